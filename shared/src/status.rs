use serde::{Deserialize, Serialize};

/// Booking lifecycle states. `Cancelled` and `Failed` are terminal;
/// `Approved` can still be cancelled while unpaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Processing,
    Approved,
    Cancelled,
    Failed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Processing => "PROCESSING",
            BookingStatus::Approved => "APPROVED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PROCESSING" => Some(BookingStatus::Processing),
            "APPROVED" => Some(BookingStatus::Approved),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "FAILED" => Some(BookingStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Failed)
    }

    /// The closed transition table for booking state.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (
                BookingStatus::Processing,
                BookingStatus::Approved | BookingStatus::Cancelled | BookingStatus::Failed
            ) | (BookingStatus::Approved, BookingStatus::Cancelled)
        )
    }
}

/// Payment state, an independent axis from [`BookingStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_reaches_every_terminal_state() {
        assert!(BookingStatus::Processing.can_transition_to(BookingStatus::Approved));
        assert!(BookingStatus::Processing.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Processing.can_transition_to(BookingStatus::Failed));
    }

    #[test]
    fn terminal_states_do_not_move() {
        for from in [BookingStatus::Cancelled, BookingStatus::Failed] {
            for to in [
                BookingStatus::Processing,
                BookingStatus::Approved,
                BookingStatus::Cancelled,
                BookingStatus::Failed,
            ] {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn approved_only_cancels() {
        assert!(BookingStatus::Approved.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Approved.can_transition_to(BookingStatus::Processing));
        assert!(!BookingStatus::Approved.can_transition_to(BookingStatus::Failed));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            BookingStatus::Processing,
            BookingStatus::Approved,
            BookingStatus::Cancelled,
            BookingStatus::Failed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::parse("UNKNOWN"), None);
    }
}
