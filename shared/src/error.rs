use thiserror::Error;

use crate::status::BookingStatus;

/// Failures raised by a storage backend. `Timeout` and `Conflict` are
/// retried internally by the backend before they ever surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("storage operation timed out")]
    Timeout,
    #[error("conflicting concurrent update")]
    Conflict,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The caller-facing error taxonomy of the booking core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    #[error("slot not found")]
    SlotNotFound,
    #[error("slot is inactive")]
    SlotInactive,
    #[error("seat count must be positive, got {0}")]
    InvalidSeats(i32),
    #[error("insufficient capacity: {available} seat(s) available")]
    InsufficientCapacity { available: i32 },
    #[error("no live hold for this booking")]
    HoldNotFound,
    #[error("booking not found")]
    BookingNotFound,
    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("concurrent modification, retries exhausted")]
    ConcurrentModification,
    #[error("a booking for this user, event and slot already exists")]
    DuplicateBooking,
    #[error("booking is already cancelled")]
    AlreadyCancelled,
    #[error("paid bookings cannot be cancelled")]
    CannotCancelPaidBooking,
    #[error("payment gateway error: {0}")]
    PaymentGateway(String),
    #[error("storage operation timed out")]
    StorageTimeout,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => BookingError::StorageTimeout,
            StoreError::Conflict => BookingError::ConcurrentModification,
            StoreError::Unavailable(message) => BookingError::Storage(message),
        }
    }
}
