use async_trait::async_trait;
use tracing::info;

use shared::{Booking, BookingError};

/// Best-effort confirmation sender. Failures are logged by the caller and
/// never roll a booking back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_booking_confirmation(&self, booking: Booking) -> Result<(), BookingError>;
}

/// Stand-in sender that writes the confirmation to the log. A mail or push
/// integration slots in behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_booking_confirmation(&self, booking: Booking) -> Result<(), BookingError> {
        info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            seats = booking.seats,
            total = %booking.total_price,
            "booking confirmation sent"
        );
        Ok(())
    }
}
