use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use shared::*;

use crate::holds::HoldManager;
use crate::ledger::InventoryLedger;
use crate::notify::Notifier;
use crate::payment::{PaymentGateway, CAPTURE_COMPLETED};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub sub_slot: String,
    pub seats: i32,
}

#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub approval_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// Orchestrates the booking state machine. The only component that moves
/// `booking_status`/`payment_status`; every transition applies its ledger
/// side-effect first and commits the status flip only after the ledger
/// succeeded, so a ledger failure leaves the row untouched.
pub struct BookingLifecycle {
    bookings: Arc<dyn BookingStore>,
    slots: Arc<dyn SlotStore>,
    ledger: Arc<InventoryLedger>,
    holds: Arc<HoldManager>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    payment: PaymentSettings,
}

impl BookingLifecycle {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        slots: Arc<dyn SlotStore>,
        ledger: Arc<InventoryLedger>,
        holds: Arc<HoldManager>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        payment: PaymentSettings,
    ) -> Self {
        Self {
            bookings,
            slots,
            ledger,
            holds,
            gateway,
            notifier,
            payment,
        }
    }

    pub async fn create_booking(
        &self,
        request: BookingRequest,
    ) -> Result<CreatedBooking, BookingError> {
        if request.seats <= 0 {
            return Err(BookingError::InvalidSeats(request.seats));
        }

        // reject duplicates before touching any seats
        if let Some(existing) = self
            .bookings
            .find_active_duplicate(
                request.user_id,
                request.event_id,
                request.slot_id,
                request.date,
            )
            .await?
        {
            info!(
                booking_id = %existing.id,
                user_id = %request.user_id,
                "duplicate booking attempt rejected"
            );
            return Err(BookingError::DuplicateBooking);
        }

        let key = SlotKey::new(request.slot_id, request.date, request.sub_slot.clone());
        let cell = self
            .slots
            .load_cell(&key)
            .await?
            .ok_or(BookingError::SlotNotFound)?;
        if !cell.active {
            return Err(BookingError::SlotInactive);
        }

        let unit_price = cell.counters.price.clone();
        let total_price = &unit_price * BigDecimal::from(request.seats);
        let booking_id = Uuid::new_v4();
        let now = Utc::now();

        let hold = self.holds.create(booking_id, key.clone(), request.seats);
        if let Err(err) = self.ledger.place_hold(hold).await {
            if let BookingError::InsufficientCapacity { .. } = err {
                // rejected bookings are kept, in Failed, for the audit trail
                let failed = build_booking(
                    booking_id,
                    &request,
                    key,
                    unit_price,
                    total_price,
                    BookingStatus::Failed,
                    PaymentStatus::Failed,
                );
                if let Err(store_err) = self.bookings.insert(&failed).await {
                    warn!(%booking_id, error = %store_err, "failed to record rejected booking");
                }
            }
            return Err(err);
        }

        let booking = build_booking(
            booking_id,
            &request,
            key,
            unit_price,
            total_price,
            BookingStatus::Processing,
            PaymentStatus::Pending,
        );
        if let Err(err) = self.bookings.insert(&booking).await {
            // a hold must not outlive the booking row we failed to write
            if let Err(release_err) = self.ledger.release_hold(booking_id).await {
                warn!(%booking_id, error = %release_err, "failed to release orphaned hold");
            }
            return Err(err.into());
        }

        let order = match self
            .gateway
            .create_order(
                &booking.total_price,
                &self.payment.currency,
                &self.payment.return_url,
                &self.payment.cancel_url,
            )
            .await
        {
            Ok(order) => order,
            Err(err) => {
                if let Err(release_err) = self.ledger.release_hold(booking_id).await {
                    warn!(%booking_id, error = %release_err, "failed to release hold after gateway error");
                }
                self.bookings
                    .update_status(
                        booking_id,
                        BookingStatus::Failed,
                        PaymentStatus::Failed,
                        None,
                    )
                    .await?;
                return Err(err);
            }
        };

        info!(%booking_id, created_at = %now, "booking created, awaiting payment");
        Ok(CreatedBooking {
            booking,
            approval_url: order.approval_url,
        })
    }

    /// Payment-capture callback. Idempotent: a replayed callback for an
    /// already approved and paid booking succeeds without re-mutating.
    pub async fn confirm_payment(
        &self,
        booking_id: Uuid,
        token: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if booking.booking_status == BookingStatus::Approved
            && booking.payment_status == PaymentStatus::Completed
        {
            return Ok(booking);
        }
        if booking.booking_status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                from: booking.booking_status,
                to: BookingStatus::Approved,
            });
        }

        let capture = self.gateway.capture_order(token).await?;
        if capture != CAPTURE_COMPLETED {
            warn!(%booking_id, capture, "payment capture did not complete");
            if let Err(release_err) = self.ledger.release_hold(booking_id).await {
                warn!(%booking_id, error = %release_err, "failed to release hold after capture failure");
            }
            self.bookings
                .update_status(
                    booking_id,
                    BookingStatus::Failed,
                    PaymentStatus::Failed,
                    None,
                )
                .await?;
            return Err(BookingError::PaymentGateway(format!(
                "capture returned {capture}"
            )));
        }

        let applied = self.ledger.confirm_hold(booking_id).await?;
        if !applied && booking.booking_status != BookingStatus::Approved {
            // the hold expired (and was swept) before the callback arrived
            return Err(BookingError::HoldNotFound);
        }

        self.bookings
            .update_status(
                booking_id,
                BookingStatus::Approved,
                PaymentStatus::Completed,
                Some(token),
            )
            .await?;

        let confirmed = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        info!(%booking_id, "booking approved");
        self.send_confirmation(&confirmed);
        Ok(confirmed)
    }

    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;

        if booking.payment_status == PaymentStatus::Completed {
            return Err(BookingError::CannotCancelPaidBooking);
        }

        match booking.booking_status {
            BookingStatus::Cancelled | BookingStatus::Failed => {
                return Err(BookingError::AlreadyCancelled);
            }
            BookingStatus::Processing => {
                self.ledger.release_hold(booking_id).await?;
            }
            BookingStatus::Approved => {
                // confirmed seats, not a hold
                self.ledger
                    .release_booked(&booking.key, booking.seats)
                    .await?;
            }
        }

        self.bookings
            .update_status(
                booking_id,
                BookingStatus::Cancelled,
                PaymentStatus::Cancelled,
                None,
            )
            .await?;

        info!(%booking_id, "booking cancelled");
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)
    }

    /// Admin-driven transition. The ledger side-effect is keyed on the
    /// *previous* status, so a transition into Approved from a state that
    /// never held seats cannot spuriously decrement `held`.
    pub async fn update_status(
        &self,
        booking_id: Uuid,
        new_status: BookingStatus,
    ) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)?;
        let from = booking.booking_status;

        if from == new_status {
            return Ok(booking);
        }
        if !from.can_transition_to(new_status) {
            return Err(BookingError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        match (from, new_status) {
            (BookingStatus::Processing, BookingStatus::Approved) => {
                if !self.ledger.confirm_hold(booking_id).await? {
                    return Err(BookingError::HoldNotFound);
                }
            }
            (BookingStatus::Processing, BookingStatus::Cancelled | BookingStatus::Failed) => {
                self.ledger.release_hold(booking_id).await?;
            }
            (BookingStatus::Approved, BookingStatus::Cancelled) => {
                if booking.payment_status == PaymentStatus::Completed {
                    return Err(BookingError::CannotCancelPaidBooking);
                }
                self.ledger
                    .release_booked(&booking.key, booking.seats)
                    .await?;
            }
            _ => {}
        }

        let payment_status = match new_status {
            BookingStatus::Cancelled => PaymentStatus::Cancelled,
            BookingStatus::Failed => PaymentStatus::Failed,
            _ => booking.payment_status,
        };

        self.bookings
            .update_status(booking_id, new_status, payment_status, None)
            .await?;

        info!(%booking_id, from = from.as_str(), to = new_status.as_str(), "booking status updated");
        self.bookings
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound)
    }

    fn send_confirmation(&self, booking: &Booking) {
        let notifier = Arc::clone(&self.notifier);
        let booking = booking.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.send_booking_confirmation(booking.clone()).await {
                warn!(booking_id = %booking.id, error = %err, "confirmation notice failed");
            }
        });
    }
}

fn build_booking(
    booking_id: Uuid,
    request: &BookingRequest,
    key: SlotKey,
    unit_price: BigDecimal,
    total_price: BigDecimal,
    booking_status: BookingStatus,
    payment_status: PaymentStatus,
) -> Booking {
    let now = Utc::now();
    Booking {
        id: booking_id,
        user_id: request.user_id,
        event_id: request.event_id,
        key,
        seats: request.seats,
        unit_price,
        total_price,
        booking_status,
        payment_status,
        payment_reference: None,
        created_at: now,
        updated_at: now,
    }
}
