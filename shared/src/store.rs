use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{Booking, Hold, SlotCell, SlotKey};
use crate::error::StoreError;
use crate::status::{BookingStatus, PaymentStatus};

/// Outcome of an atomic hold placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed,
    SlotMissing,
    SlotInactive,
    Insufficient { available: i32 },
}

/// Outcome of settling (confirming or releasing) a hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    Applied,
    HoldMissing,
    /// Confirming would push `booked` past capacity (counter drift). The
    /// hold survives; nothing was written.
    Rejected { available: i32 },
}

/// Storage of slot capacity cells and their holds.
///
/// Implementations must guarantee that each mutating operation is atomic per
/// cell (the counter change and the companion hold-record write commit
/// together or not at all) and that operations on different cells never
/// serialize against each other.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn load_cell(&self, key: &SlotKey) -> Result<Option<SlotCell>, StoreError>;

    /// Create or refresh a cell definition. Counters of an existing cell are
    /// left untouched.
    async fn upsert_cell(&self, cell: &SlotCell) -> Result<(), StoreError>;

    /// Guarded `held += seats` plus hold-record insert, one atomic unit.
    async fn place_hold(&self, hold: &Hold) -> Result<PlaceOutcome, StoreError>;

    /// `held -= seats; booked += seats` plus hold-record delete.
    async fn confirm_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError>;

    /// Clamped `held -= seats` plus hold-record delete. A missing hold is
    /// reported, not an error.
    async fn release_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError>;

    /// Clamped `booked -= seats`: cancellation of a confirmed booking.
    async fn release_booked(&self, key: &SlotKey, seats: i32) -> Result<(), StoreError>;

    async fn get_hold(&self, booking_id: Uuid) -> Result<Option<Hold>, StoreError>;

    /// Remove a hold record without touching counters.
    async fn delete_hold(&self, booking_id: Uuid) -> Result<(), StoreError>;

    /// All holds with `expires_at <= now`.
    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError>;

    /// Seats across live (non-expired) holds for one cell.
    async fn live_held_seats(&self, key: &SlotKey, now: DateTime<Utc>)
        -> Result<i32, StoreError>;

    /// Replace a cell's counters wholesale. Drift-correction only.
    async fn overwrite_counters(
        &self,
        key: &SlotKey,
        booked: i32,
        held: i32,
    ) -> Result<(), StoreError>;
}

/// Storage of booking rows.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// A Processing or Approved booking by the same user for the same event,
    /// slot and date. Terminal rows do not block a retry.
    async fn find_active_duplicate(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Booking>, StoreError>;

    async fn update_status(
        &self,
        booking_id: Uuid,
        booking_status: BookingStatus,
        payment_status: PaymentStatus,
        payment_reference: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Sum of seats over Approved bookings for one cell, the authoritative
    /// input to recalculation.
    async fn approved_seats(&self, key: &SlotKey) -> Result<i32, StoreError>;
}
