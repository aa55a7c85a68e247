use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::{Booking, CounterError, Hold, SlotCell, SlotKey};
use crate::error::StoreError;
use crate::status::{BookingStatus, PaymentStatus};
use crate::store::{BookingStore, PlaceOutcome, SettleOutcome, SlotStore};

use async_trait::async_trait;

/// In-memory backend for tests and local runs.
///
/// Per-cell atomicity comes from the map entry guard: a mutating operation
/// holds the guard for its cell across the whole read-modify-write, while
/// other cells stay free. Hold settlement removes the hold record first:
/// `DashMap::remove` hands it out at most once, so racing double
/// confirms/releases have exactly one winner.
#[derive(Default)]
pub struct MemoryStore {
    cells: DashMap<SlotKey, SlotCell>,
    holds: DashMap<Uuid, Hold>,
    bookings: DashMap<Uuid, Booking>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all booking rows, for inspection in tests.
    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings.iter().map(|b| b.value().clone()).collect()
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn load_cell(&self, key: &SlotKey) -> Result<Option<SlotCell>, StoreError> {
        Ok(self.cells.get(key).map(|cell| cell.value().clone()))
    }

    async fn upsert_cell(&self, cell: &SlotCell) -> Result<(), StoreError> {
        match self.cells.get_mut(&cell.key) {
            Some(mut existing) => {
                existing.counters.capacity = cell.counters.capacity;
                existing.counters.price = cell.counters.price.clone();
                existing.active = cell.active;
            }
            None => {
                self.cells.insert(cell.key.clone(), cell.clone());
            }
        }
        Ok(())
    }

    async fn place_hold(&self, hold: &Hold) -> Result<PlaceOutcome, StoreError> {
        let Some(mut cell) = self.cells.get_mut(&hold.key) else {
            return Ok(PlaceOutcome::SlotMissing);
        };
        if !cell.active {
            return Ok(PlaceOutcome::SlotInactive);
        }
        match cell.counters.place(hold.seats) {
            Err(CounterError::Insufficient { available }) => {
                Ok(PlaceOutcome::Insufficient { available })
            }
            Ok(()) => {
                // hold record committed under the cell guard
                self.holds.insert(hold.booking_id, hold.clone());
                Ok(PlaceOutcome::Placed)
            }
        }
    }

    async fn confirm_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError> {
        let Some((_, hold)) = self.holds.remove(&booking_id) else {
            return Ok(SettleOutcome::HoldMissing);
        };
        let Some(mut cell) = self.cells.get_mut(&hold.key) else {
            self.holds.insert(hold.booking_id, hold);
            return Err(StoreError::Unavailable(
                "slot cell missing for hold".to_string(),
            ));
        };
        match cell.counters.confirm(hold.seats) {
            Ok(()) => Ok(SettleOutcome::Applied),
            Err(CounterError::Insufficient { available }) => {
                self.holds.insert(hold.booking_id, hold.clone());
                Ok(SettleOutcome::Rejected { available })
            }
        }
    }

    async fn release_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError> {
        let Some((_, hold)) = self.holds.remove(&booking_id) else {
            return Ok(SettleOutcome::HoldMissing);
        };
        if let Some(mut cell) = self.cells.get_mut(&hold.key) {
            cell.counters.release(hold.seats);
        }
        Ok(SettleOutcome::Applied)
    }

    async fn release_booked(&self, key: &SlotKey, seats: i32) -> Result<(), StoreError> {
        let Some(mut cell) = self.cells.get_mut(key) else {
            return Err(StoreError::Unavailable("slot cell not found".to_string()));
        };
        cell.counters.release_booked(seats);
        Ok(())
    }

    async fn get_hold(&self, booking_id: Uuid) -> Result<Option<Hold>, StoreError> {
        Ok(self.holds.get(&booking_id).map(|h| h.value().clone()))
    }

    async fn delete_hold(&self, booking_id: Uuid) -> Result<(), StoreError> {
        self.holds.remove(&booking_id);
        Ok(())
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError> {
        Ok(self
            .holds
            .iter()
            .filter(|h| h.value().is_expired(now))
            .map(|h| h.value().clone())
            .collect())
    }

    async fn live_held_seats(
        &self,
        key: &SlotKey,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        Ok(self
            .holds
            .iter()
            .filter(|h| h.value().key == *key && !h.value().is_expired(now))
            .map(|h| h.value().seats)
            .sum())
    }

    async fn overwrite_counters(
        &self,
        key: &SlotKey,
        booked: i32,
        held: i32,
    ) -> Result<(), StoreError> {
        let Some(mut cell) = self.cells.get_mut(key) else {
            return Err(StoreError::Unavailable("slot cell not found".to_string()));
        };
        cell.counters.booked = booked.max(0);
        cell.counters.held = held.max(0);
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&booking_id).map(|b| b.value().clone()))
    }

    async fn find_active_duplicate(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .bookings
            .iter()
            .find(|b| {
                let booking = b.value();
                booking.user_id == user_id
                    && booking.event_id == event_id
                    && booking.key.slot_id == slot_id
                    && booking.key.date == date
                    && matches!(
                        booking.booking_status,
                        BookingStatus::Processing | BookingStatus::Approved
                    )
            })
            .map(|b| b.value().clone()))
    }

    async fn update_status(
        &self,
        booking_id: Uuid,
        booking_status: BookingStatus,
        payment_status: PaymentStatus,
        payment_reference: Option<&str>,
    ) -> Result<(), StoreError> {
        let Some(mut booking) = self.bookings.get_mut(&booking_id) else {
            return Err(StoreError::Unavailable("booking not found".to_string()));
        };
        booking.booking_status = booking_status;
        booking.payment_status = payment_status;
        if let Some(reference) = payment_reference {
            booking.payment_reference = Some(reference.to_string());
        }
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn approved_seats(&self, key: &SlotKey) -> Result<i32, StoreError> {
        Ok(self
            .bookings
            .iter()
            .filter(|b| {
                b.value().key == *key && b.value().booking_status == BookingStatus::Approved
            })
            .map(|b| b.value().seats)
            .sum())
    }
}
