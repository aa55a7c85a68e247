use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::status::{BookingStatus, PaymentStatus};

/// Address of one bookable capacity cell: a sub-slot of an event slot on a
/// calendar date. Sub-slot keys are opaque identifiers ("slot_1", "vip");
/// mapping display strings onto them is a presentation concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub sub_slot: String,
}

impl SlotKey {
    pub fn new(slot_id: Uuid, date: NaiveDate, sub_slot: impl Into<String>) -> Self {
        Self {
            slot_id,
            date,
            sub_slot: sub_slot.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CounterError {
    #[error("insufficient capacity: {available} seat(s) available")]
    Insufficient { available: i32 },
}

/// Seat accounting for one cell. `capacity` is fixed at creation; `booked`
/// and `held` move only through the methods below, which keep
/// `0 <= booked + held <= capacity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCounters {
    pub capacity: i32,
    pub booked: i32,
    pub held: i32,
    pub price: BigDecimal,
}

impl SlotCounters {
    pub fn new(capacity: i32, price: BigDecimal) -> Self {
        Self {
            capacity,
            booked: 0,
            held: 0,
            price,
        }
    }

    pub fn available(&self) -> i32 {
        self.capacity - self.booked - self.held
    }

    /// Admit `seats` into `held`, rejecting anything the cell cannot absorb.
    pub fn place(&mut self, seats: i32) -> Result<(), CounterError> {
        let available = self.available();
        if seats > available {
            return Err(CounterError::Insufficient { available });
        }
        self.held += seats;
        Ok(())
    }

    /// Move `seats` from `held` to `booked`. The sum is preserved, so a cell
    /// that admitted the hold can always confirm it; a drifted cell that no
    /// longer can is rejected rather than oversold.
    pub fn confirm(&mut self, seats: i32) -> Result<(), CounterError> {
        if self.booked + seats > self.capacity {
            return Err(CounterError::Insufficient {
                available: self.capacity - self.booked,
            });
        }
        self.held = (self.held - seats).max(0);
        self.booked += seats;
        Ok(())
    }

    /// Drop `seats` from `held`, clamping at zero. Never touches `booked`.
    pub fn release(&mut self, seats: i32) {
        self.held = (self.held - seats).max(0);
    }

    /// Drop `seats` from `booked`, clamping at zero. Cancellation of an
    /// approved booking, not a hold release.
    pub fn release_booked(&mut self, seats: i32) {
        self.booked = (self.booked - seats).max(0);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCell {
    pub key: SlotKey,
    pub counters: SlotCounters,
    pub active: bool,
}

impl SlotCell {
    pub fn new(key: SlotKey, capacity: i32, price: BigDecimal) -> Self {
        Self {
            key,
            counters: SlotCounters::new(capacity, price),
            active: true,
        }
    }
}

/// TTL-bounded seat reservation pending payment. Deleting the record is the
/// terminal state; an expired hold differs from a released one only in being
/// sweep-initiated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub booking_id: Uuid,
    #[serde(flatten)]
    pub key: SlotKey,
    pub seats: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(
        booking_id: Uuid,
        key: SlotKey,
        seats: i32,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            booking_id,
            key,
            seats,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// One booking row. Rows are never deleted, only status-transitioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    #[serde(flatten)]
    pub key: SlotKey,
    pub seats: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
