use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;
use shared::*;

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::slot_cells)]
pub struct SlotCellRow {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub slot_date: NaiveDate,
    pub sub_slot: String,
    pub capacity: i32,
    pub booked: i32,
    pub held: i32,
    pub price: BigDecimal,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SlotCellRow {
    pub fn from_cell(cell: &SlotCell) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id: cell.key.slot_id,
            slot_date: cell.key.date,
            sub_slot: cell.key.sub_slot.clone(),
            capacity: cell.counters.capacity,
            booked: cell.counters.booked,
            held: cell.counters.held,
            price: cell.counters.price.clone(),
            active: cell.active,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn counters(&self) -> SlotCounters {
        SlotCounters {
            capacity: self.capacity,
            booked: self.booked,
            held: self.held,
            price: self.price.clone(),
        }
    }

    pub fn into_cell(self) -> SlotCell {
        let counters = self.counters();
        SlotCell {
            key: SlotKey::new(self.slot_id, self.slot_date, self.sub_slot),
            counters,
            active: self.active,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::seat_holds)]
pub struct HoldRow {
    pub booking_id: Uuid,
    pub slot_id: Uuid,
    pub slot_date: NaiveDate,
    pub sub_slot: String,
    pub seats: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl HoldRow {
    pub fn from_hold(hold: &Hold) -> Self {
        Self {
            booking_id: hold.booking_id,
            slot_id: hold.key.slot_id,
            slot_date: hold.key.date,
            sub_slot: hold.key.sub_slot.clone(),
            seats: hold.seats,
            created_at: hold.created_at,
            expires_at: hold.expires_at,
        }
    }

    pub fn into_hold(self) -> Hold {
        Hold {
            booking_id: self.booking_id,
            key: SlotKey::new(self.slot_id, self.slot_date, self.sub_slot),
            seats: self.seats,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::bookings)]
pub struct BookingRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_id: Uuid,
    pub slot_id: Uuid,
    pub slot_date: NaiveDate,
    pub sub_slot: String,
    pub seats: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
    pub booking_status: String,
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BookingRow {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            event_id: booking.event_id,
            slot_id: booking.key.slot_id,
            slot_date: booking.key.date,
            sub_slot: booking.key.sub_slot.clone(),
            seats: booking.seats,
            unit_price: booking.unit_price.clone(),
            total_price: booking.total_price.clone(),
            booking_status: booking.booking_status.as_str().to_string(),
            payment_status: booking.payment_status.as_str().to_string(),
            payment_reference: booking.payment_reference.clone(),
            created_at: Some(booking.created_at),
            updated_at: Some(booking.updated_at),
        }
    }

    pub fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            user_id: self.user_id,
            event_id: self.event_id,
            key: SlotKey::new(self.slot_id, self.slot_date, self.sub_slot),
            seats: self.seats,
            unit_price: self.unit_price,
            total_price: self.total_price,
            booking_status: BookingStatus::parse(&self.booking_status)
                .unwrap_or(BookingStatus::Failed),
            payment_status: PaymentStatus::parse(&self.payment_status)
                .unwrap_or(PaymentStatus::Failed),
            payment_reference: self.payment_reference,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}
