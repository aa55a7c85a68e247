use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{
    pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use shared::*;

use crate::models::{BookingRow, HoldRow, SlotCellRow};
use crate::schema::{bookings, seat_holds, slot_cells};

type DbPool = Pool<AsyncPgConnection>;

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 25;

/// Postgres backend for both storage traits.
///
/// Every mutating slot operation runs in one transaction that locks the cell
/// row (`SELECT ... FOR UPDATE`), applies the shared counter arithmetic, and
/// writes the row plus its companion hold record. The row lock is the
/// per-cell serialization point; unrelated cells proceed in parallel.
/// Serialization failures and pool timeouts are retried with jittered
/// backoff before surfacing as `Conflict`/`Timeout`.
pub struct PgStore {
    pool: DbPool,
}

enum TxnError {
    Retryable(StoreError),
    Fatal(StoreError),
}

impl TxnError {
    fn into_store(self) -> StoreError {
        match self {
            TxnError::Retryable(err) | TxnError::Fatal(err) => err,
        }
    }
}

fn db_error(err: diesel::result::Error) -> TxnError {
    match &err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            TxnError::Retryable(StoreError::Conflict)
        }
        _ => TxnError::Fatal(StoreError::Unavailable(err.to_string())),
    }
}

fn pool_error(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> TxnError {
    match err {
        bb8::RunError::TimedOut => TxnError::Retryable(StoreError::Timeout),
        bb8::RunError::User(e) => TxnError::Fatal(StoreError::Unavailable(e.to_string())),
    }
}

/// Same mapping for non-retried (read-only) paths.
fn read_error(err: diesel::result::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn read_pool_error(err: bb8::RunError<diesel_async::pooled_connection::PoolError>) -> StoreError {
    match err {
        bb8::RunError::TimedOut => StoreError::Timeout,
        bb8::RunError::User(e) => StoreError::Unavailable(e.to_string()),
    }
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn retrying<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TxnError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(TxnError::Retryable(err)) if attempt < MAX_ATTEMPTS => {
                    warn!(operation, attempt, error = %err, "retrying slot-store operation");
                    let jitter = rand::thread_rng().gen_range(0..50);
                    tokio::time::sleep(Duration::from_millis(
                        BASE_BACKOFF_MS * u64::from(attempt) + jitter,
                    ))
                    .await;
                }
                Err(err) => return Err(err.into_store()),
            }
        }
    }

    async fn place_hold_once(&self, hold: &Hold) -> Result<PlaceOutcome, TxnError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let hold = hold.clone();
        conn.transaction::<PlaceOutcome, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                let row: Option<SlotCellRow> = slot_cells::table
                    .filter(slot_cells::slot_id.eq(hold.key.slot_id))
                    .filter(slot_cells::slot_date.eq(hold.key.date))
                    .filter(slot_cells::sub_slot.eq(&hold.key.sub_slot))
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                let Some(row) = row else {
                    return Ok(PlaceOutcome::SlotMissing);
                };
                if !row.active {
                    return Ok(PlaceOutcome::SlotInactive);
                }

                let mut counters = row.counters();
                if let Err(CounterError::Insufficient { available }) =
                    counters.place(hold.seats)
                {
                    return Ok(PlaceOutcome::Insufficient { available });
                }

                diesel::update(slot_cells::table.filter(slot_cells::id.eq(row.id)))
                    .set((
                        slot_cells::held.eq(counters.held),
                        slot_cells::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                diesel::insert_into(seat_holds::table)
                    .values(HoldRow::from_hold(&hold))
                    .execute(conn)
                    .await?;

                Ok(PlaceOutcome::Placed)
            })
        })
        .await
        .map_err(db_error)
    }

    async fn confirm_hold_once(&self, booking_id: Uuid) -> Result<SettleOutcome, TxnError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        conn.transaction::<SettleOutcome, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                let hold: Option<HoldRow> = seat_holds::table
                    .find(booking_id)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let Some(hold) = hold else {
                    return Ok(SettleOutcome::HoldMissing);
                };

                let row: SlotCellRow = slot_cells::table
                    .filter(slot_cells::slot_id.eq(hold.slot_id))
                    .filter(slot_cells::slot_date.eq(hold.slot_date))
                    .filter(slot_cells::sub_slot.eq(&hold.sub_slot))
                    .for_update()
                    .first(conn)
                    .await?;

                let mut counters = row.counters();
                if let Err(CounterError::Insufficient { available }) =
                    counters.confirm(hold.seats)
                {
                    return Ok(SettleOutcome::Rejected { available });
                }

                diesel::update(slot_cells::table.filter(slot_cells::id.eq(row.id)))
                    .set((
                        slot_cells::booked.eq(counters.booked),
                        slot_cells::held.eq(counters.held),
                        slot_cells::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)
                    .await?;

                diesel::delete(seat_holds::table.find(booking_id))
                    .execute(conn)
                    .await?;

                Ok(SettleOutcome::Applied)
            })
        })
        .await
        .map_err(db_error)
    }

    async fn release_hold_once(&self, booking_id: Uuid) -> Result<SettleOutcome, TxnError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        conn.transaction::<SettleOutcome, diesel::result::Error, _>(|conn| {
            Box::pin(async move {
                let hold: Option<HoldRow> = seat_holds::table
                    .find(booking_id)
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let Some(hold) = hold else {
                    return Ok(SettleOutcome::HoldMissing);
                };

                let row: Option<SlotCellRow> = slot_cells::table
                    .filter(slot_cells::slot_id.eq(hold.slot_id))
                    .filter(slot_cells::slot_date.eq(hold.slot_date))
                    .filter(slot_cells::sub_slot.eq(&hold.sub_slot))
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;

                if let Some(row) = row {
                    let mut counters = row.counters();
                    counters.release(hold.seats);
                    diesel::update(slot_cells::table.filter(slot_cells::id.eq(row.id)))
                        .set((
                            slot_cells::held.eq(counters.held),
                            slot_cells::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                }

                diesel::delete(seat_holds::table.find(booking_id))
                    .execute(conn)
                    .await?;

                Ok(SettleOutcome::Applied)
            })
        })
        .await
        .map_err(db_error)
    }

    async fn release_booked_once(&self, key: &SlotKey, seats: i32) -> Result<(), TxnError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        let key = key.clone();
        let result = conn
            .transaction::<bool, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let row: Option<SlotCellRow> = slot_cells::table
                        .filter(slot_cells::slot_id.eq(key.slot_id))
                        .filter(slot_cells::slot_date.eq(key.date))
                        .filter(slot_cells::sub_slot.eq(&key.sub_slot))
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?;
                    let Some(row) = row else {
                        return Ok(false);
                    };

                    let mut counters = row.counters();
                    counters.release_booked(seats);
                    diesel::update(slot_cells::table.filter(slot_cells::id.eq(row.id)))
                        .set((
                            slot_cells::booked.eq(counters.booked),
                            slot_cells::updated_at.eq(Utc::now()),
                        ))
                        .execute(conn)
                        .await?;
                    Ok(true)
                })
            })
            .await
            .map_err(db_error)?;

        if result {
            Ok(())
        } else {
            Err(TxnError::Fatal(StoreError::Unavailable(
                "slot cell not found".to_string(),
            )))
        }
    }
}

#[async_trait::async_trait]
impl SlotStore for PgStore {
    async fn load_cell(&self, key: &SlotKey) -> Result<Option<SlotCell>, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let row: Option<SlotCellRow> = slot_cells::table
            .filter(slot_cells::slot_id.eq(key.slot_id))
            .filter(slot_cells::slot_date.eq(key.date))
            .filter(slot_cells::sub_slot.eq(&key.sub_slot))
            .first(&mut conn)
            .await
            .optional()
            .map_err(read_error)?;
        Ok(row.map(SlotCellRow::into_cell))
    }

    async fn upsert_cell(&self, cell: &SlotCell) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let row = SlotCellRow::from_cell(cell);
        diesel::insert_into(slot_cells::table)
            .values(&row)
            .on_conflict((
                slot_cells::slot_id,
                slot_cells::slot_date,
                slot_cells::sub_slot,
            ))
            .do_update()
            .set((
                slot_cells::capacity.eq(row.capacity),
                slot_cells::price.eq(row.price.clone()),
                slot_cells::active.eq(row.active),
                slot_cells::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(())
    }

    async fn place_hold(&self, hold: &Hold) -> Result<PlaceOutcome, StoreError> {
        self.retrying("place_hold", || self.place_hold_once(hold))
            .await
    }

    async fn confirm_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError> {
        self.retrying("confirm_hold", || self.confirm_hold_once(booking_id))
            .await
    }

    async fn release_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError> {
        self.retrying("release_hold", || self.release_hold_once(booking_id))
            .await
    }

    async fn release_booked(&self, key: &SlotKey, seats: i32) -> Result<(), StoreError> {
        self.retrying("release_booked", || self.release_booked_once(key, seats))
            .await
    }

    async fn get_hold(&self, booking_id: Uuid) -> Result<Option<Hold>, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let row: Option<HoldRow> = seat_holds::table
            .find(booking_id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(read_error)?;
        Ok(row.map(HoldRow::into_hold))
    }

    async fn delete_hold(&self, booking_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        diesel::delete(seat_holds::table.find(booking_id))
            .execute(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(())
    }

    async fn expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let rows: Vec<HoldRow> = seat_holds::table
            .filter(seat_holds::expires_at.le(now))
            .order(seat_holds::expires_at.asc())
            .load(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(rows.into_iter().map(HoldRow::into_hold).collect())
    }

    async fn live_held_seats(
        &self,
        key: &SlotKey,
        now: DateTime<Utc>,
    ) -> Result<i32, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let total: Option<i64> = seat_holds::table
            .filter(seat_holds::slot_id.eq(key.slot_id))
            .filter(seat_holds::slot_date.eq(key.date))
            .filter(seat_holds::sub_slot.eq(&key.sub_slot))
            .filter(seat_holds::expires_at.gt(now))
            .select(diesel::dsl::sum(seat_holds::seats))
            .first(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(total.unwrap_or(0) as i32)
    }

    async fn overwrite_counters(
        &self,
        key: &SlotKey,
        booked: i32,
        held: i32,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let updated = diesel::update(
            slot_cells::table
                .filter(slot_cells::slot_id.eq(key.slot_id))
                .filter(slot_cells::slot_date.eq(key.date))
                .filter(slot_cells::sub_slot.eq(&key.sub_slot)),
        )
        .set((
            slot_cells::booked.eq(booked.max(0)),
            slot_cells::held.eq(held.max(0)),
            slot_cells::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await
        .map_err(read_error)?;

        if updated == 0 {
            return Err(StoreError::Unavailable("slot cell not found".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BookingStore for PgStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        diesel::insert_into(bookings::table)
            .values(BookingRow::from_booking(booking))
            .execute(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(())
    }

    async fn get(&self, booking_id: Uuid) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let row: Option<BookingRow> = bookings::table
            .find(booking_id)
            .first(&mut conn)
            .await
            .optional()
            .map_err(read_error)?;
        Ok(row.map(BookingRow::into_booking))
    }

    async fn find_active_duplicate(
        &self,
        user_id: Uuid,
        event_id: Uuid,
        slot_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let row: Option<BookingRow> = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .filter(bookings::event_id.eq(event_id))
            .filter(bookings::slot_id.eq(slot_id))
            .filter(bookings::slot_date.eq(date))
            .filter(bookings::booking_status.eq_any(vec![
                BookingStatus::Processing.as_str(),
                BookingStatus::Approved.as_str(),
            ]))
            .first(&mut conn)
            .await
            .optional()
            .map_err(read_error)?;
        Ok(row.map(BookingRow::into_booking))
    }

    async fn update_status(
        &self,
        booking_id: Uuid,
        booking_status: BookingStatus,
        payment_status: PaymentStatus,
        payment_reference: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let updated = match payment_reference {
            Some(reference) => {
                diesel::update(bookings::table.find(booking_id))
                    .set((
                        bookings::booking_status.eq(booking_status.as_str()),
                        bookings::payment_status.eq(payment_status.as_str()),
                        bookings::payment_reference.eq(reference),
                        bookings::updated_at.eq(Utc::now()),
                    ))
                    .execute(&mut conn)
                    .await
            }
            None => {
                diesel::update(bookings::table.find(booking_id))
                    .set((
                        bookings::booking_status.eq(booking_status.as_str()),
                        bookings::payment_status.eq(payment_status.as_str()),
                        bookings::updated_at.eq(Utc::now()),
                    ))
                    .execute(&mut conn)
                    .await
            }
        }
        .map_err(read_error)?;

        if updated == 0 {
            return Err(StoreError::Unavailable("booking not found".to_string()));
        }
        Ok(())
    }

    async fn approved_seats(&self, key: &SlotKey) -> Result<i32, StoreError> {
        let mut conn = self.pool.get().await.map_err(read_pool_error)?;
        let total: Option<i64> = bookings::table
            .filter(bookings::slot_id.eq(key.slot_id))
            .filter(bookings::slot_date.eq(key.date))
            .filter(bookings::sub_slot.eq(&key.sub_slot))
            .filter(bookings::booking_status.eq(BookingStatus::Approved.as_str()))
            .select(diesel::dsl::sum(bookings::seats))
            .first(&mut conn)
            .await
            .map_err(read_error)?;
        Ok(total.unwrap_or(0) as i32)
    }
}
