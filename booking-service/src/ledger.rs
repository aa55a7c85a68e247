use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared::*;

/// The sole mutator of slot counters.
///
/// Each operation is linearizable per cell through the store's locking:
/// concurrent operations on one cell serialize, operations on different
/// cells never block each other. Nothing here (or anywhere) locks the whole
/// inventory.
pub struct InventoryLedger {
    slots: Arc<dyn SlotStore>,
    bookings: Arc<dyn BookingStore>,
}

impl InventoryLedger {
    pub fn new(slots: Arc<dyn SlotStore>, bookings: Arc<dyn BookingStore>) -> Self {
        Self { slots, bookings }
    }

    /// Seats currently open on a cell: `capacity - booked - held`.
    pub async fn check_availability(
        &self,
        key: &SlotKey,
        seats: i32,
    ) -> Result<i32, BookingError> {
        if seats <= 0 {
            return Err(BookingError::InvalidSeats(seats));
        }
        let cell = self
            .slots
            .load_cell(key)
            .await?
            .ok_or(BookingError::SlotNotFound)?;
        if !cell.active {
            return Err(BookingError::SlotInactive);
        }
        Ok(cell.counters.available())
    }

    /// Atomically admit a hold. Two racing calls that together would exceed
    /// capacity resolve with exactly one winner; the loser gets
    /// `InsufficientCapacity` and must not be retried automatically.
    pub async fn place_hold(&self, hold: Hold) -> Result<Hold, BookingError> {
        if hold.seats <= 0 {
            return Err(BookingError::InvalidSeats(hold.seats));
        }
        match self.slots.place_hold(&hold).await? {
            PlaceOutcome::Placed => {
                info!(
                    booking_id = %hold.booking_id,
                    slot_id = %hold.key.slot_id,
                    seats = hold.seats,
                    "hold placed"
                );
                Ok(hold)
            }
            PlaceOutcome::SlotMissing => Err(BookingError::SlotNotFound),
            PlaceOutcome::SlotInactive => Err(BookingError::SlotInactive),
            PlaceOutcome::Insufficient { available } => {
                // an expected outcome, not a system error
                debug!(
                    booking_id = %hold.booking_id,
                    slot_id = %hold.key.slot_id,
                    requested = hold.seats,
                    available,
                    "hold rejected, insufficient capacity"
                );
                Err(BookingError::InsufficientCapacity { available })
            }
        }
    }

    /// Move a hold's seats from `held` to `booked` and delete the hold.
    /// Returns `Ok(false)` when no live hold exists; the caller decides
    /// whether that is an idempotent re-confirm (checked against the
    /// booking's own status) or an error.
    pub async fn confirm_hold(&self, booking_id: Uuid) -> Result<bool, BookingError> {
        match self.slots.confirm_hold(booking_id).await? {
            SettleOutcome::Applied => {
                info!(%booking_id, "hold confirmed");
                Ok(true)
            }
            SettleOutcome::HoldMissing => Ok(false),
            SettleOutcome::Rejected { available } => {
                Err(BookingError::InsufficientCapacity { available })
            }
        }
    }

    /// Give a hold's seats back to the pool. Idempotent: a missing hold is a
    /// no-op, and `held` can never go negative.
    pub async fn release_hold(&self, booking_id: Uuid) -> Result<(), BookingError> {
        match self.slots.release_hold(booking_id).await? {
            SettleOutcome::Applied => {
                info!(%booking_id, "hold released");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Return confirmed seats to the pool: cancellation of an approved
    /// booking, a distinct path from releasing a hold.
    pub async fn release_booked(&self, key: &SlotKey, seats: i32) -> Result<(), BookingError> {
        self.slots.release_booked(key, seats).await?;
        info!(slot_id = %key.slot_id, seats, "booked seats released");
        Ok(())
    }

    /// Rebuild a cell's counters from the source of truth: `booked` from the
    /// sum of approved bookings, `held` from live holds. Drift correction,
    /// not a hot path.
    pub async fn recalculate(&self, key: &SlotKey) -> Result<(), BookingError> {
        self.recalculate_at(key, Utc::now()).await
    }

    pub async fn recalculate_at(
        &self,
        key: &SlotKey,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let booked = self.bookings.approved_seats(key).await?;
        let held = self.slots.live_held_seats(key, now).await?;
        self.slots.overwrite_counters(key, booked, held).await?;
        info!(slot_id = %key.slot_id, booked, held, "cell counters recalculated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Duration;

    fn key() -> SlotKey {
        SlotKey::new(Uuid::new_v4(), "2026-10-01".parse().unwrap(), "slot_1")
    }

    async fn setup(capacity: i32) -> (Arc<MemoryStore>, Arc<InventoryLedger>, SlotKey) {
        let store = Arc::new(MemoryStore::new());
        let key = key();
        store
            .upsert_cell(&SlotCell::new(key.clone(), capacity, BigDecimal::from(40)))
            .await
            .unwrap();
        let ledger = Arc::new(InventoryLedger::new(store.clone(), store.clone()));
        (store, ledger, key)
    }

    fn hold_for(key: &SlotKey, seats: i32) -> Hold {
        Hold::new(
            Uuid::new_v4(),
            key.clone(),
            seats,
            Utc::now(),
            Duration::minutes(15),
        )
    }

    async fn counters(store: &MemoryStore, key: &SlotKey) -> SlotCounters {
        store.load_cell(key).await.unwrap().unwrap().counters
    }

    #[tokio::test]
    async fn two_racing_full_capacity_holds_admit_exactly_one() {
        let (store, ledger, key) = setup(10).await;

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let ledger = ledger.clone();
            let hold = hold_for(&key, 10);
            tasks.push(tokio::spawn(async move { ledger.place_hold(hold).await }));
        }

        let mut placed = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => placed += 1,
                Err(BookingError::InsufficientCapacity { available }) => {
                    assert_eq!(available, 0);
                    rejected += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(placed, 1);
        assert_eq!(rejected, 1);
        assert_eq!(counters(&store, &key).await.held, 10);
    }

    #[tokio::test]
    async fn many_racing_holds_never_oversell() {
        let (store, ledger, key) = setup(10).await;

        let mut tasks = Vec::new();
        for _ in 0..25 {
            let ledger = ledger.clone();
            let hold = hold_for(&key, 1);
            tasks.push(tokio::spawn(async move { ledger.place_hold(hold).await }));
        }

        let mut placed = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                placed += 1;
            }
        }
        assert_eq!(placed, 10);
        let c = counters(&store, &key).await;
        assert_eq!(c.held, 10);
        assert_eq!(c.available(), 0);
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let (store, ledger, key) = setup(10).await;
        let hold = hold_for(&key, 3);
        let booking_id = hold.booking_id;
        ledger.place_hold(hold).await.unwrap();

        assert!(ledger.confirm_hold(booking_id).await.unwrap());
        let after_first = counters(&store, &key).await;
        assert_eq!(after_first.booked, 3);
        assert_eq!(after_first.held, 0);

        assert!(!ledger.confirm_hold(booking_id).await.unwrap());
        assert_eq!(counters(&store, &key).await, after_first);
    }

    #[tokio::test]
    async fn release_is_idempotent_and_never_goes_negative() {
        let (store, ledger, key) = setup(10).await;

        // releasing a hold that never existed is a no-op
        ledger.release_hold(Uuid::new_v4()).await.unwrap();
        assert_eq!(counters(&store, &key).await.held, 0);

        let hold = hold_for(&key, 5);
        let booking_id = hold.booking_id;
        ledger.place_hold(hold).await.unwrap();
        ledger.release_hold(booking_id).await.unwrap();
        ledger.release_hold(booking_id).await.unwrap();

        let c = counters(&store, &key).await;
        assert_eq!(c.held, 0);
        assert_eq!(c.booked, 0);
    }

    #[tokio::test]
    async fn availability_checks_validate_input() {
        let (_, ledger, key) = setup(10).await;
        assert_eq!(
            ledger.check_availability(&key, 0).await,
            Err(BookingError::InvalidSeats(0))
        );
        let missing = SlotKey::new(Uuid::new_v4(), key.date, "slot_1");
        assert_eq!(
            ledger.check_availability(&missing, 2).await,
            Err(BookingError::SlotNotFound)
        );
        assert_eq!(ledger.check_availability(&key, 2).await, Ok(10));
    }

    #[tokio::test]
    async fn inactive_slot_rejects_holds() {
        let (store, ledger, key) = setup(10).await;
        let mut cell = store.load_cell(&key).await.unwrap().unwrap();
        cell.active = false;
        store.upsert_cell(&cell).await.unwrap();

        assert_eq!(
            ledger.check_availability(&key, 1).await,
            Err(BookingError::SlotInactive)
        );
        assert_eq!(
            ledger.place_hold(hold_for(&key, 1)).await,
            Err(BookingError::SlotInactive)
        );
    }

    #[tokio::test]
    async fn recalculate_converges_from_drifted_counters() {
        let (store, ledger, key) = setup(20).await;
        let now = Utc::now();

        // source of truth: two approved bookings (6 seats), one cancelled
        for (seats, status) in [
            (4, BookingStatus::Approved),
            (2, BookingStatus::Approved),
            (9, BookingStatus::Cancelled),
        ] {
            let booking = Booking {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                key: key.clone(),
                seats,
                unit_price: BigDecimal::from(40),
                total_price: BigDecimal::from(40 * seats),
                booking_status: status,
                payment_status: PaymentStatus::Completed,
                payment_reference: None,
                created_at: now,
                updated_at: now,
            };
            BookingStore::insert(store.as_ref(), &booking).await.unwrap();
        }

        // one live hold (3 seats) and one already-expired hold (2 seats)
        ledger
            .place_hold(Hold::new(
                Uuid::new_v4(),
                key.clone(),
                3,
                now,
                Duration::minutes(15),
            ))
            .await
            .unwrap();
        ledger
            .place_hold(Hold::new(
                Uuid::new_v4(),
                key.clone(),
                2,
                now - Duration::minutes(30),
                Duration::minutes(15),
            ))
            .await
            .unwrap();

        // drift the counters badly before recalculating
        store.overwrite_counters(&key, 19, 0).await.unwrap();

        ledger.recalculate_at(&key, now).await.unwrap();
        let c = counters(&store, &key).await;
        assert_eq!(c.booked, 6);
        assert_eq!(c.held, 3);
    }
}
