use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use shared::BookingError;

use crate::holds::HoldManager;
use crate::ledger::InventoryLedger;

/// Background reclaim of expired holds. Holds whose bookings never complete
/// payment are released back to their cells on a fixed cadence; a sweep that
/// fails is retried wholesale on the next tick, and a hold that fails to
/// release is skipped rather than blocking the rest of the batch.
pub struct ExpirySweeper {
    ledger: Arc<InventoryLedger>,
    holds: Arc<HoldManager>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(ledger: Arc<InventoryLedger>, holds: Arc<HoldManager>, interval: Duration) -> Self {
        Self {
            ledger,
            holds,
            interval,
        }
    }

    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep(Utc::now()).await {
                Ok(0) => debug!("sweep found no expired holds"),
                Ok(released) => info!(released, "sweep released expired holds"),
                Err(err) => error!(error = %err, "sweep failed, retrying next tick"),
            }
        }
    }

    /// One pass over the expired holds at `now`. Returns how many were
    /// released. Racing payment confirmations are safe: whichever of the
    /// sweeper and the confirmation settles the hold first wins, and the
    /// loser sees it as already gone.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, BookingError> {
        let expired = self.holds.list_expired(now).await?;
        let mut released = 0;
        for hold in expired {
            if let Err(err) = self.ledger.release_hold(hold.booking_id).await {
                warn!(
                    booking_id = %hold.booking_id,
                    error = %err,
                    "failed to release expired hold, leaving for next sweep"
                );
                continue;
            }
            debug!(
                booking_id = %hold.booking_id,
                seats = hold.seats,
                expired_at = %hold.expires_at,
                "released expired hold"
            );
            released += 1;
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    use shared::*;

    fn sweeper_over(store: Arc<MemoryStore>) -> ExpirySweeper {
        let ledger = Arc::new(InventoryLedger::new(store.clone(), store.clone()));
        let holds = Arc::new(HoldManager::new(store, ChronoDuration::minutes(15)));
        ExpirySweeper::new(ledger, holds, Duration::from_secs(300))
    }

    async fn seeded_cell(store: &MemoryStore, capacity: i32) -> SlotKey {
        let key = SlotKey::new(Uuid::new_v4(), "2026-12-05".parse().unwrap(), "slot_1");
        store
            .upsert_cell(&SlotCell::new(key.clone(), capacity, BigDecimal::from(40)))
            .await
            .unwrap();
        key
    }

    #[tokio::test]
    async fn expired_holds_are_released_and_capacity_is_reusable() {
        let store = Arc::new(MemoryStore::new());
        let key = seeded_cell(&store, 5).await;
        let now = Utc::now();

        // a full-capacity hold whose payment never arrives
        let hold = Hold::new(Uuid::new_v4(), key.clone(), 5, now, ChronoDuration::minutes(15));
        match store.place_hold(&hold).await.unwrap() {
            PlaceOutcome::Placed => {}
            other => panic!("unexpected outcome: {other:?}"),
        }

        let sweeper = sweeper_over(store.clone());
        let released = sweeper.sweep(now + ChronoDuration::minutes(16)).await.unwrap();
        assert_eq!(released, 1);

        let cell = store.load_cell(&key).await.unwrap().unwrap();
        assert_eq!(cell.counters.held, 0);
        assert!(store.get_hold(hold.booking_id).await.unwrap().is_none());

        // the freed seats admit a fresh hold
        let fresh = Hold::new(
            Uuid::new_v4(),
            key,
            5,
            now + ChronoDuration::minutes(16),
            ChronoDuration::minutes(15),
        );
        assert!(matches!(
            store.place_hold(&fresh).await.unwrap(),
            PlaceOutcome::Placed
        ));
    }

    #[tokio::test]
    async fn live_holds_survive_the_sweep() {
        let store = Arc::new(MemoryStore::new());
        let key = seeded_cell(&store, 10).await;
        let now = Utc::now();

        let stale = Hold::new(Uuid::new_v4(), key.clone(), 2, now, ChronoDuration::minutes(15));
        let live = Hold::new(
            Uuid::new_v4(),
            key.clone(),
            3,
            now + ChronoDuration::minutes(10),
            ChronoDuration::minutes(15),
        );
        store.place_hold(&stale).await.unwrap();
        store.place_hold(&live).await.unwrap();

        let sweeper = sweeper_over(store.clone());
        let released = sweeper.sweep(now + ChronoDuration::minutes(16)).await.unwrap();
        assert_eq!(released, 1);

        let cell = store.load_cell(&key).await.unwrap().unwrap();
        assert_eq!(cell.counters.held, 3);
        assert!(store.get_hold(live.booking_id).await.unwrap().is_some());
        assert!(store.get_hold(stale.booking_id).await.unwrap().is_none());
    }

    /// Store wrapper that refuses to release one specific hold.
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        poisoned: Uuid,
    }

    #[async_trait]
    impl SlotStore for FlakyStore {
        async fn load_cell(&self, key: &SlotKey) -> Result<Option<SlotCell>, StoreError> {
            self.inner.load_cell(key).await
        }

        async fn upsert_cell(&self, cell: &SlotCell) -> Result<(), StoreError> {
            self.inner.upsert_cell(cell).await
        }

        async fn place_hold(&self, hold: &Hold) -> Result<PlaceOutcome, StoreError> {
            self.inner.place_hold(hold).await
        }

        async fn confirm_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError> {
            self.inner.confirm_hold(booking_id).await
        }

        async fn release_hold(&self, booking_id: Uuid) -> Result<SettleOutcome, StoreError> {
            if booking_id == self.poisoned {
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
            self.inner.release_hold(booking_id).await
        }

        async fn release_booked(&self, key: &SlotKey, seats: i32) -> Result<(), StoreError> {
            self.inner.release_booked(key, seats).await
        }

        async fn get_hold(&self, booking_id: Uuid) -> Result<Option<Hold>, StoreError> {
            self.inner.get_hold(booking_id).await
        }

        async fn delete_hold(&self, booking_id: Uuid) -> Result<(), StoreError> {
            self.inner.delete_hold(booking_id).await
        }

        async fn expired_holds(&self, now: chrono::DateTime<Utc>) -> Result<Vec<Hold>, StoreError> {
            self.inner.expired_holds(now).await
        }

        async fn live_held_seats(
            &self,
            key: &SlotKey,
            now: chrono::DateTime<Utc>,
        ) -> Result<i32, StoreError> {
            self.inner.live_held_seats(key, now).await
        }

        async fn overwrite_counters(
            &self,
            key: &SlotKey,
            booked: i32,
            held: i32,
        ) -> Result<(), StoreError> {
            self.inner.overwrite_counters(key, booked, held).await
        }
    }

    #[tokio::test]
    async fn a_failing_release_does_not_block_the_rest_of_the_batch() {
        let inner = Arc::new(MemoryStore::new());
        let key = seeded_cell(&inner, 10).await;
        let now = Utc::now();

        let stuck = Hold::new(Uuid::new_v4(), key.clone(), 2, now, ChronoDuration::minutes(15));
        let ok = Hold::new(Uuid::new_v4(), key.clone(), 3, now, ChronoDuration::minutes(15));
        inner.place_hold(&stuck).await.unwrap();
        inner.place_hold(&ok).await.unwrap();

        let flaky = Arc::new(FlakyStore {
            inner: inner.clone(),
            poisoned: stuck.booking_id,
        });
        let ledger = Arc::new(InventoryLedger::new(flaky.clone(), inner.clone()));
        let holds = Arc::new(HoldManager::new(flaky, ChronoDuration::minutes(15)));
        let sweeper = ExpirySweeper::new(ledger, holds, Duration::from_secs(300));

        let released = sweeper.sweep(now + ChronoDuration::minutes(16)).await.unwrap();
        assert_eq!(released, 1);

        // the stuck hold is left in place for a later sweep
        assert!(inner.get_hold(stuck.booking_id).await.unwrap().is_some());
        assert!(inner.get_hold(ok.booking_id).await.unwrap().is_none());
        let cell = inner.load_cell(&key).await.unwrap().unwrap();
        assert_eq!(cell.counters.held, 2);
    }
}
