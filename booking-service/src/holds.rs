use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use shared::*;

pub const DEFAULT_HOLD_TTL_MINUTES: i64 = 15;

/// Tracks hold records and their TTLs. The capacity reservation itself goes
/// through `InventoryLedger::place_hold`, which commits the record built here
/// in the same atomic step.
pub struct HoldManager {
    slots: Arc<dyn SlotStore>,
    ttl: Duration,
}

impl HoldManager {
    pub fn new(slots: Arc<dyn SlotStore>, ttl: Duration) -> Self {
        Self { slots, ttl }
    }

    pub fn with_default_ttl(slots: Arc<dyn SlotStore>) -> Self {
        Self::new(slots, Duration::minutes(DEFAULT_HOLD_TTL_MINUTES))
    }

    /// Pure record construction; nothing is persisted yet.
    pub fn create(&self, booking_id: Uuid, key: SlotKey, seats: i32) -> Hold {
        Hold::new(booking_id, key, seats, Utc::now(), self.ttl)
    }

    pub async fn get(&self, booking_id: Uuid) -> Result<Option<Hold>, BookingError> {
        Ok(self.slots.get_hold(booking_id).await?)
    }

    /// All holds with `expires_at <= now`.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Hold>, BookingError> {
        Ok(self.slots.expired_holds(now).await?)
    }

    /// Remove the hold record. Counter bookkeeping is the ledger's job.
    pub async fn delete(&self, booking_id: Uuid) -> Result<(), BookingError> {
        Ok(self.slots.delete_hold(booking_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn key() -> SlotKey {
        SlotKey::new(Uuid::new_v4(), "2026-11-20".parse().unwrap(), "slot_2")
    }

    #[tokio::test]
    async fn created_holds_carry_the_configured_ttl() {
        let store: Arc<dyn SlotStore> = Arc::new(MemoryStore::new());
        let manager = HoldManager::new(store, Duration::minutes(20));
        let hold = manager.create(Uuid::new_v4(), key(), 2);
        assert_eq!(hold.expires_at - hold.created_at, Duration::minutes(20));
    }

    #[tokio::test]
    async fn list_expired_respects_the_boundary() {
        let store = Arc::new(MemoryStore::new());
        let key = key();
        store
            .upsert_cell(&SlotCell::new(key.clone(), 10, BigDecimal::from(10)))
            .await
            .unwrap();

        let manager = HoldManager::with_default_ttl(store.clone());
        let hold = manager.create(Uuid::new_v4(), key, 2);
        store.place_hold(&hold).await.unwrap();

        let just_before = hold.expires_at - Duration::seconds(1);
        assert!(manager.list_expired(just_before).await.unwrap().is_empty());

        let expired = manager.list_expired(hold.expires_at).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].booking_id, hold.booking_id);

        manager.delete(hold.booking_id).await.unwrap();
        assert!(manager.get(hold.booking_id).await.unwrap().is_none());
    }
}
