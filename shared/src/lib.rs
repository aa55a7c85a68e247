pub mod domain;
pub mod error;
pub mod memory;
pub mod status;
pub mod store;

pub use domain::{Booking, CounterError, Hold, SlotCell, SlotCounters, SlotKey};
pub use error::{BookingError, StoreError};
pub use memory::MemoryStore;
pub use status::{BookingStatus, PaymentStatus};
pub use store::{BookingStore, PlaceOutcome, SettleOutcome, SlotStore};
