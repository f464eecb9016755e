//! Subscription persistence and checkpoint writes used by the serieswatch runtime.

mod backend;
mod error;
mod memory;
mod sqlite;
mod store;

pub use backend::{NewSubscription, SubscriptionBackend};
pub use error::{StoreError, StoreResult};
pub use memory::InMemorySubscriptionBackend;
pub use sqlite::SqliteSubscriptionBackend;
pub use store::SubscriptionStore;
