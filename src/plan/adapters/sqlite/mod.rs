//! `SQLite` adapters for plan orchestration.
//!
//! The database runs in WAL mode and every write takes the reserved lock
//! up front (`BEGIN IMMEDIATE`), so concurrent writers serialise without
//! deadlocking on lock upgrades.

mod connection;
mod models;
mod schema;
mod store;

pub use connection::{PlanSqlitePool, open_pool};
pub use store::SqlitePlanStore;
