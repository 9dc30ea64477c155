//! In-memory adapters for plan orchestration.

mod store;

pub use store::InMemoryPlanStore;
