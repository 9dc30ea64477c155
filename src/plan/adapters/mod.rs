//! Adapter implementations for plan orchestration ports.

pub mod memory;
pub mod sqlite;
