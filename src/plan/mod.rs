//! Durable plan orchestration.
//!
//! A goal becomes a plan of ordered tasks. Each task moves through a guarded
//! lifecycle, every change is persisted together with an audit event, and a
//! runner drives the tasks through external executors with retry and
//! escalation. The module follows hexagonal architecture:
//!
//! - Domain types and the task state machine in [`domain`]
//! - Store and capability contracts in [`ports`]
//! - In-memory and `SQLite` stores in [`adapters`]
//! - Runner, controller and crash recovery in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
