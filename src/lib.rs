//! Planwright: a durable task-orchestration engine.
//!
//! A user goal becomes a plan: an ordered list of tasks, each assigned to a
//! named agent. Tasks move through a guarded state machine, every mutation
//! is persisted together with an append-only event, and a runner drives the
//! plan to a synthesised close while honouring cooperative cancellation and
//! a bounded retry policy.
//!
//! # Architecture
//!
//! Planwright follows hexagonal architecture principles:
//!
//! - **Domain**: plans, tasks, responses and events with their invariants
//! - **Ports**: the plan store and the executor, decomposer and synthesiser
//!   capabilities
//! - **Adapters**: in-memory and `SQLite` stores
//! - **Services**: the orchestrator runner, plan controller and crash
//!   recovery
//!
//! # Modules
//!
//! - [`plan`]: the orchestration engine
//! - [`config`]: environment-driven settings
//! - [`telemetry`]: tracing initialisation

pub mod config;
pub mod plan;
pub mod telemetry;
