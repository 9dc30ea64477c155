//! Unit tests for plan orchestration.

mod domain_tests;
mod support;
