//! # Trustmesh Testkit
//!
//! Testing utilities shared across the workspace: per-role fixtures that
//! drive the ledger into known chain states, and proptest generators for
//! the core types.

pub mod fixtures;
pub mod generators;

pub use fixtures::ChainFixture;
