//! # Trustmesh Store
//!
//! The pluggable off-ledger cache: opaque byte values with optional
//! per-entry TTLs behind one async [`Store`] trait, so actors are written
//! against a single interface whether the deployment caches in memory or
//! in SQLite.
//!
//! TTLs here are soft, local state only; the ledger never loses a payload
//! because a cache entry lapsed.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::Store;
