//! Store trait: the abstract interface for the off-ledger cache.
//!
//! Actors cache short-lived protocol state here (session keys, counters,
//! pending-request bookkeeping). Values are opaque bytes; an optional TTL
//! makes an entry lapse without touching the ledger, which never expires
//! payloads through this layer.
//!
//! Implementations include SQLite (persistent) and in-memory (for tests
//! and single-process deployments).

use async_trait::async_trait;

use crate::error::Result;

/// The Store trait: async interface for the cache.
///
/// # Design Notes
///
/// - **Expired means absent**: a lapsed entry is indistinguishable from a
///   missing one on every read path.
/// - **Counters are values**: `incr` stores an i64 as 8 big-endian bytes;
///   calling it on a non-counter value fails `NotCounter`.
/// - **`set` upserts, `replace` requires presence**: `replace` on a missing
///   or lapsed key fails `KeyNotFound`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a value. Returns `None` for missing or expired entries.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value, creating or overwriting, with an optional TTL in
    /// seconds.
    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()>;

    /// Overwrite an existing live entry; fails `KeyNotFound` otherwise.
    async fn replace(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()>;

    /// Increment a counter by `delta`, creating it at `delta` if absent.
    /// Returns the new value.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64>;

    /// Delete an entry. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove entries whose deadline has passed at `now` (Unix ms).
    /// Returns the number removed.
    async fn purge_expired(&self, now: i64) -> Result<u64>;
}

/// Encode a counter value as stored bytes.
pub(crate) fn encode_counter(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode stored bytes as a counter value.
pub(crate) fn decode_counter(bytes: &[u8]) -> Option<i64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(i64::from_be_bytes(arr))
}

/// Current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

/// Deadline for an optional TTL, measured from `now`.
pub(crate) fn deadline_for(now: i64, ttl_secs: Option<u64>) -> Option<i64> {
    ttl_secs.map(|secs| now + (secs as i64) * 1000)
}
