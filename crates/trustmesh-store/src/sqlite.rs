//! SQLite implementation of the Store trait.
//!
//! The persistent cache backend. Uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{deadline_for, decode_counter, encode_counter, now_millis, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex; every operation runs on the blocking
/// pool so it never stalls the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database, for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock_conn(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Database(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(format!("spawn_blocking failed: {}", e)),
    ))
}

/// Fetch a live entry's value and deadline, treating lapsed rows as absent.
fn get_live(conn: &Connection, key: &str, now: i64) -> Result<Option<(Vec<u8>, Option<i64>)>> {
    let row: Option<(Vec<u8>, Option<i64>)> = conn
        .query_row(
            "SELECT value, deadline FROM cache_entries WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(row.filter(|(_, deadline)| deadline.map(|d| now < d).unwrap_or(true)))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            Ok(get_live(&conn, &key, now_millis())?.map(|(value, _)| value))
        })
        .await
        .map_err(join_error)?
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()> {
        let key = key.to_string();
        let value = value.to_vec();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let deadline = deadline_for(now_millis(), ttl_secs);
            conn.execute(
                "INSERT INTO cache_entries (key, value, deadline) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    deadline = excluded.deadline",
                params![key, value, deadline],
            )?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn replace(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()> {
        let key = key.to_string();
        let value = value.to_vec();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let now = now_millis();
            if get_live(&conn, &key, now)?.is_none() {
                return Err(StoreError::KeyNotFound(key));
            }

            let deadline = deadline_for(now, ttl_secs);
            conn.execute(
                "UPDATE cache_entries SET value = ?2, deadline = ?3 WHERE key = ?1",
                params![key, value, deadline],
            )?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let key = key.to_string();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let now = now_millis();

            let (current, deadline) = match get_live(&conn, &key, now)? {
                Some((value, deadline)) => {
                    let counter =
                        decode_counter(&value).ok_or_else(|| StoreError::NotCounter(key.clone()))?;
                    (counter, deadline)
                }
                None => (0, None),
            };

            let next = current + delta;
            conn.execute(
                "INSERT INTO cache_entries (key, value, deadline) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    deadline = excluded.deadline",
                params![key, encode_counter(next).as_slice(), deadline],
            )?;
            Ok(next)
        })
        .await
        .map_err(join_error)?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let was_live = get_live(&conn, &key, now_millis())?.is_some();
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(was_live)
        })
        .await
        .map_err(join_error)?
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE deadline IS NOT NULL AND deadline <= ?1",
                params![now],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(join_error)?
    }
}
