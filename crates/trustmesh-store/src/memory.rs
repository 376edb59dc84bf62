//! In-memory implementation of the Store trait.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{deadline_for, decode_counter, encode_counter, now_millis, Store};

struct Entry {
    value: Vec<u8>,
    deadline: Option<i64>,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        match self.deadline {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}

/// HashMap-backed store for tests and single-process deployments.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries, live or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        let entries = self.entries.read().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()> {
        let now = now_millis();
        let entry = Entry {
            value: value.to_vec(),
            deadline: deadline_for(now, ttl_secs),
        };
        self.entries.write().unwrap().insert(key.to_string(), entry);
        Ok(())
    }

    async fn replace(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<()> {
        let now = now_millis();
        let mut entries = self.entries.write().unwrap();
        match entries.get(key) {
            Some(existing) if existing.is_live(now) => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.to_vec(),
                        deadline: deadline_for(now, ttl_secs),
                    },
                );
                Ok(())
            }
            _ => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let now = now_millis();
        let mut entries = self.entries.write().unwrap();

        let current = match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                decode_counter(&entry.value).ok_or_else(|| StoreError::NotCounter(key.to_string()))?
            }
            None => 0,
        };

        let next = current + delta;
        // A counter created by incr has no TTL; a pre-existing deadline is
        // carried over.
        let deadline = entries.get(key).filter(|e| e.is_live(now)).and_then(|e| e.deadline);
        entries.insert(
            key.to_string(),
            Entry {
                value: encode_counter(next).to_vec(),
                deadline,
            },
        );
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = now_millis();
        let mut entries = self.entries.write().unwrap();
        match entries.remove(key) {
            Some(entry) => Ok(entry.is_live(now)),
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}
