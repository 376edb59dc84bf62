//! Configuration for a Trustmesh deployment.
//!
//! There are no process-wide singletons: a config is parsed once and the
//! store it selects is handed to each actor explicitly.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use trustmesh_store::{MemoryStore, SqliteStore, Store};

use crate::error::Result;

/// Which cache backend to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process HashMap; state dies with the process.
    Memory,
    /// SQLite file at the given path.
    Sqlite { path: PathBuf },
}

/// Deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Cache backend.
    pub store: StoreBackend,

    /// How long a payload may sit unapproved before `expire_pending`
    /// sweeps it (seconds).
    pub pending_ttl_secs: u64,

    /// Default lifetime for approved Access payloads (seconds).
    pub default_access_ttl_secs: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            pending_ttl_secs: 24 * 60 * 60,
            default_access_ttl_secs: 60 * 60,
        }
    }
}

impl MeshConfig {
    /// Parse a config from JSON.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("config serialization failed")
    }
}

/// Open the cache store a config selects.
pub fn open_store(config: &MeshConfig) -> Result<Arc<dyn Store>> {
    match &config.store {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite { path } => Ok(Arc::new(SqliteStore::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MeshConfig::default();
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.pending_ttl_secs, 86_400);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = MeshConfig {
            store: StoreBackend::Sqlite {
                path: PathBuf::from("/var/lib/trustmesh/cache.db"),
            },
            pending_ttl_secs: 600,
            default_access_ttl_secs: 120,
        };

        let parsed = MeshConfig::from_json(&config.to_json()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MeshConfig::from_json(r#"{"pending_ttl_secs": 30}"#).unwrap();
        assert_eq!(config.pending_ttl_secs, 30);
        assert_eq!(config.store, StoreBackend::Memory);
    }

    #[test]
    fn test_open_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = MeshConfig {
            store: StoreBackend::Sqlite {
                path: dir.path().join("cache.db"),
            },
            ..MeshConfig::default()
        };

        let store = open_store(&config).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            store.set("k", b"v", None).await.unwrap();
            assert_eq!(store.get("k").await.unwrap().unwrap(), b"v");
        });
    }

    #[test]
    fn test_open_memory_store() {
        let store = open_store(&MeshConfig::default()).unwrap();
        // Smoke check through the trait object.
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            store.set("k", b"v", None).await.unwrap();
            assert_eq!(store.get("k").await.unwrap().unwrap(), b"v");
        });
    }
}
