//! # Trustmesh
//!
//! A chain of trust for consumer IoT: subscribers vouch for gateways,
//! trusted gateways vouch for devices, and services negotiate encrypted
//! sessions against gateways — all mediated by a content-addressed
//! authorization ledger.
//!
//! ## Key Concepts
//!
//! - **Payload**: A content-addressed authorization record. Stored once,
//!   approved at most once by its designated approver, revoked at most
//!   once by its original sender.
//! - **Chain of trust**: Owner → ISP approves the gateway; gateway →
//!   vendor approves the device; device trust is derived, so revoking a
//!   gateway instantly untrusts everything it vouched for.
//! - **Sessions**: An approved, unexpired Access payload is the ticket for
//!   a nonce-based handshake that yields a symmetric session key.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trustmesh::{open_store, Isp, MeshConfig, Owner, TrustLedger};
//! use trustmesh::core::Keypair;
//!
//! let ledger = Arc::new(TrustLedger::new());
//! let store = open_store(&MeshConfig::default()).unwrap();
//!
//! let owner = Owner::new(Keypair::generate(), Arc::clone(&ledger));
//! let isp = Isp::new(Keypair::generate(), [0x12; 32], Arc::clone(&ledger));
//!
//! let gateway_id = Keypair::generate().actor_id();
//! let (payload_id, envelope) = owner
//!     .request_gateway_trust(gateway_id, isp.actor_id(), &isp.x25519_public(), vec![], 0)
//!     .unwrap();
//! isp.approve_gateway(&envelope, "203.0.113.7", 1).unwrap();
//! assert!(ledger.is_trusted_gateway(&gateway_id));
//! # let _ = (payload_id, store);
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `trustmesh::core` - Identities, content hashing, signatures
//! - `trustmesh::ledger` - The TrustLedger and its event feed
//! - `trustmesh::session` - Envelopes and the session handshake
//! - `trustmesh::store` - The pluggable cache store

pub use trustmesh_core as core;
pub use trustmesh_ledger as ledger;
pub use trustmesh_session as session;
pub use trustmesh_store as store;

pub mod actors;
pub mod config;
pub mod error;
pub mod transport;

pub use actors::{Device, DeviceCredentials, DeviceRegistry, Gateway, Isp, Owner, Service, Vendor};
pub use config::{open_store, MeshConfig, StoreBackend};
pub use error::{MeshError, Result};
pub use transport::{DeviceEvidence, RequestEnvelope, TrustRequest};

// The most-used ledger types, lifted to the top level.
pub use trustmesh_core::{ActorId, AuthContent, Keypair, PayloadId, PayloadKind};
pub use trustmesh_ledger::{EventCursor, EventFilter, EventKind, LedgerEvent, TrustLedger};
pub use trustmesh_session::{HandshakeStatus, SessionKey};
