//! # Trustmesh Core
//!
//! Pure primitives for the Trustmesh chain of trust: authorization payloads,
//! canonicalization, content hashing, and signatures.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`AuthContent`] - The domain content of an authorization request
//! - [`PayloadId`] - Content-addressed identifier (Blake3 hash), doubles as
//!   the anti-replay token
//! - [`ActorId`] - An actor identity, bound to an Ed25519 public key
//! - [`SignedContent`] - Content plus the sender's signature over its
//!   canonical bytes
//!
//! ## Canonicalization
//!
//! All hashed content is encoded using deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod content;
pub mod crypto;
pub mod error;
pub mod types;

pub use canonical::{canonical_content_bytes, decode_content};
pub use content::{AuthContent, PayloadKind, SignedContent, CONTENT_NONCE_LEN};
pub use crypto::{verify_claim, Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::CoreError;
pub use types::{ActorId, PayloadId};
