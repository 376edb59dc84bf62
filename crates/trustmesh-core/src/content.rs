//! Authorization content: the domain payload that gets hashed and signed.
//!
//! An [`AuthContent`] binds a target identity (who is being vouched for) to
//! a designated approver, plus free-form domain attributes. Its content hash
//! is the [`PayloadId`] the ledger keys everything on.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_content_bytes;
use crate::crypto::{verify_claim, Blake3Hash, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::types::{ActorId, PayloadId};

/// Length of the per-request random nonce.
pub const CONTENT_NONCE_LEN: usize = 16;

/// The kind of authorization a payload expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum PayloadKind {
    /// An ISP vouching a gateway into the trust chain.
    GatewayAuth = 0x0001,
    /// A vendor vouching a device behind a trusted gateway.
    DeviceAuth = 0x0002,
    /// A service requesting time-limited access to a gateway.
    Access = 0x0003,
}

impl PayloadKind {
    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::GatewayAuth),
            0x0002 => Some(Self::DeviceAuth),
            0x0003 => Some(Self::Access),
            _ => None,
        }
    }
}

/// The domain content of an authorization request.
///
/// The `nonce` is drawn fresh per request so that semantically repeated
/// requests (the same credentials submitted twice) still produce distinct
/// content hashes. An exact replay of the same signed message reproduces the
/// hash and is rejected by the ledger as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContent {
    /// What kind of authorization this is.
    pub kind: PayloadKind,

    /// The identity being vouched for.
    pub target: ActorId,

    /// The identity authorized to approve this payload.
    pub approver: ActorId,

    /// Domain-specific attributes (credentials, addresses, labels).
    pub attributes: Vec<(String, String)>,

    /// Per-request random nonce.
    pub nonce: [u8; CONTENT_NONCE_LEN],
}

impl AuthContent {
    /// Build content with a fresh random nonce.
    pub fn new(
        kind: PayloadKind,
        target: ActorId,
        approver: ActorId,
        attributes: Vec<(String, String)>,
    ) -> Self {
        let mut nonce = [0u8; CONTENT_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        Self {
            kind,
            target,
            approver,
            attributes,
            nonce,
        }
    }

    /// Build content with an explicit nonce (deterministic tests, replays).
    pub fn with_nonce(
        kind: PayloadKind,
        target: ActorId,
        approver: ActorId,
        attributes: Vec<(String, String)>,
        nonce: [u8; CONTENT_NONCE_LEN],
    ) -> Self {
        Self {
            kind,
            target,
            approver,
            attributes,
            nonce,
        }
    }

    /// Compute the content hash: Blake3 over the canonical bytes.
    pub fn content_id(&self) -> PayloadId {
        let bytes = canonical_content_bytes(self);
        PayloadId(Blake3Hash::hash(&bytes).0)
    }

    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Content plus the sender's signature over its canonical bytes.
///
/// This is the plaintext carried inside the off-chain request envelope. The
/// approver re-canonicalizes the content, checks the hash against the
/// chain-stored payload, and verifies the signature against the recorded
/// sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedContent {
    /// The authorization content.
    pub content: AuthContent,

    /// Ed25519 signature over canonical_content_bytes(content).
    pub signature: Ed25519Signature,
}

impl SignedContent {
    /// Sign content with the sender's keypair.
    pub fn sign(content: AuthContent, keypair: &Keypair) -> Self {
        let bytes = canonical_content_bytes(&content);
        let signature = keypair.sign(&bytes);
        Self { content, signature }
    }

    /// Verify the signature against a claimed sender identity.
    ///
    /// Returns a boolean decision; malformed signatures are `false`, never
    /// an error.
    pub fn verify(&self, claimed_sender: &ActorId) -> bool {
        let bytes = canonical_content_bytes(&self.content);
        verify_claim(&bytes, &self.signature, claimed_sender)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
