//! Off-chain request envelopes.
//!
//! A trust request travels from sender to approver as a sealed envelope
//! whose plaintext is a CBOR [`TrustRequest`]: the claimed payload id, the
//! signed content, and (for device requests) the device's evidence. The
//! approver opens it, re-hashes the content, and checks everything against
//! the ledger before approving.

use serde::{Deserialize, Serialize};

use trustmesh_core::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, PayloadId, SignedContent};
use trustmesh_session::{SealedEnvelope, X25519PublicKey, X25519StaticSecret};

use crate::error::{MeshError, Result};

/// Evidence a device presents to its vendor, carried alongside a
/// DeviceAuth request. The vendor selects the check by the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEvidence {
    /// The device signs the canonical content bytes with its own key.
    Signature {
        public_key: Ed25519PublicKey,
        signature: Ed25519Signature,
    },

    /// Keyed Blake3 of the canonical content bytes under a pre-shared
    /// secret.
    SharedSecretDigest { digest: Blake3Hash },

    /// Manufacturer fingerprint hash.
    Fingerprint { digest: Blake3Hash },

    /// Hardware address, compared verbatim.
    MacAddress { mac: String },
}

/// The plaintext of a request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRequest {
    /// The payload id the sender stored on the ledger.
    pub payload_id: PayloadId,

    /// The signed authorization content.
    pub signed: SignedContent,

    /// Device evidence, present only for DeviceAuth requests.
    pub evidence: Option<DeviceEvidence>,
}

impl TrustRequest {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes)
            .map_err(|e| MeshError::Session(trustmesh_session::SessionError::Malformed(e.to_string())))
    }

    /// Re-hash the content and check it against the claimed payload id.
    pub fn check_hash(&self) -> Result<PayloadId> {
        let computed = self.signed.content.content_id();
        if computed != self.payload_id {
            return Err(MeshError::HashMismatch {
                claimed: self.payload_id,
                computed,
            });
        }
        Ok(computed)
    }
}

/// A trust request sealed to its approver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub payload: SealedEnvelope,
}

impl RequestEnvelope {
    /// Seal a request to the approver's X25519 key.
    pub fn seal(recipient: &X25519PublicKey, request: &TrustRequest) -> Result<Self> {
        let payload = SealedEnvelope::seal(recipient, &request.to_bytes())?;
        Ok(Self { payload })
    }

    /// Open with the approver's static secret.
    pub fn open(&self, recipient_secret: &X25519StaticSecret) -> Result<TrustRequest> {
        let plaintext = self.payload.open(recipient_secret)?;
        TrustRequest::from_bytes(&plaintext)
    }
}
