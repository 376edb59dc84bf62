//! Error types for the session layer.
//!
//! Confidentiality failures ([`SessionError::DecryptionFailure`]) and
//! authenticity failures ([`SessionError::InvalidSignature`]) are distinct
//! variants so callers can tell a garbled envelope apart from a forged one.

use thiserror::Error;

use trustmesh_core::{ActorId, PayloadId};

/// Errors that can occur in envelope encryption and the handshake.
#[derive(Debug, Error)]
pub enum SessionError {
    /// AEAD open failed: wrong key, tampered ciphertext, or bad nonce.
    #[error("decryption failure: {0}")]
    DecryptionFailure(String),

    /// AEAD seal failed.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// A signature did not verify under the expected identity.
    #[error("invalid signature from {0}")]
    InvalidSignature(ActorId),

    /// The echoed handshake nonce differs from the one sent.
    ///
    /// Not retryable with the same state; restart with a fresh nonce.
    #[error("handshake nonce mismatch")]
    NonceMismatch,

    /// The handshake token is not a valid, unexpired Access approval.
    #[error("access not approved for token {0}")]
    AccessNotApproved(PayloadId),

    /// An operation was called in the wrong handshake state.
    #[error("invalid handshake state: {0}")]
    InvalidState(&'static str),

    /// A message body failed to deserialize.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
