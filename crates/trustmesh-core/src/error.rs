//! Error types for Trustmesh Core.

use thiserror::Error;

/// Core errors that can occur during payload operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unsupported payload kind: {0}")]
    UnsupportedKind(u16),

    #[error("malformed content: {0}")]
    MalformedContent(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}
