//! The top-level error type.
//!
//! Wraps the component crate errors and adds the failures that only exist
//! at the protocol boundary, where sealed requests are opened and checked
//! against the ledger.

use thiserror::Error;

use trustmesh_core::{ActorId, CoreError, PayloadId};
use trustmesh_ledger::LedgerError;
use trustmesh_session::SessionError;
use trustmesh_store::StoreError;

/// Errors surfaced by actor operations.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Core primitive failure (encoding, malformed key material).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Envelope or handshake failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Cache store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A request's signature did not verify under the on-ledger sender.
    #[error("invalid signature from {0}")]
    InvalidSignature(ActorId),

    /// The request's content hashes to something other than the payload id
    /// it claims.
    #[error("content hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch {
        claimed: PayloadId,
        computed: PayloadId,
    },

    /// Device evidence did not match the vendor's records.
    #[error("device evidence rejected: {0}")]
    EvidenceRejected(&'static str),

    /// A device request carried no evidence at all.
    #[error("device evidence missing")]
    MissingEvidence,

    /// The vendor has no record of the device.
    #[error("unknown device: {0}")]
    UnknownDevice(ActorId),
}

/// Result type for actor operations.
pub type Result<T> = std::result::Result<T, MeshError>;
