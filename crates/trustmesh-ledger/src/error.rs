//! Error types for the Trustmesh ledger.
//!
//! Every rejected operation maps to a specific variant so the transport
//! layer can surface the right externally visible response. Ledger errors
//! are local and non-corrupting.

use thiserror::Error;

use trustmesh_core::{ActorId, PayloadId, PayloadKind};

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A payload with this content hash already exists.
    #[error("duplicate payload: {0}")]
    DuplicatePayload(PayloadId),

    /// No payload with this content hash.
    #[error("payload not found: {0}")]
    PayloadNotFound(PayloadId),

    /// The payload has already left the Stored state.
    #[error("payload already approved: {0}")]
    AlreadyApproved(PayloadId),

    /// The payload has already been revoked.
    #[error("payload already revoked: {0}")]
    AlreadyRevoked(PayloadId),

    /// The caller is not the designated approver.
    #[error("caller {caller} is not the approver of payload {payload_id}")]
    UnauthorizedApprover {
        payload_id: PayloadId,
        caller: ActorId,
    },

    /// The caller is not the original sender.
    #[error("caller {caller} is not the sender of payload {payload_id}")]
    UnauthorizedSource {
        payload_id: PayloadId,
        caller: ActorId,
    },

    /// The named target does not match the payload's target.
    #[error("target mismatch on payload {payload_id}: expected {expected}, got {got}")]
    TargetMismatch {
        payload_id: PayloadId,
        expected: ActorId,
        got: ActorId,
    },

    /// The governing gateway is not (or no longer) trusted.
    #[error("gateway {0} is not trusted")]
    UntrustedParent(ActorId),

    /// Revocation attempted on a payload that was never approved.
    #[error("payload {0} was never approved")]
    NotTrustedYet(PayloadId),

    /// Operation applied to the wrong payload kind.
    #[error("payload kind mismatch: expected {expected:?}, got {got:?}")]
    KindMismatch {
        expected: PayloadKind,
        got: PayloadKind,
    },
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
