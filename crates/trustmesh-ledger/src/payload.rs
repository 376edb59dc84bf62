//! Payload records: the ledger-owned lifecycle state of an authorization.
//!
//! The ledger exclusively owns these records; actors only ever hold
//! [`PayloadId`] references.

use serde::{Deserialize, Serialize};

use trustmesh_core::{ActorId, PayloadId, PayloadKind};

/// Lifecycle state of a payload.
///
/// Transitions are monotone: Stored, then at most once Approved, then at
/// most once Revoked. Revoked is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadState {
    /// Created, awaiting the designated approver.
    Stored,
    /// Approved by the designated approver.
    Approved,
    /// Revoked by the original sender (or expired out of Stored).
    Revoked,
}

/// A ledger payload record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRecord {
    /// Content hash of the authorization content; the record's identity.
    pub payload_id: PayloadId,

    /// What kind of authorization this is.
    pub kind: PayloadKind,

    /// The identity that stored the payload.
    pub sender: ActorId,

    /// The identity being vouched for.
    pub target: ActorId,

    /// The identity authorized to approve.
    pub approver: ActorId,

    /// Current lifecycle state.
    pub state: PayloadState,

    /// When the payload was stored (Unix ms).
    pub stored_at: i64,

    /// When it was approved, if it was.
    pub approved_at: Option<i64>,

    /// When it was revoked, if it was.
    pub revoked_at: Option<i64>,

    /// Access payloads only: when the approval lapses (Unix ms).
    pub expires_at: Option<i64>,

    /// GatewayAuth payloads only: the router address bound at approval.
    pub router_ip: Option<String>,
}

impl PayloadRecord {
    /// Create a new Stored record.
    pub fn new(
        payload_id: PayloadId,
        kind: PayloadKind,
        sender: ActorId,
        target: ActorId,
        approver: ActorId,
        now: i64,
    ) -> Self {
        Self {
            payload_id,
            kind,
            sender,
            target,
            approver,
            state: PayloadState::Stored,
            stored_at: now,
            approved_at: None,
            revoked_at: None,
            expires_at: None,
            router_ip: None,
        }
    }

    /// Whether the record is Approved and not Revoked.
    pub fn is_active(&self) -> bool {
        self.state == PayloadState::Approved
    }

    /// Whether the record is still awaiting approval.
    pub fn is_pending(&self) -> bool {
        self.state == PayloadState::Stored
    }

    /// Whether an Access approval is still within its lifetime at `now`.
    ///
    /// Non-Access records have no expiry and always pass this check.
    pub fn is_unexpired(&self, now: i64) -> bool {
        match self.expires_at {
            Some(deadline) => now < deadline,
            None => true,
        }
    }
}
