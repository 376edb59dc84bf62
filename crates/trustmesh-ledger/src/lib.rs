//! # Trustmesh Ledger
//!
//! The authoritative state machine for the chain of trust: payload
//! lifecycle (store, approve, revoke), derived trust predicates, and a
//! typed, restartable event feed.
//!
//! ## Key Properties
//!
//! - **Content-addressed**: payloads are keyed by their content hash, which
//!   doubles as the anti-replay token. Storing the same hash twice fails.
//! - **Monotone lifecycle**: Stored, then at most once Approved, then at
//!   most once Revoked. No state is ever revisited.
//! - **Derived trust**: gateway and device trust are recomputed predicates,
//!   not stored flags. Revoking a gateway cascades to its devices with no
//!   fan-out delete and no stale cache.
//! - **Non-corrupting failures**: a rejected operation leaves the payload's
//!   prior state untouched and affects no other payload.
//!
//! Every successful transition emits exactly one [`LedgerEvent`] into an
//! append-only log; consumers follow it with an [`EventCursor`] from any
//! offset.

pub mod error;
pub mod events;
pub mod ledger;
pub mod payload;

pub use error::{LedgerError, Result};
pub use events::{EventCursor, EventFilter, EventKind, EventLog, LedgerEvent};
pub use ledger::TrustLedger;
pub use payload::{PayloadRecord, PayloadState};
