//! Typed ledger events and the restartable event feed.
//!
//! Each successful state transition emits exactly one event into an
//! append-only log with monotonically increasing offsets. Consumers follow
//! the log with an [`EventCursor`]: a lazy, restartable sequence that
//! replays past events from any offset and then awaits future ones. This
//! replaces ad hoc per-listener callbacks with one filterable stream
//! abstraction.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use trustmesh_core::{ActorId, PayloadId, PayloadKind};

/// A typed event emitted by a successful ledger transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A payload entered the Stored state.
    PayloadAdded {
        payload_id: PayloadId,
        kind: PayloadKind,
        sender: ActorId,
        target: ActorId,
        approver: ActorId,
    },

    /// A GatewayAuth payload was approved; the gateway is now trusted.
    GatewayApproved {
        payload_id: PayloadId,
        gateway: ActorId,
        approver: ActorId,
        router_ip: String,
    },

    /// A DeviceAuth payload was approved; the device is now trusted.
    DeviceApproved {
        payload_id: PayloadId,
        device: ActorId,
        gateway: ActorId,
        approver: ActorId,
    },

    /// An Access payload was approved with an expiry time.
    AccessApproved {
        payload_id: PayloadId,
        service: ActorId,
        gateway: ActorId,
        expires_at: i64,
    },

    /// A gateway's trust was revoked (device trust recomputes to false).
    GatewayRevoked {
        payload_id: PayloadId,
        gateway: ActorId,
        sender: ActorId,
    },

    /// A device's trust was revoked.
    DeviceRevoked {
        payload_id: PayloadId,
        device: ActorId,
        sender: ActorId,
    },

    /// An access approval was revoked.
    AccessRevoked {
        payload_id: PayloadId,
        service: ActorId,
        sender: ActorId,
    },

    /// A payload that was never approved timed out of the Stored state.
    PayloadExpired {
        payload_id: PayloadId,
        kind: PayloadKind,
        sender: ActorId,
    },
}

impl LedgerEvent {
    /// The discriminator for filtering.
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::PayloadAdded { .. } => EventKind::PayloadAdded,
            LedgerEvent::GatewayApproved { .. } => EventKind::GatewayApproved,
            LedgerEvent::DeviceApproved { .. } => EventKind::DeviceApproved,
            LedgerEvent::AccessApproved { .. } => EventKind::AccessApproved,
            LedgerEvent::GatewayRevoked { .. } => EventKind::GatewayRevoked,
            LedgerEvent::DeviceRevoked { .. } => EventKind::DeviceRevoked,
            LedgerEvent::AccessRevoked { .. } => EventKind::AccessRevoked,
            LedgerEvent::PayloadExpired { .. } => EventKind::PayloadExpired,
        }
    }

    /// The payload this event concerns.
    pub fn payload_id(&self) -> PayloadId {
        match self {
            LedgerEvent::PayloadAdded { payload_id, .. }
            | LedgerEvent::GatewayApproved { payload_id, .. }
            | LedgerEvent::DeviceApproved { payload_id, .. }
            | LedgerEvent::AccessApproved { payload_id, .. }
            | LedgerEvent::GatewayRevoked { payload_id, .. }
            | LedgerEvent::DeviceRevoked { payload_id, .. }
            | LedgerEvent::AccessRevoked { payload_id, .. }
            | LedgerEvent::PayloadExpired { payload_id, .. } => *payload_id,
        }
    }

    /// All identities named by this event, for participant filtering.
    pub fn participants(&self) -> Vec<ActorId> {
        match self {
            LedgerEvent::PayloadAdded {
                sender,
                target,
                approver,
                ..
            } => vec![*sender, *target, *approver],
            LedgerEvent::GatewayApproved {
                gateway, approver, ..
            } => vec![*gateway, *approver],
            LedgerEvent::DeviceApproved {
                device,
                gateway,
                approver,
                ..
            } => vec![*device, *gateway, *approver],
            LedgerEvent::AccessApproved {
                service, gateway, ..
            } => vec![*service, *gateway],
            LedgerEvent::GatewayRevoked {
                gateway, sender, ..
            } => vec![*gateway, *sender],
            LedgerEvent::DeviceRevoked { device, sender, .. } => vec![*device, *sender],
            LedgerEvent::AccessRevoked {
                service, sender, ..
            } => vec![*service, *sender],
            LedgerEvent::PayloadExpired { sender, .. } => vec![*sender],
        }
    }
}

/// Event discriminator used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PayloadAdded,
    GatewayApproved,
    DeviceApproved,
    AccessApproved,
    GatewayRevoked,
    DeviceRevoked,
    AccessRevoked,
    PayloadExpired,
}

/// A filter over the event feed.
///
/// Empty filter matches everything. Kinds and participant compose as a
/// conjunction.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    kinds: Option<Vec<EventKind>>,
    participant: Option<ActorId>,
}

impl EventFilter {
    /// A filter that matches every event.
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to one event kind (may be called repeatedly to widen).
    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Restrict to events naming the given participant.
    pub fn participant(mut self, actor: ActorId) -> Self {
        self.participant = Some(actor);
        self
    }

    /// Whether an event passes this filter.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if let Some(ref actor) = self.participant {
            if !event.participants().contains(actor) {
                return false;
            }
        }
        true
    }
}

/// The append-only event log.
pub struct EventLog {
    entries: RwLock<Vec<LedgerEvent>>,
    notify: Notify,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Append an event and wake any waiting cursors.
    pub fn publish(&self, event: LedgerEvent) {
        self.entries.write().unwrap().push(event);
        self.notify.notify_waiters();
    }

    /// Number of events in the log (the next offset).
    pub fn len(&self) -> u64 {
        self.entries.read().unwrap().len() as u64
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Snapshot the event at a given offset.
    pub fn get(&self, offset: u64) -> Option<LedgerEvent> {
        self.entries.read().unwrap().get(offset as usize).cloned()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// A lazy, restartable cursor over the event log.
///
/// Replays past events from its offset, then awaits future ones. Creating a
/// new cursor at offset N restarts the sequence from N.
pub struct EventCursor {
    log: Arc<EventLog>,
    offset: u64,
    filter: EventFilter,
}

impl EventCursor {
    /// Create a cursor over `log` starting at `offset`.
    pub fn new(log: Arc<EventLog>, offset: u64, filter: EventFilter) -> Self {
        Self {
            log,
            offset,
            filter,
        }
    }

    /// The offset the cursor will read next.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Return the next matching event if one is already in the log.
    ///
    /// Non-matching events are consumed silently; the returned offset is
    /// the matched event's position.
    pub fn try_next(&mut self) -> Option<(u64, LedgerEvent)> {
        while let Some(event) = self.log.get(self.offset) {
            let at = self.offset;
            self.offset += 1;
            if self.filter.matches(&event) {
                return Some((at, event));
            }
        }
        None
    }

    /// Await the next matching event, past or future.
    pub async fn next(&mut self) -> (u64, LedgerEvent) {
        loop {
            // Register interest before checking, so a publish between the
            // check and the await cannot be lost.
            let log = Arc::clone(&self.log);
            let notified = log.notify.notified();
            if let Some(hit) = self.try_next() {
                return hit;
            }
            notified.await;
        }
    }
}
