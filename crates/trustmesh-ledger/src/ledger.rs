//! The TrustLedger: a role-gated state machine over authorization payloads.
//!
//! All mutating operations carry an explicit, identity-stamped `caller` and
//! an explicit `now` timestamp (Unix ms). The single write lock totally
//! orders mutations, which subsumes the per-hash serialization the
//! anti-replay guarantee needs; queries take a shared read lock and never
//! fail.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use trustmesh_core::{ActorId, PayloadId, PayloadKind};

use crate::error::{LedgerError, Result};
use crate::events::{EventCursor, EventFilter, EventLog, LedgerEvent};
use crate::payload::{PayloadRecord, PayloadState};

/// The authorization ledger.
///
/// Construct one explicitly and share it via `Arc`; components receive it
/// by injection, never through a process-wide singleton.
pub struct TrustLedger {
    inner: RwLock<LedgerInner>,
    events: Arc<EventLog>,
}

struct LedgerInner {
    /// Payload records keyed by content hash.
    payloads: HashMap<PayloadId, PayloadRecord>,

    /// Index: (kind, target) -> payload ids vouching for that target.
    by_target: HashMap<(PayloadKind, ActorId), Vec<PayloadId>>,
}

impl LedgerInner {
    /// A gateway is trusted iff some GatewayAuth payload targeting it is
    /// Approved and not Revoked.
    fn gateway_trusted(&self, gateway: &ActorId) -> bool {
        self.any_active(PayloadKind::GatewayAuth, gateway, |_| true)
    }

    /// A device is trusted iff some DeviceAuth payload targeting it is
    /// Approved, not Revoked, AND the gateway that sent it is itself still
    /// trusted. The conjunction is recomputed here at query time, which is
    /// what makes gateway revocation cascade without a fan-out delete.
    fn device_trusted(&self, device: &ActorId) -> bool {
        self.any_active(PayloadKind::DeviceAuth, device, |record| {
            self.gateway_trusted(&record.sender)
        })
    }

    fn any_active(
        &self,
        kind: PayloadKind,
        target: &ActorId,
        extra: impl Fn(&PayloadRecord) -> bool,
    ) -> bool {
        self.by_target
            .get(&(kind, *target))
            .map(|ids| {
                ids.iter().any(|id| {
                    self.payloads
                        .get(id)
                        .map(|r| r.is_active() && extra(r))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}

impl TrustLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                payloads: HashMap::new(),
                by_target: HashMap::new(),
            }),
            events: Arc::new(EventLog::new()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle Operations
    // ─────────────────────────────────────────────────────────────────────

    /// Store a payload, creating it in the Stored state.
    ///
    /// Exactly one store per content hash ever succeeds, even under
    /// concurrent racing calls: the hash is the anti-replay token.
    pub fn store(
        &self,
        payload_id: PayloadId,
        kind: PayloadKind,
        target: ActorId,
        approver: ActorId,
        caller: ActorId,
        now: i64,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        if inner.payloads.contains_key(&payload_id) {
            return Err(LedgerError::DuplicatePayload(payload_id));
        }

        let record = PayloadRecord::new(payload_id, kind, caller, target, approver, now);
        inner.payloads.insert(payload_id, record);
        inner
            .by_target
            .entry((kind, target))
            .or_default()
            .push(payload_id);
        drop(inner);

        tracing::debug!(payload = %payload_id, ?kind, "payload stored");
        self.events.publish(LedgerEvent::PayloadAdded {
            payload_id,
            kind,
            sender: caller,
            target,
            approver,
        });
        Ok(())
    }

    /// Approve a GatewayAuth payload, binding the router address.
    ///
    /// Only the designated approver may call this, and only while the
    /// payload is Stored. On success the target gateway becomes trusted.
    pub fn approve_gateway(
        &self,
        payload_id: PayloadId,
        router_ip: &str,
        caller: ActorId,
        now: i64,
    ) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let record = approvable(&mut inner, payload_id, PayloadKind::GatewayAuth, &caller)?;

            record.state = PayloadState::Approved;
            record.approved_at = Some(now);
            record.router_ip = Some(router_ip.to_string());

            LedgerEvent::GatewayApproved {
                payload_id,
                gateway: record.target,
                approver: caller,
                router_ip: router_ip.to_string(),
            }
        };

        self.events.publish(event);
        Ok(())
    }

    /// Approve a DeviceAuth payload.
    ///
    /// Requires the sending gateway to currently hold gateway trust;
    /// otherwise fails `UntrustedParent` and the payload stays Stored.
    pub fn approve_device(&self, payload_id: PayloadId, caller: ActorId, now: i64) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();

            let sender = {
                let record = inner
                    .payloads
                    .get(&payload_id)
                    .ok_or(LedgerError::PayloadNotFound(payload_id))?;
                record.sender
            };
            if !inner.gateway_trusted(&sender) {
                return Err(LedgerError::UntrustedParent(sender));
            }

            let record = approvable(&mut inner, payload_id, PayloadKind::DeviceAuth, &caller)?;
            record.state = PayloadState::Approved;
            record.approved_at = Some(now);

            LedgerEvent::DeviceApproved {
                payload_id,
                device: record.target,
                gateway: record.sender,
                approver: caller,
            }
        };

        self.events.publish(event);
        Ok(())
    }

    /// Approve an Access payload with a lifetime of `ttl_secs`.
    ///
    /// The approving gateway must itself hold gateway trust.
    pub fn approve_access(
        &self,
        payload_id: PayloadId,
        ttl_secs: u64,
        caller: ActorId,
        now: i64,
    ) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();

            let approver = {
                let record = inner
                    .payloads
                    .get(&payload_id)
                    .ok_or(LedgerError::PayloadNotFound(payload_id))?;
                record.approver
            };
            if !inner.gateway_trusted(&approver) {
                return Err(LedgerError::UntrustedParent(approver));
            }

            let expires_at = now + (ttl_secs as i64) * 1000;
            let record = approvable(&mut inner, payload_id, PayloadKind::Access, &caller)?;
            record.state = PayloadState::Approved;
            record.approved_at = Some(now);
            record.expires_at = Some(expires_at);

            LedgerEvent::AccessApproved {
                payload_id,
                service: record.target,
                gateway: record.approver,
                expires_at,
            }
        };

        self.events.publish(event);
        Ok(())
    }

    /// Revoke a gateway's trust.
    ///
    /// Only the original sender may revoke, the named target must match
    /// the record, and the payload must have been approved. Devices
    /// trusted through this gateway recompute to untrusted via the derived
    /// predicate; nothing is deleted.
    pub fn revoke_gateway(
        &self,
        payload_id: PayloadId,
        target: ActorId,
        caller: ActorId,
        now: i64,
    ) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let record = revocable(
                &mut inner,
                payload_id,
                PayloadKind::GatewayAuth,
                &target,
                &caller,
            )?;

            record.state = PayloadState::Revoked;
            record.revoked_at = Some(now);

            LedgerEvent::GatewayRevoked {
                payload_id,
                gateway: record.target,
                sender: caller,
            }
        };

        tracing::warn!(payload = %payload_id, gateway = %target, "gateway trust revoked");
        self.events.publish(event);
        Ok(())
    }

    /// Revoke a device's trust. No cascade is needed; device trust hangs
    /// off nothing else.
    pub fn revoke_device(
        &self,
        payload_id: PayloadId,
        target: ActorId,
        caller: ActorId,
        now: i64,
    ) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let record = revocable(
                &mut inner,
                payload_id,
                PayloadKind::DeviceAuth,
                &target,
                &caller,
            )?;

            record.state = PayloadState::Revoked;
            record.revoked_at = Some(now);

            LedgerEvent::DeviceRevoked {
                payload_id,
                device: record.target,
                sender: caller,
            }
        };

        self.events.publish(event);
        Ok(())
    }

    /// Revoke an access approval before its expiry.
    pub fn revoke_access(
        &self,
        payload_id: PayloadId,
        target: ActorId,
        caller: ActorId,
        now: i64,
    ) -> Result<()> {
        let event = {
            let mut inner = self.inner.write().unwrap();
            let record = revocable(
                &mut inner,
                payload_id,
                PayloadKind::Access,
                &target,
                &caller,
            )?;

            record.state = PayloadState::Revoked;
            record.revoked_at = Some(now);

            LedgerEvent::AccessRevoked {
                payload_id,
                service: record.target,
                sender: caller,
            }
        };

        self.events.publish(event);
        Ok(())
    }

    /// Expire payloads that have sat in Stored longer than the cutoff.
    ///
    /// Every Stored record with `stored_at < cutoff` transitions to
    /// Revoked and emits one `PayloadExpired` event. Returns the expired
    /// ids. This bounds the growth of never-approved payloads.
    pub fn expire_pending(&self, cutoff: i64, now: i64) -> Vec<PayloadId> {
        let expired: Vec<LedgerEvent> = {
            let mut inner = self.inner.write().unwrap();
            let stale: Vec<PayloadId> = inner
                .payloads
                .values()
                .filter(|r| r.is_pending() && r.stored_at < cutoff)
                .map(|r| r.payload_id)
                .collect();

            stale
                .iter()
                .map(|id| {
                    let record = inner.payloads.get_mut(id).unwrap();
                    record.state = PayloadState::Revoked;
                    record.revoked_at = Some(now);
                    LedgerEvent::PayloadExpired {
                        payload_id: record.payload_id,
                        kind: record.kind,
                        sender: record.sender,
                    }
                })
                .collect()
        };

        let ids: Vec<PayloadId> = expired.iter().map(|e| e.payload_id()).collect();
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), "expired pending payloads");
        }
        for event in expired {
            self.events.publish(event);
        }
        ids
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries (read-only, never fail)
    // ─────────────────────────────────────────────────────────────────────

    /// Whether the gateway currently holds trust.
    pub fn is_trusted_gateway(&self, gateway: &ActorId) -> bool {
        self.inner.read().unwrap().gateway_trusted(gateway)
    }

    /// Whether the device currently holds trust (through a still-trusted
    /// gateway).
    pub fn is_trusted_device(&self, device: &ActorId) -> bool {
        self.inner.read().unwrap().device_trusted(device)
    }

    /// Whether an Access approval is usable at `now`: approved, not
    /// revoked, unexpired, and its approving gateway still trusted.
    pub fn is_access_valid(&self, payload_id: &PayloadId, now: i64) -> bool {
        let inner = self.inner.read().unwrap();
        inner
            .payloads
            .get(payload_id)
            .map(|r| {
                r.kind == PayloadKind::Access
                    && r.is_active()
                    && r.is_unexpired(now)
                    && inner.gateway_trusted(&r.approver)
            })
            .unwrap_or(false)
    }

    /// Whether the payload is Stored and awaiting exactly this approver.
    pub fn is_valid_payload_for_approver(
        &self,
        payload_id: &PayloadId,
        approver: &ActorId,
    ) -> bool {
        self.inner
            .read()
            .unwrap()
            .payloads
            .get(payload_id)
            .map(|r| r.is_pending() && r.approver == *approver)
            .unwrap_or(false)
    }

    /// Snapshot a payload record.
    pub fn get(&self, payload_id: &PayloadId) -> Option<PayloadRecord> {
        self.inner.read().unwrap().payloads.get(payload_id).cloned()
    }

    /// Number of payloads in the ledger.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().payloads.len()
    }

    /// Whether the ledger holds no payloads.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().payloads.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event Feed
    // ─────────────────────────────────────────────────────────────────────

    /// The shared event log.
    pub fn events(&self) -> Arc<EventLog> {
        Arc::clone(&self.events)
    }

    /// Subscribe to the event feed from `offset` with a filter.
    pub fn subscribe(&self, offset: u64, filter: EventFilter) -> EventCursor {
        EventCursor::new(Arc::clone(&self.events), offset, filter)
    }
}

impl Default for TrustLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a record for approval, enforcing the shared preconditions:
/// exists, right kind, still Stored, caller is the designated approver.
fn approvable<'a>(
    inner: &'a mut LedgerInner,
    payload_id: PayloadId,
    kind: PayloadKind,
    caller: &ActorId,
) -> Result<&'a mut PayloadRecord> {
    let record = inner
        .payloads
        .get_mut(&payload_id)
        .ok_or(LedgerError::PayloadNotFound(payload_id))?;

    if record.kind != kind {
        return Err(LedgerError::KindMismatch {
            expected: kind,
            got: record.kind,
        });
    }
    match record.state {
        PayloadState::Approved => return Err(LedgerError::AlreadyApproved(payload_id)),
        PayloadState::Revoked => return Err(LedgerError::AlreadyRevoked(payload_id)),
        PayloadState::Stored => {}
    }
    if record.approver != *caller {
        return Err(LedgerError::UnauthorizedApprover {
            payload_id,
            caller: *caller,
        });
    }

    Ok(record)
}

/// Fetch a record for revocation: exists, right kind, Approved (Stored
/// payloads were never trusted), caller is the original sender, and the
/// named target matches the record.
fn revocable<'a>(
    inner: &'a mut LedgerInner,
    payload_id: PayloadId,
    kind: PayloadKind,
    target: &ActorId,
    caller: &ActorId,
) -> Result<&'a mut PayloadRecord> {
    let record = inner
        .payloads
        .get_mut(&payload_id)
        .ok_or(LedgerError::PayloadNotFound(payload_id))?;

    if record.kind != kind {
        return Err(LedgerError::KindMismatch {
            expected: kind,
            got: record.kind,
        });
    }
    match record.state {
        PayloadState::Revoked => return Err(LedgerError::AlreadyRevoked(payload_id)),
        PayloadState::Stored => return Err(LedgerError::NotTrustedYet(payload_id)),
        PayloadState::Approved => {}
    }
    if record.sender != *caller {
        return Err(LedgerError::UnauthorizedSource {
            payload_id,
            caller: *caller,
        });
    }
    if record.target != *target {
        return Err(LedgerError::TargetMismatch {
            payload_id,
            expected: record.target,
            got: *target,
        });
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn actor(tag: u8) -> ActorId {
        ActorId::from_bytes([tag; 32])
    }

    fn pid(tag: u8) -> PayloadId {
        PayloadId::from_bytes([tag; 32])
    }

    /// Store and approve a GatewayAuth payload for `gateway`.
    fn trust_gateway(ledger: &TrustLedger, id: PayloadId, gateway: ActorId, now: i64) {
        let owner = actor(0x01);
        let isp = actor(0x02);
        ledger
            .store(id, PayloadKind::GatewayAuth, gateway, isp, owner, now)
            .unwrap();
        ledger.approve_gateway(id, "10.1.2.3", isp, now).unwrap();
    }

    #[test]
    fn test_store_then_approve_gateway() {
        let ledger = TrustLedger::new();
        let gateway = actor(0x10);
        trust_gateway(&ledger, pid(1), gateway, 1_000);

        assert!(ledger.is_trusted_gateway(&gateway));
        let record = ledger.get(&pid(1)).unwrap();
        assert_eq!(record.state, PayloadState::Approved);
        assert_eq!(record.router_ip.as_deref(), Some("10.1.2.3"));
    }

    #[test]
    fn test_duplicate_store_rejected() {
        let ledger = TrustLedger::new();
        ledger
            .store(
                pid(1),
                PayloadKind::GatewayAuth,
                actor(0x10),
                actor(0x02),
                actor(0x01),
                1_000,
            )
            .unwrap();

        // Same hash, different target and approver: still rejected.
        let err = ledger
            .store(
                pid(1),
                PayloadKind::Access,
                actor(0x77),
                actor(0x88),
                actor(0x99),
                2_000,
            )
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicatePayload(pid(1)));

        // The original record is untouched.
        assert_eq!(ledger.get(&pid(1)).unwrap().kind, PayloadKind::GatewayAuth);
    }

    #[test]
    fn test_double_approve_fails() {
        let ledger = TrustLedger::new();
        trust_gateway(&ledger, pid(1), actor(0x10), 1_000);

        let err = ledger
            .approve_gateway(pid(1), "10.9.9.9", actor(0x02), 2_000)
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyApproved(pid(1)));
    }

    #[test]
    fn test_wrong_approver_rejected() {
        let ledger = TrustLedger::new();
        ledger
            .store(
                pid(1),
                PayloadKind::GatewayAuth,
                actor(0x10),
                actor(0x02),
                actor(0x01),
                1_000,
            )
            .unwrap();

        let intruder = actor(0x66);
        let err = ledger
            .approve_gateway(pid(1), "10.0.0.1", intruder, 1_001)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnauthorizedApprover { .. }));
        assert!(ledger.get(&pid(1)).unwrap().is_pending());
    }

    #[test]
    fn test_device_approval_requires_trusted_gateway() {
        let ledger = TrustLedger::new();
        let gateway = actor(0x10);
        let device = actor(0x20);
        let vendor = actor(0x03);

        // Device payload sent by the (untrusted) gateway.
        ledger
            .store(
                pid(2),
                PayloadKind::DeviceAuth,
                device,
                vendor,
                gateway,
                1_000,
            )
            .unwrap();

        let err = ledger.approve_device(pid(2), vendor, 1_001).unwrap_err();
        assert_eq!(err, LedgerError::UntrustedParent(gateway));
        assert!(!ledger.is_trusted_device(&device));

        // Trust the gateway, then approval goes through.
        trust_gateway(&ledger, pid(1), gateway, 1_002);
        ledger.approve_device(pid(2), vendor, 1_003).unwrap();
        assert!(ledger.is_trusted_device(&device));
    }

    #[test]
    fn test_gateway_revocation_cascades() {
        let ledger = TrustLedger::new();
        let (g1, g2) = (actor(0x10), actor(0x11));
        let (d1, d2) = (actor(0x20), actor(0x21));
        let vendor = actor(0x03);
        let owner = actor(0x01);

        trust_gateway(&ledger, pid(1), g1, 1_000);
        trust_gateway(&ledger, pid(2), g2, 1_000);

        ledger
            .store(pid(3), PayloadKind::DeviceAuth, d1, vendor, g1, 1_001)
            .unwrap();
        ledger.approve_device(pid(3), vendor, 1_002).unwrap();
        ledger
            .store(pid(4), PayloadKind::DeviceAuth, d2, vendor, g2, 1_001)
            .unwrap();
        ledger.approve_device(pid(4), vendor, 1_002).unwrap();

        assert!(ledger.is_trusted_device(&d1));
        assert!(ledger.is_trusted_device(&d2));

        // Revoking g1 drops d1 but leaves d2 (vouched via g2) alone.
        ledger.revoke_gateway(pid(1), g1, owner, 2_000).unwrap();
        assert!(!ledger.is_trusted_gateway(&g1));
        assert!(!ledger.is_trusted_device(&d1));
        assert!(ledger.is_trusted_gateway(&g2));
        assert!(ledger.is_trusted_device(&d2));

        // The device payload itself is still Approved; only the derived
        // predicate changed.
        assert!(ledger.get(&pid(3)).unwrap().is_active());
    }

    #[test]
    fn test_revoke_preconditions() {
        let ledger = TrustLedger::new();
        let gateway = actor(0x10);
        let owner = actor(0x01);

        // Unknown payload.
        assert_eq!(
            ledger
                .revoke_gateway(pid(9), gateway, owner, 1_000)
                .unwrap_err(),
            LedgerError::PayloadNotFound(pid(9))
        );

        // Never-approved payload.
        ledger
            .store(
                pid(1),
                PayloadKind::GatewayAuth,
                gateway,
                actor(0x02),
                owner,
                1_000,
            )
            .unwrap();
        assert_eq!(
            ledger
                .revoke_gateway(pid(1), gateway, owner, 1_001)
                .unwrap_err(),
            LedgerError::NotTrustedYet(pid(1))
        );

        ledger
            .approve_gateway(pid(1), "10.0.0.1", actor(0x02), 1_002)
            .unwrap();

        // Wrong caller.
        assert!(matches!(
            ledger
                .revoke_gateway(pid(1), gateway, actor(0x55), 1_003)
                .unwrap_err(),
            LedgerError::UnauthorizedSource { .. }
        ));

        // Wrong target.
        assert!(matches!(
            ledger
                .revoke_gateway(pid(1), actor(0x66), owner, 1_003)
                .unwrap_err(),
            LedgerError::TargetMismatch { .. }
        ));

        // Success, then double revoke.
        ledger.revoke_gateway(pid(1), gateway, owner, 1_004).unwrap();
        assert_eq!(
            ledger
                .revoke_gateway(pid(1), gateway, owner, 1_005)
                .unwrap_err(),
            LedgerError::AlreadyRevoked(pid(1))
        );
    }

    #[test]
    fn test_access_approval_and_expiry() {
        let ledger = TrustLedger::new();
        let gateway = actor(0x10);
        let service = actor(0x30);
        trust_gateway(&ledger, pid(1), gateway, 1_000);

        ledger
            .store(pid(2), PayloadKind::Access, service, gateway, service, 1_000)
            .unwrap();
        ledger.approve_access(pid(2), 60, gateway, 10_000).unwrap();

        let record = ledger.get(&pid(2)).unwrap();
        assert_eq!(record.expires_at, Some(70_000));

        assert!(ledger.is_access_valid(&pid(2), 69_999));
        assert!(!ledger.is_access_valid(&pid(2), 70_000));
    }

    #[test]
    fn test_access_requires_trusted_gateway() {
        let ledger = TrustLedger::new();
        let gateway = actor(0x10);
        let service = actor(0x30);
        let owner = actor(0x01);

        ledger
            .store(pid(2), PayloadKind::Access, service, gateway, service, 1_000)
            .unwrap();
        assert_eq!(
            ledger
                .approve_access(pid(2), 60, gateway, 1_001)
                .unwrap_err(),
            LedgerError::UntrustedParent(gateway)
        );

        // Once the gateway loses trust, an approved access stops validating.
        trust_gateway(&ledger, pid(1), gateway, 1_002);
        ledger.approve_access(pid(2), 600, gateway, 1_003).unwrap();
        assert!(ledger.is_access_valid(&pid(2), 1_004));

        ledger.revoke_gateway(pid(1), gateway, owner, 1_005).unwrap();
        assert!(!ledger.is_access_valid(&pid(2), 1_006));
    }

    #[test]
    fn test_is_valid_payload_for_approver() {
        let ledger = TrustLedger::new();
        let isp = actor(0x02);
        ledger
            .store(
                pid(1),
                PayloadKind::GatewayAuth,
                actor(0x10),
                isp,
                actor(0x01),
                1_000,
            )
            .unwrap();

        assert!(ledger.is_valid_payload_for_approver(&pid(1), &isp));
        assert!(!ledger.is_valid_payload_for_approver(&pid(1), &actor(0x55)));
        assert!(!ledger.is_valid_payload_for_approver(&pid(9), &isp));

        ledger.approve_gateway(pid(1), "10.0.0.1", isp, 1_001).unwrap();
        assert!(!ledger.is_valid_payload_for_approver(&pid(1), &isp));
    }

    #[test]
    fn test_expire_pending() {
        let ledger = TrustLedger::new();
        ledger
            .store(
                pid(1),
                PayloadKind::GatewayAuth,
                actor(0x10),
                actor(0x02),
                actor(0x01),
                1_000,
            )
            .unwrap();
        ledger
            .store(
                pid(2),
                PayloadKind::Access,
                actor(0x30),
                actor(0x10),
                actor(0x30),
                5_000,
            )
            .unwrap();

        // Cutoff between the two stored_at times: only the first expires.
        let expired = ledger.expire_pending(3_000, 9_000);
        assert_eq!(expired, vec![pid(1)]);
        assert_eq!(ledger.get(&pid(1)).unwrap().state, PayloadState::Revoked);
        assert!(ledger.get(&pid(2)).unwrap().is_pending());

        // Approved payloads are never expired by the pending sweep.
        let expired = ledger.expire_pending(i64::MAX, 9_001);
        assert_eq!(expired, vec![pid(2)]);
    }

    #[test]
    fn test_events_emitted_per_transition() {
        let ledger = TrustLedger::new();
        let gateway = actor(0x10);
        trust_gateway(&ledger, pid(1), gateway, 1_000);
        ledger
            .revoke_gateway(pid(1), gateway, actor(0x01), 2_000)
            .unwrap();

        let mut cursor = ledger.subscribe(0, EventFilter::any());
        let kinds: Vec<EventKind> = std::iter::from_fn(|| cursor.try_next())
            .map(|(_, e)| e.kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PayloadAdded,
                EventKind::GatewayApproved,
                EventKind::GatewayRevoked,
            ]
        );
    }

    #[test]
    fn test_rejected_operations_emit_nothing() {
        let ledger = TrustLedger::new();
        ledger
            .store(
                pid(1),
                PayloadKind::GatewayAuth,
                actor(0x10),
                actor(0x02),
                actor(0x01),
                1_000,
            )
            .unwrap();
        let before = ledger.events().len();

        let _ = ledger.approve_gateway(pid(1), "10.0.0.1", actor(0x55), 1_001);
        let _ = ledger.store(
            pid(1),
            PayloadKind::GatewayAuth,
            actor(0x10),
            actor(0x02),
            actor(0x01),
            1_002,
        );

        assert_eq!(ledger.events().len(), before);
    }

    #[test]
    fn test_concurrent_store_exactly_one_wins() {
        let ledger = Arc::new(TrustLedger::new());
        let mut handles = Vec::new();

        for i in 0..8u8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                ledger.store(
                    pid(0x42),
                    PayloadKind::GatewayAuth,
                    actor(0x10),
                    actor(0x02),
                    actor(i),
                    1_000,
                )
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(LedgerError::DuplicatePayload(_)))));
        assert_eq!(ledger.len(), 1);
    }
}
