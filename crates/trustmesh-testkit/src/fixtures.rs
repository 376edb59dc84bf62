//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: one deterministic keypair per
//! role, a shared ledger, and idempotent helpers that drive the chain into
//! the states most tests start from.

use std::sync::Arc;

use trustmesh_core::{ActorId, AuthContent, Keypair, PayloadId, PayloadKind};
use trustmesh_ledger::TrustLedger;

/// A fixture with every protocol role and a shared ledger.
pub struct ChainFixture {
    pub ledger: Arc<TrustLedger>,

    pub owner: Keypair,
    pub isp: Keypair,
    pub gateway: Keypair,
    pub vendor: Keypair,
    pub device: Keypair,
    pub service: Keypair,

    /// X25519 seeds for the roles that receive sealed envelopes.
    pub isp_x25519: [u8; 32],
    pub gateway_x25519: [u8; 32],
    pub vendor_x25519: [u8; 32],
}

impl ChainFixture {
    /// Create a fixture with deterministic per-role keys.
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(TrustLedger::new()),
            owner: Keypair::from_seed(&[0xA1; 32]),
            isp: Keypair::from_seed(&[0xA2; 32]),
            gateway: Keypair::from_seed(&[0xA3; 32]),
            vendor: Keypair::from_seed(&[0xA4; 32]),
            device: Keypair::from_seed(&[0xA5; 32]),
            service: Keypair::from_seed(&[0xA6; 32]),
            isp_x25519: [0xB2; 32],
            gateway_x25519: [0xB3; 32],
            vendor_x25519: [0xB4; 32],
        }
    }

    pub fn gateway_id(&self) -> ActorId {
        self.gateway.actor_id()
    }

    pub fn device_id(&self) -> ActorId {
        self.device.actor_id()
    }

    pub fn service_id(&self) -> ActorId {
        self.service.actor_id()
    }

    /// Drive the ledger to "gateway trusted". Idempotent: calling twice
    /// returns the same payload id without a duplicate store.
    pub fn trusted_gateway(&self, now: i64) -> PayloadId {
        let content = AuthContent::with_nonce(
            PayloadKind::GatewayAuth,
            self.gateway.actor_id(),
            self.isp.actor_id(),
            vec![],
            [0x01; 16],
        );
        let payload_id = content.content_id();

        if self.ledger.get(&payload_id).is_none() {
            self.ledger
                .store(
                    payload_id,
                    PayloadKind::GatewayAuth,
                    self.gateway.actor_id(),
                    self.isp.actor_id(),
                    self.owner.actor_id(),
                    now,
                )
                .expect("fixture gateway store");
            self.ledger
                .approve_gateway(payload_id, "203.0.113.7", self.isp.actor_id(), now)
                .expect("fixture gateway approve");
        }
        payload_id
    }

    /// Drive the ledger to "device trusted" (through the fixture gateway).
    /// Returns (gateway payload, device payload).
    pub fn trusted_device(&self, now: i64) -> (PayloadId, PayloadId) {
        let gateway_payload = self.trusted_gateway(now);

        let content = AuthContent::with_nonce(
            PayloadKind::DeviceAuth,
            self.device.actor_id(),
            self.vendor.actor_id(),
            vec![],
            [0x02; 16],
        );
        let payload_id = content.content_id();

        if self.ledger.get(&payload_id).is_none() {
            self.ledger
                .store(
                    payload_id,
                    PayloadKind::DeviceAuth,
                    self.device.actor_id(),
                    self.vendor.actor_id(),
                    self.gateway.actor_id(),
                    now,
                )
                .expect("fixture device store");
            self.ledger
                .approve_device(payload_id, self.vendor.actor_id(), now)
                .expect("fixture device approve");
        }
        (gateway_payload, payload_id)
    }

    /// Drive the ledger to "access approved" for the fixture service with
    /// the given TTL. Returns (gateway payload, access payload).
    pub fn approved_access(&self, ttl_secs: u64, now: i64) -> (PayloadId, PayloadId) {
        let gateway_payload = self.trusted_gateway(now);

        let content = AuthContent::with_nonce(
            PayloadKind::Access,
            self.service.actor_id(),
            self.gateway.actor_id(),
            vec![],
            [0x03; 16],
        );
        let payload_id = content.content_id();

        if self.ledger.get(&payload_id).is_none() {
            self.ledger
                .store(
                    payload_id,
                    PayloadKind::Access,
                    self.service.actor_id(),
                    self.gateway.actor_id(),
                    self.service.actor_id(),
                    now,
                )
                .expect("fixture access store");
            self.ledger
                .approve_access(payload_id, ttl_secs, self.gateway.actor_id(), now)
                .expect("fixture access approve");
        }
        (gateway_payload, payload_id)
    }
}

impl Default for ChainFixture {
    fn default() -> Self {
        Self::new()
    }
}
