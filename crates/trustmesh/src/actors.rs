//! The six protocol roles and their operations.
//!
//! Every actor is constructed explicitly with its keys and a shared ledger
//! handle; there is no ambient registry. Mutating operations take an
//! explicit `now` timestamp (Unix ms) so callers own the clock.
//!
//! The chain of responsibility:
//!
//! - **Owner** asks an **ISP** to vouch for a home **Gateway**.
//! - A trusted Gateway asks a **Vendor** to vouch for a **Device**, backed
//!   by off-chain evidence the device produces.
//! - A **Service** asks a trusted Gateway for time-limited access, then
//!   runs the session handshake against it.

use std::collections::HashMap;
use std::sync::Arc;

use trustmesh_core::{
    canonical_content_bytes, ActorId, AuthContent, Blake3Hash, Ed25519PublicKey, Keypair,
    PayloadId, PayloadKind, SignedContent,
};
use trustmesh_ledger::{LedgerError, PayloadRecord, TrustLedger};
use trustmesh_session::{
    HandshakeInitiator, HandshakeResponder, SealedEnvelope, SessionKey, X25519PublicKey,
    X25519StaticSecret,
};
use trustmesh_store::{Store, StoreError};

use crate::error::{MeshError, Result};
use crate::transport::{DeviceEvidence, RequestEnvelope, TrustRequest};

/// Cache key for an established session key.
fn session_cache_key(token: &PayloadId) -> String {
    format!("session/{}", token.to_hex())
}

/// Open a sealed request and run the approver-side checks shared by every
/// approval path: the content re-hashes to the claimed payload id, the
/// payload is on the ledger, and the signature verifies under the sender
/// the ledger recorded (never under whatever the request claims).
fn open_checked(
    envelope: &RequestEnvelope,
    secret: &X25519StaticSecret,
    ledger: &TrustLedger,
) -> Result<(TrustRequest, PayloadRecord)> {
    let request = envelope.open(secret)?;
    request.check_hash()?;

    let record = ledger
        .get(&request.payload_id)
        .ok_or(LedgerError::PayloadNotFound(request.payload_id))?;
    if !request.signed.verify(&record.sender) {
        return Err(MeshError::InvalidSignature(record.sender));
    }
    Ok((request, record))
}

fn session_key_from_cache(bytes: Vec<u8>) -> Result<SessionKey> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StoreError::InvalidData("cached session key is not 32 bytes".into()))?;
    Ok(SessionKey::from_bytes(arr))
}

// ─────────────────────────────────────────────────────────────────────────
// Owner
// ─────────────────────────────────────────────────────────────────────────

/// The subscriber who owns a gateway and vouches for it to an ISP.
pub struct Owner {
    keypair: Keypair,
    ledger: Arc<TrustLedger>,
}

impl Owner {
    pub fn new(keypair: Keypair, ledger: Arc<TrustLedger>) -> Self {
        Self { keypair, ledger }
    }

    pub fn actor_id(&self) -> ActorId {
        self.keypair.actor_id()
    }

    /// Store a GatewayAuth payload and seal the signed request to the ISP.
    pub fn request_gateway_trust(
        &self,
        gateway: ActorId,
        isp: ActorId,
        isp_pk: &X25519PublicKey,
        attributes: Vec<(String, String)>,
        now: i64,
    ) -> Result<(PayloadId, RequestEnvelope)> {
        let content = AuthContent::new(PayloadKind::GatewayAuth, gateway, isp, attributes);
        let payload_id = content.content_id();

        self.ledger.store(
            payload_id,
            PayloadKind::GatewayAuth,
            gateway,
            isp,
            self.actor_id(),
            now,
        )?;

        let request = TrustRequest {
            payload_id,
            signed: SignedContent::sign(content, &self.keypair),
            evidence: None,
        };
        Ok((payload_id, RequestEnvelope::seal(isp_pk, &request)?))
    }

    /// Withdraw trust from a gateway this owner vouched for.
    pub fn revoke_gateway(&self, payload_id: PayloadId, gateway: ActorId, now: i64) -> Result<()> {
        self.ledger
            .revoke_gateway(payload_id, gateway, self.actor_id(), now)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// ISP
// ─────────────────────────────────────────────────────────────────────────

/// The provider who approves gateway trust and binds the router address.
pub struct Isp {
    keypair: Keypair,
    x25519_seed: [u8; 32],
    ledger: Arc<TrustLedger>,
}

impl Isp {
    pub fn new(keypair: Keypair, x25519_seed: [u8; 32], ledger: Arc<TrustLedger>) -> Self {
        Self {
            keypair,
            x25519_seed,
            ledger,
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.keypair.actor_id()
    }

    /// The key owners seal gateway requests to.
    pub fn x25519_public(&self) -> X25519PublicKey {
        X25519StaticSecret::from_bytes(self.x25519_seed).public_key()
    }

    /// Open an owner's request, check it, and approve the gateway.
    pub fn approve_gateway(
        &self,
        envelope: &RequestEnvelope,
        router_ip: &str,
        now: i64,
    ) -> Result<PayloadId> {
        let secret = X25519StaticSecret::from_bytes(self.x25519_seed);
        let (request, _) = open_checked(envelope, &secret, &self.ledger)?;

        self.ledger
            .approve_gateway(request.payload_id, router_ip, self.actor_id(), now)?;
        Ok(request.payload_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────

/// The home router: vouches for devices, approves service access, and
/// answers session handshakes.
pub struct Gateway {
    keypair: Keypair,
    x25519_seed: [u8; 32],
    ledger: Arc<TrustLedger>,
    cache: Arc<dyn Store>,
}

impl Gateway {
    pub fn new(
        keypair: Keypair,
        x25519_seed: [u8; 32],
        ledger: Arc<TrustLedger>,
        cache: Arc<dyn Store>,
    ) -> Self {
        Self {
            keypair,
            x25519_seed,
            ledger,
            cache,
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.keypair.actor_id()
    }

    /// The key services seal access requests and handshakes to.
    pub fn x25519_public(&self) -> X25519PublicKey {
        X25519StaticSecret::from_bytes(self.x25519_seed).public_key()
    }

    /// Build the DeviceAuth content for a device behind this gateway.
    ///
    /// The device computes its evidence over these exact content bytes, so
    /// the content is built first and submitted unchanged.
    pub fn build_device_request(
        &self,
        device: ActorId,
        vendor: ActorId,
        attributes: Vec<(String, String)>,
    ) -> AuthContent {
        AuthContent::new(PayloadKind::DeviceAuth, device, vendor, attributes)
    }

    /// Store the DeviceAuth payload and seal it, with the device's
    /// evidence, to the vendor.
    pub fn submit_device_request(
        &self,
        content: AuthContent,
        evidence: DeviceEvidence,
        vendor_pk: &X25519PublicKey,
        now: i64,
    ) -> Result<(PayloadId, RequestEnvelope)> {
        let payload_id = content.content_id();

        self.ledger.store(
            payload_id,
            PayloadKind::DeviceAuth,
            content.target,
            content.approver,
            self.actor_id(),
            now,
        )?;

        let request = TrustRequest {
            payload_id,
            signed: SignedContent::sign(content, &self.keypair),
            evidence: Some(evidence),
        };
        Ok((payload_id, RequestEnvelope::seal(vendor_pk, &request)?))
    }

    /// Open a service's access request, check it, and approve with a TTL.
    pub fn approve_access(
        &self,
        envelope: &RequestEnvelope,
        ttl_secs: u64,
        now: i64,
    ) -> Result<PayloadId> {
        let secret = X25519StaticSecret::from_bytes(self.x25519_seed);
        let (request, _) = open_checked(envelope, &secret, &self.ledger)?;

        self.ledger
            .approve_access(request.payload_id, ttl_secs, self.actor_id(), now)?;
        Ok(request.payload_id)
    }

    /// Answer a session handshake challenge, caching the established key
    /// under the access token for `ttl_secs`.
    pub async fn answer_handshake(
        &self,
        challenge: &SealedEnvelope,
        ttl_secs: u64,
        now: i64,
    ) -> Result<SealedEnvelope> {
        let mut responder = HandshakeResponder::new(
            self.keypair.clone(),
            X25519StaticSecret::from_bytes(self.x25519_seed),
            Arc::clone(&self.ledger),
        );
        let reply = responder.answer(challenge, now)?;

        if let (Some(token), Some(key)) = (responder.token(), responder.session_key()) {
            self.cache
                .set(&session_cache_key(&token), key.as_bytes(), Some(ttl_secs))
                .await?;
        }
        Ok(reply)
    }

    /// Look up a cached session key by access token.
    pub async fn session_key(&self, token: &PayloadId) -> Result<Option<SessionKey>> {
        match self.cache.get(&session_cache_key(token)).await? {
            Some(bytes) => Ok(Some(session_key_from_cache(bytes)?)),
            None => Ok(None),
        }
    }

    /// Withdraw trust from a device this gateway vouched for.
    pub fn revoke_device(&self, payload_id: PayloadId, device: ActorId, now: i64) -> Result<()> {
        self.ledger
            .revoke_device(payload_id, device, self.actor_id(), now)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Vendor
// ─────────────────────────────────────────────────────────────────────────

/// What a vendor knows about a manufactured device.
#[derive(Debug, Clone, Default)]
pub struct DeviceCredentials {
    pub public_key: Option<Ed25519PublicKey>,
    pub shared_secret: Option<[u8; 32]>,
    pub fingerprint: Option<Blake3Hash>,
    pub mac: Option<String>,
}

/// The vendor's record of manufactured devices.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: HashMap<ActorId, DeviceCredentials>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device: ActorId, credentials: DeviceCredentials) {
        self.devices.insert(device, credentials);
    }

    pub fn get(&self, device: &ActorId) -> Option<&DeviceCredentials> {
        self.devices.get(device)
    }
}

/// The manufacturer who approves device trust after checking evidence.
pub struct Vendor {
    keypair: Keypair,
    x25519_seed: [u8; 32],
    ledger: Arc<TrustLedger>,
    registry: DeviceRegistry,
}

impl Vendor {
    pub fn new(keypair: Keypair, x25519_seed: [u8; 32], ledger: Arc<TrustLedger>) -> Self {
        Self {
            keypair,
            x25519_seed,
            ledger,
            registry: DeviceRegistry::new(),
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.keypair.actor_id()
    }

    /// The key gateways seal device requests to.
    pub fn x25519_public(&self) -> X25519PublicKey {
        X25519StaticSecret::from_bytes(self.x25519_seed).public_key()
    }

    /// Record a manufactured device's expected credentials.
    pub fn register_device(&mut self, device: ActorId, credentials: DeviceCredentials) {
        self.registry.register(device, credentials);
    }

    /// Open a gateway's device request, check signature and evidence, and
    /// approve.
    ///
    /// Fails `UntrustedParent` (from the ledger) if the sending gateway is
    /// not itself trusted, and `EvidenceRejected`/`UnknownDevice` when the
    /// off-chain evidence check fails.
    pub fn approve_device(&self, envelope: &RequestEnvelope, now: i64) -> Result<PayloadId> {
        let secret = X25519StaticSecret::from_bytes(self.x25519_seed);
        let (request, record) = open_checked(envelope, &secret, &self.ledger)?;

        let evidence = request.evidence.as_ref().ok_or(MeshError::MissingEvidence)?;
        let credentials = self
            .registry
            .get(&record.target)
            .ok_or(MeshError::UnknownDevice(record.target))?;
        if let Err(err) = check_evidence(evidence, credentials, &request.signed.content) {
            tracing::warn!(device = %record.target, %err, "device evidence rejected");
            return Err(err);
        }

        self.ledger
            .approve_device(request.payload_id, self.actor_id(), now)?;
        Ok(request.payload_id)
    }
}

/// Verify device evidence against the vendor's records for that device.
fn check_evidence(
    evidence: &DeviceEvidence,
    credentials: &DeviceCredentials,
    content: &AuthContent,
) -> Result<()> {
    let message = canonical_content_bytes(content);

    match evidence {
        DeviceEvidence::Signature {
            public_key,
            signature,
        } => {
            let expected = credentials
                .public_key
                .ok_or(MeshError::EvidenceRejected("no registered device key"))?;
            if *public_key != expected {
                return Err(MeshError::EvidenceRejected("key does not match registration"));
            }
            expected
                .verify(&message, signature)
                .map_err(|_| MeshError::EvidenceRejected("device signature invalid"))
        }
        DeviceEvidence::SharedSecretDigest { digest } => {
            let secret = credentials
                .shared_secret
                .ok_or(MeshError::EvidenceRejected("no registered shared secret"))?;
            if *digest != Blake3Hash::keyed(&secret, &message) {
                return Err(MeshError::EvidenceRejected("shared secret digest mismatch"));
            }
            Ok(())
        }
        DeviceEvidence::Fingerprint { digest } => {
            let expected = credentials
                .fingerprint
                .ok_or(MeshError::EvidenceRejected("no registered fingerprint"))?;
            if *digest != expected {
                return Err(MeshError::EvidenceRejected("fingerprint mismatch"));
            }
            Ok(())
        }
        DeviceEvidence::MacAddress { mac } => {
            let expected = credentials
                .mac
                .as_deref()
                .ok_or(MeshError::EvidenceRejected("no registered MAC address"))?;
            if mac != expected {
                return Err(MeshError::EvidenceRejected("MAC address mismatch"));
            }
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Device
// ─────────────────────────────────────────────────────────────────────────

/// An IoT device: holds credential material and produces evidence over the
/// exact content bytes its gateway will submit.
pub struct Device {
    keypair: Keypair,
    shared_secret: Option<[u8; 32]>,
    fingerprint: Option<Blake3Hash>,
    mac: Option<String>,
}

impl Device {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair,
            shared_secret: None,
            fingerprint: None,
            mac: None,
        }
    }

    pub fn with_shared_secret(mut self, secret: [u8; 32]) -> Self {
        self.shared_secret = Some(secret);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Blake3Hash) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }

    pub fn actor_id(&self) -> ActorId {
        self.keypair.actor_id()
    }

    /// The credentials the vendor should hold for this device.
    pub fn credentials(&self) -> DeviceCredentials {
        DeviceCredentials {
            public_key: Some(self.keypair.public_key()),
            shared_secret: self.shared_secret,
            fingerprint: self.fingerprint,
            mac: self.mac.clone(),
        }
    }

    /// Sign the canonical content bytes with the device key.
    pub fn sign_evidence(&self, content: &AuthContent) -> DeviceEvidence {
        let message = canonical_content_bytes(content);
        DeviceEvidence::Signature {
            public_key: self.keypair.public_key(),
            signature: self.keypair.sign(&message),
        }
    }

    /// Keyed digest of the canonical content bytes under the pre-shared
    /// secret, if the device holds one.
    pub fn digest_evidence(&self, content: &AuthContent) -> Option<DeviceEvidence> {
        let secret = self.shared_secret?;
        let message = canonical_content_bytes(content);
        Some(DeviceEvidence::SharedSecretDigest {
            digest: Blake3Hash::keyed(&secret, &message),
        })
    }

    /// Manufacturer fingerprint, if the device carries one.
    pub fn fingerprint_evidence(&self) -> Option<DeviceEvidence> {
        self.fingerprint
            .map(|digest| DeviceEvidence::Fingerprint { digest })
    }

    /// Hardware address, if known.
    pub fn mac_evidence(&self) -> Option<DeviceEvidence> {
        self.mac
            .clone()
            .map(|mac| DeviceEvidence::MacAddress { mac })
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────

/// A remote party that wants a session with a gateway.
pub struct Service {
    keypair: Keypair,
    ledger: Arc<TrustLedger>,
    cache: Arc<dyn Store>,
}

impl Service {
    pub fn new(keypair: Keypair, ledger: Arc<TrustLedger>, cache: Arc<dyn Store>) -> Self {
        Self {
            keypair,
            ledger,
            cache,
        }
    }

    pub fn actor_id(&self) -> ActorId {
        self.keypair.actor_id()
    }

    /// Store an Access payload targeting this service and seal the signed
    /// request to the approving gateway.
    pub fn request_access(
        &self,
        gateway: ActorId,
        gateway_pk: &X25519PublicKey,
        attributes: Vec<(String, String)>,
        now: i64,
    ) -> Result<(PayloadId, RequestEnvelope)> {
        let content = AuthContent::new(PayloadKind::Access, self.actor_id(), gateway, attributes);
        let payload_id = content.content_id();

        self.ledger.store(
            payload_id,
            PayloadKind::Access,
            self.actor_id(),
            gateway,
            self.actor_id(),
            now,
        )?;

        let request = TrustRequest {
            payload_id,
            signed: SignedContent::sign(content, &self.keypair),
            evidence: None,
        };
        Ok((payload_id, RequestEnvelope::seal(gateway_pk, &request)?))
    }

    /// Start the handshake for an approved access token, producing the
    /// sealed challenge.
    pub fn begin_handshake(
        &self,
        token: PayloadId,
        gateway: ActorId,
        gateway_pk: X25519PublicKey,
        now: i64,
    ) -> Result<(HandshakeInitiator, SealedEnvelope)> {
        let mut initiator = HandshakeInitiator::new(self.keypair.clone(), token, gateway, gateway_pk);
        let challenge = initiator.challenge(now)?;
        Ok((initiator, challenge))
    }

    /// Verify the gateway's reply and cache the established key under the
    /// access token for `ttl_secs`.
    pub async fn complete_handshake(
        &self,
        initiator: &mut HandshakeInitiator,
        reply: &SealedEnvelope,
        ttl_secs: u64,
    ) -> Result<SessionKey> {
        let key = initiator.complete(reply)?;
        self.cache
            .set(
                &session_cache_key(&initiator.token()),
                key.as_bytes(),
                Some(ttl_secs),
            )
            .await?;
        Ok(key)
    }

    /// Look up a cached session key by access token.
    pub async fn session_key(&self, token: &PayloadId) -> Result<Option<SessionKey>> {
        match self.cache.get(&session_cache_key(token)).await? {
            Some(bytes) => Ok(Some(session_key_from_cache(bytes)?)),
            None => Ok(None),
        }
    }

    /// Give up an access approval early.
    pub fn revoke_access(&self, payload_id: PayloadId, now: i64) -> Result<()> {
        self.ledger
            .revoke_access(payload_id, self.actor_id(), self.actor_id(), now)?;
        Ok(())
    }
}
