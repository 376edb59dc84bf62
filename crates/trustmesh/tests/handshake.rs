//! Session establishment against a live chain of trust.

use std::sync::Arc;

use trustmesh::core::Keypair;
use trustmesh::session::{derive_session_key, SessionError};
use trustmesh::store::MemoryStore;
use trustmesh::{
    ActorId, Gateway, HandshakeStatus, Isp, MeshError, Owner, PayloadId, Service, TrustLedger,
};

struct SessionRig {
    ledger: Arc<TrustLedger>,
    gateway: Gateway,
    service: Service,
}

/// Build a rig with the gateway already trusted, and an approved access
/// token for the service.
fn rig_with_access(ttl_secs: u64, now: i64) -> (SessionRig, PayloadId) {
    let ledger = Arc::new(TrustLedger::new());
    let owner = Owner::new(Keypair::from_seed(&[0xA1; 32]), Arc::clone(&ledger));
    let isp = Isp::new(Keypair::from_seed(&[0xA2; 32]), [0xB2; 32], Arc::clone(&ledger));
    let gateway = Gateway::new(
        Keypair::from_seed(&[0xA3; 32]),
        [0xB3; 32],
        Arc::clone(&ledger),
        Arc::new(MemoryStore::new()),
    );
    let service = Service::new(
        Keypair::from_seed(&[0xA6; 32]),
        Arc::clone(&ledger),
        Arc::new(MemoryStore::new()),
    );

    let (_, envelope) = owner
        .request_gateway_trust(
            gateway.actor_id(),
            isp.actor_id(),
            &isp.x25519_public(),
            vec![],
            now,
        )
        .unwrap();
    isp.approve_gateway(&envelope, "203.0.113.7", now).unwrap();

    let (token, envelope) = service
        .request_access(gateway.actor_id(), &gateway.x25519_public(), vec![], now)
        .unwrap();
    gateway.approve_access(&envelope, ttl_secs, now).unwrap();

    (
        SessionRig {
            ledger,
            gateway,
            service,
        },
        token,
    )
}

#[tokio::test]
async fn handshake_yields_one_key_usable_for_traffic() {
    let (rig, token) = rig_with_access(600, 1_000);

    let (mut initiator, challenge) = rig
        .service
        .begin_handshake(token, rig.gateway.actor_id(), rig.gateway.x25519_public(), 1_001)
        .unwrap();
    assert_eq!(initiator.status(), HandshakeStatus::Challenged);

    let reply = rig.gateway.answer_handshake(&challenge, 600, 1_002).await.unwrap();
    let key = rig
        .service
        .complete_handshake(&mut initiator, &reply, 600)
        .await
        .unwrap();
    assert_eq!(initiator.status(), HandshakeStatus::Established);

    // The gateway's cached key decrypts what the service's key sealed.
    let gateway_key = rig.gateway.session_key(&token).await.unwrap().unwrap();
    let message = key.seal(b"thermostat reading: 21.5C").unwrap();
    assert_eq!(
        gateway_key.open(&message).unwrap(),
        b"thermostat reading: 21.5C"
    );

    // And each direction uses a fresh nonce per message.
    let again = key.seal(b"thermostat reading: 21.5C").unwrap();
    assert_ne!(message.nonce, again.nonce);
}

#[tokio::test]
async fn expired_token_stops_the_handshake() {
    let (rig, token) = rig_with_access(600, 1_000);

    // 600s after approval the token has lapsed.
    let later = 1_000 + 600 * 1_000;
    let (_, challenge) = rig
        .service
        .begin_handshake(token, rig.gateway.actor_id(), rig.gateway.x25519_public(), later)
        .unwrap();

    let err = rig.gateway.answer_handshake(&challenge, 600, later).await.unwrap_err();
    assert!(matches!(
        err,
        MeshError::Session(SessionError::AccessNotApproved(t)) if t == token
    ));
    assert!(rig.gateway.session_key(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn revoked_access_stops_the_handshake() {
    let (rig, token) = rig_with_access(600, 1_000);
    rig.service.revoke_access(token, 1_001).unwrap();

    let (_, challenge) = rig
        .service
        .begin_handshake(token, rig.gateway.actor_id(), rig.gateway.x25519_public(), 1_002)
        .unwrap();
    assert!(matches!(
        rig.gateway.answer_handshake(&challenge, 600, 1_003).await,
        Err(MeshError::Session(SessionError::AccessNotApproved(_)))
    ));
}

#[tokio::test]
async fn revoking_the_gateway_invalidates_live_tokens() {
    let (rig, token) = rig_with_access(600, 1_000);
    assert!(rig.ledger.is_access_valid(&token, 1_001));

    // The owner pulls the plug on the gateway; the still-unexpired access
    // token dies with it.
    let owner = Owner::new(Keypair::from_seed(&[0xA1; 32]), Arc::clone(&rig.ledger));
    let mut cursor = rig.ledger.subscribe(0, trustmesh::EventFilter::any());
    let gateway_payload = cursor.try_next().map(|(_, e)| e.payload_id()).unwrap();
    owner
        .revoke_gateway(gateway_payload, rig.gateway.actor_id(), 1_002)
        .unwrap();

    assert!(!rig.ledger.is_access_valid(&token, 1_003));
    let (_, challenge) = rig
        .service
        .begin_handshake(token, rig.gateway.actor_id(), rig.gateway.x25519_public(), 1_004)
        .unwrap();
    assert!(matches!(
        rig.gateway.answer_handshake(&challenge, 600, 1_005).await,
        Err(MeshError::Session(SessionError::AccessNotApproved(_)))
    ));
}

fn padded(word: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..word.len()].copy_from_slice(word.as_bytes());
    out
}

#[test]
fn derived_key_ignores_argument_order() {
    let alpha = padded("alpha");
    let beta = padded("beta");
    let a = ActorId::from_bytes([0x01; 32]);
    let b = ActorId::from_bytes([0xFF; 32]);

    let forward = derive_session_key((&a, &alpha), (&b, &beta));
    let backward = derive_session_key((&b, &beta), (&a, &alpha));
    assert_eq!(forward, backward);

    // Which actor holds which secret still matters.
    let swapped = derive_session_key((&a, &beta), (&b, &alpha));
    assert_ne!(forward, swapped);
}

#[tokio::test]
async fn failed_handshake_leaves_no_key_behind() {
    let (rig, token) = rig_with_access(600, 1_000);

    let (mut initiator, challenge) = rig
        .service
        .begin_handshake(token, rig.gateway.actor_id(), rig.gateway.x25519_public(), 1_001)
        .unwrap();
    let reply = rig.gateway.answer_handshake(&challenge, 600, 1_002).await.unwrap();

    // A corrupted reply fails the handshake terminally.
    let mut bytes = reply.to_bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let tampered = trustmesh::session::SealedEnvelope::from_bytes(&bytes).unwrap();

    assert!(rig
        .service
        .complete_handshake(&mut initiator, &tampered, 600)
        .await
        .is_err());
    assert_eq!(initiator.status(), HandshakeStatus::Failed);
    assert!(rig.service.session_key(&token).await.unwrap().is_none());

    // Even the genuine reply is refused after failure.
    assert!(matches!(
        rig.service.complete_handshake(&mut initiator, &reply, 600).await,
        Err(MeshError::Session(SessionError::InvalidState(_)))
    ));
}
