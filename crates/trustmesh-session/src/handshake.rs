//! The nonce-based session handshake.
//!
//! A service that holds an approved Access payload establishes a symmetric
//! session key with the approving gateway:
//!
//! 1. The initiator signs a challenge (token, nonce, fresh secret, reply
//!    key) and seals it to the responder's X25519 key.
//! 2. The responder opens it, checks the token against the ledger (a valid
//!    unexpired Access approval that it approved), verifies the signature
//!    against the sender recorded for that token, and answers with a signed,
//!    sealed reply echoing the nonce and carrying its own secret.
//! 3. The initiator verifies the echoed nonce byte-for-byte and the
//!    responder's signature.
//!
//! Both sides then derive the same key from the two secrets. Any
//! verification failure moves the handshake to [`HandshakeStatus::Failed`];
//! a failed handshake never yields a key and must be restarted with a fresh
//! nonce.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use trustmesh_core::{verify_claim, ActorId, Ed25519Signature, Keypair, PayloadId};
use trustmesh_ledger::TrustLedger;

use crate::crypto::{
    derive_session_key, generate_nonce, generate_secret, SessionKey, X25519PublicKey,
    X25519StaticSecret,
};
use crate::envelope::SealedEnvelope;
use crate::error::{Result, SessionError};

/// The initiator's signed challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeBody {
    /// The Access payload authorizing this session.
    pub token: PayloadId,
    /// The initiator's claimed identity.
    pub signer: ActorId,
    /// Where to seal the reply.
    pub reply_to: X25519PublicKey,
    /// When the challenge was built (Unix ms).
    pub timestamp: i64,
    /// Fresh per-handshake nonce, echoed back verbatim.
    pub nonce: [u8; 16],
    /// The initiator's half of the session key material.
    pub secret: [u8; 32],
}

/// The responder's signed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    /// The challenge nonce, echoed.
    pub nonce: [u8; 16],
    /// The responder's claimed identity.
    pub signer: ActorId,
    /// The responder's half of the session key material.
    pub secret: [u8; 32],
}

/// A serialized body plus a signature over those exact bytes.
///
/// The body travels as the bytes that were signed, so the verifier checks
/// the signature before deserializing and never re-canonicalizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub body: Vec<u8>,
    pub signature: Ed25519Signature,
}

impl SignedMessage {
    /// Serialize `body` and sign the bytes.
    pub fn sign<T: Serialize>(body: &T, keypair: &Keypair) -> Self {
        let mut buf = Vec::new();
        ciborium::into_writer(body, &mut buf).expect("CBOR serialization failed");
        let signature = keypair.sign(&buf);
        Self {
            body: buf,
            signature,
        }
    }

    /// Verify the signature under `claimed` and deserialize the body.
    pub fn verify_and_parse<T: for<'de> Deserialize<'de>>(&self, claimed: &ActorId) -> Result<T> {
        if !verify_claim(&self.body, &self.signature, claimed) {
            return Err(SessionError::InvalidSignature(*claimed));
        }
        ciborium::from_reader(self.body.as_slice())
            .map_err(|e| SessionError::Malformed(e.to_string()))
    }

    /// Deserialize the body without verifying (for fields needed to locate
    /// the verification key).
    pub fn parse_unverified<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        ciborium::from_reader(self.body.as_slice())
            .map_err(|e| SessionError::Malformed(e.to_string()))
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| SessionError::Malformed(e.to_string()))
    }
}

/// Handshake progress. Failed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Initiated,
    Challenged,
    Established,
    Failed,
}

/// The service side of the handshake.
///
/// One initiator per handshake attempt; distinct handshakes share no state.
pub struct HandshakeInitiator {
    keypair: Keypair,
    reply_secret: X25519StaticSecret,
    token: PayloadId,
    responder: ActorId,
    responder_pk: X25519PublicKey,
    nonce: [u8; 16],
    secret: [u8; 32],
    status: HandshakeStatus,
}

impl HandshakeInitiator {
    /// Start a handshake for an approved Access `token` against the
    /// responder identified by `responder` and reachable at `responder_pk`.
    pub fn new(
        keypair: Keypair,
        token: PayloadId,
        responder: ActorId,
        responder_pk: X25519PublicKey,
    ) -> Self {
        Self {
            keypair,
            reply_secret: X25519StaticSecret::generate(),
            token,
            responder,
            responder_pk,
            nonce: generate_nonce(),
            secret: generate_secret(),
            status: HandshakeStatus::Initiated,
        }
    }

    /// Current status.
    pub fn status(&self) -> HandshakeStatus {
        self.status
    }

    /// The Access payload this handshake is for.
    pub fn token(&self) -> PayloadId {
        self.token
    }

    /// Build and seal the signed challenge.
    pub fn challenge(&mut self, now: i64) -> Result<SealedEnvelope> {
        if self.status != HandshakeStatus::Initiated {
            return Err(SessionError::InvalidState("challenge after start"));
        }

        let body = ChallengeBody {
            token: self.token,
            signer: self.keypair.actor_id(),
            reply_to: self.reply_secret.public_key(),
            timestamp: now,
            nonce: self.nonce,
            secret: self.secret,
        };
        let signed = SignedMessage::sign(&body, &self.keypair);
        let envelope = SealedEnvelope::seal(&self.responder_pk, &signed.to_bytes())?;

        self.status = HandshakeStatus::Challenged;
        Ok(envelope)
    }

    /// Open and verify the responder's reply, yielding the session key.
    pub fn complete(&mut self, reply: &SealedEnvelope) -> Result<SessionKey> {
        if self.status != HandshakeStatus::Challenged {
            return Err(SessionError::InvalidState("complete before challenge"));
        }

        match self.try_complete(reply) {
            Ok(key) => {
                self.status = HandshakeStatus::Established;
                Ok(key)
            }
            Err(err) => {
                self.status = HandshakeStatus::Failed;
                Err(err)
            }
        }
    }

    fn try_complete(&self, reply: &SealedEnvelope) -> Result<SessionKey> {
        let plaintext = reply.open(&self.reply_secret)?;
        let signed = SignedMessage::from_bytes(&plaintext)?;
        let body: ReplyBody = signed.verify_and_parse(&self.responder)?;

        if body.signer != self.responder {
            return Err(SessionError::InvalidSignature(body.signer));
        }
        if body.nonce != self.nonce {
            return Err(SessionError::NonceMismatch);
        }

        Ok(derive_session_key(
            (&self.keypair.actor_id(), &self.secret),
            (&self.responder, &body.secret),
        ))
    }
}

/// The gateway side of the handshake.
pub struct HandshakeResponder {
    keypair: Keypair,
    x25519_secret: X25519StaticSecret,
    ledger: Arc<TrustLedger>,
    session: Option<(PayloadId, SessionKey)>,
}

impl HandshakeResponder {
    /// Create a responder around the gateway's long-lived keys and ledger.
    pub fn new(keypair: Keypair, x25519_secret: X25519StaticSecret, ledger: Arc<TrustLedger>) -> Self {
        Self {
            keypair,
            x25519_secret,
            ledger,
            session: None,
        }
    }

    /// Open a challenge, authorize it against the ledger, and answer.
    ///
    /// The token must be a valid unexpired Access approval that this
    /// responder approved, and the challenge must verify under the sender
    /// recorded for that token. On success the responder holds the derived
    /// session key.
    pub fn answer(&mut self, challenge: &SealedEnvelope, now: i64) -> Result<SealedEnvelope> {
        let plaintext = challenge.open(&self.x25519_secret)?;
        let signed = SignedMessage::from_bytes(&plaintext)?;
        let body: ChallengeBody = signed.parse_unverified()?;

        if !self.ledger.is_access_valid(&body.token, now) {
            tracing::warn!(token = %body.token, "handshake rejected: access not valid");
            return Err(SessionError::AccessNotApproved(body.token));
        }
        // is_access_valid implies the record exists.
        let record = self
            .ledger
            .get(&body.token)
            .ok_or(SessionError::AccessNotApproved(body.token))?;
        if record.approver != self.keypair.actor_id() {
            return Err(SessionError::AccessNotApproved(body.token));
        }

        // The identity the signature must verify under is the one the
        // ledger recorded, not whatever the challenge claims.
        if body.signer != record.sender {
            return Err(SessionError::InvalidSignature(body.signer));
        }
        let body: ChallengeBody = signed.verify_and_parse(&record.sender)?;

        let secret = generate_secret();
        let reply = ReplyBody {
            nonce: body.nonce,
            signer: self.keypair.actor_id(),
            secret,
        };
        let signed_reply = SignedMessage::sign(&reply, &self.keypair);
        let envelope = SealedEnvelope::seal(&body.reply_to, &signed_reply.to_bytes())?;

        let key = derive_session_key(
            (&record.sender, &body.secret),
            (&self.keypair.actor_id(), &secret),
        );
        self.session = Some((body.token, key));
        Ok(envelope)
    }

    /// The session key, once a challenge has been answered.
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session.as_ref().map(|(_, key)| key)
    }

    /// The token of the answered challenge, if any.
    pub fn token(&self) -> Option<PayloadId> {
        self.session.as_ref().map(|(token, _)| *token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustmesh_core::PayloadKind;

    struct Rig {
        ledger: Arc<TrustLedger>,
        service: Keypair,
        gateway: Keypair,
        gateway_x25519: [u8; 32],
        token: PayloadId,
    }

    /// Ledger with a trusted gateway and an approved Access payload for the
    /// service.
    fn rig() -> Rig {
        let ledger = Arc::new(TrustLedger::new());
        let owner = Keypair::from_seed(&[0x01; 32]);
        let isp = Keypair::from_seed(&[0x02; 32]);
        let gateway = Keypair::from_seed(&[0x03; 32]);
        let service = Keypair::from_seed(&[0x04; 32]);

        let gw_payload = PayloadId::from_bytes([0xA0; 32]);
        ledger
            .store(
                gw_payload,
                PayloadKind::GatewayAuth,
                gateway.actor_id(),
                isp.actor_id(),
                owner.actor_id(),
                1_000,
            )
            .unwrap();
        ledger
            .approve_gateway(gw_payload, "10.0.0.1", isp.actor_id(), 1_001)
            .unwrap();

        let token = PayloadId::from_bytes([0xA1; 32]);
        ledger
            .store(
                token,
                PayloadKind::Access,
                service.actor_id(),
                gateway.actor_id(),
                service.actor_id(),
                1_002,
            )
            .unwrap();
        ledger
            .approve_access(token, 600, gateway.actor_id(), 1_003)
            .unwrap();

        Rig {
            ledger,
            service,
            gateway,
            gateway_x25519: [0x33; 32],
            token,
        }
    }

    fn responder(rig: &Rig) -> HandshakeResponder {
        HandshakeResponder::new(
            rig.gateway.clone(),
            X25519StaticSecret::from_bytes(rig.gateway_x25519),
            Arc::clone(&rig.ledger),
        )
    }

    fn initiator(rig: &Rig) -> HandshakeInitiator {
        let gateway_pk = X25519StaticSecret::from_bytes(rig.gateway_x25519).public_key();
        HandshakeInitiator::new(
            rig.service.clone(),
            rig.token,
            rig.gateway.actor_id(),
            gateway_pk,
        )
    }

    #[test]
    fn test_handshake_both_sides_same_key() {
        let rig = rig();
        let mut init = initiator(&rig);
        let mut resp = responder(&rig);

        let challenge = init.challenge(2_000).unwrap();
        assert_eq!(init.status(), HandshakeStatus::Challenged);

        let reply = resp.answer(&challenge, 2_001).unwrap();
        let key = init.complete(&reply).unwrap();

        assert_eq!(init.status(), HandshakeStatus::Established);
        assert_eq!(Some(&key), resp.session_key());

        // The established key carries real traffic both ways.
        let message = resp.session_key().unwrap().seal(b"telemetry").unwrap();
        assert_eq!(key.open(&message).unwrap(), b"telemetry");
    }

    #[test]
    fn test_unapproved_token_rejected() {
        let rig = rig();
        let mut resp = responder(&rig);

        let stray = PayloadId::from_bytes([0xEE; 32]);
        let gateway_pk = X25519StaticSecret::from_bytes(rig.gateway_x25519).public_key();
        let mut init = HandshakeInitiator::new(
            rig.service.clone(),
            stray,
            rig.gateway.actor_id(),
            gateway_pk,
        );

        let challenge = init.challenge(2_000).unwrap();
        assert!(matches!(
            resp.answer(&challenge, 2_001),
            Err(SessionError::AccessNotApproved(t)) if t == stray
        ));
        assert!(resp.session_key().is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let rig = rig();
        let mut init = initiator(&rig);
        let mut resp = responder(&rig);

        let challenge = init.challenge(2_000).unwrap();
        // TTL was 600s from now=1_003.
        let after_expiry = 1_003 + 600_000;
        assert!(matches!(
            resp.answer(&challenge, after_expiry),
            Err(SessionError::AccessNotApproved(_))
        ));
    }

    #[test]
    fn test_impostor_signature_rejected() {
        let rig = rig();
        let mut resp = responder(&rig);

        // An impostor with its own keypair uses the service's valid token.
        let impostor = Keypair::from_seed(&[0x66; 32]);
        let gateway_pk = X25519StaticSecret::from_bytes(rig.gateway_x25519).public_key();
        let mut init =
            HandshakeInitiator::new(impostor, rig.token, rig.gateway.actor_id(), gateway_pk);

        let challenge = init.challenge(2_000).unwrap();
        assert!(matches!(
            resp.answer(&challenge, 2_001),
            Err(SessionError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_wrong_nonce_in_reply_fails_handshake() {
        let rig = rig();
        let mut init = initiator(&rig);
        let challenge = init.challenge(2_000).unwrap();

        // A malicious responder opens the challenge and answers with a
        // wrong nonce but an otherwise valid signed reply.
        let gateway_secret = X25519StaticSecret::from_bytes(rig.gateway_x25519);
        let plaintext = challenge.open(&gateway_secret).unwrap();
        let signed = SignedMessage::from_bytes(&plaintext).unwrap();
        let body: ChallengeBody = signed.parse_unverified().unwrap();

        let mut wrong_nonce = body.nonce;
        wrong_nonce[0] ^= 0x01;
        let reply = ReplyBody {
            nonce: wrong_nonce,
            signer: rig.gateway.actor_id(),
            secret: generate_secret(),
        };
        let signed_reply = SignedMessage::sign(&reply, &rig.gateway);
        let envelope = SealedEnvelope::seal(&body.reply_to, &signed_reply.to_bytes()).unwrap();

        assert!(matches!(
            init.complete(&envelope),
            Err(SessionError::NonceMismatch)
        ));
        assert_eq!(init.status(), HandshakeStatus::Failed);

        // A failed handshake never yields a key afterwards.
        assert!(matches!(
            init.complete(&envelope),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_reply_signed_by_stranger_rejected() {
        let rig = rig();
        let mut init = initiator(&rig);
        let challenge = init.challenge(2_000).unwrap();

        let gateway_secret = X25519StaticSecret::from_bytes(rig.gateway_x25519);
        let plaintext = challenge.open(&gateway_secret).unwrap();
        let signed = SignedMessage::from_bytes(&plaintext).unwrap();
        let body: ChallengeBody = signed.parse_unverified().unwrap();

        let stranger = Keypair::from_seed(&[0x77; 32]);
        let reply = ReplyBody {
            nonce: body.nonce,
            signer: stranger.actor_id(),
            secret: generate_secret(),
        };
        let signed_reply = SignedMessage::sign(&reply, &stranger);
        let envelope = SealedEnvelope::seal(&body.reply_to, &signed_reply.to_bytes()).unwrap();

        assert!(matches!(
            init.complete(&envelope),
            Err(SessionError::InvalidSignature(_))
        ));
        assert_eq!(init.status(), HandshakeStatus::Failed);
    }

    #[test]
    fn test_challenge_only_once() {
        let rig = rig();
        let mut init = initiator(&rig);
        init.challenge(2_000).unwrap();

        assert!(matches!(
            init.challenge(2_001),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_wrong_responder_cannot_answer() {
        let rig = rig();
        let mut init = initiator(&rig);
        let challenge = init.challenge(2_000).unwrap();

        // A different gateway holding a different X25519 key cannot even
        // open the challenge.
        let other = HandshakeResponder::new(
            Keypair::from_seed(&[0x55; 32]),
            X25519StaticSecret::from_bytes([0x44; 32]),
            Arc::clone(&rig.ledger),
        );
        let mut other = other;
        assert!(matches!(
            other.answer(&challenge, 2_001),
            Err(SessionError::DecryptionFailure(_))
        ));
    }
}
