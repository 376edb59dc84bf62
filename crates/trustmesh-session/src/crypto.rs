//! X25519 key agreement, ChaCha20-Poly1305 keys, and the derived session
//! cipher.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use trustmesh_core::ActorId;

use crate::error::{Result, SessionError};

/// Domain separation context for session key derivation.
const SESSION_KEY_CONTEXT: &str = "trustmesh-session-v0-key";

/// Domain separation context for envelope key derivation.
const ENVELOPE_KEY_CONTEXT: &str = "trustmesh-session-v0-envelope";

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret key.
///
/// Key agreement only; signing identities are Ed25519 and live in the core
/// crate.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// A shared secret from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the envelope encryption key from this shared secret.
    pub fn derive_envelope_key(&self) -> AeadKey {
        let mut hasher = blake3::Hasher::new_derive_key(ENVELOPE_KEY_CONTEXT);
        hasher.update(&self.0);
        AeadKey(*hasher.finalize().as_bytes())
    }
}

/// A 256-bit ChaCha20-Poly1305 key.
#[derive(Clone)]
pub struct AeadKey([u8; 32]);

impl AeadKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt plaintext under a nonce.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| SessionError::EncryptionFailure(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| SessionError::EncryptionFailure(e.to_string()))
    }

    /// Decrypt ciphertext under a nonce.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| SessionError::DecryptionFailure(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce.0), ciphertext)
            .map_err(|e| SessionError::DecryptionFailure(e.to_string()))
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305, fresh per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 12];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// A symmetric session key established by the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt a session message with a fresh random nonce.
    ///
    /// The nonce travels with the ciphertext; no fixed-IV mode exists.
    pub fn seal(&self, plaintext: &[u8]) -> Result<SessionCiphertext> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = AeadKey(self.0).encrypt(plaintext, &nonce)?;
        Ok(SessionCiphertext { nonce, ciphertext })
    }

    /// Decrypt a session message.
    pub fn open(&self, message: &SessionCiphertext) -> Result<Vec<u8>> {
        AeadKey(self.0).decrypt(&message.ciphertext, &message.nonce)
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "SessionKey(..)")
    }
}

/// An encrypted session message: nonce plus ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCiphertext {
    pub nonce: EncryptionNonce,
    pub ciphertext: Vec<u8>,
}

/// Derive the shared session key from both handshake secrets.
///
/// The secrets are concatenated in the byte-wise order of their owners'
/// [`ActorId`]s, not in protocol-role order, so the initiator and responder
/// derive identical keys from their mirrored views of the exchange.
pub fn derive_session_key(
    a: (&ActorId, &[u8; 32]),
    b: (&ActorId, &[u8; 32]),
) -> SessionKey {
    let (lo, hi) = if a.0 <= b.0 { (a.1, b.1) } else { (b.1, a.1) };
    let mut hasher = blake3::Hasher::new_derive_key(SESSION_KEY_CONTEXT);
    hasher.update(lo);
    hasher.update(hi);
    SessionKey(*hasher.finalize().as_bytes())
}

/// Generate a fresh 32-byte handshake secret.
pub fn generate_secret() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a fresh 16-byte handshake nonce.
pub fn generate_nonce() -> [u8; 16] {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_key_agreement() {
        let alice = X25519StaticSecret::generate();
        let bob = X25519StaticSecret::generate();

        let a = alice.diffie_hellman(&bob.public_key());
        let b = bob.diffie_hellman(&alice.public_key());
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_ephemeral_key_agreement() {
        let bob = X25519StaticSecret::generate();
        let eph = EphemeralKeyPair::generate();
        let eph_public = eph.public_key();

        let a = eph.diffie_hellman(&bob.public_key());
        let b = bob.diffie_hellman(&eph_public);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_aead_roundtrip_and_tamper() {
        let key = AeadKey::from_bytes([0x42; 32]);
        let nonce = EncryptionNonce::generate();

        let mut ciphertext = key.encrypt(b"hello", &nonce).unwrap();
        assert_eq!(key.decrypt(&ciphertext, &nonce).unwrap(), b"hello");

        ciphertext[0] ^= 0x01;
        assert!(matches!(
            key.decrypt(&ciphertext, &nonce),
            Err(SessionError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_session_key_nonce_varies_per_message() {
        let key = SessionKey::from_bytes([0x07; 32]);
        let m1 = key.seal(b"same plaintext").unwrap();
        let m2 = key.seal(b"same plaintext").unwrap();

        assert_ne!(m1.nonce, m2.nonce);
        assert_ne!(m1.ciphertext, m2.ciphertext);
        assert_eq!(key.open(&m1).unwrap(), key.open(&m2).unwrap());
    }

    #[test]
    fn test_derive_session_key_order_independent() {
        let low = ActorId::from_bytes([0x01; 32]);
        let high = ActorId::from_bytes([0xFF; 32]);
        let sa = [0xAA; 32];
        let sb = [0xBB; 32];

        let k1 = derive_session_key((&low, &sa), (&high, &sb));
        let k2 = derive_session_key((&high, &sb), (&low, &sa));
        assert_eq!(k1, k2);

        // Swapping which actor owns which secret changes the key.
        let k3 = derive_session_key((&low, &sb), (&high, &sa));
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_envelope_key_domain_separated() {
        let shared = SharedKey([0x42; 32]);
        let envelope_key = shared.derive_envelope_key();
        assert_ne!(envelope_key.as_bytes(), shared.as_bytes());
    }
}
