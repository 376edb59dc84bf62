//! Public-key sealed envelopes.
//!
//! A [`SealedEnvelope`] carries a message encrypted to a recipient's X25519
//! public key: an ephemeral key agreement, a Blake3-derived AEAD key, and a
//! fresh random nonce per seal. Only the holder of the matching static
//! secret can open it.

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};
use crate::error::{Result, SessionError};

/// A message sealed to a recipient's X25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    /// The sender's one-time ephemeral public key.
    pub ephemeral_pk: X25519PublicKey,

    /// AEAD nonce, unique per seal.
    pub nonce: EncryptionNonce,

    /// Ciphertext with authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Seal plaintext to a recipient.
    pub fn seal(recipient: &X25519PublicKey, plaintext: &[u8]) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_pk = ephemeral.public_key();
        let key = ephemeral.diffie_hellman(recipient).derive_envelope_key();

        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;

        Ok(Self {
            ephemeral_pk,
            nonce,
            ciphertext,
        })
    }

    /// Open with the recipient's static secret.
    ///
    /// Fails with [`SessionError::DecryptionFailure`] on a wrong key or any
    /// tampering.
    pub fn open(&self, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        let key = recipient_secret
            .diffie_hellman(&self.ephemeral_pk)
            .derive_envelope_key();
        key.decrypt(&self.ciphertext, &self.nonce)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let recipient = X25519StaticSecret::generate();
        let envelope = SealedEnvelope::seal(&recipient.public_key(), b"for your eyes").unwrap();

        assert_eq!(envelope.open(&recipient).unwrap(), b"for your eyes");
    }

    #[test]
    fn test_wrong_recipient_fails() {
        let recipient = X25519StaticSecret::generate();
        let stranger = X25519StaticSecret::generate();

        let envelope = SealedEnvelope::seal(&recipient.public_key(), b"secret").unwrap();
        assert!(matches!(
            envelope.open(&stranger),
            Err(SessionError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let recipient = X25519StaticSecret::generate();
        let mut envelope = SealedEnvelope::seal(&recipient.public_key(), b"secret").unwrap();
        envelope.ciphertext[0] ^= 0x01;

        assert!(envelope.open(&recipient).is_err());
    }

    #[test]
    fn test_each_seal_is_unique() {
        let recipient = X25519StaticSecret::generate();
        let e1 = SealedEnvelope::seal(&recipient.public_key(), b"same").unwrap();
        let e2 = SealedEnvelope::seal(&recipient.public_key(), b"same").unwrap();

        assert_ne!(e1.ephemeral_pk, e2.ephemeral_pk);
        assert_ne!(e1.ciphertext, e2.ciphertext);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let recipient = X25519StaticSecret::generate();
        let envelope = SealedEnvelope::seal(&recipient.public_key(), b"wire").unwrap();

        let recovered = SealedEnvelope::from_bytes(&envelope.to_bytes()).unwrap();
        assert_eq!(envelope, recovered);
        assert_eq!(recovered.open(&recipient).unwrap(), b"wire");
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(matches!(
            SealedEnvelope::from_bytes(&[0xFF, 0x00, 0x13]),
            Err(SessionError::Malformed(_))
        ));
    }
}
