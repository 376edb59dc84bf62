//! # Trustmesh Session
//!
//! The confidential transport layer: public-key sealed envelopes, the
//! symmetric session cipher, and the nonce-based handshake that turns an
//! approved Access payload into a shared session key.
//!
//! ## Design
//!
//! - **Envelopes** ([`SealedEnvelope`]): ephemeral X25519 agreement, Blake3
//!   `derive_key` domain separation, ChaCha20-Poly1305 with a fresh random
//!   nonce per seal.
//! - **Handshake** ([`HandshakeInitiator`] / [`HandshakeResponder`]): both
//!   parties contribute a 32-byte secret; the responder authorizes against
//!   the ledger before answering; the initiator rejects any reply whose
//!   echoed nonce differs by even one byte.
//! - **Session keys** ([`SessionKey`]): derived from both secrets in a
//!   fixed actor-id order so either side computes the same key; every
//!   session message carries its own nonce.

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod handshake;

pub use crypto::{
    derive_session_key, generate_nonce, generate_secret, AeadKey, EncryptionNonce,
    EphemeralKeyPair, SessionCiphertext, SessionKey, SharedKey, X25519PublicKey,
    X25519StaticSecret,
};
pub use envelope::SealedEnvelope;
pub use error::{Result, SessionError};
pub use handshake::{
    ChallengeBody, HandshakeInitiator, HandshakeResponder, HandshakeStatus, ReplyBody,
    SignedMessage,
};
