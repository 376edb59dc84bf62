//! Proptest generators for property-based testing.

use proptest::prelude::*;

use trustmesh_core::{ActorId, AuthContent, Keypair, PayloadId, PayloadKind, CONTENT_NONCE_LEN};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random ActorId.
pub fn actor_id() -> impl Strategy<Value = ActorId> {
    any::<[u8; 32]>().prop_map(ActorId::from_bytes)
}

/// Generate a random PayloadId.
pub fn payload_id() -> impl Strategy<Value = PayloadId> {
    any::<[u8; 32]>().prop_map(PayloadId::from_bytes)
}

/// Generate a PayloadKind.
pub fn payload_kind() -> impl Strategy<Value = PayloadKind> {
    prop_oneof![
        Just(PayloadKind::GatewayAuth),
        Just(PayloadKind::DeviceAuth),
        Just(PayloadKind::Access),
    ]
}

/// Generate an attribute key or value.
pub fn attribute_text() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(String::from)
}

/// Generate an attribute list of up to `max` entries.
pub fn attributes(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((attribute_text(), attribute_text()), 0..=max)
}

/// Generate a content nonce.
pub fn content_nonce() -> impl Strategy<Value = [u8; CONTENT_NONCE_LEN]> {
    any::<[u8; CONTENT_NONCE_LEN]>()
}

/// Generate a full AuthContent.
pub fn auth_content() -> impl Strategy<Value = AuthContent> {
    (
        payload_kind(),
        actor_id(),
        actor_id(),
        attributes(4),
        content_nonce(),
    )
        .prop_map(|(kind, target, approver, attrs, nonce)| {
            AuthContent::with_nonce(kind, target, approver, attrs, nonce)
        })
}

/// Generate a reasonable timestamp (Unix ms).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}
