//! Property-based tests spanning the envelope, encryptor and PSK-ratchet
//! modules — the quantified invariants from the project's testable
//! properties, rather than the fixed example-based tests that live
//! alongside each module.

use proptest::prelude::*;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::encryptor::{decrypt, encrypt};
use crate::envelope::{self, StandardEnvelope, V3_MAX_PLAINTEXT};
use crate::payload::MessagePayload;
use crate::psk_ratchet;

fn arb_static_secret() -> impl Strategy<Value = StaticSecret> {
    any::<[u8; 32]>().prop_map(StaticSecret::from)
}

proptest! {
    #[test]
    fn v3_round_trips_for_recipient_and_sender(
        sender_seed in any::<[u8; 32]>(),
        recipient_seed in any::<[u8; 32]>(),
        text in "[ -~]{0,200}",
    ) {
        let sender_priv = StaticSecret::from(sender_seed);
        let recipient_priv = StaticSecret::from(recipient_seed);
        let recipient_pub = X25519PublicKey::from(&recipient_priv);

        let payload = MessagePayload::text(text);
        let env = encrypt(&payload.encode(), &sender_priv, &recipient_pub).unwrap();

        prop_assert_eq!(decrypt(&env, &recipient_priv).unwrap().unwrap(), payload.clone());
        prop_assert_eq!(decrypt(&env, &sender_priv).unwrap().unwrap(), payload);
    }

    #[test]
    fn envelope_encode_decode_is_the_identity(
        sender_static in any::<[u8; 32]>(),
        eph_pub in any::<[u8; 32]>(),
        nonce in any::<[u8; 12]>(),
        enc_sender_key in any::<[u8; 48]>(),
        ciphertext in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let env = StandardEnvelope::V3 {
            sender_static,
            eph_pub,
            nonce,
            enc_sender_key,
            ciphertext,
        };
        let encoded = env.encode();
        let decoded = envelope::decode(&encoded).unwrap();
        prop_assert_eq!(decoded, envelope::DecodedEnvelope::Standard(env));
    }

    #[test]
    fn flipping_any_ciphertext_bit_breaks_decryption(
        sender_seed in any::<[u8; 32]>(),
        recipient_seed in any::<[u8; 32]>(),
        flip_byte_index in 0usize..16,
        flip_bit in 0u8..8,
    ) {
        let sender_priv = StaticSecret::from(sender_seed);
        let recipient_priv = StaticSecret::from(recipient_seed);
        let recipient_pub = X25519PublicKey::from(&recipient_priv);

        let env = encrypt(b"a message long enough to flip bits in", &sender_priv, &recipient_pub).unwrap();
        let StandardEnvelope::V3 { sender_static, eph_pub, nonce, enc_sender_key, mut ciphertext } = env else {
            unreachable!()
        };
        ciphertext[flip_byte_index] ^= 1 << flip_bit;
        let mutated = StandardEnvelope::V3 { sender_static, eph_pub, nonce, enc_sender_key, ciphertext };

        prop_assert!(decrypt(&mutated, &recipient_priv).is_err());
    }

    #[test]
    fn current_psk_is_deterministic_for_any_initial_secret_and_counter(
        initial_psk in any::<[u8; 32]>(),
        counter in any::<u32>(),
    ) {
        prop_assert_eq!(
            psk_ratchet::current_psk(&initial_psk, counter),
            psk_ratchet::current_psk(&initial_psk, counter)
        );
    }

    #[test]
    fn successive_psk_counters_never_collide(
        initial_psk in any::<[u8; 32]>(),
        counter in 0u32..(u32::MAX - 1),
    ) {
        prop_assert_ne!(
            psk_ratchet::current_psk(&initial_psk, counter),
            psk_ratchet::current_psk(&initial_psk, counter + 1)
        );
    }
}

#[test]
fn a_thousand_encryptions_never_repeat_ephemeral_key_or_nonce() {
    let sender_priv = StaticSecret::from([0x11; 32]);
    let recipient_priv = StaticSecret::from([0x22; 32]);
    let recipient_pub = X25519PublicKey::from(&recipient_priv);

    let mut seen_eph_pubs = std::collections::HashSet::new();
    let mut seen_nonces = std::collections::HashSet::new();

    for _ in 0..1000 {
        let env = encrypt(b"hi", &sender_priv, &recipient_pub).unwrap();
        let StandardEnvelope::V3 { eph_pub, nonce, .. } = env else {
            unreachable!()
        };
        assert!(seen_eph_pubs.insert(eph_pub), "ephemeral public key repeated");
        assert!(seen_nonces.insert(nonce), "nonce repeated");
    }
}

#[test]
fn oversized_plaintext_is_exactly_at_the_boundary() {
    let sender_priv = StaticSecret::from([0x33; 32]);
    let recipient_priv = StaticSecret::from([0x44; 32]);
    let recipient_pub = X25519PublicKey::from(&recipient_priv);

    let max = vec![0u8; V3_MAX_PLAINTEXT];
    assert!(encrypt(&max, &sender_priv, &recipient_pub).is_ok());

    let over = vec![0u8; V3_MAX_PLAINTEXT + 1];
    assert!(encrypt(&over, &sender_priv, &recipient_pub).is_err());
}
