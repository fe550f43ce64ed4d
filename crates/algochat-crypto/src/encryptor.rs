//! Message encryption and decryption over the standard-protocol envelope
//! formats.
//!
//! v3 is the only format this module encodes. Every v3 message seals a
//! copy of its own message key under a second key derived from
//! `ECDH(ephemeral, senderStatic)`, so the sender can read their own
//! outbound messages without retaining the ephemeral secret — `decrypt`
//! tries the recipient derivation first and falls back to the sender
//! derivation, returning identical output either way. v1 and v2 are
//! decrypt-only: this crate never emits them, but still needs to read
//! messages from peers running older clients.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::envelope::{PskEnvelope, StandardEnvelope, PSK_MAX_PLAINTEXT, V3_MAX_PLAINTEXT};
use crate::payload::{self, DecodedPayload, MessagePayload, PayloadError};
use crate::psk_ratchet;

const INFO_V1: &[u8] = b"AlgoChat-v1-message";
const SALT_V1: &[u8] = b"AlgoChat-v1-salt";

const INFO_V2: &[u8] = b"AlgoChat-v2-message";

const INFO_V3_MESSAGE: &[u8] = b"AlgoChatV2";
const INFO_V3_SENDER_KEY: &[u8] = b"AlgoChatV2-senderkey";

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("plaintext of {got} bytes exceeds the {max}-byte limit for this envelope version")]
    PlaintextTooLarge { got: usize, max: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("ciphertext failed authentication")]
    DecryptionFailed,
    #[error("decrypted plaintext is malformed: {0}")]
    Payload(#[from] PayloadError),
}

fn hkdf_expand32(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .expect("32-byte output is within HKDF-SHA256's max expand length");
    out
}

fn seal(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .expect("chacha20poly1305 encryption over a bounded plaintext cannot fail")
}

fn open(key: &[u8; 32], nonce: &[u8; 12], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DecryptError::DecryptionFailed)
}

/// Encrypt a plaintext payload into a v3 envelope.
///
/// `sender_priv` is the sender's long-term static X25519 key; its public
/// half is re-derived from it rather than taken as a separate argument,
/// so the two can never be mismatched by a caller. A fresh ephemeral
/// keypair is generated per call and discarded once the envelope is
/// built — `StaticSecret` zeroizes its scalar on drop.
pub fn encrypt(
    plaintext: &[u8],
    sender_priv: &StaticSecret,
    recipient_pub: &X25519PublicKey,
) -> Result<StandardEnvelope, EncryptError> {
    if plaintext.len() > V3_MAX_PLAINTEXT {
        return Err(EncryptError::PlaintextTooLarge {
            got: plaintext.len(),
            max: V3_MAX_PLAINTEXT,
        });
    }

    let sender_pub = X25519PublicKey::from(sender_priv);
    let eph_priv = StaticSecret::random_from_rng(OsRng);
    let eph_pub = X25519PublicKey::from(&eph_priv);

    let mut nonce = [0u8; 12];
    rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce);

    let shared_with_recipient = eph_priv.diffie_hellman(recipient_pub);
    let mut message_info = Vec::with_capacity(INFO_V3_MESSAGE.len() + 64);
    message_info.extend_from_slice(INFO_V3_MESSAGE);
    message_info.extend_from_slice(sender_pub.as_bytes());
    message_info.extend_from_slice(recipient_pub.as_bytes());
    let message_key = hkdf_expand32(shared_with_recipient.as_bytes(), eph_pub.as_bytes(), &message_info);
    let ciphertext = seal(&message_key, &nonce, plaintext);

    let shared_with_sender = eph_priv.diffie_hellman(&sender_pub);
    let mut sender_key_info = Vec::with_capacity(INFO_V3_SENDER_KEY.len() + 32);
    sender_key_info.extend_from_slice(INFO_V3_SENDER_KEY);
    sender_key_info.extend_from_slice(sender_pub.as_bytes());
    let sender_key = hkdf_expand32(shared_with_sender.as_bytes(), eph_pub.as_bytes(), &sender_key_info);
    let sealed_message_key = seal(&sender_key, &[0u8; 12], &message_key);
    let enc_sender_key: [u8; 48] = sealed_message_key
        .try_into()
        .expect("sealing a 32-byte key with a 16-byte AEAD tag always yields 48 bytes");

    Ok(StandardEnvelope::V3 {
        sender_static: *sender_pub.as_bytes(),
        eph_pub: *eph_pub.as_bytes(),
        nonce,
        enc_sender_key,
        ciphertext,
    })
}

/// Decrypt an envelope addressed to, or previously sent by, `my_priv`.
///
/// Returns `Ok(None)` for the key-publish marker — a valid decryption
/// that carries no user-visible message — and `Ok(Some(..))` for an
/// ordinary or reply message. Tries the recipient-side key schedule
/// first; for v3, falls back to the sender-side schedule so a sender
/// can read their own sent messages. Both paths yield identical output
/// on success, so a caller cannot distinguish which one matched.
pub fn decrypt(
    envelope: &StandardEnvelope,
    my_priv: &StaticSecret,
) -> Result<Option<MessagePayload>, DecryptError> {
    let plaintext = match envelope {
        StandardEnvelope::V1 {
            sender_static,
            nonce,
            ciphertext,
        } => {
            let shared = my_priv.diffie_hellman(&X25519PublicKey::from(*sender_static));
            let key = hkdf_expand32(shared.as_bytes(), SALT_V1, INFO_V1);
            open(&key, nonce, ciphertext)?
        }
        StandardEnvelope::V2 {
            sender_static,
            eph_pub,
            nonce,
            ciphertext,
        } => {
            let shared = my_priv.diffie_hellman(&X25519PublicKey::from(*eph_pub));
            let my_pub = X25519PublicKey::from(my_priv);
            let mut info = Vec::with_capacity(INFO_V2.len() + 64);
            info.extend_from_slice(INFO_V2);
            info.extend_from_slice(sender_static);
            info.extend_from_slice(my_pub.as_bytes());
            let key = hkdf_expand32(shared.as_bytes(), eph_pub, &info);
            open(&key, nonce, ciphertext)?
        }
        StandardEnvelope::V3 {
            sender_static,
            eph_pub,
            nonce,
            enc_sender_key,
            ciphertext,
        } => decrypt_v3(my_priv, sender_static, eph_pub, nonce, enc_sender_key, ciphertext)?,
    };

    match payload::decode(&plaintext)? {
        DecodedPayload::KeyPublish => Ok(None),
        DecodedPayload::Message(m) => Ok(Some(m)),
    }
}

fn decrypt_v3(
    my_priv: &StaticSecret,
    sender_static: &[u8; 32],
    eph_pub: &[u8; 32],
    nonce: &[u8; 12],
    enc_sender_key: &[u8; 48],
    ciphertext: &[u8],
) -> Result<Vec<u8>, DecryptError> {
    let eph_pub_key = X25519PublicKey::from(*eph_pub);
    let shared = my_priv.diffie_hellman(&eph_pub_key);
    let my_pub = X25519PublicKey::from(my_priv);

    // Recipient path: myPriv is the addressee, so the message key was
    // sealed for the recipient directly.
    let mut recipient_info = Vec::with_capacity(INFO_V3_MESSAGE.len() + 64);
    recipient_info.extend_from_slice(INFO_V3_MESSAGE);
    recipient_info.extend_from_slice(sender_static);
    recipient_info.extend_from_slice(my_pub.as_bytes());
    let recipient_key = hkdf_expand32(shared.as_bytes(), eph_pub, &recipient_info);
    if let Ok(plaintext) = open(&recipient_key, nonce, ciphertext) {
        return Ok(plaintext);
    }

    // Sender path: myPriv is the original sender, so `shared` here is
    // ECDH(senderPriv, ephPub) — the same value the encryptor used to
    // seal the message key, by ECDH symmetry. Only succeeds when
    // `my_pub == sender_static`.
    let mut sender_key_info = Vec::with_capacity(INFO_V3_SENDER_KEY.len() + 32);
    sender_key_info.extend_from_slice(INFO_V3_SENDER_KEY);
    sender_key_info.extend_from_slice(my_pub.as_bytes());
    let sender_key = hkdf_expand32(shared.as_bytes(), eph_pub, &sender_key_info);
    let message_key_bytes = open(&sender_key, &[0u8; 12], enc_sender_key)?;
    let message_key: [u8; 32] = message_key_bytes
        .try_into()
        .map_err(|_| DecryptError::DecryptionFailed)?;
    open(&message_key, nonce, ciphertext)
}

/// Encrypt a plaintext payload into a PSK-ratchet envelope at the given
/// counter. The caller is responsible for obtaining `counter` from
/// [`crate::psk_state::PskState::advance_send_counter`] under its
/// serializing boundary — this function has no notion of ratchet state,
/// only of a single position in it.
pub fn encrypt_psk(
    plaintext: &[u8],
    sender_priv: &StaticSecret,
    recipient_pub: &X25519PublicKey,
    initial_psk: &[u8; 32],
    counter: u32,
) -> Result<PskEnvelope, EncryptError> {
    if plaintext.len() > PSK_MAX_PLAINTEXT {
        return Err(EncryptError::PlaintextTooLarge {
            got: plaintext.len(),
            max: PSK_MAX_PLAINTEXT,
        });
    }

    let sender_pub = X25519PublicKey::from(sender_priv);
    let eph_priv = StaticSecret::random_from_rng(OsRng);
    let eph_pub = X25519PublicKey::from(&eph_priv);
    let current_psk = psk_ratchet::current_psk(initial_psk, counter);

    let mut nonce = [0u8; 12];
    rand_core::RngCore::fill_bytes(&mut OsRng, &mut nonce);

    let shared_with_recipient = eph_priv.diffie_hellman(recipient_pub);
    let message_key = psk_ratchet::derive_message_key(
        shared_with_recipient.as_bytes(),
        &current_psk,
        eph_pub.as_bytes(),
        sender_pub.as_bytes(),
        recipient_pub.as_bytes(),
    );
    let ciphertext = seal(&message_key, &nonce, plaintext);

    let shared_with_sender = eph_priv.diffie_hellman(&sender_pub);
    let sender_key = psk_ratchet::derive_sender_key(
        shared_with_sender.as_bytes(),
        &current_psk,
        eph_pub.as_bytes(),
        sender_pub.as_bytes(),
    );
    let sealed_message_key = seal(&sender_key, &[0u8; 12], &message_key);
    let enc_sender_key: [u8; 48] = sealed_message_key
        .try_into()
        .expect("sealing a 32-byte key with a 16-byte AEAD tag always yields 48 bytes");

    Ok(PskEnvelope {
        counter,
        sender_static: *sender_pub.as_bytes(),
        eph_pub: *eph_pub.as_bytes(),
        nonce,
        enc_sender_key,
        ciphertext,
    })
}

/// Decrypt a PSK-ratchet envelope. Derives `currentPSK(envelope.counter)`
/// from `initial_psk` and tries the recipient path, then the sender
/// path, exactly as [`decrypt`] does for v3. The caller must validate
/// `envelope.counter` against the peer's [`crate::psk_state::PskState`]
/// before or after calling this — replay detection is not this
/// function's concern.
pub fn decrypt_psk(
    envelope: &PskEnvelope,
    my_priv: &StaticSecret,
    initial_psk: &[u8; 32],
) -> Result<Option<MessagePayload>, DecryptError> {
    let current_psk = psk_ratchet::current_psk(initial_psk, envelope.counter);
    let eph_pub_key = X25519PublicKey::from(envelope.eph_pub);
    let shared = my_priv.diffie_hellman(&eph_pub_key);
    let my_pub = X25519PublicKey::from(my_priv);

    let recipient_key = psk_ratchet::derive_message_key(
        shared.as_bytes(),
        &current_psk,
        &envelope.eph_pub,
        &envelope.sender_static,
        my_pub.as_bytes(),
    );
    let plaintext = if let Ok(plaintext) = open(&recipient_key, &envelope.nonce, &envelope.ciphertext) {
        plaintext
    } else {
        let sender_key = psk_ratchet::derive_sender_key(
            shared.as_bytes(),
            &current_psk,
            &envelope.eph_pub,
            my_pub.as_bytes(),
        );
        let message_key_bytes = open(&sender_key, &[0u8; 12], &envelope.enc_sender_key)?;
        let message_key: [u8; 32] = message_key_bytes
            .try_into()
            .map_err(|_| DecryptError::DecryptionFailed)?;
        open(&message_key, &envelope.nonce, &envelope.ciphertext)?
    };

    match payload::decode(&plaintext)? {
        DecodedPayload::KeyPublish => Ok(None),
        DecodedPayload::Message(m) => Ok(Some(m)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ReplyTo;

    fn keypair(seed: u8) -> (StaticSecret, X25519PublicKey) {
        let priv_key = StaticSecret::from([seed; 32]);
        let pub_key = X25519PublicKey::from(&priv_key);
        (priv_key, pub_key)
    }

    #[test]
    fn recipient_can_decrypt_plain_text() {
        let (alice_priv, _alice_pub) = keypair(0x11);
        let (bob_priv, bob_pub) = keypair(0x22);

        let payload = MessagePayload::text("hey bob");
        let env = encrypt(&payload.encode(), &alice_priv, &bob_pub).unwrap();
        let decrypted = decrypt(&env, &bob_priv).unwrap().unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn sender_can_decrypt_their_own_message() {
        let (alice_priv, _alice_pub) = keypair(0x33);
        let (_bob_priv, bob_pub) = keypair(0x44);

        let payload = MessagePayload::with_reply(
            "see above",
            ReplyTo {
                txid: "TX1".into(),
                preview: "original message".into(),
            },
        );
        let env = encrypt(&payload.encode(), &alice_priv, &bob_pub).unwrap();
        let decrypted = decrypt(&env, &alice_priv).unwrap().unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn a_third_party_cannot_decrypt() {
        let (alice_priv, _) = keypair(0x55);
        let (_bob_priv, bob_pub) = keypair(0x66);
        let (eve_priv, _) = keypair(0x77);

        let env = encrypt(b"secret", &alice_priv, &bob_pub).unwrap();
        assert!(matches!(decrypt(&env, &eve_priv), Err(DecryptError::DecryptionFailed)));
    }

    #[test]
    fn key_publish_marker_decrypts_to_none() {
        let (alice_priv, _) = keypair(0x88);
        let (bob_priv, bob_pub) = keypair(0x99);

        let env = encrypt(&payload::KEY_PUBLISH_MARKER, &alice_priv, &bob_pub).unwrap();
        assert_eq!(decrypt(&env, &bob_priv).unwrap(), None);
    }

    #[test]
    fn oversized_plaintext_is_rejected() {
        let (alice_priv, _) = keypair(0xAA);
        let (_, bob_pub) = keypair(0xBB);
        let oversized = vec![0u8; V3_MAX_PLAINTEXT + 1];
        assert!(matches!(
            encrypt(&oversized, &alice_priv, &bob_pub),
            Err(EncryptError::PlaintextTooLarge { .. })
        ));
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce_and_ephemeral_key() {
        let (alice_priv, _) = keypair(0xCC);
        let (_, bob_pub) = keypair(0xDD);
        let a = encrypt(b"hi", &alice_priv, &bob_pub).unwrap();
        let b = encrypt(b"hi", &alice_priv, &bob_pub).unwrap();
        match (a, b) {
            (StandardEnvelope::V3 { eph_pub: e1, nonce: n1, .. }, StandardEnvelope::V3 { eph_pub: e2, nonce: n2, .. }) => {
                assert_ne!(e1, e2);
                assert_ne!(n1, n2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn v1_decrypt_matches_a_hand_built_envelope() {
        let (alice_priv, alice_pub) = keypair(0xE0);
        let (bob_priv, _bob_pub) = keypair(0xE1);

        let shared = bob_priv.diffie_hellman(&alice_pub);
        let key = hkdf_expand32(shared.as_bytes(), SALT_V1, INFO_V1);
        let nonce = [0x07u8; 12];
        let ciphertext = seal(&key, &nonce, b"legacy message");

        let env = StandardEnvelope::V1 {
            sender_static: *alice_pub.as_bytes(),
            nonce,
            ciphertext,
        };
        let decrypted = decrypt(&env, &bob_priv).unwrap().unwrap();
        assert_eq!(decrypted, MessagePayload::text("legacy message"));
    }

    #[test]
    fn v2_decrypt_matches_a_hand_built_envelope() {
        let (alice_priv, alice_pub) = keypair(0xE2);
        let (bob_priv, bob_pub) = keypair(0xE3);
        let eph_priv = StaticSecret::from([0xE4; 32]);
        let eph_pub = X25519PublicKey::from(&eph_priv);

        let shared = eph_priv.diffie_hellman(&bob_pub);
        let mut info = Vec::new();
        info.extend_from_slice(INFO_V2);
        info.extend_from_slice(alice_pub.as_bytes());
        info.extend_from_slice(bob_pub.as_bytes());
        let key = hkdf_expand32(shared.as_bytes(), eph_pub.as_bytes(), &info);
        let nonce = [0x09u8; 12];
        let ciphertext = seal(&key, &nonce, b"forward secret");
        let _ = alice_priv;

        let env = StandardEnvelope::V2 {
            sender_static: *alice_pub.as_bytes(),
            eph_pub: *eph_pub.as_bytes(),
            nonce,
            ciphertext,
        };
        let decrypted = decrypt(&env, &bob_priv).unwrap().unwrap();
        assert_eq!(decrypted, MessagePayload::text("forward secret"));
        assert!(env.uses_forward_secrecy());
    }

    #[test]
    fn psk_recipient_can_decrypt() {
        let (alice_priv, _) = keypair(0x30);
        let (bob_priv, bob_pub) = keypair(0x31);
        let initial_psk = [0xAA; 32];

        let env = encrypt_psk(b"quantum-defended hello", &alice_priv, &bob_pub, &initial_psk, 7).unwrap();
        assert_eq!(env.counter, 7);
        let decrypted = decrypt_psk(&env, &bob_priv, &initial_psk).unwrap().unwrap();
        assert_eq!(decrypted, MessagePayload::text("quantum-defended hello"));
    }

    #[test]
    fn psk_sender_can_decrypt_their_own_message() {
        let (alice_priv, _) = keypair(0x32);
        let (_bob_priv, bob_pub) = keypair(0x33);
        let initial_psk = [0xBB; 32];

        let env = encrypt_psk(b"to myself too", &alice_priv, &bob_pub, &initial_psk, 0).unwrap();
        let decrypted = decrypt_psk(&env, &alice_priv, &initial_psk).unwrap().unwrap();
        assert_eq!(decrypted, MessagePayload::text("to myself too"));
    }

    #[test]
    fn psk_wrong_initial_psk_fails_to_decrypt() {
        let (alice_priv, _) = keypair(0x34);
        let (bob_priv, bob_pub) = keypair(0x35);

        let env = encrypt_psk(b"hi", &alice_priv, &bob_pub, &[0xCC; 32], 0).unwrap();
        assert!(matches!(
            decrypt_psk(&env, &bob_priv, &[0xDD; 32]),
            Err(DecryptError::DecryptionFailed)
        ));
    }

    #[test]
    fn psk_different_counters_are_not_interchangeable() {
        let (alice_priv, _) = keypair(0x36);
        let (bob_priv, bob_pub) = keypair(0x37);
        let initial_psk = [0xEE; 32];

        let mut env = encrypt_psk(b"position zero", &alice_priv, &bob_pub, &initial_psk, 0).unwrap();
        env.counter = 1;
        assert!(matches!(
            decrypt_psk(&env, &bob_priv, &initial_psk),
            Err(DecryptError::DecryptionFailed)
        ));
    }

    #[test]
    fn psk_oversized_plaintext_is_rejected() {
        let (alice_priv, _) = keypair(0x38);
        let (_, bob_pub) = keypair(0x39);
        let oversized = vec![0u8; PSK_MAX_PLAINTEXT + 1];
        assert!(matches!(
            encrypt_psk(&oversized, &alice_priv, &bob_pub, &[0; 32], 0),
            Err(EncryptError::PlaintextTooLarge { .. })
        ));
    }
}
