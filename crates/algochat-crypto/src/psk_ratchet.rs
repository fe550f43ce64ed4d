//! Pure PSK key schedule: a two-level HKDF tree over a shared secret
//! established out-of-band (see [`crate::psk_uri`]), giving every
//! message its own symmetric key without requiring either party to be
//! online. Combined with the per-message ECDH in `encryptor`, this
//! gives PSK-ratchet envelopes hybrid classical+pre-shared-secret
//! defense: an attacker needs to break both X25519 and the PSK to read
//! a message.
//!
//! A ratchet counter `c` factors into a session index `c / 100` and an
//! in-session position `c % 100`. Sessions are independent HKDF
//! expansions of `initialPSK`; positions are independent expansions of
//! their session key. Nothing here is stateful — advancing the counter
//! and detecting replay is [`crate::psk_state`]'s job.

use hkdf::Hkdf;
use sha2::Sha256;

/// Messages per ratchet session before the session index advances.
pub const SESSION_SIZE: u32 = 100;

const SALT_SESSION: &[u8] = b"AlgoChat-PSK-Session";
const SALT_POSITION: &[u8] = b"AlgoChat-PSK-Position";

pub const INFO_PSK_MESSAGE: &[u8] = b"AlgoChatV1-PSK";
pub const INFO_PSK_SENDER_KEY: &[u8] = b"AlgoChatV1-PSK-SenderKey";

fn hkdf_expand32(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = [0u8; 32];
    hk.expand(info, &mut out)
        .expect("32-byte output is within HKDF-SHA256's max expand length");
    out
}

/// `sessionPSK(i) = HKDF(initialPSK, salt="AlgoChat-PSK-Session", info=u32_be(i), L=32)`
pub fn session_psk(initial_psk: &[u8; 32], session: u32) -> [u8; 32] {
    hkdf_expand32(initial_psk, SALT_SESSION, &session.to_be_bytes())
}

/// `positionPSK(s, p) = HKDF(s, salt="AlgoChat-PSK-Position", info=u32_be(p), L=32)`
pub fn position_psk(session_key: &[u8; 32], position: u32) -> [u8; 32] {
    hkdf_expand32(session_key, SALT_POSITION, &position.to_be_bytes())
}

/// `currentPSK(c) = positionPSK(sessionPSK(c / 100), c mod 100)`
pub fn current_psk(initial_psk: &[u8; 32], counter: u32) -> [u8; 32] {
    let session = session_psk(initial_psk, counter / SESSION_SIZE);
    position_psk(&session, counter % SESSION_SIZE)
}

/// Hybrid message key: `HKDF(IKM = ecdh_shared ‖ current_psk, salt = eph_pub,
/// info = "AlgoChatV1-PSK" ‖ sender_static ‖ recipient_static, L=32)`.
pub fn derive_message_key(
    ecdh_shared: &[u8; 32],
    current_psk: &[u8; 32],
    eph_pub: &[u8; 32],
    sender_static: &[u8; 32],
    recipient_static: &[u8; 32],
) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(64);
    ikm.extend_from_slice(ecdh_shared);
    ikm.extend_from_slice(current_psk);
    let mut info = Vec::with_capacity(INFO_PSK_MESSAGE.len() + 64);
    info.extend_from_slice(INFO_PSK_MESSAGE);
    info.extend_from_slice(sender_static);
    info.extend_from_slice(recipient_static);
    hkdf_expand32(&ikm, eph_pub, &info)
}

/// Hybrid sender key, used to seal the message key for bidirectional
/// sender-side decryption: `HKDF(IKM = ecdh_shared ‖ current_psk,
/// salt = eph_pub, info = "AlgoChatV1-PSK-SenderKey" ‖ sender_static, L=32)`.
pub fn derive_sender_key(
    ecdh_shared: &[u8; 32],
    current_psk: &[u8; 32],
    eph_pub: &[u8; 32],
    sender_static: &[u8; 32],
) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(64);
    ikm.extend_from_slice(ecdh_shared);
    ikm.extend_from_slice(current_psk);
    let mut info = Vec::with_capacity(INFO_PSK_SENDER_KEY.len() + 32);
    info.extend_from_slice(INFO_PSK_SENDER_KEY);
    info.extend_from_slice(sender_static);
    hkdf_expand32(&ikm, eph_pub, &info)
}
