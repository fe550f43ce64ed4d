//! Static X25519 key derivation from a signing identity's seed.
//!
//! An account's long-term encryption key is never generated and stored
//! independently: it is derived, deterministically and without any
//! side channel, from the signing seed the account already holds. This
//! means an account's AlgoChat key has exactly the lifetime of its
//! signing identity and never needs its own backup.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

/// Domain-separation salt for the static encryption key HKDF.
const STATIC_KEY_SALT: &[u8] = b"AlgoChat-v1-encryption";
/// Domain-separation info for the static encryption key HKDF.
const STATIC_KEY_INFO: &[u8] = b"x25519-key";

#[derive(Debug, thiserror::Error)]
pub enum KeyDerivationError {
    #[error("invalid public key: expected 32 bytes, got {0}")]
    InvalidPublicKey(usize),
}

/// Derive the static X25519 keypair for an account from its 32-byte
/// Ed25519 signing seed.
///
/// `K = HKDF-SHA256(IKM = seed, salt = "AlgoChat-v1-encryption",
/// info = "x25519-key", L = 32)`, interpreted as an X25519 private
/// scalar. Deterministic: the same seed always yields the same keypair.
pub fn derive_x25519(seed: &[u8; 32]) -> (StaticSecret, X25519PublicKey) {
    let hk = Hkdf::<Sha256>::new(Some(STATIC_KEY_SALT), seed);
    let mut scalar = [0u8; 32];
    hk.expand(STATIC_KEY_INFO, &mut scalar)
        .expect("32-byte output is within HKDF-SHA256's max expand length");

    let priv_key = StaticSecret::from(scalar);
    scalar.zeroize();
    let pub_key = X25519PublicKey::from(&priv_key);
    (priv_key, pub_key)
}

/// Encode an X25519 public key as its canonical 32-byte wire form.
pub fn encode_pub(key: &X25519PublicKey) -> [u8; 32] {
    *key.as_bytes()
}

/// Decode a 32-byte slice into an X25519 public key.
pub fn decode_pub(bytes: &[u8]) -> Result<X25519PublicKey, KeyDerivationError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| KeyDerivationError::InvalidPublicKey(bytes.len()))?;
    Ok(X25519PublicKey::from(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let seed = [0x11u8; 32];
        let (priv1, pub1) = derive_x25519(&seed);
        let (priv2, pub2) = derive_x25519(&seed);
        assert_eq!(priv1.to_bytes(), priv2.to_bytes());
        assert_eq!(pub1.as_bytes(), pub2.as_bytes());
    }

    #[test]
    fn different_seeds_give_different_keys() {
        let (_, a) = derive_x25519(&[0x11u8; 32]);
        let (_, b) = derive_x25519(&[0x22u8; 32]);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn encode_decode_round_trip() {
        let (_, pub_key) = derive_x25519(&[0x42u8; 32]);
        let encoded = encode_pub(&pub_key);
        let decoded = decode_pub(&encoded).unwrap();
        assert_eq!(decoded.as_bytes(), pub_key.as_bytes());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert!(decode_pub(&[0u8; 31]).is_err());
        assert!(decode_pub(&[0u8; 33]).is_err());
    }
}
