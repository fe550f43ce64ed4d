//! Derives and carries an account's static X25519 encryption keypair.
//!
//! The keypair itself is never generated independently; it is derived
//! deterministically from the signing seed the
//! [`crate::collaborators::SigningAccount`] already holds, so it has
//! exactly that identity's lifetime and never needs its own backup.

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use algochat_crypto::key_derivation::{self, KeyDerivationError};

/// An account's static X25519 keypair, derived from its signing seed.
#[derive(Clone)]
pub struct EncryptionKeys {
    pub priv_key: StaticSecret,
    pub pub_key: X25519PublicKey,
}

impl EncryptionKeys {
    /// Derive the keypair for an account from its 32-byte Ed25519 signing
    /// seed. Deterministic: the same seed always yields the same keys.
    pub fn derive(signing_seed: &[u8; 32]) -> Self {
        let (priv_key, pub_key) = key_derivation::derive_x25519(signing_seed);
        Self { priv_key, pub_key }
    }

    pub fn encoded_pub(&self) -> [u8; 32] {
        key_derivation::encode_pub(&self.pub_key)
    }
}

pub fn decode_pub(bytes: &[u8]) -> Result<X25519PublicKey, KeyDerivationError> {
    key_derivation::decode_pub(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_keyed_by_seed() {
        let a = EncryptionKeys::derive(&[0x11; 32]);
        let b = EncryptionKeys::derive(&[0x11; 32]);
        let c = EncryptionKeys::derive(&[0x22; 32]);
        assert_eq!(a.encoded_pub(), b.encoded_pub());
        assert_ne!(a.encoded_pub(), c.encoded_pub());
    }
}
