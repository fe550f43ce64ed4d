//! Binds an account's static encryption key to its signing identity.
//!
//! Discovery (see `MessageIndexer` in `algochat-core`) learns a peer's
//! `StaticKey` from self-published transactions on the ledger; a
//! malicious indexer or relay could otherwise substitute its own key.
//! Signing `encPub` with the account's Ed25519 signing key, and
//! verifying against its public address, closes that gap: an encoder
//! cannot produce a valid signature over a key it doesn't control the
//! seed for.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::hash::sha256;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid verifying key")]
    InvalidVerifyingKey,
}

/// Sign an encryption public key with the owning account's Ed25519
/// signing key, binding the two together.
pub fn sign(enc_pub: &[u8; 32], signing_key: &SigningKey) -> [u8; 64] {
    let signature: Signature = signing_key.sign(enc_pub);
    signature.to_bytes()
}

/// Verify that `signature` over `enc_pub` was produced by the signing
/// key whose Ed25519 public key equals `address`. Returns `false` for
/// any malformed or non-matching input rather than propagating a
/// verification-library error — callers treat failure uniformly as
/// "do not trust this key."
pub fn verify(enc_pub: &[u8; 32], address: &[u8; 32], signature: &[u8; 64]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(address) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    verifying_key.verify(enc_pub, &sig).is_ok()
}

/// A human-readable fingerprint of an encryption key: the first 8 bytes
/// of SHA-256(encPub), uppercase hex, grouped in fours.
pub fn fingerprint(enc_pub: &[u8; 32]) -> String {
    let digest = sha256(enc_pub);
    let groups: Vec<String> = digest[..8]
        .chunks(2)
        .map(|chunk| format!("{:02X}{:02X}", chunk[0], chunk[1]))
        .collect();
    groups.join(" ")
}
