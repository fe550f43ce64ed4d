//! Plain SHA-256, shared by [`crate::signature`]'s fingerprint and
//! anything else in this crate that needs a digest without pulling in
//! `sha2` directly.

use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // sha256("") per FIPS 180-4 test vectors.
        assert_eq!(
            hex(&sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    fn hex(b: &[u8; 32]) -> String {
        b.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

