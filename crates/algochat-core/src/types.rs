//! Small shared types used across the conversation model, caches, queue,
//! and indexer: the account address, a direction tag, and the diagnostic
//! report a bulk scan hands back to its caller.

use std::fmt;

/// An account's 32-byte Ed25519 verifying key, also its identity on the
/// ledger. Distinct from a [`crate::keys::EncryptionKeys`] public half,
/// which is derived from the signing identity but is a different curve
/// entirely.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }
}

/// Which side of a conversation a message travelled: `Sent` when this
/// account was the transaction's sender, `Received` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

/// Diagnostic counters returned alongside a scan's messages, so the
/// "corrupt notes vanish silently" behavior the spec calls for is still
/// observable by a caller instead of only reaching the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub messages_found: usize,
    pub skipped_corrupt: usize,
    pub skipped_replay: usize,
    pub skipped_not_psk_contact: usize,
    pub skipped_key_publish: usize,
}

impl ScanReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped_corrupt
            + self.skipped_replay
            + self.skipped_not_psk_contact
            + self.skipped_key_publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trips_through_hex_display() {
        let addr = Address([0xAB; 32]);
        assert_eq!(addr.to_string(), hex::encode([0xAB; 32]));
    }

    #[test]
    fn scan_report_totals_every_skip_reason() {
        let report = ScanReport {
            messages_found: 3,
            skipped_corrupt: 1,
            skipped_replay: 2,
            skipped_not_psk_contact: 1,
            skipped_key_publish: 1,
        };
        assert_eq!(report.total_skipped(), 5);
    }
}
