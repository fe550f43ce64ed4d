//! Error taxonomy for AlgoChat Core.
//!
//! Every fallible operation in this crate returns a `thiserror`-derived
//! enum scoped to its module; [`ChatError`] is the flat top-level surface
//! the `Chat` facade returns, composed from the lower-level enums via
//! `#[from]` so a caller matching on one type sees every failure mode
//! named in the project's error taxonomy without having to chase through
//! each collaborator's error type individually.

use thiserror::Error;

use algochat_crypto::encryptor::{DecryptError, EncryptError};
use algochat_crypto::envelope::EnvelopeError;
use algochat_crypto::key_derivation::KeyDerivationError;
use algochat_crypto::psk_state::PskStateError;
use algochat_crypto::psk_uri::PskUriError;

use crate::types::Address;

/// Input-validity errors: malformed wire data or values that were never
/// well-formed to begin with.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(#[from] KeyDerivationError),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] EnvelopeError),

    #[error("plaintext of {got} bytes exceeds the {max}-byte limit for this envelope version")]
    MessageTooLarge { got: usize, max: usize },

    #[error("invalid PSK exchange URI: {0}")]
    InvalidPskUri(#[from] PskUriError),
}

/// Replay and ordering errors surfaced while validating a PSK ratchet
/// counter or looking up a PSK contact.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay detected")]
    ReplayDetected,

    #[error("counter outside the accepted window")]
    CounterOutOfRange,

    #[error("address {0} is not a known PSK contact")]
    NotPskContact(Address),
}

impl From<PskStateError> for ReplayError {
    fn from(e: PskStateError) -> Self {
        match e {
            PskStateError::ReplayDetected(_) => ReplayError::ReplayDetected,
            PskStateError::CounterOutOfRange { .. } => ReplayError::CounterOutOfRange,
        }
    }
}

/// Discovery errors: looking up a peer's static encryption key.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no public key found for address {0}")]
    PublicKeyNotFound(Address),

    #[error("discovered key's signature does not verify against {0}")]
    SignatureMismatch(Address),
}

/// Ledger-facing errors, surfaced from the `LedgerClient`/`Indexer`
/// collaborators.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("no indexer configured")]
    IndexerNotConfigured,

    #[error("indexer request timed out")]
    IndexerTimeout,

    #[error("timed out waiting for confirmation")]
    ConfirmationTimeout,
}

/// Storage errors, surfaced from the durable queue backend or the
/// external key-storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found for address {0}")]
    KeyNotFound(Address),

    #[error("biometric authentication failed")]
    AuthFailed,

    #[error("a password is required to unlock this key")]
    PasswordRequired,

    #[error("storage decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("I/O error persisting queue state: {0}")]
    Io(String),

    #[error("failed to (de)serialize persisted state: {0}")]
    Serialization(String),
}

/// Top-level error surface returned by the `Chat` facade and the modules
/// it orchestrates.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptError),

    #[error(transparent)]
    Encryption(#[from] EncryptError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("operation was cancelled")]
    Cancelled,
}

impl From<KeyDerivationError> for ChatError {
    fn from(e: KeyDerivationError) -> Self {
        ChatError::Input(InputError::from(e))
    }
}

impl From<EnvelopeError> for ChatError {
    fn from(e: EnvelopeError) -> Self {
        ChatError::Input(InputError::from(e))
    }
}

impl From<PskStateError> for ChatError {
    fn from(e: PskStateError) -> Self {
        ChatError::Replay(ReplayError::from(e))
    }
}

impl From<PskUriError> for ChatError {
    fn from(e: PskUriError) -> Self {
        ChatError::Input(InputError::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_error_converts_from_psk_state_error() {
        let e = PskStateError::ReplayDetected(7);
        assert!(matches!(ReplayError::from(e), ReplayError::ReplayDetected));

        let e = PskStateError::CounterOutOfRange {
            counter: 500,
            peer_last_counter: 0,
        };
        assert!(matches!(ReplayError::from(e), ReplayError::CounterOutOfRange));
    }

    #[test]
    fn chat_error_display_is_human_readable() {
        let e: ChatError = LedgerError::IndexerNotConfigured.into();
        assert_eq!(e.to_string(), "no indexer configured");
    }
}
