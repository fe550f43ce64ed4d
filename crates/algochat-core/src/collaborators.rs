//! Collaborator interfaces: everything this crate treats as external.
//!
//! The ledger client, the indexer, the signing identity, biometric/file
//! key storage, and CLI/localnet scaffolding are all out of scope for
//! this crate (see the project's purpose-and-scope notes) - they are
//! consumed here only through the abstract traits below. A concrete
//! application wires a real implementation of each in; tests wire in the
//! in-memory doubles from [`crate::harness`].

use async_trait::async_trait;

use crate::errors::{LedgerError, StorageError};
use crate::types::Address;

/// Opaque ledger transaction id (a hex-encoded hash on most account-based
/// ledgers; treated as an opaque string here).
pub type TxId = String;

/// A ledger round/block number.
pub type Round = u64;

/// One transaction as surfaced by an [`Indexer`] search - the fields
/// [`crate::indexer::MessageIndexer`] needs to classify and decrypt a
/// candidate chat message.
#[derive(Debug, Clone)]
pub struct IndexedTransaction {
    pub id: TxId,
    pub sender: Address,
    pub recipient: Address,
    pub round: Round,
    /// Seconds since epoch the round was confirmed (ledger block time).
    pub round_time: i64,
    pub note_bytes: Vec<u8>,
}

/// Result of an [`Indexer::search`] call: a page of transactions plus
/// whatever pagination state the caller should pass back in for the next
/// page (opaque to this crate).
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub transactions: Vec<IndexedTransaction>,
    pub next_token: Option<String>,
}

/// Broadcasts payments and waits for their confirmation. Signing and
/// address derivation are the `SigningAccount`'s job, not this trait's -
/// `send_payment` takes an already-encoded note and an amount, nothing
/// more.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn send_payment(
        &self,
        from: Address,
        to: Address,
        amount_micro_units: u64,
        note: Vec<u8>,
    ) -> Result<TxId, LedgerError>;

    async fn wait_confirmed(
        &self,
        tx: &TxId,
        timeout: std::time::Duration,
    ) -> Result<Round, LedgerError>;
}

/// Queries transaction history by address. Implementations page through
/// results; the indexer module bounds how many pages it will walk (see
/// `MAX_DISCOVERY_PAGES` in [`crate::indexer`]) so a misbehaving or
/// slow indexer cannot make a discovery scan run forever.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Transactions sent BY `address`, newest round first.
    async fn search_sent_by(
        &self,
        address: Address,
        limit: usize,
        page_token: Option<String>,
    ) -> Result<SearchResult, LedgerError>;

    /// Transactions between `me` and `participant`, in either direction,
    /// optionally restricted to rounds strictly greater than `after_round`.
    async fn search_between(
        &self,
        me: Address,
        participant: Address,
        limit: usize,
        after_round: Option<Round>,
        page_token: Option<String>,
    ) -> Result<SearchResult, LedgerError>;

    /// All chat transactions involving `me`, in either direction -
    /// used by `Chat::conversations` to enumerate counterparties.
    async fn search_all_for(
        &self,
        me: Address,
        limit: usize,
        page_token: Option<String>,
    ) -> Result<SearchResult, LedgerError>;
}

/// The signing identity backing an account: a 32-byte Ed25519 signing
/// seed, the derived 32-byte address, and a raw-message signer.
/// Mnemonic handling and address encoding are upstream of this trait and
/// out of scope here.
#[async_trait]
pub trait SigningAccount: Send + Sync {
    fn signing_seed(&self) -> [u8; 32];
    fn address(&self) -> Address;
    fn sign(&self, message: &[u8]) -> [u8; 64];
}

/// Durable storage backend for the send queue's persisted state. A
/// concrete implementation is responsible for its own write atomicity
/// (e.g. write-to-temp-then-rename, as [`crate::harness::FileStorage`]
/// does); [`crate::queue::SendQueue`] only ever hands it a whole
/// serialized snapshot.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError>;
    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError>;
    async fn remove(&self) -> Result<(), StorageError>;
}

/// External key-storage UX collaborator (biometric/file-backed). Out of
/// scope to implement here; named so the `Chat` facade's dependency on
/// "give me my private key" has a documented shape.
#[async_trait]
pub trait KeyStorage: Send + Sync {
    async fn store(
        &self,
        priv_key: &[u8; 32],
        address: Address,
        require_auth: bool,
    ) -> Result<(), StorageError>;
    async fn retrieve(&self, address: Address) -> Result<[u8; 32], StorageError>;
    async fn has_key(&self, address: Address) -> bool;
    async fn delete(&self, address: Address) -> Result<(), StorageError>;
    async fn list_stored_addresses(&self) -> Vec<Address>;
}
