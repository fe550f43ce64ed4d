//! In-memory and file-backed test doubles for the collaborator traits in
//! [`crate::collaborators`].
//!
//! Nothing here is meant for production use; it exists so the rest of
//! the crate (and downstream integration tests) can exercise a full
//! `Chat` without a real ledger, indexer, or filesystem.

use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

use crate::collaborators::{
    IndexedTransaction, Indexer, LedgerClient, Round, SearchResult, SigningAccount, Storage, TxId,
};
use crate::errors::{LedgerError, StorageError};
use crate::types::Address;

/// A `SigningAccount` over a fixed, caller-supplied seed - deterministic,
/// so tests can derive the same address and encryption keys run after
/// run.
pub struct FixedSigningAccount {
    seed: [u8; 32],
    address: Address,
}

impl FixedSigningAccount {
    pub fn new(seed: [u8; 32], address: Address) -> Self {
        Self { seed, address }
    }
}

#[async_trait]
impl SigningAccount for FixedSigningAccount {
    fn signing_seed(&self) -> [u8; 32] {
        self.seed
    }

    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, message: &[u8]) -> [u8; 64] {
        use ed25519_dalek::{Signer, SigningKey};
        let signing_key = SigningKey::from_bytes(&self.seed);
        signing_key.sign(message).to_bytes()
    }
}

/// An in-memory ledger: every "transaction" is just appended to a
/// shared log and immediately considered confirmed. There is no
/// balance tracking - `send_payment` always succeeds.
pub struct InMemoryLedger {
    log: Mutex<Vec<IndexedTransaction>>,
    next_round: StdMutex<Round>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            next_round: StdMutex::new(1),
        }
    }

    fn take_round(&self) -> Round {
        let mut round = self.next_round.lock().unwrap();
        let this_round = *round;
        *round += 1;
        this_round
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn send_payment(
        &self,
        from: Address,
        to: Address,
        _amount_micro_units: u64,
        note: Vec<u8>,
    ) -> Result<TxId, LedgerError> {
        let round = self.take_round();
        let id = format!("TX{round}");
        self.log.lock().await.push(IndexedTransaction {
            id: id.clone(),
            sender: from,
            recipient: to,
            round,
            round_time: round as i64,
            note_bytes: note,
        });
        Ok(id)
    }

    async fn wait_confirmed(&self, tx: &TxId, _timeout: std::time::Duration) -> Result<Round, LedgerError> {
        self.log
            .lock()
            .await
            .iter()
            .find(|t| &t.id == tx)
            .map(|t| t.round)
            .ok_or_else(|| LedgerError::TransactionFailed(format!("unknown transaction {tx}")))
    }
}

/// An in-memory indexer sharing the same log as an [`InMemoryLedger`] -
/// build one from the other's transactions, or push synthetic entries
/// directly for tests that only exercise scanning/discovery.
pub struct InMemoryIndexer {
    transactions: Mutex<Vec<IndexedTransaction>>,
}

impl InMemoryIndexer {
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(Vec::new()),
        }
    }

    pub fn push_transaction(&self, tx: IndexedTransaction) {
        self.transactions
            .try_lock()
            .expect("test-only indexer is never contended")
            .push(tx);
    }
}

impl Default for InMemoryIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Indexer for InMemoryIndexer {
    async fn search_sent_by(
        &self,
        address: Address,
        limit: usize,
        _page_token: Option<String>,
    ) -> Result<SearchResult, LedgerError> {
        let mut matches: Vec<IndexedTransaction> = self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.sender == address)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.round.cmp(&a.round));
        matches.truncate(limit);
        Ok(SearchResult {
            transactions: matches,
            next_token: None,
        })
    }

    async fn search_between(
        &self,
        me: Address,
        participant: Address,
        limit: usize,
        after_round: Option<Round>,
        _page_token: Option<String>,
    ) -> Result<SearchResult, LedgerError> {
        let mut matches: Vec<IndexedTransaction> = self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| {
                let between = (t.sender == me && t.recipient == participant)
                    || (t.sender == participant && t.recipient == me);
                between && after_round.map_or(true, |after| t.round > after)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.round.cmp(&b.round));
        matches.truncate(limit);
        Ok(SearchResult {
            transactions: matches,
            next_token: None,
        })
    }

    async fn search_all_for(
        &self,
        me: Address,
        limit: usize,
        _page_token: Option<String>,
    ) -> Result<SearchResult, LedgerError> {
        let mut matches: Vec<IndexedTransaction> = self
            .transactions
            .lock()
            .await
            .iter()
            .filter(|t| t.sender == me || t.recipient == me)
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.round.cmp(&b.round));
        matches.truncate(limit);
        Ok(SearchResult {
            transactions: matches,
            next_token: None,
        })
    }
}

/// File-backed [`Storage`]: writes go to a temp path in the same
/// directory, `sync_all`, then an atomic rename over the real path, so a
/// crash mid-write can never leave a half-written queue file behind -
/// the same shape as the project's on-disk identity store.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, bytes)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        file.sync_all().await.map_err(|e| StorageError::Io(e.to_string()))?;
        drop(file);
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    async fn remove(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

/// An in-memory [`Storage`] double for tests that want a durable queue
/// without touching the filesystem at all.
#[derive(Default)]
pub struct InMemoryStorage {
    contents: Mutex<Option<Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        *self.contents.lock().await = Some(bytes.to_vec());
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.contents.lock().await.clone())
    }

    async fn remove(&self) -> Result<(), StorageError> {
        *self.contents.lock().await = None;
        Ok(())
    }
}
