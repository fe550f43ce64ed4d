//! Durable pending-message queue: FIFO by creation time, with retry
//! accounting and an optional persisted backing store.
//!
//! `enqueue -> dequeue -> mark_sending -> (mark_sent | mark_failed)` is
//! the whole lifecycle. Persistence is write-whole-queue-then-replace:
//! every mutating call serializes the entire queue and hands it to the
//! attached [`Storage`] backend, mirroring the teacher's file-identity
//! store (`identity.rs`: write to a temp path, `sync_all`, then rename
//! over the real one) so a crash mid-write can never leave a half
//! written queue file behind. An empty queue removes the backing file
//! entirely rather than persisting an empty array.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::Storage;
use crate::conversation::ReplyContext;
use crate::errors::StorageError;
use crate::types::Address;

/// How many times [`SendQueue::mark_failed`] may retry a message before
/// [`SendQueue::dequeue`] stops returning it.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    Pending,
    Sending,
    Failed,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: Uuid,
    pub recipient: Address,
    pub content: String,
    pub reply_context: Option<ReplyContext>,
    pub amount_micro_units: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub status: SendStatus,
    pub last_error: Option<String>,
}

impl PendingMessage {
    pub fn new(recipient: Address, content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            content: content.into(),
            reply_context: None,
            amount_micro_units: None,
            created_at,
            last_attempt: None,
            retry_count: 0,
            status: SendStatus::Pending,
            last_error: None,
        }
    }
}

/// FIFO queue of messages waiting to be sent, with retry accounting and
/// optional atomic persistence.
pub struct SendQueue {
    items: Vec<PendingMessage>,
    max_retries: u32,
    storage: Option<Box<dyn Storage>>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            storage: None,
        }
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            items: Vec::new(),
            max_retries,
            storage: None,
        }
    }

    pub fn attach_storage(&mut self, storage: Box<dyn Storage>) {
        self.storage = Some(storage);
    }

    /// Load a previously persisted queue from the attached storage, if
    /// any exists. Call once at startup before any other operation.
    pub async fn load(&mut self) -> Result<(), StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if let Some(bytes) = storage.read().await? {
            self.items = serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            info!(count = self.items.len(), "loaded persisted send queue");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PendingMessage] {
        &self.items
    }

    pub async fn enqueue(&mut self, message: PendingMessage) -> Result<(), StorageError> {
        self.items.push(message);
        self.persist().await
    }

    /// Pop the oldest message eligible to send: skips anything already
    /// `Sending` (another caller has it in flight) and anything that has
    /// exhausted its retry budget.
    pub fn dequeue(&mut self) -> Option<PendingMessage> {
        let index = self.items.iter().position(|m| {
            m.status != SendStatus::Sending && m.retry_count < self.max_retries
        })?;
        Some(self.items.remove(index))
    }

    pub async fn mark_sending(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<(), StorageError> {
        if let Some(item) = self.find_mut(id) {
            item.status = SendStatus::Sending;
            item.last_attempt = Some(now);
        }
        self.persist().await
    }

    pub async fn mark_sent(&mut self, id: Uuid) -> Result<(), StorageError> {
        self.items.retain(|m| m.id != id);
        self.persist().await
    }

    pub async fn mark_failed(&mut self, id: Uuid, error: impl Into<String>) -> Result<(), StorageError> {
        if let Some(item) = self.find_mut(id) {
            item.retry_count += 1;
            item.status = SendStatus::Failed;
            item.last_error = Some(error.into());
            warn!(id = %item.id, retry_count = item.retry_count, "send attempt failed");
        }
        self.persist().await
    }

    /// Re-insert a message that was removed via [`Self::dequeue`] but
    /// whose caller wants it visible in the queue again (e.g. `mark_failed`
    /// on an item already popped out). Most callers should instead hold
    /// on to the popped item and pass it straight to `mark_sending`.
    pub fn requeue(&mut self, message: PendingMessage) {
        self.items.push(message);
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut PendingMessage> {
        self.items.iter_mut().find(|m| m.id == id)
    }

    /// Write the whole queue to the attached storage, or remove the
    /// backing file if the queue is now empty.
    async fn persist(&self) -> Result<(), StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if self.items.is_empty() {
            return storage.remove().await;
        }
        let bytes = serde_json::to_vec(&self.items)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        storage.write(&bytes).await
    }
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}
