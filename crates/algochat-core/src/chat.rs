//! The `Chat` facade: the single entry point that wires an identity, a
//! ledger client, an indexer, and the crypto/caching/queueing machinery
//! in the rest of this crate into the public operations a client
//! application calls.
//!
//! Two concurrent `send` calls from the same `Chat` are serialized by
//! the `send_lock`; two concurrent `refresh` calls are allowed and
//! idempotent (cache dedup handles the race), matching the project's
//! concurrency model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use x25519_dalek::PublicKey as X25519PublicKey;

use algochat_crypto::encryptor;
use algochat_crypto::payload::{self, MessagePayload};

use crate::collaborators::{Indexer, LedgerClient, SigningAccount, TxId};
use crate::conversation::{Conversation, Message, ReplyContext};
use crate::errors::{ChatError, LedgerError};
use crate::indexer::MessageIndexer;
use crate::keys::EncryptionKeys;
use crate::sync::MessageSender;
use crate::types::{Address, Direction};

/// Tunable constants the spec calls out by name, grouped the way the
/// teacher's `RateLimitConfig` groups its own knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    pub default_send_timeout: Duration,
    pub max_retries: u32,
    pub public_key_cache_ttl: Duration,
    /// Payment amount attached to a chat transaction when the caller
    /// does not specify one via [`SendOptions::with_amount`].
    pub default_amount_micro_units: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_send_timeout: Duration::from_secs(10),
            max_retries: crate::queue::DEFAULT_MAX_RETRIES,
            public_key_cache_ttl: crate::cache::DEFAULT_PUBLIC_KEY_TTL,
            default_amount_micro_units: 0,
        }
    }
}

/// How a caller wants [`Chat::send`] to behave: whether to wait for
/// ledger confirmation and/or indexer visibility, whether this is a
/// reply, and whether to override the payment amount.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub wait_confirmed: bool,
    pub wait_indexed: bool,
    pub reply_to: Option<Message>,
    pub amount_micro_units: Option<u64>,
    pub timeout: Option<Duration>,
}

impl SendOptions {
    /// Fire-and-forget: the default.
    pub fn default_fire_and_forget() -> Self {
        Self::default()
    }

    pub fn confirmed() -> Self {
        Self {
            wait_confirmed: true,
            ..Self::default()
        }
    }

    /// Implies `confirmed`: the indexer can only see a transaction once
    /// it is on a confirmed round.
    pub fn indexed() -> Self {
        Self {
            wait_confirmed: true,
            wait_indexed: true,
            ..Self::default()
        }
    }

    pub fn replying(to: Message, confirmed: bool, indexed: bool) -> Self {
        Self {
            wait_confirmed: confirmed || indexed,
            wait_indexed: indexed,
            reply_to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_amount(
        microunits: u64,
        confirmed: bool,
        indexed: bool,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            wait_confirmed: confirmed || indexed,
            wait_indexed: indexed,
            amount_micro_units: Some(microunits),
            timeout,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub txid: TxId,
    pub message: Message,
}

/// Orchestrates a signing identity, a ledger client, an indexer, and
/// this crate's conversation model / caches / send queue / sync manager
/// into the public chat API.
pub struct Chat {
    config: ChatConfig,
    identity: Arc<dyn SigningAccount>,
    keys: EncryptionKeys,
    ledger: Arc<dyn LedgerClient>,
    indexer: MessageIndexer,
    cache: crate::cache::MessageCache,
    queue: tokio::sync::Mutex<crate::queue::SendQueue>,
    sync: crate::sync::SyncManager,
    send_lock: tokio::sync::Mutex<()>,
}

impl Chat {
    pub fn new(
        config: ChatConfig,
        identity: Arc<dyn SigningAccount>,
        ledger: Arc<dyn LedgerClient>,
        indexer_backend: Arc<dyn Indexer>,
    ) -> Self {
        let keys = EncryptionKeys::derive(&identity.signing_seed());
        Self {
            queue: tokio::sync::Mutex::new(crate::queue::SendQueue::with_max_retries(config.max_retries)),
            config,
            identity,
            keys,
            ledger,
            indexer: MessageIndexer::new(indexer_backend),
            cache: crate::cache::MessageCache::new(),
            sync: crate::sync::SyncManager::new(),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn address(&self) -> Address {
        self.identity.address()
    }

    pub fn encryption_keys(&self) -> &EncryptionKeys {
        &self.keys
    }

    /// Register a pre-shared-key contact so PSK-ratchet envelopes from
    /// (and to) `peer` can be decrypted/encrypted. Out-of-band exchange
    /// of the URI itself is the caller's job.
    pub async fn add_psk_contact(&self, peer: Address, initial_psk: [u8; 32], label: Option<String>) {
        self.indexer
            .add_psk_contact(crate::indexer::PskContact::new(peer, initial_psk, label))
            .await;
    }

    /// Lazily resolve `peer`'s public key and return an (initially
    /// empty, until [`Self::refresh`] is called) conversation with them.
    pub async fn conversation(&self, peer: Address) -> Result<Conversation, ChatError> {
        let peer_key = self.indexer.fetch_public_key(peer).await?;
        let mut conv = Conversation::new(peer);
        conv.participant_encryption_key = Some(peer_key);
        let cached = self.cache.retrieve(peer, None).await;
        conv.merge(cached);
        Ok(conv)
    }

    /// Scan for new messages with `conv`'s participant since its
    /// high-water round, merge them into both the cache and `conv`, and
    /// return the updated conversation.
    pub async fn refresh(&self, mut conv: Conversation) -> Result<Conversation, ChatError> {
        let after_round = self.cache.last_sync_round(conv.participant).await;
        let (messages, _report) = self
            .indexer
            .scan_messages(self.address(), &self.keys, conv.participant, after_round)
            .await?;
        self.cache.store(conv.participant, messages.clone()).await;
        conv.merge(messages);
        Ok(conv)
    }

    /// Encrypt `text`, submit it as a self-to-peer payment note, and
    /// optionally wait for confirmation and/or indexer visibility.
    /// Serialized against other `send` calls on this `Chat` so PSK send
    /// counters (when used) advance strictly monotonically.
    pub async fn send(&self, peer: Address, text: &str, options: SendOptions) -> Result<SendResult, ChatError> {
        let _guard = self.send_lock.lock().await;

        let reply_context = options.reply_to.as_ref().map(|m| ReplyContext::to(m.id.clone(), &m.content));
        let payload = match &reply_context {
            Some(ctx) => MessagePayload::with_reply(text, ctx.clone().into()),
            None => MessagePayload::text(text),
        };
        let encoded = payload.encode();

        let peer_key = self.indexer.fetch_public_key(peer).await?;
        let peer_pub = X25519PublicKey::from(peer_key);
        let envelope =
            encryptor::encrypt(&encoded, &self.keys.priv_key, &peer_pub).map_err(ChatError::Encryption)?;
        let note = envelope.encode();

        let amount = options.amount_micro_units.unwrap_or(self.config.default_amount_micro_units);
        let timeout = options.timeout.unwrap_or(self.config.default_send_timeout);

        let txid = self
            .ledger
            .send_payment(self.address(), peer, amount, note)
            .await
            .map_err(ChatError::Ledger)?;

        let confirmed_round = if options.wait_confirmed || options.wait_indexed {
            self.ledger.wait_confirmed(&txid, timeout).await.map_err(ChatError::Ledger)?
        } else {
            0
        };

        if options.wait_indexed {
            self.wait_for_indexer(peer, &txid, timeout).await?;
        }

        let message = Message {
            id: txid.clone(),
            sender: self.address(),
            recipient: peer,
            content: text.to_string(),
            timestamp: confirmed_round as i64,
            confirmed_round,
            direction: Direction::Sent,
            reply_context,
        };
        self.cache.store(peer, [message.clone()]).await;

        Ok(SendResult { txid, message })
    }

    /// Poll the indexer (bounded attempts) until `txid` shows up in a
    /// scan between me and `peer`, per the spec's "indexed" send option.
    async fn wait_for_indexer(&self, peer: Address, txid: &TxId, timeout: Duration) -> Result<(), ChatError> {
        const MAX_ATTEMPTS: u32 = 20;
        let deadline = tokio::time::Instant::now() + timeout;
        for _ in 0..MAX_ATTEMPTS {
            let (messages, _report) =
                self.indexer.scan_messages(self.address(), &self.keys, peer, None).await?;
            if messages.iter().any(|m| &m.id == txid) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChatError::Ledger(LedgerError::IndexerTimeout));
            }
            tokio::time::sleep(timeout / MAX_ATTEMPTS).await;
        }
        Err(ChatError::Ledger(LedgerError::IndexerTimeout))
    }

    /// Publish this account's static encryption key by sending a
    /// payment-to-self whose note is the key-publish marker, waiting for
    /// confirmation so the key is immediately discoverable.
    pub async fn publish_key_and_wait(&self) -> Result<TxId, ChatError> {
        let my_pub = self.keys.pub_key;
        let envelope = encryptor::encrypt(&payload::KEY_PUBLISH_MARKER, &self.keys.priv_key, &my_pub)
            .map_err(ChatError::Encryption)?;
        let note = envelope.encode();

        let me = self.address();
        let txid = self.ledger.send_payment(me, me, 0, note).await.map_err(ChatError::Ledger)?;
        self.ledger
            .wait_confirmed(&txid, self.config.default_send_timeout)
            .await
            .map_err(ChatError::Ledger)?;
        Ok(txid)
    }

    /// Enumerate every counterparty this account has exchanged chat
    /// transactions with, returning one populated conversation per peer.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let mut page_token = None;
        let mut peers = std::collections::HashSet::new();
        loop {
            let result = self.indexer.search_all_for(self.address(), page_token.clone()).await?;
            for tx in &result.transactions {
                let other = if tx.sender == self.address() { tx.recipient } else { tx.sender };
                if other != self.address() {
                    peers.insert(other);
                }
            }
            page_token = result.next_token;
            if page_token.is_none() {
                break;
            }
        }

        let mut conversations = Vec::with_capacity(peers.len());
        for peer in peers {
            if let Ok(conv) = self.conversation(peer).await {
                conversations.push(self.refresh(conv).await?);
            }
        }
        Ok(conversations)
    }

    /// Mark connectivity, draining the send queue on a false -> true
    /// transition.
    pub async fn set_online(&self, online: bool) {
        self.sync.set_online(online, &self.queue, self).await;
    }

    pub async fn is_online(&self) -> bool {
        self.sync.is_online().await
    }

    /// Enqueue a message for later sending (e.g. while offline), to be
    /// drained by [`Self::set_online`] once connectivity returns.
    pub async fn enqueue_for_later(&self, peer: Address, text: &str) -> Result<(), ChatError> {
        let message = crate::queue::PendingMessage::new(peer, text, chrono::Utc::now());
        self.queue.lock().await.enqueue(message).await.map_err(ChatError::Storage)
    }
}

#[async_trait]
impl MessageSender for Chat {
    async fn send_pending(
        &self,
        recipient: Address,
        content: &str,
        reply_context: Option<ReplyContext>,
        amount_micro_units: Option<u64>,
    ) -> Result<TxId, ChatError> {
        let mut options = match reply_context {
            Some(ctx) => {
                let reply_message = Message {
                    id: ctx.txid.clone(),
                    sender: recipient,
                    recipient: self.address(),
                    content: ctx.preview.clone(),
                    timestamp: 0,
                    confirmed_round: 0,
                    direction: Direction::Received,
                    reply_context: None,
                };
                SendOptions::replying(reply_message, true, false)
            }
            None => SendOptions::confirmed(),
        };
        if let Some(amount) = amount_micro_units {
            options.amount_micro_units = Some(amount);
        }
        let result = self.send(recipient, content, options).await?;
        Ok(result.txid)
    }
}
