//! Message cache (per-peer, with a last-sync-round high-water mark) and
//! a TTL-bounded public-key cache.
//!
//! Both caches are owned behind a `tokio::sync::RwLock` so concurrent
//! `refresh` calls (allowed by the spec's concurrency model, since
//! `store` is dedup-idempotent) never observe a half-written state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::collaborators::Round;
use crate::conversation::Message;
use crate::types::Address;

/// Default TTL for a cached public key, per the spec's "default small
/// minutes" guidance.
pub const DEFAULT_PUBLIC_KEY_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct PeerCache {
    messages: HashMap<String, Message>,
    last_sync_round: Option<Round>,
}

/// Caches decrypted messages per counterparty, deduplicated by id, along
/// with the highest confirmed round seen for that peer so the next scan
/// can resume from there instead of re-walking the whole history.
#[derive(Default)]
pub struct MessageCache {
    peers: RwLock<HashMap<Address, PeerCache>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a batch of messages for `participant`, deduplicating by id
    /// and advancing `last_sync_round` to the max confirmed round seen.
    pub async fn store(&self, participant: Address, messages: impl IntoIterator<Item = Message>) {
        let mut peers = self.peers.write().await;
        let entry = peers.entry(participant).or_default();
        for message in messages {
            let round = message.confirmed_round;
            entry.messages.insert(message.id.clone(), message);
            entry.last_sync_round = Some(entry.last_sync_round.map_or(round, |r| r.max(round)));
        }
        debug!(peer = %participant, count = entry.messages.len(), "message cache updated");
    }

    /// Retrieve every cached message for `participant`, optionally
    /// filtered to `confirmed_round > after_round`.
    pub async fn retrieve(&self, participant: Address, after_round: Option<Round>) -> Vec<Message> {
        let peers = self.peers.read().await;
        let Some(entry) = peers.get(&participant) else {
            return Vec::new();
        };
        let mut out: Vec<Message> = entry
            .messages
            .values()
            .filter(|m| after_round.map_or(true, |after| m.confirmed_round > after))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        out
    }

    pub async fn last_sync_round(&self, participant: Address) -> Option<Round> {
        self.peers
            .read()
            .await
            .get(&participant)
            .and_then(|p| p.last_sync_round)
    }

    pub async fn clear(&self) {
        self.peers.write().await.clear();
    }

    pub async fn clear_participant(&self, participant: Address) {
        self.peers.write().await.remove(&participant);
    }
}

struct CachedKey {
    key: [u8; 32],
    stored_at: Instant,
}

/// TTL-bounded cache of discovered public keys, keyed by address.
pub struct PublicKeyCache {
    ttl: Duration,
    entries: RwLock<HashMap<Address, CachedKey>>,
}

impl PublicKeyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn store(&self, address: Address, key: [u8; 32]) {
        self.entries.write().await.insert(
            address,
            CachedKey {
                key,
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns `None` if the address was never cached, or if its entry
    /// has aged past the configured TTL.
    pub async fn retrieve(&self, address: Address) -> Option<[u8; 32]> {
        let entries = self.entries.read().await;
        let entry = entries.get(&address)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.key)
    }
}

impl Default for PublicKeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_KEY_TTL)
    }
}
