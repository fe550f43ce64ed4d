//! Scans a peer's transaction history, classifies envelopes, decrypts
//! them, and assembles [`Message`] records. Also resolves public keys
//! via self-published transactions (see `Chat::publish_key_and_wait`).
//!
//! PSK-ratchet replay state is the one piece of cross-call mutable state
//! in the crypto-adjacent path (per the project's concurrency model), so
//! it lives here behind a `tokio::sync::RwLock`, serializing concurrent
//! scans of the same PSK contact.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use algochat_crypto::envelope::{self, DecodedEnvelope};
use algochat_crypto::psk_state::PskState;

use crate::cache::PublicKeyCache;
use crate::collaborators::{Indexer, IndexedTransaction, SearchResult};
use crate::conversation::{Message, ReplyContext};
use crate::errors::{ChatError, DiscoveryError};
use crate::keys::EncryptionKeys;
use crate::types::{Address, Direction, ScanReport};

/// Page size used for both discovery and conversation scans.
const PAGE_SIZE: usize = 100;
/// Discovery gives up after this many pages rather than paging forever
/// against a misbehaving or slow indexer.
const MAX_DISCOVERY_PAGES: usize = 20;
/// Same bound applied to a conversation scan.
const MAX_SCAN_PAGES: usize = 200;

/// A pre-shared-key contact: the peer's address, the out-of-band shared
/// secret, an optional human label, and this side's ratchet state for
/// that peer.
#[derive(Debug, Clone)]
pub struct PskContact {
    pub address: Address,
    pub initial_psk: [u8; 32],
    pub label: Option<String>,
    pub state: PskState,
}

impl PskContact {
    pub fn new(address: Address, initial_psk: [u8; 32], label: Option<String>) -> Self {
        Self {
            address,
            initial_psk,
            label,
            state: PskState::new(),
        }
    }
}

/// Scans transaction history and resolves public keys. Owns the PSK
/// contact registry and a TTL public-key cache; the `Indexer`
/// collaborator itself is stateless from this type's point of view.
pub struct MessageIndexer {
    indexer: Arc<dyn Indexer>,
    public_keys: PublicKeyCache,
    psk_contacts: RwLock<HashMap<Address, PskContact>>,
}

impl MessageIndexer {
    pub fn new(indexer: Arc<dyn Indexer>) -> Self {
        Self {
            indexer,
            public_keys: PublicKeyCache::default(),
            psk_contacts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_psk_contact(&self, contact: PskContact) {
        self.psk_contacts.write().await.insert(contact.address, contact);
    }

    pub async fn remove_psk_contact(&self, address: Address) {
        self.psk_contacts.write().await.remove(&address);
    }

    pub async fn has_psk_contact(&self, address: Address) -> bool {
        self.psk_contacts.read().await.contains_key(&address)
    }

    /// Pass-through to the underlying `Indexer::search_all_for`, used by
    /// `Chat::conversations` to enumerate every counterparty.
    pub async fn search_all_for(
        &self,
        me: Address,
        page_token: Option<String>,
    ) -> Result<SearchResult, ChatError> {
        self.indexer
            .search_all_for(me, PAGE_SIZE, page_token)
            .await
            .map_err(ChatError::from)
    }

    /// Resolve `address`'s static encryption key, consulting the TTL
    /// cache first, then walking its self-sent transactions newest-first
    /// looking for the first recognized envelope.
    ///
    /// The project's canonical envelope (126-byte v3 header, see the
    /// wire-format design notes) carries no inline signature, so there is
    /// nothing here for [`algochat_crypto::signature::verify`] to check -
    /// the signature path exists for callers that bind a key
    /// out-of-band (e.g. displaying [`algochat_crypto::signature::fingerprint`]
    /// for the user to compare) rather than for this scan itself.
    pub async fn fetch_public_key(&self, address: Address) -> Result<[u8; 32], ChatError> {
        if let Some(key) = self.public_keys.retrieve(address).await {
            return Ok(key);
        }

        let mut page_token = None;
        for _ in 0..MAX_DISCOVERY_PAGES {
            let result = self
                .indexer
                .search_sent_by(address, PAGE_SIZE, page_token.clone())
                .await?;

            for tx in &result.transactions {
                if !envelope::is_chat_message(&tx.note_bytes) {
                    continue;
                }
                let Ok(decoded) = envelope::decode(&tx.note_bytes) else {
                    continue;
                };
                if let DecodedEnvelope::Standard(env) = decoded {
                    let sender_key = *env.sender_static();
                    self.public_keys.store(address, sender_key).await;
                    return Ok(sender_key);
                }
            }

            page_token = result.next_token;
            if page_token.is_none() {
                break;
            }
        }

        Err(ChatError::Discovery(DiscoveryError::PublicKeyNotFound(address)))
    }

    /// Scan transactions between `me` and `participant`, decrypt every
    /// recognized envelope, and return the resulting messages alongside
    /// a diagnostic [`ScanReport`]. Corrupt notes, replayed PSK counters,
    /// and messages from unknown PSK contacts are skipped rather than
    /// aborting the scan, per the project's error-propagation policy.
    pub async fn scan_messages(
        &self,
        me: Address,
        my_keys: &EncryptionKeys,
        participant: Address,
        after_round: Option<u64>,
    ) -> Result<(Vec<Message>, ScanReport), ChatError> {
        let mut report = ScanReport::new();
        let mut by_id: HashMap<String, Message> = HashMap::new();

        let mut page_token = None;
        for _ in 0..MAX_SCAN_PAGES {
            let result = self
                .indexer
                .search_between(me, participant, PAGE_SIZE, after_round, page_token.clone())
                .await?;

            for tx in &result.transactions {
                if let Some(message) = self.classify(tx, me, my_keys, &mut report).await {
                    by_id.insert(message.id.clone(), message);
                }
            }

            page_token = result.next_token;
            if page_token.is_none() {
                break;
            }
        }

        let mut messages: Vec<Message> = by_id.into_values().collect();
        messages.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        report.messages_found = messages.len();
        Ok((messages, report))
    }

    async fn classify(
        &self,
        tx: &IndexedTransaction,
        me: Address,
        my_keys: &EncryptionKeys,
        report: &mut ScanReport,
    ) -> Option<Message> {
        if !envelope::is_chat_message(&tx.note_bytes) {
            return None;
        }
        let decoded = match envelope::decode(&tx.note_bytes) {
            Ok(d) => d,
            Err(e) => {
                warn!(tx = %tx.id, error = %e, "skipping corrupt envelope");
                report.skipped_corrupt += 1;
                return None;
            }
        };

        let payload = match decoded {
            DecodedEnvelope::Standard(env) => {
                match algochat_crypto::encryptor::decrypt(&env, &my_keys.priv_key) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => {
                        report.skipped_key_publish += 1;
                        return None;
                    }
                    Err(e) => {
                        warn!(tx = %tx.id, error = %e, "skipping undecryptable envelope");
                        report.skipped_corrupt += 1;
                        return None;
                    }
                }
            }
            DecodedEnvelope::Psk(env) => {
                let counter = env.counter;
                let mut contacts = self.psk_contacts.write().await;
                let Some(contact) = contacts.get_mut(&tx_counterparty(tx, me)) else {
                    debug!(tx = %tx.id, "skipping psk envelope: not a psk contact");
                    report.skipped_not_psk_contact += 1;
                    return None;
                };
                if let Err(e) = contact.state.validate_and_record_receive(counter) {
                    warn!(tx = %tx.id, counter, error = %e, "skipping replayed or out-of-range psk counter");
                    report.skipped_replay += 1;
                    return None;
                }
                let initial_psk = contact.initial_psk;
                drop(contacts);

                match algochat_crypto::encryptor::decrypt_psk(&env, &my_keys.priv_key, &initial_psk) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => {
                        report.skipped_key_publish += 1;
                        return None;
                    }
                    Err(e) => {
                        warn!(tx = %tx.id, error = %e, "skipping undecryptable psk envelope");
                        report.skipped_corrupt += 1;
                        return None;
                    }
                }
            }
        };

        let direction = if tx.sender == me { Direction::Sent } else { Direction::Received };
        Some(Message {
            id: tx.id.clone(),
            sender: tx.sender,
            recipient: tx.recipient,
            content: payload.text,
            timestamp: tx.round_time,
            confirmed_round: tx.round,
            direction,
            reply_context: payload.reply_to.map(ReplyContext::from),
        })
    }
}

/// PSK contacts are keyed by the counterparty address regardless of
/// which side sent a given transaction.
fn tx_counterparty(tx: &IndexedTransaction, me: Address) -> Address {
    if tx.sender == me {
        tx.recipient
    } else {
        tx.sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::InMemoryIndexer;
    use algochat_crypto::encryptor::{encrypt, encrypt_psk};
    use algochat_crypto::payload::MessagePayload;

    fn keys(seed: u8) -> EncryptionKeys {
        EncryptionKeys::derive(&[seed; 32])
    }

    #[tokio::test]
    async fn fetch_public_key_finds_the_first_self_sent_envelope() {
        let alice = keys(0x10);
        let alice_addr = Address([0xA1; 32]);

        let fake = Arc::new(InMemoryIndexer::new());
        let env = encrypt(b"hello", &alice.priv_key, &alice.pub_key).unwrap();
        fake.push_transaction(IndexedTransaction {
            id: "TX1".to_string(),
            sender: alice_addr,
            recipient: alice_addr,
            round: 10,
            round_time: 1000,
            note_bytes: env.encode(),
        });

        let indexer = MessageIndexer::new(fake);
        let found = indexer.fetch_public_key(alice_addr).await.unwrap();
        assert_eq!(found, alice.encoded_pub());

        // second call hits the cache, not the (now-empty-result) indexer
        let found_again = indexer.fetch_public_key(alice_addr).await.unwrap();
        assert_eq!(found_again, alice.encoded_pub());
    }

    #[tokio::test]
    async fn fetch_public_key_reports_not_found_for_an_unknown_address() {
        let fake = Arc::new(InMemoryIndexer::new());
        let indexer = MessageIndexer::new(fake);
        let err = indexer.fetch_public_key(Address([0x99; 32])).await.unwrap_err();
        assert!(matches!(err, ChatError::Discovery(DiscoveryError::PublicKeyNotFound(_))));
    }

    #[tokio::test]
    async fn scan_messages_decrypts_and_classifies_direction() {
        let me_addr = Address([0x01; 32]);
        let peer_addr = Address([0x02; 32]);
        let me_keys = keys(0x21);
        let peer_keys = keys(0x22);

        let fake = Arc::new(InMemoryIndexer::new());
        let env = encrypt(
            &MessagePayload::text("hi there").encode(),
            &peer_keys.priv_key,
            &me_keys.pub_key,
        )
        .unwrap();
        fake.push_transaction(IndexedTransaction {
            id: "TX-IN".to_string(),
            sender: peer_addr,
            recipient: me_addr,
            round: 5,
            round_time: 500,
            note_bytes: env.encode(),
        });

        let indexer = MessageIndexer::new(fake);
        let (messages, report) = indexer
            .scan_messages(me_addr, &me_keys, peer_addr, None)
            .await
            .unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Received);
        assert_eq!(messages[0].content, "hi there");
        assert_eq!(report.messages_found, 1);
        assert_eq!(report.total_skipped(), 0);
    }

    #[tokio::test]
    async fn scan_messages_skips_key_publish_markers() {
        let me_addr = Address([0x01; 32]);
        let peer_addr = Address([0x02; 32]);
        let me_keys = keys(0x31);
        let peer_keys = keys(0x32);

        let fake = Arc::new(InMemoryIndexer::new());
        let env = encrypt(
            &algochat_crypto::payload::KEY_PUBLISH_MARKER,
            &peer_keys.priv_key,
            &me_keys.pub_key,
        )
        .unwrap();
        fake.push_transaction(IndexedTransaction {
            id: "TX-PUB".to_string(),
            sender: peer_addr,
            recipient: me_addr,
            round: 1,
            round_time: 100,
            note_bytes: env.encode(),
        });

        let indexer = MessageIndexer::new(fake);
        let (messages, report) = indexer
            .scan_messages(me_addr, &me_keys, peer_addr, None)
            .await
            .unwrap();

        assert!(messages.is_empty());
        assert_eq!(report.skipped_key_publish, 1);
    }

    #[tokio::test]
    async fn scan_messages_skips_psk_envelopes_from_unknown_contacts() {
        let me_addr = Address([0x01; 32]);
        let peer_addr = Address([0x02; 32]);
        let me_keys = keys(0x41);
        let peer_keys = keys(0x42);

        let fake = Arc::new(InMemoryIndexer::new());
        let env = encrypt_psk(
            b"quantum hello",
            &peer_keys.priv_key,
            &me_keys.pub_key,
            &[0xAA; 32],
            0,
        )
        .unwrap();
        fake.push_transaction(IndexedTransaction {
            id: "TX-PSK".to_string(),
            sender: peer_addr,
            recipient: me_addr,
            round: 1,
            round_time: 100,
            note_bytes: env.encode(),
        });

        let indexer = MessageIndexer::new(fake);
        let (messages, report) = indexer
            .scan_messages(me_addr, &me_keys, peer_addr, None)
            .await
            .unwrap();

        assert!(messages.is_empty());
        assert_eq!(report.skipped_not_psk_contact, 1);
    }

    #[tokio::test]
    async fn scan_messages_decrypts_psk_envelopes_for_known_contacts() {
        let me_addr = Address([0x01; 32]);
        let peer_addr = Address([0x02; 32]);
        let me_keys = keys(0x51);
        let peer_keys = keys(0x52);
        let initial_psk = [0xBB; 32];

        let fake = Arc::new(InMemoryIndexer::new());
        let env = encrypt_psk(b"ratcheted", &peer_keys.priv_key, &me_keys.pub_key, &initial_psk, 0).unwrap();
        fake.push_transaction(IndexedTransaction {
            id: "TX-PSK-OK".to_string(),
            sender: peer_addr,
            recipient: me_addr,
            round: 1,
            round_time: 100,
            note_bytes: env.encode(),
        });

        let indexer = MessageIndexer::new(fake);
        indexer
            .add_psk_contact(PskContact::new(peer_addr, initial_psk, None))
            .await;

        let (messages, report) = indexer
            .scan_messages(me_addr, &me_keys, peer_addr, None)
            .await
            .unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "ratcheted");
        assert_eq!(report.skipped_not_psk_contact, 0);
    }

    #[tokio::test]
    async fn scan_messages_skips_a_replayed_psk_counter() {
        let me_addr = Address([0x01; 32]);
        let peer_addr = Address([0x02; 32]);
        let me_keys = keys(0x61);
        let peer_keys = keys(0x62);
        let initial_psk = [0xCC; 32];

        let fake = Arc::new(InMemoryIndexer::new());
        let env = encrypt_psk(b"dupe", &peer_keys.priv_key, &me_keys.pub_key, &initial_psk, 3).unwrap();
        // the same counter appears twice, as if replayed on the ledger
        fake.push_transaction(IndexedTransaction {
            id: "TX-A".to_string(),
            sender: peer_addr,
            recipient: me_addr,
            round: 1,
            round_time: 100,
            note_bytes: env.encode(),
        });
        fake.push_transaction(IndexedTransaction {
            id: "TX-B".to_string(),
            sender: peer_addr,
            recipient: me_addr,
            round: 2,
            round_time: 200,
            note_bytes: env.encode(),
        });

        let indexer = MessageIndexer::new(fake);
        indexer
            .add_psk_contact(PskContact::new(peer_addr, initial_psk, None))
            .await;

        let (messages, report) = indexer
            .scan_messages(me_addr, &me_keys, peer_addr, None)
            .await
            .unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(report.skipped_replay, 1);
    }
}
