//! The in-memory conversation model: a participant-keyed, de-duplicated,
//! timestamp-sorted message set, plus the `lastSent`/`lastReceived`/
//! direction-filter views the `Chat` facade needs.

use algochat_crypto::payload::{truncate_reply_preview, ReplyTo};

use crate::collaborators::{Round, TxId};
use crate::types::{Address, Direction};

/// A reply context attached to an outbound or inbound message: which
/// transaction it replies to, and an 80-char-or-less preview of the
/// original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    pub txid: TxId,
    pub preview: String,
}

impl ReplyContext {
    /// Build a reply context from the message being replied to, applying
    /// the spec's 80-character preview truncation.
    pub fn to(txid: impl Into<TxId>, full_text: &str) -> Self {
        Self {
            txid: txid.into(),
            preview: truncate_reply_preview(full_text),
        }
    }
}

impl From<ReplyContext> for ReplyTo {
    fn from(ctx: ReplyContext) -> Self {
        ReplyTo {
            txid: ctx.txid,
            preview: ctx.preview,
        }
    }
}

impl From<ReplyTo> for ReplyContext {
    fn from(reply: ReplyTo) -> Self {
        ReplyContext {
            txid: reply.txid,
            preview: reply.preview,
        }
    }
}

/// One decrypted, ledger-anchored chat message.
///
/// Identity is the transaction id alone, per the spec's dedup invariant:
/// two copies of the same message (e.g. fetched by two concurrent scans)
/// are the same `Message` regardless of anything else about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: TxId,
    pub sender: Address,
    pub recipient: Address,
    pub content: String,
    /// Ledger round's block time - the canonical ordering key.
    pub timestamp: i64,
    pub confirmed_round: Round,
    pub direction: Direction,
    pub reply_context: Option<ReplyContext>,
}

/// A conversation with a single counterparty: messages in both
/// directions, sorted ascending by (`timestamp`, `id`) and unique by
/// `id`.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub participant: Address,
    pub participant_encryption_key: Option<[u8; 32]>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(participant: Address) -> Self {
        Self {
            participant,
            participant_encryption_key: None,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Insert `message` in timestamp order if its id is not already
    /// present. Returns `true` if it was inserted. Idempotent: a second
    /// `append` of the same id is a no-op, matching the spec's dedup
    /// invariant for `Conversation.append`.
    pub fn append(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| (m.timestamp, &m.id) <= (message.timestamp, &message.id));
        self.messages.insert(pos, message);
        true
    }

    /// Repeated `append` over a batch, in any order; the result is
    /// always timestamp-ascending and id-deduplicated regardless of
    /// the batch's own order.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Message>) {
        for message in incoming {
            self.append(message);
        }
    }

    pub fn last_sent(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.direction == Direction::Sent)
    }

    pub fn last_received(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.direction == Direction::Received)
    }

    pub fn filter_by_direction(&self, direction: Direction) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.direction == direction)
    }

    /// The highest `confirmed_round` seen in this conversation, used by
    /// the cache/indexer to resume a scan from where the last one left
    /// off. `None` for an empty conversation.
    pub fn high_water_round(&self) -> Option<Round> {
        self.messages.iter().map(|m| m.confirmed_round).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn msg(id: &str, timestamp: i64, direction: Direction) -> Message {
        Message {
            id: id.to_string(),
            sender: Address([0x01; 32]),
            recipient: Address([0x02; 32]),
            content: "hi".to_string(),
            timestamp,
            confirmed_round: timestamp as u64,
            direction,
            reply_context: None,
        }
    }

    #[test]
    fn append_is_idempotent_by_id() {
        let mut conv = Conversation::new(Address([0x02; 32]));
        assert!(conv.append(msg("TX1", 100, Direction::Sent)));
        assert!(!conv.append(msg("TX1", 100, Direction::Sent)));
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn append_maintains_timestamp_ascending_order() {
        let mut conv = Conversation::new(Address([0x02; 32]));
        conv.append(msg("TX3", 300, Direction::Sent));
        conv.append(msg("TX1", 100, Direction::Received));
        conv.append(msg("TX2", 200, Direction::Sent));

        let timestamps: Vec<i64> = conv.messages().iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
    }

    #[test]
    fn merge_deduplicates_across_the_whole_batch() {
        let mut conv = Conversation::new(Address([0x02; 32]));
        conv.append(msg("TX1", 100, Direction::Sent));
        conv.merge(vec![
            msg("TX1", 100, Direction::Sent),
            msg("TX2", 50, Direction::Received),
        ]);
        assert_eq!(conv.messages().len(), 2);
        // TX2 has an earlier timestamp, so it must sort before TX1.
        assert_eq!(conv.messages()[0].id, "TX2");
    }

    #[test]
    fn last_sent_and_last_received_return_the_most_recent_of_each() {
        let mut conv = Conversation::new(Address([0x02; 32]));
        conv.append(msg("TX1", 100, Direction::Sent));
        conv.append(msg("TX2", 200, Direction::Received));
        conv.append(msg("TX3", 300, Direction::Sent));

        assert_eq!(conv.last_sent().unwrap().id, "TX3");
        assert_eq!(conv.last_received().unwrap().id, "TX2");
    }

    #[test]
    fn filter_by_direction_returns_only_matching_messages() {
        let mut conv = Conversation::new(Address([0x02; 32]));
        conv.append(msg("TX1", 100, Direction::Sent));
        conv.append(msg("TX2", 200, Direction::Received));

        let sent: Vec<_> = conv.filter_by_direction(Direction::Sent).collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "TX1");
    }

    #[test]
    fn high_water_round_is_the_max_confirmed_round() {
        let mut conv = Conversation::new(Address([0x02; 32]));
        assert_eq!(conv.high_water_round(), None);
        conv.append(msg("TX1", 100, Direction::Sent));
        conv.append(msg("TX2", 50, Direction::Received));
        assert_eq!(conv.high_water_round(), Some(100));
    }

    #[test]
    fn reply_context_truncates_long_previews() {
        let ctx = ReplyContext::to("TX1", &"a".repeat(100));
        assert_eq!(ctx.preview.len(), 80);
        assert!(ctx.preview.ends_with("..."));
    }

    proptest! {
        /// Merging any batch of messages, in any order, any number of times,
        /// always yields a set that is unique-by-id and timestamp-ascending -
        /// the spec's `Conversation.append` idempotence invariant.
        #[test]
        fn merge_is_idempotent_and_stays_sorted(
            ids in prop::collection::vec(0u8..20, 0..30),
            timestamps in prop::collection::vec(any::<i64>(), 0..30),
        ) {
            let mut conv = Conversation::new(Address([0x02; 32]));
            let batch: Vec<Message> = ids
                .iter()
                .zip(timestamps.iter().cycle())
                .map(|(id, ts)| msg(&id.to_string(), *ts, Direction::Sent))
                .collect();

            conv.merge(batch.clone());
            let after_first = conv.messages().to_vec();
            conv.merge(batch);
            let after_second = conv.messages().to_vec();

            prop_assert_eq!(after_first.len(), after_second.len());
            let mut seen = std::collections::HashSet::new();
            for m in conv.messages() {
                prop_assert!(seen.insert(m.id.clone()), "duplicate id {}", m.id);
            }
            for pair in conv.messages().windows(2) {
                prop_assert!((pair[0].timestamp, &pair[0].id) <= (pair[1].timestamp, &pair[1].id));
            }
        }
    }
}
