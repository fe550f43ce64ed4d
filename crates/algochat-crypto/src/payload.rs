//! The plaintext carried inside an envelope's ciphertext.
//!
//! Three shapes share the same byte string: a distinguished 16-byte
//! key-publish marker, a legacy bare UTF-8 string, and a canonical JSON
//! object with a reply context. Decoders tell them apart by exact
//! length+equality (marker), then by a leading `{` (JSON), falling back
//! to UTF-8 text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::constant_time_compare;

/// Fixed 16-byte sentinel plaintext signalling "no user message, just
/// publishing my key." Chosen to be valid ASCII (so it can never be
/// mistaken for truncated UTF-8) and to not collide with `{` (so it's
/// never routed through the JSON decoder) or any plausible short text.
/// This is part of the wire contract: once deployed, it cannot change.
pub const KEY_PUBLISH_MARKER: [u8; 16] = *b"AlgoChat-KeyPub!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub txid: String,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePayload {
    pub text: String,
    pub reply_to: Option<ReplyTo>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
        }
    }

    pub fn with_reply(text: impl Into<String>, reply_to: ReplyTo) -> Self {
        Self {
            text: text.into(),
            reply_to: Some(reply_to),
        }
    }

    /// Encode to the bytes that get encrypted. Plain text when there is
    /// no reply context (matches the legacy simple form byte-for-byte);
    /// canonical JSON, sorted keys, when a reply context is attached.
    pub fn encode(&self) -> Vec<u8> {
        match &self.reply_to {
            None => self.text.clone().into_bytes(),
            Some(reply_to) => {
                let mut reply_map = BTreeMap::new();
                reply_map.insert("preview".to_string(), Value::String(reply_to.preview.clone()));
                reply_map.insert("txid".to_string(), Value::String(reply_to.txid.clone()));

                let mut top = BTreeMap::new();
                top.insert(
                    "replyTo".to_string(),
                    serde_json::to_value(reply_map).expect("BTreeMap<String, String> always serializes"),
                );
                top.insert("text".to_string(), Value::String(self.text.clone()));

                // BTreeMap serializes keys in sorted order regardless of
                // serde_json's preserve_order feature, so this is canonical
                // independent of what the rest of the dependency graph enables.
                serde_json::to_vec(&top).expect("BTreeMap<String, Value> always serializes")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    /// A key-publish marker; not a user-visible message.
    KeyPublish,
    Message(MessagePayload),
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("plaintext is not valid UTF-8")]
    NotUtf8,
    #[error("malformed JSON payload: {0}")]
    MalformedJson(String),
}

/// Truncate a reply preview to at most 80 characters total, including the
/// `"..."` suffix when truncation occurred.
pub fn truncate_reply_preview(text: &str) -> String {
    const MAX_LEN: usize = 80;
    const SUFFIX: &str = "...";
    let char_count = text.chars().count();
    if char_count <= MAX_LEN {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_LEN - SUFFIX.len()).collect();
    format!("{truncated}{SUFFIX}")
}

pub fn decode(bytes: &[u8]) -> Result<DecodedPayload, PayloadError> {
    if bytes.len() == KEY_PUBLISH_MARKER.len() && constant_time_compare(bytes, &KEY_PUBLISH_MARKER) {
        return Ok(DecodedPayload::KeyPublish);
    }

    if bytes.first() == Some(&b'{') {
        let text = std::str::from_utf8(bytes).map_err(|_| PayloadError::NotUtf8)?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| PayloadError::MalformedJson(e.to_string()))?;
        let text_field = value
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| PayloadError::MalformedJson("missing \"text\" field".to_string()))?
            .to_string();
        let reply_to = match value.get("replyTo") {
            None | Some(Value::Null) => None,
            Some(reply_value) => {
                let txid = reply_value
                    .get("txid")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PayloadError::MalformedJson("replyTo.txid missing".to_string()))?
                    .to_string();
                let preview = reply_value
                    .get("preview")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PayloadError::MalformedJson("replyTo.preview missing".to_string()))?
                    .to_string();
                Some(ReplyTo { txid, preview })
            }
        };
        return Ok(DecodedPayload::Message(MessagePayload {
            text: text_field,
            reply_to,
        }));
    }

    let text = std::str::from_utf8(bytes).map_err(|_| PayloadError::NotUtf8)?;
    Ok(DecodedPayload::Message(MessagePayload::text(text)))
}
