//! Envelope wire formats.
//!
//! Three standard-protocol (0x01) layouts coexist on the wire — v1 and
//! v2 are legacy, decrypt-only; v3 is the only version this crate
//! encodes. A fourth protocol byte (0x02) carries the PSK-ratchet
//! layout, which is structurally unrelated to the standard ones and is
//! never confused with them: decoding dispatches on
//! `(bytes[0], bytes[1])` exactly once, into a tagged union.
//!
//! ```text
//! v1  (proto 0x01): [ver=1][proto=1][senderStatic:32][nonce:12][ct..]            header 46
//! v2  (proto 0x01): [ver=2][proto=1][senderStatic:32][ephPub:32][nonce:12][ct..] header 78
//! v3  (proto 0x01): [ver=3][proto=1][senderStatic:32][ephPub:32][nonce:12][encSenderKey:48][ct..] header 126
//! psk (proto 0x02): [ver=1][proto=2][counter:4][senderStatic:32][ephPub:32][nonce:12][encSenderKey:48][ct..] header 130
//! ```

pub const PROTO_STANDARD: u8 = 0x01;
pub const PROTO_PSK: u8 = 0x02;

pub const V1_HEADER_LEN: usize = 2 + 32 + 12;
pub const V2_HEADER_LEN: usize = 2 + 32 + 32 + 12;
pub const V3_HEADER_LEN: usize = 2 + 32 + 32 + 12 + 48;
pub const PSK_HEADER_LEN: usize = 2 + 4 + 32 + 32 + 12 + 48;

/// Max plaintext a v3 envelope can carry inside a 1024-byte note.
pub const V3_MAX_PLAINTEXT: usize = 1024 - V3_HEADER_LEN - 16;
/// Max plaintext a PSK envelope can carry inside a 1024-byte note.
pub const PSK_MAX_PLAINTEXT: usize = 1024 - PSK_HEADER_LEN - 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope too short for its version: got {got} bytes, need at least {need}")]
    TooShort { got: usize, need: usize },
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported protocol byte: {0}")]
    UnsupportedProtocol(u8),
    #[error("envelope is empty")]
    Empty,
}

/// A standard-protocol (0x01) envelope, one variant per wire version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandardEnvelope {
    /// Legacy, decrypt-only. No forward secrecy, no bidirectional decrypt.
    V1 {
        sender_static: [u8; 32],
        nonce: [u8; 12],
        ciphertext: Vec<u8>,
    },
    /// Legacy, decrypt-only. Forward secrecy via an ephemeral key, but no
    /// sealed sender key, so the sender cannot decrypt their own message.
    V2 {
        sender_static: [u8; 32],
        eph_pub: [u8; 32],
        nonce: [u8; 12],
        ciphertext: Vec<u8>,
    },
    /// Current. Forward secrecy plus a sealed per-message key that lets
    /// the sender decrypt their own outbound message.
    V3 {
        sender_static: [u8; 32],
        eph_pub: [u8; 32],
        nonce: [u8; 12],
        enc_sender_key: [u8; 48],
        ciphertext: Vec<u8>,
    },
}

impl StandardEnvelope {
    pub fn version(&self) -> u8 {
        match self {
            StandardEnvelope::V1 { .. } => 1,
            StandardEnvelope::V2 { .. } => 2,
            StandardEnvelope::V3 { .. } => 3,
        }
    }

    pub fn sender_static(&self) -> &[u8; 32] {
        match self {
            StandardEnvelope::V1 { sender_static, .. }
            | StandardEnvelope::V2 { sender_static, .. }
            | StandardEnvelope::V3 { sender_static, .. } => sender_static,
        }
    }

    /// v1 derives its key straight from the two static keys; v2 and v3
    /// mix in a fresh ephemeral keypair per message.
    pub fn uses_forward_secrecy(&self) -> bool {
        !matches!(self, StandardEnvelope::V1 { .. })
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            StandardEnvelope::V1 {
                sender_static,
                nonce,
                ciphertext,
            } => {
                let mut out = Vec::with_capacity(V1_HEADER_LEN + ciphertext.len());
                out.push(1);
                out.push(PROTO_STANDARD);
                out.extend_from_slice(sender_static);
                out.extend_from_slice(nonce);
                out.extend_from_slice(ciphertext);
                out
            }
            StandardEnvelope::V2 {
                sender_static,
                eph_pub,
                nonce,
                ciphertext,
            } => {
                let mut out = Vec::with_capacity(V2_HEADER_LEN + ciphertext.len());
                out.push(2);
                out.push(PROTO_STANDARD);
                out.extend_from_slice(sender_static);
                out.extend_from_slice(eph_pub);
                out.extend_from_slice(nonce);
                out.extend_from_slice(ciphertext);
                out
            }
            StandardEnvelope::V3 {
                sender_static,
                eph_pub,
                nonce,
                enc_sender_key,
                ciphertext,
            } => {
                let mut out = Vec::with_capacity(V3_HEADER_LEN + ciphertext.len());
                out.push(3);
                out.push(PROTO_STANDARD);
                out.extend_from_slice(sender_static);
                out.extend_from_slice(eph_pub);
                out.extend_from_slice(nonce);
                out.extend_from_slice(enc_sender_key);
                out.extend_from_slice(ciphertext);
                out
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let version = bytes[0];
        match version {
            1 => {
                if bytes.len() < V1_HEADER_LEN {
                    return Err(EnvelopeError::TooShort {
                        got: bytes.len(),
                        need: V1_HEADER_LEN,
                    });
                }
                let mut sender_static = [0u8; 32];
                sender_static.copy_from_slice(&bytes[2..34]);
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(&bytes[34..46]);
                Ok(StandardEnvelope::V1 {
                    sender_static,
                    nonce,
                    ciphertext: bytes[46..].to_vec(),
                })
            }
            2 => {
                if bytes.len() < V2_HEADER_LEN {
                    return Err(EnvelopeError::TooShort {
                        got: bytes.len(),
                        need: V2_HEADER_LEN,
                    });
                }
                let mut sender_static = [0u8; 32];
                sender_static.copy_from_slice(&bytes[2..34]);
                let mut eph_pub = [0u8; 32];
                eph_pub.copy_from_slice(&bytes[34..66]);
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(&bytes[66..78]);
                Ok(StandardEnvelope::V2 {
                    sender_static,
                    eph_pub,
                    nonce,
                    ciphertext: bytes[78..].to_vec(),
                })
            }
            3 => {
                if bytes.len() < V3_HEADER_LEN {
                    return Err(EnvelopeError::TooShort {
                        got: bytes.len(),
                        need: V3_HEADER_LEN,
                    });
                }
                let mut sender_static = [0u8; 32];
                sender_static.copy_from_slice(&bytes[2..34]);
                let mut eph_pub = [0u8; 32];
                eph_pub.copy_from_slice(&bytes[34..66]);
                let mut nonce = [0u8; 12];
                nonce.copy_from_slice(&bytes[66..78]);
                let mut enc_sender_key = [0u8; 48];
                enc_sender_key.copy_from_slice(&bytes[78..126]);
                Ok(StandardEnvelope::V3 {
                    sender_static,
                    eph_pub,
                    nonce,
                    enc_sender_key,
                    ciphertext: bytes[126..].to_vec(),
                })
            }
            other => Err(EnvelopeError::UnsupportedVersion(other)),
        }
    }
}

/// A PSK-ratchet (protocol 0x02) envelope. Always version 1 on the wire;
/// the ratchet position, not the envelope version, evolves over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PskEnvelope {
    pub counter: u32,
    pub sender_static: [u8; 32],
    pub eph_pub: [u8; 32],
    pub nonce: [u8; 12],
    pub enc_sender_key: [u8; 48],
    pub ciphertext: Vec<u8>,
}

impl PskEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PSK_HEADER_LEN + self.ciphertext.len());
        out.push(1);
        out.push(PROTO_PSK);
        out.extend_from_slice(&self.counter.to_be_bytes());
        out.extend_from_slice(&self.sender_static);
        out.extend_from_slice(&self.eph_pub);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.enc_sender_key);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes[0] != 1 {
            return Err(EnvelopeError::UnsupportedVersion(bytes[0]));
        }
        if bytes.len() < PSK_HEADER_LEN {
            return Err(EnvelopeError::TooShort {
                got: bytes.len(),
                need: PSK_HEADER_LEN,
            });
        }
        let counter = u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let mut sender_static = [0u8; 32];
        sender_static.copy_from_slice(&bytes[6..38]);
        let mut eph_pub = [0u8; 32];
        eph_pub.copy_from_slice(&bytes[38..70]);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[70..82]);
        let mut enc_sender_key = [0u8; 48];
        enc_sender_key.copy_from_slice(&bytes[82..130]);
        Ok(PskEnvelope {
            counter,
            sender_static,
            eph_pub,
            nonce,
            enc_sender_key,
            ciphertext: bytes[130..].to_vec(),
        })
    }
}

/// The result of decoding an envelope: exactly one of the two wire
/// families. The dispatch happens once, here, and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEnvelope {
    Standard(StandardEnvelope),
    Psk(PskEnvelope),
}

impl DecodedEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DecodedEnvelope::Standard(e) => e.encode(),
            DecodedEnvelope::Psk(e) => e.encode(),
        }
    }
}

/// Decode a note's bytes into a tagged envelope. Inspects `bytes[0..2]`
/// (version, protocol) to choose the layout, then validates length.
pub fn decode(bytes: &[u8]) -> Result<DecodedEnvelope, EnvelopeError> {
    if bytes.is_empty() {
        return Err(EnvelopeError::Empty);
    }
    if bytes.len() < 2 {
        return Err(EnvelopeError::TooShort { got: bytes.len(), need: 2 });
    }
    match bytes[1] {
        PROTO_STANDARD => StandardEnvelope::decode(bytes).map(DecodedEnvelope::Standard),
        PROTO_PSK => PskEnvelope::decode(bytes).map(DecodedEnvelope::Psk),
        other => Err(EnvelopeError::UnsupportedProtocol(other)),
    }
}

/// True only when `bytes` decodes as a recognized, length-valid
/// envelope. Used by the indexer to classify notes before attempting a
/// full decode.
pub fn is_chat_message(bytes: &[u8]) -> bool {
    decode(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3_fixture(ct_len: usize) -> StandardEnvelope {
        StandardEnvelope::V3 {
            sender_static: [0x01; 32],
            eph_pub: [0x02; 32],
            nonce: [0x03; 12],
            enc_sender_key: [0x04; 48],
            ciphertext: vec![0x05; ct_len],
        }
    }

    #[test]
    fn v1_round_trip() {
        let env = StandardEnvelope::V1 {
            sender_static: [0xAA; 32],
            nonce: [0xBB; 12],
            ciphertext: b"hello".to_vec(),
        };
        let encoded = env.encode();
        assert_eq!(encoded.len(), V1_HEADER_LEN + 5);
        match decode(&encoded).unwrap() {
            DecodedEnvelope::Standard(decoded) => assert_eq!(decoded, env),
            _ => panic!("expected standard envelope"),
        }
    }

    #[test]
    fn v2_round_trip() {
        let env = StandardEnvelope::V2 {
            sender_static: [0xAA; 32],
            eph_pub: [0xCC; 32],
            nonce: [0xBB; 12],
            ciphertext: b"hello there".to_vec(),
        };
        let encoded = env.encode();
        match decode(&encoded).unwrap() {
            DecodedEnvelope::Standard(decoded) => assert_eq!(decoded, env),
            _ => panic!("expected standard envelope"),
        }
    }

    #[test]
    fn v3_round_trip() {
        let env = v3_fixture(16);
        let encoded = env.encode();
        match decode(&encoded).unwrap() {
            DecodedEnvelope::Standard(decoded) => assert_eq!(decoded, env),
            _ => panic!("expected standard envelope"),
        }
    }

    #[test]
    fn psk_round_trip() {
        let env = PskEnvelope {
            counter: 0xDEADBEEF,
            sender_static: [0x11; 32],
            eph_pub: [0x22; 32],
            nonce: [0x33; 12],
            enc_sender_key: [0x44; 48],
            ciphertext: b"psk payload".to_vec(),
        };
        let encoded = env.encode();
        match decode(&encoded).unwrap() {
            DecodedEnvelope::Psk(decoded) => assert_eq!(decoded, env),
            _ => panic!("expected psk envelope"),
        }
    }

    #[test]
    fn v3_max_size_is_1024_bytes() {
        let env = v3_fixture(V3_MAX_PLAINTEXT + 16);
        assert_eq!(env.encode().len(), 1024);
    }

    #[test]
    fn psk_max_size_is_1024_bytes() {
        let env = PskEnvelope {
            counter: 1,
            sender_static: [0; 32],
            eph_pub: [0; 32],
            nonce: [0; 12],
            enc_sender_key: [0; 48],
            ciphertext: vec![0; PSK_MAX_PLAINTEXT + 16],
        };
        assert_eq!(env.encode().len(), 1024);
    }

    #[test]
    fn standard_decoder_rejects_psk_protocol() {
        let mut bytes = vec![1u8, PROTO_PSK];
        bytes.extend_from_slice(&[0u8; PSK_HEADER_LEN]);
        match decode(&bytes) {
            Ok(DecodedEnvelope::Psk(_)) => {}
            other => panic!("expected PSK envelope, got {other:?}"),
        }
    }

    #[test]
    fn psk_decoder_rejects_standard_protocol() {
        let env = StandardEnvelope::V1 {
            sender_static: [0; 32],
            nonce: [0; 12],
            ciphertext: vec![],
        };
        let encoded = env.encode();
        // bytes[1] is PROTO_STANDARD, so PskEnvelope::decode must never be reached
        // by the public decode() dispatcher for these bytes.
        match decode(&encoded).unwrap() {
            DecodedEnvelope::Standard(_) => {}
            DecodedEnvelope::Psk(_) => panic!("standard bytes must not decode as psk"),
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let bytes = vec![9u8, PROTO_STANDARD, 0, 0];
        assert_eq!(decode(&bytes), Err(EnvelopeError::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_unknown_protocol() {
        let bytes = vec![1u8, 0x7F];
        assert_eq!(decode(&bytes), Err(EnvelopeError::UnsupportedProtocol(0x7F)));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = vec![3u8, PROTO_STANDARD, 0, 0];
        assert!(matches!(decode(&bytes), Err(EnvelopeError::TooShort { .. })));
    }

    #[test]
    fn is_chat_message_true_for_valid_envelope() {
        let env = v3_fixture(10);
        assert!(is_chat_message(&env.encode()));
    }

    #[test]
    fn is_chat_message_false_for_garbage() {
        assert!(!is_chat_message(b"not an envelope"));
        assert!(!is_chat_message(&[]));
    }
}
