//! Message framing: identifiers, sequence numbers, plain (unencrypted) packets.

use std::time::{SystemTime, UNIX_EPOCH};

/// Who produced a message and why. Encoded in the two low bits of its id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `..00`: sent by the client.
    ClientRequest,
    /// `..01`: sent by the server in reply to a client message.
    ServerResponse,
    /// `..11`: sent by the server on its own initiative.
    ServerInitiated,
}

impl MessageType {
    /// The low two bits every message id of this type carries.
    pub fn low_bits(self) -> i64 {
        match self {
            MessageType::ClientRequest => 0b00,
            MessageType::ServerResponse => 0b01,
            MessageType::ServerInitiated => 0b11,
        }
    }

    /// True if `msg_id` could have been produced by a client.
    pub fn is_client_id(msg_id: i64) -> bool { msg_id & 0b11 == 0 }

    /// True if `msg_id` could have been produced by a server.
    pub fn is_server_id(msg_id: i64) -> bool { msg_id & 0b01 == 1 }
}

/// Whether a message needs an acknowledgement (odd `seq_no`) or not (even).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SendMode {
    #[default]
    ContentRelated,
    NonContent,
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i32
}

// ─── MessageIdGenerator ──────────────────────────────────────────────────────

/// Produces strictly increasing message ids.
///
/// The upper 32 bits hold the (server-corrected) Unix time, the lower 32 bits
/// the sub-second part shifted left by two; the two low bits carry the
/// [`MessageType`].
#[derive(Clone, Debug, Default)]
pub struct MessageIdGenerator {
    last: i64,
    time_offset: i32,
}

impl MessageIdGenerator {
    pub fn new(time_offset: i32) -> Self {
        Self { last: 0, time_offset }
    }

    pub fn set_time_offset(&mut self, time_offset: i32) { self.time_offset = time_offset; }

    pub fn time_offset(&self) -> i32 { self.time_offset }

    /// The last id handed out, 0 if none.
    pub fn last(&self) -> i64 { self.last }

    pub fn next(&mut self, kind: MessageType) -> i64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let secs = (now.as_secs() as i64).wrapping_add(self.time_offset as i64) as u64;
        let nanos = now.subsec_nanos() as u64;
        let mut base = ((secs << 32) | (nanos << 2)) as i64 & !0b11;
        if base <= self.last {
            base = (self.last & !0b11) + 4;
        }
        self.last = base | kind.low_bits();
        self.last
    }
}

// ─── SeqNoGenerator ──────────────────────────────────────────────────────────

/// Per-connection `seq_no` counter.
///
/// Content-related messages get `2·n + 1` and advance `n`; the rest get `2·n`.
#[derive(Clone, Debug, Default)]
pub struct SeqNoGenerator {
    content_messages: i32,
}

impl SeqNoGenerator {
    pub fn new() -> Self { Self::default() }

    pub fn next(&mut self, mode: SendMode) -> i32 {
        match mode {
            SendMode::ContentRelated => {
                let n = self.content_messages * 2 + 1;
                self.content_messages += 1;
                n
            }
            SendMode::NonContent => self.content_messages * 2,
        }
    }

    /// Content-related messages sent so far.
    pub fn content_messages(&self) -> i32 { self.content_messages }
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// A message exchanged with the application layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub message_id: i64,
    pub sequence_number: i32,
    /// The TL-serialized body (constructor ID + fields).
    pub data: Vec<u8>,
}

/// Error parsing a [`PlainMessage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlainError {
    /// Shorter than the 20-byte header.
    TooShort { len: usize },
    /// `auth_key_id` is not zero.
    NotPlain { auth_key_id: i64 },
    /// Declared length disagrees with the bytes present.
    LengthMismatch { declared: usize, available: usize },
}

impl std::fmt::Display for PlainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plain message of {len} bytes is shorter than its header"),
            Self::NotPlain { auth_key_id } => write!(f, "auth_key_id {auth_key_id:#x} on a plain message"),
            Self::LengthMismatch { declared, available } =>
                write!(f, "plain message declares {declared} bytes but carries {available}"),
        }
    }
}
impl std::error::Error for PlainError {}

/// An unencrypted message, used only during the key exchange.
///
/// ```text
/// auth_key_id:long  (0)
/// message_id:long
/// message_data_length:int
/// message_data:bytes
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlainMessage {
    pub message_id: i64,
    pub payload: Vec<u8>,
}

impl PlainMessage {
    pub const HEADER_LEN: usize = 20;

    pub fn new(message_id: i64, payload: Vec<u8>) -> Self {
        Self { message_id, payload }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + self.payload.len());
        buf.extend(0i64.to_le_bytes());
        buf.extend(self.message_id.to_le_bytes());
        buf.extend((self.payload.len() as u32).to_le_bytes());
        buf.extend(&self.payload);
        buf
    }

    pub fn parse(packet: &[u8]) -> Result<Self, PlainError> {
        if packet.len() < Self::HEADER_LEN {
            return Err(PlainError::TooShort { len: packet.len() });
        }
        let word = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&packet[at..at + 8]);
            i64::from_le_bytes(b)
        };
        let auth_key_id = word(0);
        if auth_key_id != 0 {
            return Err(PlainError::NotPlain { auth_key_id });
        }
        let message_id = word(8);
        let declared = u32::from_le_bytes([packet[16], packet[17], packet[18], packet[19]]) as usize;
        let available = packet.len() - Self::HEADER_LEN;
        if declared != available {
            return Err(PlainError::LengthMismatch { declared, available });
        }
        Ok(Self { message_id, payload: packet[Self::HEADER_LEN..].to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_keep_type_bits_and_increase() {
        let mut g = MessageIdGenerator::new(0);
        let mut last = 0;
        for kind in [MessageType::ServerResponse, MessageType::ServerInitiated, MessageType::ServerResponse] {
            let id = g.next(kind);
            assert!(id > last);
            assert_eq!(id & 0b11, kind.low_bits());
            last = id;
        }
    }

    #[test]
    fn time_offset_shifts_high_word() {
        let a = MessageIdGenerator::new(0).next(MessageType::ClientRequest) >> 32;
        let b = MessageIdGenerator::new(1000).next(MessageType::ClientRequest) >> 32;
        assert!((999..=1001).contains(&(b - a)));
    }

    #[test]
    fn seq_numbers() {
        let mut s = SeqNoGenerator::new();
        assert_eq!(s.next(SendMode::NonContent), 0);
        assert_eq!(s.next(SendMode::ContentRelated), 1);
        assert_eq!(s.next(SendMode::ContentRelated), 3);
        assert_eq!(s.next(SendMode::NonContent), 4);
        assert_eq!(s.content_messages(), 2);
    }

    #[test]
    fn plain_layout() {
        let wire = PlainMessage::new(0x1234, vec![0xaa, 0xbb]).to_bytes();
        assert_eq!(wire.len(), 22);
        assert_eq!(&wire[..8], &[0u8; 8]);
        assert_eq!(u32::from_le_bytes(wire[16..20].try_into().unwrap()), 2);
        assert_eq!(PlainMessage::parse(&wire).unwrap().payload, vec![0xaa, 0xbb]);
        assert_eq!(PlainMessage::parse(&wire[..21]), Err(PlainError::LengthMismatch { declared: 2, available: 1 }));
        assert_eq!(PlainMessage::parse(&wire[..4]), Err(PlainError::TooShort { len: 4 }));
    }
}
