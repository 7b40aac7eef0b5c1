//! Encrypted message layer (post auth-key).
//!
//! Once a [`HandshakeOutput`] exists, construct a [`SecureMessageLayer`] and
//! use it to seal every outgoing payload and open every incoming packet.
//!
//! Plaintext layout before encryption:
//!
//! ```text
//! salt:       long
//! session_id: long
//! msg_id:     long
//! seq_no:     int
//! length:     int
//! body:       bytes[length]
//! padding:    random
//! ```

use mtp_crypto::random::random_array;
use mtp_crypto::{
    AuthKey, CryptoError, DequeBuffer, ENCRYPTED_HEADER_LEN, MESSAGE_HEADER_LEN, ProtocolVersion,
    RandomSource, Side, decrypt_message, encrypt_message,
};
use mtp_tl::{Deserializable, Identifiable, Serializable, enums, gzip, types};

use crate::ErrorClass;
use crate::handshake::HandshakeOutput;
use crate::message::{Message, MessageIdGenerator, MessageType, SendMode, SeqNoGenerator};

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors sealing or opening encrypted packets.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Shorter than 24 bytes, or the ciphertext is not block aligned.
    InvalidPacketLength { len: usize },
    Crypto(CryptoError),
    ContentLengthOutOfRange { declared: usize, available: usize },
    InvalidPadding { len: usize },
    SessionMismatch { got: i64, expected: i64 },
    /// The low bits of the id do not match the peer's role.
    InvalidMessageId { msg_id: i64 },
    /// A message type this side may not send.
    InvalidMessageType { kind: MessageType },
    /// A server cannot send before the client's first packet names the session.
    SessionUnbound,
    Decode(mtp_tl::deserialize::Error),
    NestedContainer { msg_id: i64 },
    /// A `gzip_packed` body that inflates to another `gzip_packed`.
    NestedGzip { msg_id: i64 },
    /// Some sub-messages of a container were rejected; the others were
    /// delivered.
    ContainerPartiallyFailed { delivered: usize, failures: Vec<(i64, Error)> },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidPacketLength { .. }
            | Self::Decode(_)
            | Self::Crypto(CryptoError::InvalidBuffer) => ErrorClass::TransportFatal,
            Self::Crypto(CryptoError::UnalignedInput { .. })
            | Self::InvalidMessageType { .. }
            | Self::SessionUnbound => ErrorClass::Programming,
            _ => ErrorClass::Integrity,
        }
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPacketLength { len } => write!(f, "encrypted packet of {len} bytes"),
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::ContentLengthOutOfRange { declared, available } =>
                write!(f, "content length {declared} does not fit in {available} bytes"),
            Self::InvalidPadding { len } => write!(f, "{len} bytes of padding"),
            Self::SessionMismatch { got, expected } =>
                write!(f, "session_id {got:#x}, expected {expected:#x}"),
            Self::InvalidMessageId { msg_id } => write!(f, "msg_id {msg_id:#x} has the wrong parity"),
            Self::InvalidMessageType { kind } => write!(f, "this side cannot send {kind:?}"),
            Self::SessionUnbound => write!(f, "no session id yet"),
            Self::Decode(e) => write!(f, "malformed body: {e}"),
            Self::NestedContainer { msg_id } => write!(f, "container nested in container (msg_id {msg_id:#x})"),
            Self::NestedGzip { msg_id } => write!(f, "gzip_packed nested in gzip_packed (msg_id {msg_id:#x})"),
            Self::ContainerPartiallyFailed { delivered, failures } =>
                write!(f, "{} container entries rejected, {delivered} delivered", failures.len()),
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self { Self::Crypto(e) }
}

impl From<mtp_tl::deserialize::Error> for Error {
    fn from(e: mtp_tl::deserialize::Error) -> Self { Self::Decode(e) }
}

// ─── SecureMessageLayer ──────────────────────────────────────────────────────

/// Per-connection encrypted session state.
///
/// Wraps the `AuthKey` and tracks the session id, message id and `seq_no`
/// counters and the server salt. Counters live as long as the layer; a new
/// key exchange means a new layer.
pub struct SecureMessageLayer {
    auth_key: AuthKey,
    version: ProtocolVersion,
    side: Side,
    session_id: i64,
    session_bound: bool,
    salt: i64,
    msg_ids: MessageIdGenerator,
    seq: SeqNoGenerator,
    rng: Box<dyn RandomSource + Send>,
}

impl SecureMessageLayer {
    /// Build the layer for `side` from a finished handshake.
    ///
    /// A client picks a random session id; a server adopts the one in the
    /// first packet it accepts.
    pub fn new(
        output: HandshakeOutput,
        version: ProtocolVersion,
        side: Side,
        mut rng: Box<dyn RandomSource + Send>,
    ) -> Self {
        let (session_id, session_bound) = match side {
            Side::Client => (i64::from_le_bytes(random_array(&mut rng)), true),
            Side::Server => (0, false),
        };
        Self {
            auth_key: output.auth_key,
            version,
            side,
            session_id,
            session_bound,
            salt: output.server_salt,
            msg_ids: MessageIdGenerator::new(output.time_offset),
            seq: SeqNoGenerator::new(),
            rng,
        }
    }

    /// Use a fixed session id instead.
    pub fn with_session_id(mut self, session_id: i64) -> Self {
        self.session_id = session_id;
        self.session_bound = true;
        self
    }

    pub fn auth_key(&self) -> &AuthKey { &self.auth_key }
    pub fn version(&self) -> ProtocolVersion { self.version }
    pub fn side(&self) -> Side { self.side }
    pub fn session_id(&self) -> i64 { self.session_id }
    pub fn salt(&self) -> i64 { self.salt }
    pub fn time_offset(&self) -> i32 { self.msg_ids.time_offset() }

    /// Content-related messages sent so far.
    pub fn content_messages(&self) -> i32 { self.seq.content_messages() }

    /// Replace the server salt (after a salt update from the peer).
    pub fn set_salt(&mut self, salt: i64) {
        log::debug!("[secure] salt updated");
        self.salt = salt;
    }

    pub fn set_time_offset(&mut self, time_offset: i32) {
        self.msg_ids.set_time_offset(time_offset);
    }

    /// The message type [`send`](Self::send) uses when the caller does not care.
    pub fn default_message_type(&self) -> MessageType {
        match self.side {
            Side::Client => MessageType::ClientRequest,
            Side::Server => MessageType::ServerResponse,
        }
    }

    fn check_can_send(&self, kind: MessageType) -> Result<(), Error> {
        let allowed = match self.side {
            Side::Client => kind == MessageType::ClientRequest,
            Side::Server => kind != MessageType::ClientRequest,
        };
        if !allowed {
            return Err(Error::InvalidMessageType { kind });
        }
        if !self.session_bound {
            return Err(Error::SessionUnbound);
        }
        Ok(())
    }

    // ─── Sending ─────────────────────────────────────────────────────────────

    /// Seal `payload` into a ready-to-send packet. Returns the packet and the
    /// `msg_id` it was given.
    pub fn send(&mut self, payload: &[u8], mode: SendMode, kind: MessageType) -> Result<(Vec<u8>, i64), Error> {
        self.check_can_send(kind)?;
        let msg_id = self.msg_ids.next(kind);
        let seq_no = self.seq.next(mode);
        Ok((self.seal(msg_id, seq_no, payload), msg_id))
    }

    /// Pack several payloads into one `msg_container`.
    ///
    /// Returns the packet, the container's `msg_id` and the ids of the
    /// entries, in order.
    pub fn send_container(
        &mut self,
        items: &[(&[u8], SendMode)],
        kind: MessageType,
    ) -> Result<(Vec<u8>, i64, Vec<i64>), Error> {
        self.check_can_send(kind)?;
        let mut ids = Vec::with_capacity(items.len());
        let messages = items
            .iter()
            .map(|(payload, mode)| {
                let msg_id = self.msg_ids.next(kind);
                ids.push(msg_id);
                types::Message { msg_id, seqno: self.seq.next(*mode), body: payload.to_vec() }
            })
            .collect();
        let body = enums::MessageContainer::MsgContainer(types::MsgContainer { messages }).to_bytes();
        let msg_id = self.msg_ids.next(kind);
        let seq_no = self.seq.next(SendMode::NonContent);
        Ok((self.seal(msg_id, seq_no, &body), msg_id, ids))
    }

    fn seal(&mut self, msg_id: i64, seq_no: i32, body: &[u8]) -> Vec<u8> {
        let mut buf = DequeBuffer::with_capacity(MESSAGE_HEADER_LEN + body.len() + 32, ENCRYPTED_HEADER_LEN);
        buf.extend(self.salt.to_le_bytes());
        buf.extend(self.session_id.to_le_bytes());
        buf.extend(msg_id.to_le_bytes());
        buf.extend(seq_no.to_le_bytes());
        buf.extend((body.len() as u32).to_le_bytes());
        buf.extend(body.iter().copied());
        encrypt_message(&mut buf, &self.auth_key, self.side, self.version, &mut self.rng);
        log::debug!("[secure] sealed msg_id={msg_id:#x} seq_no={seq_no} body={}B", body.len());
        buf.into_vec()
    }

    // ─── Receiving ───────────────────────────────────────────────────────────

    /// Open `packet` and collect the messages it carries.
    ///
    /// On [`Error::ContainerPartiallyFailed`] the delivered messages are not
    /// returned; use [`receive_with`](Self::receive_with) to see them.
    pub fn receive(&mut self, packet: &[u8]) -> Result<Vec<Message>, Error> {
        let mut out = Vec::new();
        self.receive_with(packet, |m| out.push(m))?;
        Ok(out)
    }

    /// Open `packet` and hand each message it carries to `sink`, in order.
    ///
    /// Nothing about the session changes unless the packet authenticates.
    /// Returns how many messages were delivered.
    pub fn receive_with(&mut self, packet: &[u8], mut sink: impl FnMut(Message)) -> Result<usize, Error> {
        if packet.len() < ENCRYPTED_HEADER_LEN || (packet.len() - ENCRYPTED_HEADER_LEN) % 16 != 0 {
            return Err(Error::InvalidPacketLength { len: packet.len() });
        }
        let mut copy = packet.to_vec();
        let plain = decrypt_message(&mut copy, &self.auth_key, self.side.peer(), self.version)?;
        if plain.len() < MESSAGE_HEADER_LEN {
            return Err(Error::InvalidPacketLength { len: packet.len() });
        }

        let long = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&plain[at..at + 8]);
            i64::from_le_bytes(b)
        };
        let session_id = long(8);
        let msg_id = long(16);
        let seq_no = i32::from_le_bytes([plain[24], plain[25], plain[26], plain[27]]);
        let declared = u32::from_le_bytes([plain[28], plain[29], plain[30], plain[31]]) as usize;

        let available = plain.len() - MESSAGE_HEADER_LEN;
        if declared > available || declared % 4 != 0 {
            return Err(Error::ContentLengthOutOfRange { declared, available });
        }
        let padding = available - declared;
        let padding_ok = match self.version {
            ProtocolVersion::V1 => padding < 16,
            ProtocolVersion::V2 => (12..=1024).contains(&padding),
        };
        if !padding_ok {
            return Err(Error::InvalidPadding { len: padding });
        }
        if self.session_bound && session_id != self.session_id {
            return Err(Error::SessionMismatch { got: session_id, expected: self.session_id });
        }
        self.check_peer_msg_id(msg_id)?;

        let body = plain[MESSAGE_HEADER_LEN..MESSAGE_HEADER_LEN + declared].to_vec();
        if !self.session_bound {
            log::info!("[secure] adopted session {session_id:#x}");
            self.session_id = session_id;
            self.session_bound = true;
        }
        log::debug!("[secure] opened msg_id={msg_id:#x} seq_no={seq_no} body={declared}B");
        self.deliver(msg_id, seq_no, body, false, &mut sink)
    }

    fn check_peer_msg_id(&self, msg_id: i64) -> Result<(), Error> {
        let ok = match self.side.peer() {
            Side::Client => MessageType::is_client_id(msg_id),
            Side::Server => MessageType::is_server_id(msg_id),
        };
        if ok { Ok(()) } else { Err(Error::InvalidMessageId { msg_id }) }
    }

    fn deliver(
        &self,
        msg_id: i64,
        seq_no: i32,
        body: Vec<u8>,
        in_container: bool,
        sink: &mut dyn FnMut(Message),
    ) -> Result<usize, Error> {
        match mtp_tl::peek_tag(&body) {
            Some(id) if id == types::MsgContainer::CONSTRUCTOR_ID => {
                if in_container {
                    return Err(Error::NestedContainer { msg_id });
                }
                let enums::MessageContainer::MsgContainer(container) =
                    enums::MessageContainer::from_bytes(&body)?;
                let mut delivered = 0;
                let mut failures = Vec::new();
                for sub in container.messages {
                    let sub_id = sub.msg_id;
                    let result = match self.check_peer_msg_id(sub_id) {
                        Ok(()) => self.deliver(sub_id, sub.seqno, sub.body, true, &mut *sink),
                        Err(e) => Err(e),
                    };
                    match result {
                        Ok(n) => delivered += n,
                        Err(e) => {
                            log::warn!("[secure] container entry {sub_id:#x} rejected: {e}");
                            failures.push((sub_id, e));
                        }
                    }
                }
                if failures.is_empty() {
                    Ok(delivered)
                } else {
                    Err(Error::ContainerPartiallyFailed { delivered, failures })
                }
            }
            Some(id) if id == types::GzipPacked::CONSTRUCTOR_ID => {
                let inner = gzip::gzip_unpack(&body)?;
                if mtp_tl::peek_tag(&inner) == Some(types::GzipPacked::CONSTRUCTOR_ID) {
                    return Err(Error::NestedGzip { msg_id });
                }
                self.deliver(msg_id, seq_no, inner, in_container, sink)
            }
            _ => {
                sink(Message { message_id: msg_id, sequence_number: seq_no, data: body });
                Ok(1)
            }
        }
    }
}

impl std::fmt::Debug for SecureMessageLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureMessageLayer")
            .field("auth_key", &self.auth_key)
            .field("version", &self.version)
            .field("side", &self.side)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtp_crypto::DeterministicRandomSource;

    fn output() -> HandshakeOutput {
        HandshakeOutput {
            auth_key: AuthKey::from_bytes(core::array::from_fn(|i| (i * 7 + 3) as u8)),
            server_salt: 0x0102030405060708,
            time_offset: 0,
        }
    }

    fn layer(side: Side) -> SecureMessageLayer {
        let seed: &[u8] = match side { Side::Client => b"c", Side::Server => b"s" };
        SecureMessageLayer::new(output(), ProtocolVersion::V2, side, Box::new(DeterministicRandomSource::new(seed)))
    }

    #[test]
    fn client_cannot_send_server_types() {
        let mut c = layer(Side::Client);
        assert_eq!(
            c.send(&[0; 4], SendMode::ContentRelated, MessageType::ServerResponse),
            Err(Error::InvalidMessageType { kind: MessageType::ServerResponse })
        );
    }

    #[test]
    fn server_waits_for_session() {
        let mut s = layer(Side::Server);
        assert_eq!(
            s.send(&[0; 4], SendMode::ContentRelated, MessageType::ServerResponse),
            Err(Error::SessionUnbound)
        );
        let mut c = layer(Side::Client);
        let (packet, _) = c.send(&[1, 2, 3, 4], SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
        s.receive(&packet).unwrap();
        assert_eq!(s.session_id(), c.session_id());
        assert!(s.send(&[0; 4], SendMode::ContentRelated, MessageType::ServerResponse).is_ok());
    }
}
