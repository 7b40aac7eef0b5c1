//! Connection coordinator: one handshake, then one secure session.
//!
//! A [`Connection`] owns the negotiation engine until a key exists and the
//! [`SecureMessageLayer`] afterwards. It is fed complete packets through
//! [`on_bytes_received`](Connection::on_bytes_received) and writes its own
//! packets to the [`Transport`]; every message the peer sends ends up in the
//! [`Dispatcher`].

use std::sync::Arc;

use mtp_crypto::{AuthKey, OsRandom, RandomSource};

use crate::config::{Config, RoleKind};
use crate::error::Error;
use crate::handshake::{self, HandshakeEngine, HandshakeOutput, Initiator, Responder, State};
use crate::message::{MessageIdGenerator, MessageType, PlainMessage, SendMode};
use crate::secure::{self, SecureMessageLayer};
use crate::transport::{Dispatcher, Transport};

/// Lifecycle of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshaking,
    Ready,
    Closed,
}

// ─── Negotiator ──────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Negotiator {
    Client(HandshakeEngine<Initiator>),
    Server(HandshakeEngine<Responder>),
}

impl Negotiator {
    fn start(&mut self) -> Result<Option<Vec<u8>>, handshake::Error> {
        match self {
            Self::Client(e) => e.start(),
            Self::Server(e) => e.start(),
        }
    }

    fn process_incoming(&mut self, payload: &[u8]) -> Result<Option<Vec<u8>>, handshake::Error> {
        match self {
            Self::Client(e) => e.process_incoming(payload),
            Self::Server(e) => e.process_incoming(payload),
        }
    }

    fn state(&self) -> State {
        match self {
            Self::Client(e) => e.state(),
            Self::Server(e) => e.state(),
        }
    }

    fn retries(&self) -> u32 {
        match self {
            Self::Client(e) => e.retries(),
            Self::Server(e) => e.retries(),
        }
    }

    fn into_parts(self) -> (Option<HandshakeOutput>, Box<dyn RandomSource + Send>) {
        match self {
            Self::Client(e) => e.into_parts(),
            Self::Server(e) => e.into_parts(),
        }
    }
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// A single MTProto connection, client or server side.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mtp_proto::{Config, Connection, Message};
/// # let key: mtp_crypto::RsaKey = unimplemented!();
///
/// let mut outbox: Vec<Vec<u8>> = Vec::new();
/// let mut inbox: Vec<Message> = Vec::new();
/// let mut conn = Connection::new(Config::client(Arc::new(key)), &mut outbox, &mut inbox)?;
/// conn.start()?;
/// // write `outbox` to the socket, feed replies to `conn.on_bytes_received`
/// # Ok::<(), mtp_proto::Error>(())
/// ```
pub struct Connection<T: Transport, D: Dispatcher> {
    config: Config,
    transport: T,
    dispatcher: D,
    state: ConnectionState,
    negotiator: Option<Negotiator>,
    secure: Option<SecureMessageLayer>,
    plain_ids: MessageIdGenerator,
}

impl<T: Transport, D: Dispatcher> Connection<T, D> {
    /// Build a connection drawing randomness from the OS.
    pub fn new(config: Config, transport: T, dispatcher: D) -> Result<Self, Error> {
        Self::with_rng(config, transport, dispatcher, Box::new(OsRandom))
    }

    /// Build a connection with an explicit random source.
    pub fn with_rng(
        config: Config,
        transport: T,
        dispatcher: D,
        rng: Box<dyn RandomSource + Send>,
    ) -> Result<Self, Error> {
        config.validate().map_err(Error::InvalidConfig)?;
        let key = Arc::clone(&config.server_rsa_key);
        let negotiator = match config.role {
            RoleKind::Client => Negotiator::Client(HandshakeEngine::client(key, rng)),
            RoleKind::Server => {
                let engine = HandshakeEngine::server(key, config.dh_group.clone(), rng);
                Negotiator::Server(if config.force_dh_retry { engine.with_forced_retry() } else { engine })
            }
        };
        Ok(Self {
            config,
            transport,
            dispatcher,
            state: ConnectionState::Handshaking,
            negotiator: Some(negotiator),
            secure: None,
            plain_ids: MessageIdGenerator::default(),
        })
    }

    pub fn state(&self) -> ConnectionState { self.state }

    pub fn config(&self) -> &Config { &self.config }

    /// Where the key exchange is, while it runs.
    pub fn handshake_state(&self) -> Option<State> {
        self.negotiator.as_ref().map(Negotiator::state)
    }

    pub fn auth_key(&self) -> Option<&AuthKey> {
        self.secure.as_ref().map(SecureMessageLayer::auth_key)
    }

    pub fn secure(&self) -> Option<&SecureMessageLayer> { self.secure.as_ref() }

    /// Direct access to the session, e.g. to apply a salt update.
    pub fn secure_mut(&mut self) -> Option<&mut SecureMessageLayer> { self.secure.as_mut() }

    pub fn transport(&self) -> &T { &self.transport }

    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }

    pub fn dispatcher(&self) -> &D { &self.dispatcher }

    pub fn dispatcher_mut(&mut self) -> &mut D { &mut self.dispatcher }

    /// Begin the key exchange. A client sends `req_pq`; a server just waits.
    pub fn start(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        let result = self.start_inner();
        self.settle(result)
    }

    fn start_inner(&mut self) -> Result<(), Error> {
        let negotiator = self
            .negotiator
            .as_mut()
            .ok_or(Error::Handshake(handshake::Error::InvalidState { state: State::HasKey }))?;
        if let Some(payload) = negotiator.start()? {
            self.send_plain(payload)?;
        }
        Ok(())
    }

    /// Feed one complete packet from the transport.
    pub fn on_bytes_received(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.ensure_open()?;
        let result = self.route(packet);
        self.settle(result)
    }

    fn route(&mut self, packet: &[u8]) -> Result<(), Error> {
        let key_id = packet.get(..8).ok_or(Error::MalformedPacket { len: packet.len() })?;
        if key_id == [0u8; 8] {
            self.on_plain(packet)
        } else {
            let secure = self.secure.as_mut().ok_or(Error::UnexpectedEncryptedMessage)?;
            let dispatcher = &mut self.dispatcher;
            let delivered = secure.receive_with(packet, |message| dispatcher.dispatch(message))?;
            log::debug!("[conn] dispatched {delivered} message(s)");
            Ok(())
        }
    }

    fn on_plain(&mut self, packet: &[u8]) -> Result<(), Error> {
        let negotiator = self.negotiator.as_mut().ok_or(Error::UnexpectedPlainMessage)?;
        let plain = PlainMessage::parse(packet)?;
        log::debug!("[conn] plain msg_id={:#x} ({} bytes)", plain.message_id, plain.payload.len());

        let reply = negotiator.process_incoming(&plain.payload)?;
        let limit = self.config.max_dh_retries;
        if self.config.role == RoleKind::Client && negotiator.retries() > limit {
            return Err(Error::TooManyRetries { limit });
        }
        let done = negotiator.state() == State::HasKey;

        if let Some(payload) = reply {
            self.send_plain(payload)?;
        }
        if done {
            self.promote()?;
        }
        Ok(())
    }

    /// Swap the finished engine for the secure layer.
    fn promote(&mut self) -> Result<(), Error> {
        let Some(negotiator) = self.negotiator.take() else {
            return Ok(());
        };
        let state = negotiator.state();
        let (output, rng) = negotiator.into_parts();
        let output = output.ok_or(Error::Handshake(handshake::Error::InvalidState { state }))?;
        let side = self.config.role.side();
        self.secure = Some(SecureMessageLayer::new(output, self.config.protocol_version, side, rng));
        self.state = ConnectionState::Ready;
        log::info!("[conn] {:?} ready ({:?})", self.config.role, self.config.protocol_version);
        Ok(())
    }

    fn send_plain(&mut self, payload: Vec<u8>) -> Result<(), Error> {
        let kind = match self.config.role {
            RoleKind::Client => MessageType::ClientRequest,
            RoleKind::Server => MessageType::ServerResponse,
        };
        let packet = PlainMessage::new(self.plain_ids.next(kind), payload).to_bytes();
        self.write(&packet)
    }

    fn write(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.transport
            .send_bytes(packet)
            .map_err(|e| Error::Transport(Box::new(e)))
    }

    // ─── Encrypted sending ───────────────────────────────────────────────────

    /// Send a content-related message. Returns its `msg_id`.
    pub fn enqueue(&mut self, payload: &[u8]) -> Result<i64, Error> {
        let kind = match self.config.role {
            RoleKind::Client => MessageType::ClientRequest,
            RoleKind::Server => MessageType::ServerResponse,
        };
        self.enqueue_with(payload, SendMode::ContentRelated, kind)
    }

    /// Send a message with explicit sequencing and type.
    pub fn enqueue_with(&mut self, payload: &[u8], mode: SendMode, kind: MessageType) -> Result<i64, Error> {
        self.ensure_open()?;
        let result = self.seal_and_write(|secure| secure.send(payload, mode, kind));
        self.settle(result)
    }

    /// Send several messages in one container. Returns the container's
    /// `msg_id` and the ids of its entries.
    pub fn enqueue_container(&mut self, items: &[(&[u8], SendMode)]) -> Result<(i64, Vec<i64>), Error> {
        self.ensure_open()?;
        let result = self.seal_and_write(|secure| {
            let kind = secure.default_message_type();
            secure.send_container(items, kind).map(|(packet, id, ids)| (packet, (id, ids)))
        });
        self.settle(result)
    }

    fn seal_and_write<R>(
        &mut self,
        seal: impl FnOnce(&mut SecureMessageLayer) -> Result<(Vec<u8>, R), secure::Error>,
    ) -> Result<R, Error> {
        let secure = self.secure.as_mut().ok_or(Error::NotReady)?;
        let (packet, out) = seal(secure)?;
        self.write(&packet)?;
        Ok(out)
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Drop all session state. Further calls fail with [`Error::Closed`].
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            log::info!("[conn] closed");
        }
        self.state = ConnectionState::Closed;
        self.negotiator = None;
        self.secure = None;
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.state == ConnectionState::Closed { Err(Error::Closed) } else { Ok(()) }
    }

    fn settle<R>(&mut self, result: Result<R, Error>) -> Result<R, Error> {
        if let Err(e) = &result {
            if self.must_close(e) {
                log::warn!("[conn] closing after {:?} error: {e}", e.class());
                self.close();
            } else {
                log::warn!("[conn] {e}");
            }
        }
        result
    }

    fn must_close(&self, e: &Error) -> bool {
        match e {
            Error::Secure(secure::Error::ContainerPartiallyFailed { .. }) => false,
            Error::TooManyRetries { .. } => true,
            _ if self.handshake_state() == Some(State::Failed) => true,
            _ => e.class().is_fatal(),
        }
    }
}

impl<T: Transport, D: Dispatcher> std::fmt::Debug for Connection<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.config.role)
            .field("state", &self.state)
            .field("handshake", &self.handshake_state())
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}
