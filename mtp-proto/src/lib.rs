//! MTProto session engine: key exchange, encrypted messaging, connections.
//!
//! This crate handles:
//! * The DH key exchange, client and server roles ([`handshake`])
//! * Message ids, sequence numbers and plaintext framing ([`message`])
//! * Encrypted sessions with containers and `gzip_packed` ([`secure`])
//! * A coordinator tying both to a transport ([`Connection`])
//!
//! It is transport-agnostic: bring your own TCP/WebSocket and feed complete
//! packets to [`Connection::on_bytes_received`].

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod secure;
pub mod transport;

pub use config::{Config, DhGroup, RoleKind};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, ErrorClass};
pub use handshake::{HandshakeEngine, HandshakeOutput, Initiator, Responder};
pub use message::{Message, MessageIdGenerator, MessageType, PlainMessage, SendMode, SeqNoGenerator};
pub use mtp_crypto::{ProtocolVersion, Side};
pub use secure::SecureMessageLayer;
pub use transport::{Dispatcher, Transport};
