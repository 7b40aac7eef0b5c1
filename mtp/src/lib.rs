//! # mtp — MTProto 2.0 engine
//!
//! `mtp` wires three focused sub-crates together for convenience:
//!
//! | Sub-crate    | Role                                                         |
//! |--------------|--------------------------------------------------------------|
//! | `mtp-tl`     | TL codec plus the handshake and service records              |
//! | `mtp-crypto` | AES-IGE, SHA, RSA, PQ factorization, `AuthKey`, packet keys  |
//! | `mtp-proto`  | DH key exchange, encrypted sessions, connection coordinator  |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mtp::{Config, Connection, Message, RsaKey};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let pem = "";
//! let key = Arc::new(RsaKey::from_pem(pem)?);
//! let mut outbox: Vec<Vec<u8>> = Vec::new();
//! let mut inbox: Vec<Message> = Vec::new();
//! let mut conn = Connection::new(Config::client(key), &mut outbox, &mut inbox)?;
//!
//! // `req_pq` is now waiting in `outbox`
//! conn.start()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

/// Re-export of [`mtp_tl`]: codec traits, records, gzip helpers.
pub use mtp_tl as tl;

/// Re-export of [`mtp_crypto`]: AES-IGE, SHA, RSA, factorize, AuthKey.
pub use mtp_crypto as crypto;

/// Re-export of [`mtp_proto`]: handshake, secure layer, connection.
pub use mtp_proto as proto;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use mtp_tl::{Deserializable, Identifiable, RemoteCall, Serializable};

pub use mtp_crypto::{AuthKey, ProtocolVersion, RsaKey, Side};

pub use mtp_proto::{
    Config, Connection, ConnectionState, Dispatcher, Error, ErrorClass, Message, SecureMessageLayer, Transport,
};
