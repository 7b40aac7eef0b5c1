//! Connection-level errors and their classification.

use std::fmt;

use crate::message::PlainError;
use crate::{handshake, secure};

/// How a failure should be handled by whoever owns the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The byte stream is unusable; drop the connection.
    TransportFatal,
    /// A packet failed authentication or consistency checks.
    Integrity,
    /// The peer sent something the protocol allows but we refuse.
    Negotiation,
    /// The exchange may succeed if started again.
    Retry,
    /// The caller misused the API.
    Programming,
}

impl ErrorClass {
    /// Whether the connection must be closed after an error of this class.
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Retry | Self::Programming)
    }
}

/// Any error surfaced by a [`Connection`](crate::Connection).
#[derive(Debug)]
pub enum Error {
    Handshake(handshake::Error),
    Secure(secure::Error),
    Plain(PlainError),
    /// The transport refused to send.
    Transport(Box<dyn std::error::Error + Send + Sync>),
    InvalidConfig(&'static str),
    /// Too short to carry an `auth_key_id`.
    MalformedPacket { len: usize },
    /// A plaintext packet arrived after the key exchange finished.
    UnexpectedPlainMessage,
    /// An encrypted packet arrived before the key exchange finished.
    UnexpectedEncryptedMessage,
    /// Payloads can only be sent once the connection is ready.
    NotReady,
    Closed,
    TooManyRetries { limit: u32 },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Handshake(e) => e.class(),
            Self::Secure(e) => e.class(),
            Self::Plain(_) | Self::Transport(_) | Self::MalformedPacket { .. } => ErrorClass::TransportFatal,
            Self::UnexpectedPlainMessage | Self::UnexpectedEncryptedMessage => ErrorClass::Integrity,
            Self::TooManyRetries { .. } => ErrorClass::Retry,
            Self::InvalidConfig(_) | Self::NotReady | Self::Closed => ErrorClass::Programming,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Handshake(e) => Some(e),
            Self::Secure(e) => Some(e),
            Self::Plain(e) => Some(e),
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshake(e) => write!(f, "handshake: {e}"),
            Self::Secure(e) => write!(f, "secure layer: {e}"),
            Self::Plain(e) => write!(f, "plain message: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::InvalidConfig(why) => write!(f, "invalid config: {why}"),
            Self::MalformedPacket { len } => write!(f, "malformed packet ({len} bytes)"),
            Self::UnexpectedPlainMessage => write!(f, "plain message after key exchange"),
            Self::UnexpectedEncryptedMessage => write!(f, "encrypted message before key exchange"),
            Self::NotReady => write!(f, "connection is not ready"),
            Self::Closed => write!(f, "connection is closed"),
            Self::TooManyRetries { limit } => write!(f, "DH exchange retried {limit} times"),
        }
    }
}

impl From<handshake::Error> for Error {
    fn from(e: handshake::Error) -> Self { Self::Handshake(e) }
}

impl From<secure::Error> for Error {
    fn from(e: secure::Error) -> Self { Self::Secure(e) }
}

impl From<PlainError> for Error {
    fn from(e: PlainError) -> Self { Self::Plain(e) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(Error::Closed.class(), ErrorClass::Programming);
        assert_eq!(Error::TooManyRetries { limit: 5 }.class(), ErrorClass::Retry);
        assert_eq!(Error::MalformedPacket { len: 3 }.class(), ErrorClass::TransportFatal);
        assert_eq!(
            Error::from(secure::Error::InvalidPadding { len: 2 }).class(),
            ErrorClass::Integrity
        );
        assert!(ErrorClass::Integrity.is_fatal());
        assert!(!ErrorClass::Retry.is_fatal());
    }
}
