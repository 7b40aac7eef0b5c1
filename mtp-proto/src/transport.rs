//! Collaborator seams of a [`Connection`](crate::Connection).
//!
//! A [`Transport`] takes complete packets out; a [`Dispatcher`] takes
//! decrypted messages up. Framing on a real byte stream is the transport's
//! business.

use std::convert::Infallible;
use std::sync::mpsc;

use crate::message::Message;

/// Outbound half of a byte-stream transport.
///
/// Each call carries exactly one packet.
pub trait Transport {
    /// The error type returned by write operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send one packet to the remote.
    fn send_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

/// Collects packets in memory.
impl Transport for Vec<Vec<u8>> {
    type Error = Infallible;

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.push(data.to_vec());
        Ok(())
    }
}

impl Transport for mpsc::Sender<Vec<u8>> {
    type Error = mpsc::SendError<Vec<u8>>;

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.send(data.to_vec())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        (**self).send_bytes(data)
    }
}

/// Receives every message the secure layer accepts, in arrival order.
pub trait Dispatcher {
    fn dispatch(&mut self, message: Message);
}

impl Dispatcher for Vec<Message> {
    fn dispatch(&mut self, message: Message) {
        self.push(message);
    }
}

/// Forwards to a channel; a hung-up receiver drops the message.
impl Dispatcher for mpsc::Sender<Message> {
    fn dispatch(&mut self, message: Message) {
        if self.send(message).is_err() {
            log::warn!("[conn] dispatcher receiver is gone, message dropped");
        }
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for &mut D {
    fn dispatch(&mut self, message: Message) {
        (**self).dispatch(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_transport() {
        let (mut tx, rx) = mpsc::channel::<Vec<u8>>();
        tx.send_bytes(&[1, 2, 3, 4]).unwrap();
        assert_eq!(rx.recv().unwrap(), vec![1, 2, 3, 4]);
        drop(rx);
        assert!(tx.send_bytes(&[0; 4]).is_err());
    }
}
