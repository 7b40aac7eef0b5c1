//! Abridged framing over the in-process byte stream.

use mtp::proto::Transport;

/// Wraps a `Transport` and applies the [MTProto Abridged] framing.
///
/// Abridged is the simplest framing: send `0xef` on first connection,
/// then each packet is `[length/4 as 1 or 4 bytes][payload]`.
///
/// [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
#[derive(Debug)]
pub struct Abridged<T> {
    inner: T,
    init_sent: bool,
}

impl<T: Transport> Abridged<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, init_sent: false }
    }
}

impl<T: Transport> Transport for Abridged<T> {
    type Error = T::Error;

    fn send_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let mut frame = Vec::with_capacity(data.len() + 5);
        if !self.init_sent {
            frame.push(0xef);
            self.init_sent = true;
        }
        let words = data.len() / 4;
        if words < 127 {
            frame.push(words as u8);
        } else {
            frame.extend([0x7f, words as u8, (words >> 8) as u8, (words >> 16) as u8]);
        }
        frame.extend_from_slice(data);
        self.inner.send_bytes(&frame)
    }
}

/// Reassembles abridged frames from arbitrary chunks of the stream.
#[derive(Debug, Default)]
pub struct AbridgedReader {
    buf: Vec<u8>,
    init_seen: bool,
}

impl AbridgedReader {
    pub fn new() -> Self { Self::default() }

    /// Append bytes read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete packet, if one has fully arrived.
    pub fn next_packet(&mut self) -> Option<Vec<u8>> {
        if !self.init_seen {
            if *self.buf.first()? == 0xef {
                self.buf.remove(0);
            }
            self.init_seen = true;
        }
        let (header, words) = match *self.buf.first()? {
            0x7f => {
                let b = self.buf.get(1..4)?;
                (4, usize::from(b[0]) | usize::from(b[1]) << 8 | usize::from(b[2]) << 16)
            }
            n => (1, usize::from(n)),
        };
        let end = header + words * 4;
        if self.buf.len() < end {
            return None;
        }
        let packet = self.buf[header..end].to_vec();
        self.buf.drain(..end);
        Some(packet)
    }
}
