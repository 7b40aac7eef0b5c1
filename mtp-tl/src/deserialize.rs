//! The [`Deserializable`] trait, [`Cursor`] buffer, and primitive impls.

use std::fmt;

// ─── Error ───────────────────────────────────────────────────────────────────

/// Errors that can occur during deserialization.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Ran out of bytes before the type was fully read, or the cursor had
    /// already failed on an earlier read.
    UnexpectedEof,
    /// Decoded a constructor ID that doesn't match any known variant.
    UnexpectedConstructor { id: u32 },
    /// A TL `string` did not contain valid UTF-8.
    InvalidUtf8,
    /// A `gzip_packed` payload could not be inflated.
    Decompress,
    /// A `gzip_packed` payload inflated past `limit` bytes.
    InflatedTooLarge { limit: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of buffer"),
            Self::UnexpectedConstructor { id } => {
                write!(f, "unexpected constructor id: {id:#010x}")
            }
            Self::InvalidUtf8 => write!(f, "string is not valid UTF-8"),
            Self::Decompress  => write!(f, "gzip_packed payload could not be inflated"),
            Self::InflatedTooLarge { limit } => {
                write!(f, "gzip_packed payload inflates past {limit} bytes")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for deserialization.
pub type Result<T> = std::result::Result<T, Error>;

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// A zero-copy cursor over an in-memory byte slice.
///
/// The cursor is *sticky*: once a read runs past the end of the buffer the
/// cursor is marked failed and every later read fails immediately, even a
/// read that would have fit. A half-decoded record therefore can never be
/// mistaken for a complete one by a caller that checks only the last read.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, failed: false }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize { self.pos }

    /// Remaining bytes.
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// `true` once any read has run past the end.
    pub fn is_failed(&self) -> bool { self.failed }

    /// The bytes not yet consumed.
    pub fn rest(&self) -> &'a [u8] { &self.buf[self.pos..] }

    fn fail<T>(&mut self) -> Result<T> {
        self.failed = true;
        Err(Error::UnexpectedEof)
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.failed {
            return Err(Error::UnexpectedEof);
        }
        match self.buf.get(self.pos).copied() {
            Some(b) => { self.pos += 1; Ok(b) }
            None    => self.fail(),
        }
    }

    /// Read exactly `buf.len()` bytes.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        if self.failed {
            return Err(Error::UnexpectedEof);
        }
        let end = self.pos + out.len();
        if end > self.buf.len() {
            return self.fail();
        }
        out.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    /// Borrow the next `len` bytes without copying.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.failed {
            return Err(Error::UnexpectedEof);
        }
        if len > self.remaining() {
            return self.fail();
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..self.pos])
    }

    /// Advance past `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    /// Read a 32-bit type tag.
    pub fn read_tag(&mut self) -> Result<u32> {
        u32::deserialize(self)
    }

    /// Read a 32-bit type tag and fail unless it equals `expected`.
    pub fn expect_tag(&mut self, expected: u32) -> Result<()> {
        match self.read_tag()? {
            id if id == expected => Ok(()),
            id => Err(Error::UnexpectedConstructor { id }),
        }
    }

    /// Consume all remaining bytes into `out`.
    pub fn read_to_end(&mut self, out: &mut Vec<u8>) -> usize {
        let slice = &self.buf[self.pos..];
        out.extend_from_slice(slice);
        self.pos = self.buf.len();
        slice.len()
    }
}

/// Alias used by record impls: `crate::deserialize::Buffer<'_, '_>`.
pub type Buffer<'a, 'b> = &'a mut Cursor<'b>;

// ─── Deserializable ──────────────────────────────────────────────────────────

/// Deserialize a value from TL binary format.
pub trait Deserializable: Sized {
    /// Read `Self` from `buf`, advancing its position.
    fn deserialize(buf: Buffer) -> Result<Self>;

    /// Convenience: deserialize from a byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::from_slice(bytes);
        Self::deserialize(&mut cursor)
    }
}

// ─── Primitives ───────────────────────────────────────────────────────────────

impl Deserializable for bool {
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            0x997275b5 => Ok(true),
            0xbc799737 => Ok(false),
            id => Err(Error::UnexpectedConstructor { id }),
        }
    }
}

macro_rules! le_primitive {
    ( $( $ty:ty => $n:expr ),+ $(,)? ) => {
        $(
            impl Deserializable for $ty {
                fn deserialize(buf: Buffer) -> Result<Self> {
                    let mut b = [0u8; $n];
                    buf.read_exact(&mut b)?;
                    Ok(<$ty>::from_le_bytes(b))
                }
            }
        )+
    };
}

le_primitive! {
    i32 => 4,
    u32 => 4,
    i64 => 8,
    u64 => 8,
    f64 => 8,
}

impl Deserializable for [u8; 16] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut b = [0u8; 16];
        buf.read_exact(&mut b)?;
        Ok(b)
    }
}

impl Deserializable for [u8; 32] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut b = [0u8; 32];
        buf.read_exact(&mut b)?;
        Ok(b)
    }
}

// ─── Bytes / String ───────────────────────────────────────────────────────────

impl Deserializable for Vec<u8> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let first = buf.read_byte()?;
        let (len, header_len) = if first != 0xfe {
            (first as usize, 1)
        } else {
            let a = buf.read_byte()? as usize;
            let b = buf.read_byte()? as usize;
            let c = buf.read_byte()? as usize;
            (a | (b << 8) | (c << 16), 4)
        };

        let data = buf.read_slice(len)?.to_vec();

        // Skip alignment padding
        let padding = (4 - ((header_len + len) % 4)) % 4;
        buf.skip(padding)?;

        Ok(data)
    }
}

impl Deserializable for String {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let bytes = Vec::<u8>::deserialize(buf)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}

// ─── Vectors ─────────────────────────────────────────────────────────────────

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        buf.expect_tag(crate::VECTOR_ID)?;
        let len = u32::deserialize(buf)? as usize;
        (0..len).map(|_| T::deserialize(buf)).collect()
    }
}

impl<T: Deserializable> Deserializable for crate::RawVec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let len = u32::deserialize(buf)? as usize;
        let inner = (0..len).map(|_| T::deserialize(buf)).collect::<Result<_>>()?;
        Ok(crate::RawVec(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_cursor_stays_failed() {
        let data = [1u8, 0, 0, 0, 2, 0];
        let mut cur = Cursor::from_slice(&data);
        assert_eq!(u32::deserialize(&mut cur), Ok(1));
        assert_eq!(u32::deserialize(&mut cur), Err(Error::UnexpectedEof));
        assert!(cur.is_failed());
        // two bytes are still there, but the cursor must not hand them out
        assert_eq!(cur.read_byte(), Err(Error::UnexpectedEof));
        assert_eq!(cur.pos(), 4);
    }

    #[test]
    fn oversized_length_prefix_is_eof() {
        // claims 200 bytes, carries 3
        let data = [200u8, 1, 2, 3];
        assert_eq!(Vec::<u8>::from_bytes(&data), Err(Error::UnexpectedEof));
    }

    #[test]
    fn expect_tag_reports_id() {
        let data = 0xdeadbeefu32.to_le_bytes();
        let mut cur = Cursor::from_slice(&data);
        assert_eq!(
            cur.expect_tag(0x1cb5c415),
            Err(Error::UnexpectedConstructor { id: 0xdeadbeef })
        );
    }
}
