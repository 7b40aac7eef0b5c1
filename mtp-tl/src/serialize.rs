//! The [`Serializable`] trait and its implementations for primitive TL types.
//!
//! Encoding follows the [MTProto Binary Serialization] rules.
//!
//! [MTProto Binary Serialization]: https://core.telegram.org/mtproto/serialize

/// Serialize `self` into TL binary format.
pub trait Serializable {
    /// Appends the serialized form of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Convenience: allocate a fresh `Vec<u8>` and serialize into it.
    fn to_bytes(&self) -> Vec<u8> {
        let mut v = Vec::new();
        self.serialize(&mut v);
        v
    }
}

// ─── bool ────────────────────────────────────────────────────────────────────

/// `true`  → `boolTrue#997275b5`
/// `false` → `boolFalse#bc799737`
impl Serializable for bool {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let id: u32 = if *self { 0x997275b5 } else { 0xbc799737 };
        id.serialize(buf);
    }
}

// ─── integers ────────────────────────────────────────────────────────────────

macro_rules! le_primitive {
    ( $( $ty:ty ),+ $(,)? ) => {
        $(
            impl Serializable for $ty {
                fn serialize(&self, buf: &mut impl Extend<u8>) {
                    buf.extend(self.to_le_bytes());
                }
            }
        )+
    };
}

le_primitive!(i32, u32, i64, u64, f64);

impl Serializable for [u8; 16] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for [u8; 32] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

// ─── strings / bytes ─────────────────────────────────────────────────────────

/// Number of bytes a TL byte string of `len` bytes occupies on the wire.
pub fn bytes_len(len: usize) -> usize {
    let header_len = if len <= 253 { 1 } else { 4 };
    (header_len + len).div_ceil(4) * 4
}

/// TL string encoding: a length-prefixed, 4-byte aligned byte string.
///
/// * If `len ≤ 253`: `[len as u8][data][0-padding to align to 4 bytes]`
/// * If `len ≥ 254`: `[0xfe][len as 3 LE bytes][data][0-padding]`
///
/// # Panics
///
/// If `len` does not fit in 24 bits.
impl Serializable for &[u8] {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        assert!(len < 1 << 24, "TL byte string too long: {len} bytes");
        let (header_len, header): (usize, Vec<u8>) = if len <= 253 {
            (1, vec![len as u8])
        } else {
            (4, vec![
                0xfe,
                (len & 0xff) as u8,
                ((len >> 8) & 0xff) as u8,
                ((len >> 16) & 0xff) as u8,
            ])
        };

        let total = header_len + len;
        let padding = (4 - (total % 4)) % 4;

        buf.extend(header);
        buf.extend(self.iter().copied());
        buf.extend(std::iter::repeat_n(0u8, padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf);
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf);
    }
}

// ─── vectors ─────────────────────────────────────────────────────────────────

/// Boxed `Vector<T>` — prefixed with constructor ID `0x1cb5c415`.
impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        crate::VECTOR_ID.serialize(buf);
        (self.len() as u32).serialize(buf);
        for item in self { item.serialize(buf); }
    }
}

/// Bare `vector<T>` — just a count followed by items, no constructor ID.
impl<T: Serializable> Serializable for crate::RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.0.len() as u32).serialize(buf);
        for item in &self.0 { item.serialize(buf); }
    }
}

// ─── Option ──────────────────────────────────────────────────────────────────

/// Optional parameters are handled by flags; when `Some`, serialize the value.
/// When `None`, nothing is written (the flags word already encodes absence).
impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if let Some(v) = self { v.serialize(buf); }
    }
}

// ─── SliceWriter ─────────────────────────────────────────────────────────────

/// A fixed-capacity sink over a caller-provided buffer.
///
/// Writing past the end is a caller bug and panics; a TL writer never
/// produces a short write.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    /// Wrap `buf`, starting at offset 0.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize { self.pos }

    /// Space left.
    pub fn remaining(&self) -> usize { self.buf.len() - self.pos }
}

impl Extend<u8> for SliceWriter<'_> {
    fn extend<I: IntoIterator<Item = u8>>(&mut self, iter: I) {
        for byte in iter {
            assert!(
                self.pos < self.buf.len(),
                "SliceWriter overflow: capacity is {} bytes",
                self.buf.len()
            );
            self.buf[self.pos] = byte;
            self.pos += 1;
        }
    }
}
