//! TL binary codec for MTProto.
//!
//! Every structure that crosses the wire, from the handshake records to the
//! encrypted message envelope, rides on the two traits defined here:
//!
//! | Item                | Role                                                      |
//! |---------------------|-----------------------------------------------------------|
//! | [`Serializable`]    | Append the TL encoding of a value to any `Extend<u8>`     |
//! | [`Deserializable`]  | Read a value from a sticky-failing [`Cursor`]             |
//! | [`mtproto`]         | Handshake and service records (`resPQ`, `dh_gen_ok`, …)   |
//! | [`gzip`]            | `gzip_packed` wrapping                                    |
//!
//! # Example
//!
//! ```rust
//! use mtp_tl::{Deserializable, Serializable};
//! use mtp_tl::mtproto::functions::ReqPq;
//!
//! let req = ReqPq { nonce: [7; 16] };
//! let bytes = req.to_bytes();
//! assert_eq!(&bytes[..4], &0x60469778u32.to_le_bytes());
//! assert_eq!(ReqPq::from_bytes(&bytes[4..]).unwrap(), req);
//! ```

#![deny(unsafe_code)]

pub mod deserialize;
pub mod gzip;
pub mod mtproto;
pub mod serialize;

pub use deserialize::{Cursor, Deserializable};
#[cfg(feature = "name-for-id")]
pub use mtproto::name_for_id;
pub use mtproto::{enums, functions, types};
pub use serialize::{Serializable, SliceWriter};

/// Constructor ID of the boxed `Vector<T>`.
pub const VECTOR_ID: u32 = 0x1cb5c415;

/// A 128-bit handshake nonce, serialized as a raw 16-byte block.
pub type Nonce128 = [u8; 16];

/// A 256-bit handshake nonce, serialized as a raw 32-byte block.
pub type Nonce256 = [u8; 32];

/// Bare vector — `vector` (lowercase) as opposed to the boxed `Vector`.
///
/// Used where the count is sent without the usual `0x1cb5c415` constructor
/// ID header.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// Opaque blob of bytes that should be passed through without interpretation.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Self(v) }
}

impl Serializable for Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}

impl Deserializable for Blob {
    fn deserialize(buf: deserialize::Buffer) -> deserialize::Result<Self> {
        let mut out = Vec::new();
        buf.read_to_end(&mut out);
        Ok(Self(out))
    }
}

// ─── Core traits ──────────────────────────────────────────────────────────────

/// Every TL record has a unique 32-bit constructor ID.
pub trait Identifiable {
    /// The constructor ID as specified in the TL schema.
    const CONSTRUCTOR_ID: u32;
}

/// Marks a function type that can be sent as an RPC call.
///
/// `Return` is the type the peer will respond with.
pub trait RemoteCall: Serializable {
    /// The deserialized response type.
    type Return: Deserializable;
}

/// Read the leading 32-bit tag of `data` without consuming anything.
pub fn peek_tag(data: &[u8]) -> Option<u32> {
    data.get(..4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
