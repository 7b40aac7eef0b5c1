//! `gzip_packed` payload helpers.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::GzEncoder;

use crate::deserialize::{Error, Result};
use crate::mtproto::types::GzipPacked;
use crate::{Deserializable, Identifiable, Serializable};

/// Compress `data` and wrap it as a boxed `gzip_packed` object.
pub fn gzip_pack(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    // writing into a Vec cannot fail
    let packed_data = enc
        .write_all(data)
        .and_then(|_| enc.finish())
        .unwrap_or_default();
    let mut out = Vec::with_capacity(packed_data.len() + 8);
    GzipPacked::CONSTRUCTOR_ID.serialize(&mut out);
    GzipPacked { packed_data }.serialize(&mut out);
    out
}

/// Upper bound on the inflated size of a single `gzip_packed` payload.
pub const MAX_INFLATED: usize = 16 * 1024 * 1024;

/// Inflate a compressed blob: gzip first, zlib as a fallback.
///
/// Fails with [`Error::InflatedTooLarge`] past [`MAX_INFLATED`] bytes.
pub fn gzip_inflate(data: &[u8]) -> Result<Vec<u8>> {
    inflate_limited(data, MAX_INFLATED)
}

fn inflate_limited(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let cap = limit as u64 + 1;
    let mut out = Vec::new();
    if GzDecoder::new(data).take(cap).read_to_end(&mut out).is_ok() && !out.is_empty() {
        return check_limit(out, limit);
    }
    out.clear();
    ZlibDecoder::new(data)
        .take(cap)
        .read_to_end(&mut out)
        .map_err(|_| Error::Decompress)?;
    check_limit(out, limit)
}

fn check_limit(out: Vec<u8>, limit: usize) -> Result<Vec<u8>> {
    if out.len() > limit {
        return Err(Error::InflatedTooLarge { limit });
    }
    Ok(out)
}

/// Unwrap a boxed `gzip_packed` object into the inner (inflated) bytes.
pub fn gzip_unpack(boxed: &[u8]) -> Result<Vec<u8>> {
    let mut cur = crate::Cursor::from_slice(boxed);
    cur.expect_tag(GzipPacked::CONSTRUCTOR_ID)?;
    let packed = GzipPacked::deserialize(&mut cur)?;
    gzip_inflate(&packed.packed_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack() {
        let body: Vec<u8> = (0..4096u32).flat_map(|i| (i % 7).to_le_bytes()).collect();
        let packed = gzip_pack(&body);
        assert_eq!(&packed[..4], &0x3072cfa1u32.to_le_bytes());
        assert!(packed.len() < body.len());
        assert_eq!(gzip_unpack(&packed).unwrap(), body);
    }

    #[test]
    fn garbage_is_decompress_error() {
        assert_eq!(gzip_inflate(&[1, 2, 3, 4, 5]), Err(Error::Decompress));
    }

    #[test]
    fn inflation_is_bounded() {
        let zeros = vec![0u8; 64 * 1024];
        let packed = gzip_pack(&zeros);
        assert!(packed.len() < 1024);

        let mut cur = crate::Cursor::from_slice(&packed[4..]);
        let blob = GzipPacked::deserialize(&mut cur).unwrap().packed_data;
        assert_eq!(inflate_limited(&blob, zeros.len()).unwrap(), zeros);
        assert_eq!(
            inflate_limited(&blob, zeros.len() - 1),
            Err(Error::InflatedTooLarge { limit: zeros.len() - 1 }),
        );
    }

    #[test]
    fn oversized_gzip_packed_is_rejected() {
        let zeros = vec![0u8; MAX_INFLATED + 1];
        let packed = gzip_pack(&zeros);
        assert_eq!(gzip_unpack(&packed), Err(Error::InflatedTooLarge { limit: MAX_INFLATED }));
    }
}
