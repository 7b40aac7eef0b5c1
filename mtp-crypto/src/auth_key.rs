//! The 2048-bit authorization key produced by the DH exchange.

use crate::sha1;

/// An MTProto authorization key (256 bytes) plus its derived identifiers.
///
/// `aux_hash` is `SHA1(key)[0..8]` and `key_id` is `SHA1(key)[12..20]`.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Construct from the raw 256-byte DH output.
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// Build from a big-endian DH result of at most 256 bytes, left-padding
    /// with zeros.
    pub fn from_dh_result(value: &[u8]) -> Option<Self> {
        let value = crate::bignum::strip_leading_zeros(value);
        if value.len() > 256 {
            return None;
        }
        let mut data = [0u8; 256];
        data[256 - value.len()..].copy_from_slice(value);
        Some(Self::from_bytes(data))
    }

    /// Return the raw 256-byte representation.
    pub fn to_bytes(&self) -> [u8; 256] { self.data }

    /// Borrow the raw key material.
    pub fn as_bytes(&self) -> &[u8; 256] { &self.data }

    /// The 8-byte key identifier that prefixes every encrypted packet.
    pub fn key_id(&self) -> [u8; 8] { self.key_id }

    /// `key_id` read as a little-endian integer.
    pub fn key_id_i64(&self) -> i64 { i64::from_le_bytes(self.key_id) }

    /// The first 8 bytes of `SHA1(key)`.
    pub fn aux_hash(&self) -> [u8; 8] { self.aux_hash }

    /// `retry_id` carried by `client_DH_inner_data` after a `dh_gen_retry`.
    pub fn retry_id(&self) -> i64 { i64::from_le_bytes(self.aux_hash) }

    /// `SHA1(new_nonce ‖ number ‖ aux_hash)[4..20]`.
    ///
    /// `number` is 1, 2 or 3 for `dh_gen_ok`, `dh_gen_retry` and `dh_gen_fail`.
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let sha = sha1!(new_nonce, [number], &self.aux_hash);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={:016x})", u64::from_le_bytes(self.key_id))
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool { self.data == other.data }
}

impl Eq for AuthKey {}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn sample() -> AuthKey {
        AuthKey::from_bytes(core::array::from_fn(|i| (i * 3 + 1) as u8))
    }

    #[test]
    fn identifiers() {
        let key = sample();
        assert_eq!(key.key_id(), hex!("c04b048704bb081f"));
        let nn: [u8; 32] = core::array::from_fn(|i| 200 + i as u8);
        assert_eq!(key.calc_new_nonce_hash(&nn, 1), hex!("0068cd1d3c9c6ae9610650cc1aa3ae46"));
        assert_ne!(key.calc_new_nonce_hash(&nn, 2), key.calc_new_nonce_hash(&nn, 1));
    }

    #[test]
    fn dh_result_is_left_padded() {
        let key = AuthKey::from_dh_result(&[0, 0, 7]).unwrap();
        assert_eq!(key.as_bytes()[255], 7);
        assert!(key.as_bytes()[..255].iter().all(|&b| b == 0));
        assert!(AuthKey::from_dh_result(&[1u8; 257]).is_none());
    }

    #[test]
    fn debug_hides_material() {
        let s = format!("{:?}", sample());
        assert_eq!(s, "AuthKey(id=1f08bb0487044bc0)");
    }
}
