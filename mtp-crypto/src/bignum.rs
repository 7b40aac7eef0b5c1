//! Big-endian modular exponentiation over byte buffers.

use num_bigint::BigUint;

/// `base ^ exponent mod modulus`, all big-endian, result without leading zeros.
///
/// # Panics
///
/// If `modulus` is zero. Moduli come from validated keys or DH groups, so a
/// zero modulus is a caller bug.
pub fn mod_exp(base: &[u8], modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let m = BigUint::from_bytes_be(modulus);
    let b = BigUint::from_bytes_be(base);
    let e = BigUint::from_bytes_be(exponent);
    let r = b.modpow(&e, &m);
    if r.bits() == 0 { Vec::new() } else { r.to_bytes_be() }
}

/// Like [`mod_exp`] but left-padded with zeros to exactly `width` bytes.
///
/// # Panics
///
/// If the result does not fit in `width` bytes.
pub fn mod_exp_padded(base: &[u8], modulus: &[u8], exponent: &[u8], width: usize) -> Vec<u8> {
    left_pad(&mod_exp(base, modulus, exponent), width)
}

/// Left-pad a big-endian number with zeros to `width` bytes.
///
/// # Panics
///
/// If `value` is already wider than `width` after stripping leading zeros.
pub fn left_pad(value: &[u8], width: usize) -> Vec<u8> {
    let value = strip_leading_zeros(value);
    assert!(value.len() <= width, "value of {} bytes does not fit in {width}", value.len());
    let mut out = vec![0u8; width - value.len()];
    out.extend_from_slice(value);
    out
}

/// Drop leading zero bytes of a big-endian number.
pub fn strip_leading_zeros(value: &[u8]) -> &[u8] {
    let skip = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    &value[skip..]
}

/// Compare two big-endian numbers of arbitrary width.
pub fn cmp_be(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    let (a, b) = (strip_leading_zeros(a), strip_leading_zeros(b));
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
