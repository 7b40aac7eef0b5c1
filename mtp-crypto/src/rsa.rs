//! RSA keys and the raw `m^e mod n` operation used by the auth key exchange.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use num_bigint::BigUint;
use mtp_tl::Serializable;

use crate::{CryptoError, bignum, sha1};

/// An RSA key as configured for the handshake.
///
/// The fingerprint is the low 64 bits of `SHA-1(bytes modulus, bytes exponent)`
/// (TL-serialized), read little-endian from digest bytes `12..20`.
#[derive(Clone, PartialEq, Eq)]
pub struct RsaKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
    secret_exponent: Option<Vec<u8>>,
    fingerprint: i64,
}

impl RsaKey {
    /// Public key from big-endian modulus and exponent; fingerprint computed.
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Self {
        let modulus = bignum::strip_leading_zeros(modulus).to_vec();
        let exponent = bignum::strip_leading_zeros(exponent).to_vec();
        let fingerprint = Self::compute_fingerprint(&modulus, &exponent);
        Self { modulus, exponent, secret_exponent: None, fingerprint }
    }

    /// Rebuild a key from stored parts, keeping the stored fingerprint so
    /// [`RsaKey::is_valid`] can detect tampering.
    pub fn from_parts(
        modulus: &[u8],
        exponent: &[u8],
        secret_exponent: Option<&[u8]>,
        fingerprint: i64,
    ) -> Self {
        Self {
            modulus: bignum::strip_leading_zeros(modulus).to_vec(),
            exponent: bignum::strip_leading_zeros(exponent).to_vec(),
            secret_exponent: secret_exponent.map(|d| bignum::strip_leading_zeros(d).to_vec()),
            fingerprint,
        }
    }

    /// Parse decimal `n` and `e` strings.
    pub fn from_decimal(n: &str, e: &str) -> Option<Self> {
        let n = BigUint::parse_bytes(n.as_bytes(), 10)?;
        let e = BigUint::parse_bytes(e.as_bytes(), 10)?;
        Some(Self::new(&n.to_bytes_be(), &e.to_bytes_be()))
    }

    /// Parse a PEM block holding either a PKCS#1 `RSA PUBLIC KEY` or an
    /// X.509 `PUBLIC KEY` (SubjectPublicKeyInfo).
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let body: String = pem
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("-----"))
            .collect();
        let der = STANDARD.decode(body.as_bytes()).map_err(|_| CryptoError::InvalidKey)?;
        let (modulus, exponent) = der::parse_public_key(&der).ok_or(CryptoError::InvalidKey)?;
        let key = Self::new(modulus, exponent);
        if key.is_valid() { Ok(key) } else { Err(CryptoError::InvalidKey) }
    }

    /// Attach the private exponent (server role).
    pub fn with_secret_exponent(mut self, d: &[u8]) -> Self {
        self.secret_exponent = Some(bignum::strip_leading_zeros(d).to_vec());
        self
    }

    /// Fingerprint of a `(modulus, exponent)` pair.
    pub fn compute_fingerprint(modulus: &[u8], exponent: &[u8]) -> i64 {
        let mut buf = Vec::with_capacity(modulus.len() + exponent.len() + 8);
        bignum::strip_leading_zeros(modulus).serialize(&mut buf);
        bignum::strip_leading_zeros(exponent).serialize(&mut buf);
        let digest = sha1!(&buf);
        let mut low = [0u8; 8];
        low.copy_from_slice(&digest[12..20]);
        i64::from_le_bytes(low)
    }

    /// Non-empty modulus and exponent, and the stored fingerprint matches.
    pub fn is_valid(&self) -> bool {
        !self.modulus.is_empty()
            && !self.exponent.is_empty()
            && self.fingerprint == Self::compute_fingerprint(&self.modulus, &self.exponent)
    }

    pub fn fingerprint(&self) -> i64 { self.fingerprint }
    pub fn modulus(&self) -> &[u8] { &self.modulus }
    pub fn exponent(&self) -> &[u8] { &self.exponent }
    pub fn secret_exponent(&self) -> Option<&[u8]> { self.secret_exponent.as_deref() }
    pub fn has_secret(&self) -> bool { self.secret_exponent.is_some() }

    /// Width of the modulus in bytes.
    pub fn byte_len(&self) -> usize { self.modulus.len() }
}

impl std::fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKey")
            .field("bits", &(self.modulus.len() * 8))
            .field("fingerprint", &self.fingerprint)
            .field("secret", &self.secret_exponent.is_some())
            .finish()
    }
}

fn check_width(data: &[u8], key: &RsaKey) -> Result<(), CryptoError> {
    if key.modulus.is_empty() {
        return Err(CryptoError::InvalidKey);
    }
    if bignum::cmp_be(data, &key.modulus) != std::cmp::Ordering::Less {
        return Err(CryptoError::InputTooLarge { len: data.len(), max: key.byte_len() });
    }
    Ok(())
}

/// `data ^ e mod n`, left-padded to the modulus width.
///
/// `data` must already be padded by the caller and numerically below `n`.
pub fn encrypt(data: &[u8], key: &RsaKey) -> Result<Vec<u8>, CryptoError> {
    check_width(data, key)?;
    Ok(bignum::mod_exp_padded(data, &key.modulus, &key.exponent, key.byte_len()))
}

/// `data ^ d mod n`, left-padded to the modulus width.
pub fn decrypt(data: &[u8], key: &RsaKey) -> Result<Vec<u8>, CryptoError> {
    let d = key.secret_exponent.as_deref().ok_or(CryptoError::MissingSecretExponent)?;
    check_width(data, key)?;
    Ok(bignum::mod_exp_padded(data, &key.modulus, d, key.byte_len()))
}

/// Just enough DER to pull `(n, e)` out of an RSA public key.
mod der {
    const SEQUENCE: u8 = 0x30;
    const INTEGER: u8 = 0x02;
    const BIT_STRING: u8 = 0x03;

    /// Read one TLV; returns `(tag, content, rest)`.
    fn read_tlv(buf: &[u8]) -> Option<(u8, &[u8], &[u8])> {
        let (&tag, rest) = buf.split_first()?;
        let (&first, mut rest) = rest.split_first()?;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 || rest.len() < n {
                return None;
            }
            let len = rest[..n].iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
            rest = &rest[n..];
            len
        };
        if rest.len() < len {
            return None;
        }
        Some((tag, &rest[..len], &rest[len..]))
    }

    fn pkcs1(der: &[u8]) -> Option<(&[u8], &[u8])> {
        let (tag, seq, _) = read_tlv(der)?;
        if tag != SEQUENCE { return None; }
        let (tag, n, rest) = read_tlv(seq)?;
        if tag != INTEGER { return None; }
        let (tag, e, _) = read_tlv(rest)?;
        if tag != INTEGER { return None; }
        Some((n, e))
    }

    fn spki(der: &[u8]) -> Option<(&[u8], &[u8])> {
        let (tag, seq, _) = read_tlv(der)?;
        if tag != SEQUENCE { return None; }
        let (tag, _algorithm, rest) = read_tlv(seq)?;
        if tag != SEQUENCE { return None; }
        let (tag, bits, _) = read_tlv(rest)?;
        if tag != BIT_STRING { return None; }
        // first byte of a BIT STRING is the unused-bit count
        let (&unused, inner) = bits.split_first()?;
        if unused != 0 { return None; }
        pkcs1(inner)
    }

    pub(super) fn parse_public_key(der: &[u8]) -> Option<(&[u8], &[u8])> {
        pkcs1(der).or_else(|| spki(der))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TELEGRAM_N: &str = "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323";

    #[test]
    fn fingerprint_of_published_key() {
        let key = RsaKey::from_decimal(TELEGRAM_N, "65537").unwrap();
        assert_eq!(key.fingerprint(), -3414540481677951611);
        assert!(key.is_valid());
        assert_eq!(key.byte_len(), 256);
    }

    #[test]
    fn tampered_fingerprint_is_invalid() {
        let key = RsaKey::from_decimal(TELEGRAM_N, "65537").unwrap();
        let stored = RsaKey::from_parts(key.modulus(), key.exponent(), None, key.fingerprint());
        assert!(stored.is_valid());
        let tampered = RsaKey::from_parts(key.modulus(), key.exponent(), None, key.fingerprint() ^ 1);
        assert!(!tampered.is_valid());
        assert!(!RsaKey::from_parts(&[], &[1], None, 0).is_valid());
    }

    #[test]
    fn toy_key_roundtrip() {
        // n = 61 * 53 = 3233, e = 17, d = 2753
        let key = RsaKey::new(&3233u32.to_be_bytes(), &[17]).with_secret_exponent(&2753u32.to_be_bytes());
        let c = encrypt(&[0x00, 0x41], &key).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(u16::from_be_bytes([c[0], c[1]]), 2790); // 65^17 mod 3233
        assert_eq!(decrypt(&c, &key).unwrap(), vec![0x00, 0x41]);
    }

    #[test]
    fn oversized_input_and_missing_secret() {
        let key = RsaKey::new(&3233u32.to_be_bytes(), &[17]);
        assert!(matches!(encrypt(&[0x0d, 0xa1], &key), Err(CryptoError::InputTooLarge { .. })));
        assert_eq!(decrypt(&[1], &key), Err(CryptoError::MissingSecretExponent));
    }

    #[test]
    fn pem_rejects_garbage() {
        assert_eq!(RsaKey::from_pem("-----BEGIN RSA PUBLIC KEY-----\nAAAA\n-----END RSA PUBLIC KEY-----"), Err(CryptoError::InvalidKey));
    }
}
