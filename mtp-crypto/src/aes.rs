//! AES-256 in Infinite Garble Extension (IGE) mode.
//!
//! IGE chains each block through both the previous ciphertext and the
//! previous plaintext:
//!
//! ```text
//! c[i] = E(p[i] ^ c[i-1]) ^ p[i-1]
//! p[i] = D(c[i] ^ p[i-1]) ^ c[i-1]
//! ```
//!
//! The 32-byte IV carries `c[-1]` in its first half and `p[-1]` in the second.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::CryptoError;

/// AES block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// A derived AES-256 key and 32-byte IGE initialization vector.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey {
    pub key: [u8; 32],
    pub iv: [u8; 32],
}

impl AesKey {
    /// Encrypt `data` in place.
    pub fn encrypt(&self, data: &mut [u8]) -> Result<(), CryptoError> {
        ige_encrypt(data, &self.key, &self.iv)
    }

    /// Decrypt `data` in place.
    pub fn decrypt(&self, data: &mut [u8]) -> Result<(), CryptoError> {
        ige_decrypt(data, &self.key, &self.iv)
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesKey(..)")
    }
}

fn check_aligned(data: &[u8]) -> Result<(), CryptoError> {
    if data.len() % BLOCK_LEN == 0 {
        Ok(())
    } else {
        Err(CryptoError::UnalignedInput { len: data.len() })
    }
}

fn xor_in_place(dst: &mut [u8], src: &[u8]) {
    for (a, b) in dst.iter_mut().zip(src) { *a ^= b; }
}

/// Encrypt `data` in place with AES-256-IGE.
///
/// `data.len()` must be a multiple of 16; nothing is padded here.
pub fn ige_encrypt(data: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) -> Result<(), CryptoError> {
    check_aligned(data)?;
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; BLOCK_LEN];
    let mut prev_plain = [0u8; BLOCK_LEN];
    prev_cipher.copy_from_slice(&iv[..BLOCK_LEN]);
    prev_plain.copy_from_slice(&iv[BLOCK_LEN..]);

    for chunk in data.chunks_exact_mut(BLOCK_LEN) {
        let mut plain = [0u8; BLOCK_LEN];
        plain.copy_from_slice(chunk);

        xor_in_place(chunk, &prev_cipher);
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        xor_in_place(chunk, &prev_plain);

        prev_cipher.copy_from_slice(chunk);
        prev_plain = plain;
    }
    Ok(())
}

/// Decrypt `data` in place with AES-256-IGE.
pub fn ige_decrypt(data: &mut [u8], key: &[u8; 32], iv: &[u8; 32]) -> Result<(), CryptoError> {
    check_aligned(data)?;
    let cipher = Aes256::new(GenericArray::from_slice(key));

    let mut prev_cipher = [0u8; BLOCK_LEN];
    let mut prev_plain = [0u8; BLOCK_LEN];
    prev_cipher.copy_from_slice(&iv[..BLOCK_LEN]);
    prev_plain.copy_from_slice(&iv[BLOCK_LEN..]);

    for chunk in data.chunks_exact_mut(BLOCK_LEN) {
        let mut ciphertext = [0u8; BLOCK_LEN];
        ciphertext.copy_from_slice(chunk);

        xor_in_place(chunk, &prev_plain);
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        xor_in_place(chunk, &prev_cipher);

        prev_plain.copy_from_slice(chunk);
        prev_cipher = ciphertext;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn key_iv() -> ([u8; 32], [u8; 32]) {
        (core::array::from_fn(|i| i as u8), core::array::from_fn(|i| 32 + i as u8))
    }

    #[test]
    fn known_vector() {
        let (key, iv) = key_iv();
        let mut data: Vec<u8> = (0..48).map(|i| (i * 7) as u8).collect();
        ige_encrypt(&mut data, &key, &iv).unwrap();
        assert_eq!(
            data,
            hex!("cc0c5d515adb2aaaae819c8bbd2731cf61b0d03bea09707d9ff68ee10dd151ad0298448342333558988043fdead0e3d8")
        );
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let (key, iv) = key_iv();
        for len in [0usize, 16, 32, 160, 1024] {
            let original: Vec<u8> = (0..len).map(|i| (i * 13 + 5) as u8).collect();
            let mut data = original.clone();
            ige_encrypt(&mut data, &key, &iv).unwrap();
            if len > 0 { assert_ne!(data, original); }
            ige_decrypt(&mut data, &key, &iv).unwrap();
            assert_eq!(data, original);
        }
    }

    #[test]
    fn unaligned_input_is_rejected() {
        let (key, iv) = key_iv();
        let mut data = vec![0u8; 17];
        assert_eq!(ige_encrypt(&mut data, &key, &iv), Err(CryptoError::UnalignedInput { len: 17 }));
        assert_eq!(ige_decrypt(&mut data[..15], &key, &iv), Err(CryptoError::UnalignedInput { len: 15 }));
        // untouched on rejection
        assert!(data.iter().all(|&b| b == 0));
    }
}
