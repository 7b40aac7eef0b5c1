//! Cryptographic primitives for MTProto.
//!
//! Provides:
//! - AES-256-IGE encryption/decryption
//! - SHA-1 / SHA-256 hash macros
//! - Big-endian modular exponentiation
//! - Pollard-rho PQ factorization
//! - RSA keys, fingerprints and raw encryption
//! - `AuthKey`, the 256-byte session key
//! - Message key derivation and packet encryption for both key schedules
//! - DH nonce → temporary AES key derivation
//! - Injectable randomness

#![deny(unsafe_code)]

pub mod aes;
mod auth_key;
pub mod bignum;
mod deque_buffer;
mod factorize;
pub mod random;
pub mod rsa;
pub mod sha;

pub use aes::AesKey;
pub use auth_key::AuthKey;
pub use bignum::{mod_exp, mod_exp_padded};
pub use deque_buffer::DequeBuffer;
pub use factorize::{factorize, find_pq_factor};
pub use random::{DeterministicRandomSource, OsRandom, RandomSource};
pub use rsa::RsaKey;

#[doc(hidden)]
pub mod __private {
    pub use sha1;
    pub use sha2;
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failures of the primitives in this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CryptoError {
    /// AES-IGE input is not a multiple of 16 bytes.
    UnalignedInput { len: usize },
    /// RSA input is not numerically below the modulus.
    InputTooLarge { len: usize, max: usize },
    /// RSA decryption requested on a public-only key.
    MissingSecretExponent,
    /// The key is empty, malformed, or its fingerprint does not match.
    InvalidKey,
    /// Ciphertext too short or not block-aligned.
    InvalidBuffer,
    /// The `auth_key_id` in the packet does not match our key.
    AuthKeyMismatch,
    /// The `msg_key` in the packet does not match the decrypted content.
    MessageKeyMismatch,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnalignedInput { len } => write!(f, "AES-IGE input of {len} bytes is not block aligned"),
            Self::InputTooLarge { len, max } => write!(f, "RSA input of {len} bytes is not below the {max}-byte modulus"),
            Self::MissingSecretExponent => write!(f, "RSA key has no secret exponent"),
            Self::InvalidKey => write!(f, "invalid RSA key"),
            Self::InvalidBuffer => write!(f, "invalid ciphertext buffer length"),
            Self::AuthKeyMismatch => write!(f, "auth_key_id mismatch"),
            Self::MessageKeyMismatch => write!(f, "msg_key mismatch"),
        }
    }
}
impl std::error::Error for CryptoError {}

// ─── Key schedule ────────────────────────────────────────────────────────────

/// Which peer produced a packet. Selects the `x` offset into the auth key:
/// 0 for client-to-server, 8 for server-to-client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side { Client, Server }

impl Side {
    pub fn x(self) -> usize { match self { Side::Client => 0, Side::Server => 8 } }

    pub fn peer(self) -> Side { match self { Side::Client => Side::Server, Side::Server => Side::Client } }
}

/// Message-key schedule.
///
/// `V1` derives AES keys with four SHA-1 digests and takes `msg_key` from the
/// unpadded plaintext; `V2` uses SHA-256 and hashes the padded plaintext
/// together with part of the auth key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

/// Size of `salt ‖ session_id ‖ msg_id ‖ seq_no ‖ length` in front of every body.
pub const MESSAGE_HEADER_LEN: usize = 32;

/// `key_id ‖ msg_key` in front of every ciphertext.
pub const ENCRYPTED_HEADER_LEN: usize = 24;

fn calc_key_v1(auth_key: &AuthKey, msg_key: &[u8; 16], x: usize) -> AesKey {
    let ak = &auth_key.data;
    let sha_a = sha1!(msg_key, &ak[x..x + 32]);
    let sha_b = sha1!(&ak[32 + x..48 + x], msg_key, &ak[48 + x..64 + x]);
    let sha_c = sha1!(&ak[64 + x..96 + x], msg_key);
    let sha_d = sha1!(msg_key, &ak[96 + x..128 + x]);

    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&sha_a[..8]);
    key[8..20].copy_from_slice(&sha_b[8..20]);
    key[20..].copy_from_slice(&sha_c[4..16]);

    let mut iv = [0u8; 32];
    iv[..12].copy_from_slice(&sha_a[8..20]);
    iv[12..20].copy_from_slice(&sha_b[..8]);
    iv[20..24].copy_from_slice(&sha_c[16..20]);
    iv[24..].copy_from_slice(&sha_d[..8]);

    AesKey { key, iv }
}

fn calc_key_v2(auth_key: &AuthKey, msg_key: &[u8; 16], x: usize) -> AesKey {
    let ak = &auth_key.data;
    let sha_a = sha256!(msg_key, &ak[x..x + 36]);
    let sha_b = sha256!(&ak[40 + x..40 + x + 36], msg_key);

    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&sha_a[..8]);
    key[8..24].copy_from_slice(&sha_b[8..24]);
    key[24..].copy_from_slice(&sha_a[24..]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&sha_b[..8]);
    iv[8..24].copy_from_slice(&sha_a[8..24]);
    iv[24..].copy_from_slice(&sha_b[24..]);

    AesKey { key, iv }
}

/// Derive the AES key and IV for a packet sent by `sender`.
pub fn calc_key(auth_key: &AuthKey, msg_key: &[u8; 16], sender: Side, version: ProtocolVersion) -> AesKey {
    match version {
        ProtocolVersion::V1 => calc_key_v1(auth_key, msg_key, sender.x()),
        ProtocolVersion::V2 => calc_key_v2(auth_key, msg_key, sender.x()),
    }
}

/// AES key for packets the client sends.
pub fn generate_client_to_server_aes_key(auth_key: &AuthKey, msg_key: &[u8; 16], version: ProtocolVersion) -> AesKey {
    calc_key(auth_key, msg_key, Side::Client, version)
}

/// AES key for packets the server sends.
pub fn generate_server_to_client_aes_key(auth_key: &AuthKey, msg_key: &[u8; 16], version: ProtocolVersion) -> AesKey {
    calc_key(auth_key, msg_key, Side::Server, version)
}

/// Compute `msg_key`.
///
/// For `V1`, `plaintext` is the header and body without padding; for `V2` it
/// is the padded plaintext.
pub fn calc_msg_key(auth_key: &AuthKey, plaintext: &[u8], sender: Side, version: ProtocolVersion) -> [u8; 16] {
    let mut msg_key = [0u8; 16];
    match version {
        ProtocolVersion::V1 => msg_key.copy_from_slice(&sha1!(plaintext)[4..20]),
        ProtocolVersion::V2 => {
            let x = sender.x();
            let large = sha256!(&auth_key.data[88 + x..88 + x + 32], plaintext);
            msg_key.copy_from_slice(&large[8..24]);
        }
    }
    msg_key
}

/// Bytes of random padding appended to a plaintext of `len` bytes.
///
/// `V1` pads to the block size only. `V2` always adds between 12 and 1024
/// bytes; 17..=32 are used here.
pub fn padding_len(len: usize, version: ProtocolVersion) -> usize {
    match version {
        ProtocolVersion::V1 => (16 - len % 16) % 16,
        ProtocolVersion::V2 => 16 + (16 - len % 16),
    }
}

// ─── Packet encryption ───────────────────────────────────────────────────────

/// Encrypt `buffer` (header plus body) in place.
///
/// After this call `buffer` contains `key_id ‖ msg_key ‖ ciphertext`.
pub fn encrypt_message(
    buffer: &mut DequeBuffer,
    auth_key: &AuthKey,
    sender: Side,
    version: ProtocolVersion,
    rng: &mut (impl RandomSource + ?Sized),
) {
    let pad = padding_len(buffer.len(), version);
    let mut rnd = [0u8; 32];
    rng.fill_bytes(&mut rnd[..pad]);

    let msg_key = match version {
        ProtocolVersion::V1 => {
            let msg_key = calc_msg_key(auth_key, buffer.as_ref(), sender, version);
            buffer.extend(rnd[..pad].iter().copied());
            msg_key
        }
        ProtocolVersion::V2 => {
            buffer.extend(rnd[..pad].iter().copied());
            calc_msg_key(auth_key, buffer.as_ref(), sender, version)
        }
    };

    let key = calc_key(auth_key, &msg_key, sender, version);
    key.encrypt(buffer.as_mut())
        .expect("plaintext padded to the block size");

    buffer.extend_front(&msg_key);
    buffer.extend_front(&auth_key.key_id);
}

/// Decrypt a packet produced by `sender`.
///
/// `buffer` must start with `key_id ‖ msg_key ‖ ciphertext`. The ciphertext
/// is decrypted in place and the plaintext (padding included) returned once
/// `msg_key` checks out. For `V1` the declared body length in the header is
/// needed to recompute `msg_key`; a length that does not fit is reported as
/// [`CryptoError::MessageKeyMismatch`].
pub fn decrypt_message<'a>(
    buffer: &'a mut [u8],
    auth_key: &AuthKey,
    sender: Side,
    version: ProtocolVersion,
) -> Result<&'a mut [u8], CryptoError> {
    if buffer.len() < ENCRYPTED_HEADER_LEN || (buffer.len() - ENCRYPTED_HEADER_LEN) % 16 != 0 {
        return Err(CryptoError::InvalidBuffer);
    }
    if auth_key.key_id != buffer[..8] {
        return Err(CryptoError::AuthKeyMismatch);
    }
    let mut msg_key = [0u8; 16];
    msg_key.copy_from_slice(&buffer[8..24]);

    let key = calc_key(auth_key, &msg_key, sender, version);
    let plaintext = &mut buffer[ENCRYPTED_HEADER_LEN..];
    key.decrypt(plaintext)?;

    let hashed: &[u8] = match version {
        ProtocolVersion::V1 => {
            if plaintext.len() < MESSAGE_HEADER_LEN {
                return Err(CryptoError::MessageKeyMismatch);
            }
            let len = u32::from_le_bytes([plaintext[28], plaintext[29], plaintext[30], plaintext[31]]) as usize;
            if len > plaintext.len() - MESSAGE_HEADER_LEN {
                return Err(CryptoError::MessageKeyMismatch);
            }
            &plaintext[..MESSAGE_HEADER_LEN + len]
        }
        ProtocolVersion::V2 => &*plaintext,
    };
    if msg_key != calc_msg_key(auth_key, hashed, sender, version) {
        return Err(CryptoError::MessageKeyMismatch);
    }
    Ok(plaintext)
}

// ─── Handshake helpers ───────────────────────────────────────────────────────

/// Derive the temporary AES key protecting `server_DH_inner_data` and
/// `client_DH_inner_data`.
pub fn generate_key_data_from_nonce(server_nonce: &[u8; 16], new_nonce: &[u8; 32]) -> AesKey {
    let h1 = sha1!(new_nonce, server_nonce);
    let h2 = sha1!(server_nonce, new_nonce);
    let h3 = sha1!(new_nonce, new_nonce);

    let mut key = [0u8; 32];
    key[..20].copy_from_slice(&h1);
    key[20..].copy_from_slice(&h2[..12]);

    let mut iv = [0u8; 32];
    iv[..8].copy_from_slice(&h2[12..]);
    iv[8..28].copy_from_slice(&h3);
    iv[28..].copy_from_slice(&new_nonce[..4]);

    AesKey { key, iv }
}
