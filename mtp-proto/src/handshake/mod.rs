//! Sans-IO MTProto authorization key exchange.
//!
//! # Flow
//!
//! ```text
//! client (Initiator)                           server (Responder)
//!   req_pq                 ─────────────────▶
//!                          ◀───────────────── res_pq
//!   req_DH_params          ─────────────────▶
//!                          ◀───────────────── server_DH_params_ok
//!   set_client_DH_params   ─────────────────▶
//!                          ◀───────────────── dh_gen_ok | dh_gen_retry | dh_gen_fail
//! ```
//!
//! Both sides are a [`HandshakeEngine`], parameterized by a [`Role`]. Each
//! inbound payload (the body of a plain message) goes through
//! [`HandshakeEngine::process_incoming`], which returns the payload to send
//! back, if any. Any error leaves the engine in [`State::Failed`].

mod client;
mod server;

use std::fmt;
use std::sync::Arc;

use mtp_crypto::random::random_array;
use mtp_crypto::{AesKey, AuthKey, CryptoError, RandomSource, RsaKey, sha1};
use mtp_tl::{Cursor, Deserializable};
use num_bigint::BigUint;
use num_traits::One;

use crate::ErrorClass;
use crate::config::RoleKind;

pub use client::Initiator;
pub use server::Responder;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors that can occur during auth key generation.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    InvalidState         { state: State },
    UnexpectedConstructor { id: u32 },
    Decode               (mtp_tl::deserialize::Error),
    InvalidNonce         { got: [u8; 16], expected: [u8; 16] },
    InvalidServerNonce   { got: [u8; 16], expected: [u8; 16] },
    InvalidPqSize        { size: usize },
    InvalidPq            { pq: u64 },
    PqFactorizationFailed { pq: u64 },
    InvalidFactors       { p: Vec<u8>, q: Vec<u8> },
    UnknownFingerprint   { expected: i64, fingerprints: Vec<i64> },
    InvalidRsaKey,
    DhParamsFail,
    InvalidEncryptedLength { len: usize },
    InvalidAnswerHash    { got: [u8; 20], expected: [u8; 20] },
    InvalidG             { g: i32 },
    InvalidDhPrime       { len: usize },
    DhValueOutOfRange    { name: &'static str },
    InvalidRetryId       { got: i64, expected: i64 },
    DhGenFail,
    InvalidNewNonceHash  { got: [u8; 16], expected: [u8; 16] },
    Crypto               (CryptoError),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Decode(_) | Self::InvalidEncryptedLength { .. } => ErrorClass::TransportFatal,
            Self::InvalidNonce { .. }
            | Self::InvalidServerNonce { .. }
            | Self::InvalidAnswerHash { .. }
            | Self::InvalidNewNonceHash { .. } => ErrorClass::Integrity,
            Self::Crypto(
                CryptoError::UnalignedInput { .. }
                | CryptoError::MissingSecretExponent
                | CryptoError::InvalidKey,
            )
            | Self::InvalidState { .. }
            | Self::InvalidRsaKey => ErrorClass::Programming,
            Self::Crypto(_) => ErrorClass::Integrity,
            _ => ErrorClass::Negotiation,
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { state }
                => write!(f, "no handshake input expected in state {state:?}"),
            Self::UnexpectedConstructor { id }
                => write!(f, "unexpected constructor {id:#010x}"),
            Self::Decode(e)
                => write!(f, "malformed handshake record: {e}"),
            Self::InvalidNonce { got, expected }
                => write!(f, "nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidServerNonce { got, expected }
                => write!(f, "server_nonce mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidPqSize { size }
                => write!(f, "pq size {size} invalid (expected 8)"),
            Self::InvalidPq { pq }
                => write!(f, "pq {pq} rejected"),
            Self::PqFactorizationFailed { pq }
                => write!(f, "could not factorize pq {pq}"),
            Self::InvalidFactors { p, q }
                => write!(f, "factors p={p:?} q={q:?} do not match pq"),
            Self::UnknownFingerprint { expected, fingerprints }
                => write!(f, "fingerprint {expected} not in {fingerprints:?}"),
            Self::InvalidRsaKey
                => write!(f, "configured RSA key is invalid"),
            Self::DhParamsFail
                => write!(f, "server returned DH params failure"),
            Self::InvalidEncryptedLength { len }
                => write!(f, "encrypted data of {len} bytes has the wrong size"),
            Self::InvalidAnswerHash { got, expected }
                => write!(f, "answer hash mismatch: got {got:?}, expected {expected:?}"),
            Self::InvalidG { g }
                => write!(f, "g={g} not in 2..=7"),
            Self::InvalidDhPrime { len }
                => write!(f, "dh_prime of {len} bytes is not a 2048-bit number"),
            Self::DhValueOutOfRange { name }
                => write!(f, "{name} outside the safe range"),
            Self::InvalidRetryId { got, expected }
                => write!(f, "retry_id {got} is neither 0 nor {expected}"),
            Self::DhGenFail
                => write!(f, "DH gen failed"),
            Self::InvalidNewNonceHash { got, expected }
                => write!(f, "new nonce hash mismatch: got {got:?}, expected {expected:?}"),
            Self::Crypto(e)
                => write!(f, "crypto: {e}"),
        }
    }
}

impl From<mtp_tl::deserialize::Error> for Error {
    fn from(e: mtp_tl::deserialize::Error) -> Self {
        match e {
            mtp_tl::deserialize::Error::UnexpectedConstructor { id } => Self::UnexpectedConstructor { id },
            e => Self::Decode(e),
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self { Self::Crypto(e) }
}

// ─── State ────────────────────────────────────────────────────────────────────

/// Handshake progress.
///
/// Both roles walk the same states; the client moves on what it sends, the
/// server on what it receives. `PqAccepted` and `DhRepliedFail` are transient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Idle,
    PqRequested,
    PqAccepted,
    DhRequested,
    DhRepliedOk,
    DhRepliedFail,
    DhGenerationResultRequested,
    HasKey,
    Failed,
}

/// Ephemeral data of one exchange, for both roles.
///
/// `peer_public` is `g_a` on the client and `g_b` on the server; `secret` is
/// the local exponent.
#[derive(Clone, Default)]
pub struct HandshakeSession {
    pub client_nonce: [u8; 16],
    pub server_nonce: [u8; 16],
    pub new_nonce: [u8; 32],
    pub pq: u64,
    pub p: u32,
    pub q: u32,
    pub g: u32,
    pub dh_prime: Vec<u8>,
    pub peer_public: Vec<u8>,
    pub(crate) secret: Vec<u8>,
    pub(crate) tmp_aes_key: Option<AesKey>,
    pub retry_id: i64,
    pub time_offset: i32,
}

impl fmt::Debug for HandshakeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("pq", &self.pq)
            .field("p", &self.p)
            .field("q", &self.q)
            .field("g", &self.g)
            .field("retry_id", &self.retry_id)
            .field("time_offset", &self.time_offset)
            .finish_non_exhaustive()
    }
}

/// What survives a successful exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct HandshakeOutput {
    pub auth_key: AuthKey,
    pub server_salt: i64,
    /// Seconds to add to the local clock to get the server's.
    pub time_offset: i32,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// The asymmetric half of the exchange.
pub trait Role: Sized + Send {
    const KIND: RoleKind;

    /// Produce the first message, if this role speaks first.
    fn start(engine: &mut HandshakeEngine<Self>) -> Result<Option<Vec<u8>>, Error>;

    /// Handle one inbound payload in the current state.
    fn step(engine: &mut HandshakeEngine<Self>, payload: &[u8]) -> Result<Option<Vec<u8>>, Error>;
}

/// DH key exchange state machine.
pub struct HandshakeEngine<R: Role> {
    role: R,
    state: State,
    session: HandshakeSession,
    rsa_key: Arc<RsaKey>,
    rng: Box<dyn RandomSource + Send>,
    output: Option<HandshakeOutput>,
    retries: u32,
}

impl<R: Role> HandshakeEngine<R> {
    fn with_role(role: R, rsa_key: Arc<RsaKey>, rng: Box<dyn RandomSource + Send>) -> Self {
        Self {
            role,
            state: State::Idle,
            session: HandshakeSession::default(),
            rsa_key,
            rng,
            output: None,
            retries: 0,
        }
    }

    pub fn state(&self) -> State { self.state }

    pub fn role(&self) -> RoleKind { R::KIND }

    pub fn session(&self) -> &HandshakeSession { &self.session }

    /// Number of `dh_gen_retry` rounds so far.
    pub fn retries(&self) -> u32 { self.retries }

    pub fn output(&self) -> Option<&HandshakeOutput> { self.output.as_ref() }

    pub fn into_output(self) -> Option<HandshakeOutput> { self.output }

    /// Take the result together with the random source, so the caller can
    /// hand the latter on to the message layer.
    pub fn into_parts(self) -> (Option<HandshakeOutput>, Box<dyn RandomSource + Send>) {
        (self.output, self.rng)
    }

    /// Begin the exchange. Returns the first payload to send, if any.
    pub fn start(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if self.state != State::Idle {
            return Err(Error::InvalidState { state: self.state });
        }
        let result = R::start(self);
        self.check(result)
    }

    /// Feed the payload of one inbound plain message.
    pub fn process_incoming(&mut self, payload: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if matches!(self.state, State::HasKey | State::Failed) {
            return Err(Error::InvalidState { state: self.state });
        }
        let result = R::step(self, payload);
        self.check(result)
    }

    fn check(&mut self, result: Result<Option<Vec<u8>>, Error>) -> Result<Option<Vec<u8>>, Error> {
        if let Err(e) = &result {
            log::warn!("[handshake] {:?} failed in {:?}: {e}", R::KIND, self.state);
            self.set_state(State::Failed);
            self.session = HandshakeSession::default();
        }
        result
    }

    fn set_state(&mut self, state: State) {
        log::debug!("[handshake] {:?}: {:?} → {:?}", R::KIND, self.state, state);
        self.state = state;
    }

    fn random<const N: usize>(&mut self) -> [u8; N] {
        random_array(&mut self.rng)
    }

    fn tmp_aes_key(&self) -> Result<AesKey, Error> {
        self.session.tmp_aes_key.clone().ok_or(Error::InvalidState { state: self.state })
    }

    /// Key is final: publish the result and drop the ephemeral data.
    fn finish(&mut self, auth_key: AuthKey) {
        let server_salt = server_salt(&self.session.new_nonce, &self.session.server_nonce);
        log::info!("[handshake] {:?} established {auth_key:?}", R::KIND);
        self.output = Some(HandshakeOutput {
            auth_key,
            server_salt,
            time_offset: self.session.time_offset,
        });
        self.session = HandshakeSession::default();
        self.set_state(State::HasKey);
    }
}

impl<R: Role> fmt::Debug for HandshakeEngine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeEngine")
            .field("role", &R::KIND)
            .field("state", &self.state)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

// ─── Shared steps ────────────────────────────────────────────────────────────

/// `sha1(inner) ‖ inner ‖ random padding`, AES-IGE encrypted with `key`.
fn encrypt_hashed(inner: &[u8], key: &AesKey, rng: &mut (impl RandomSource + ?Sized)) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(20 + inner.len() + 16);
    buf.extend(sha1!(inner));
    buf.extend_from_slice(inner);
    let pad = (16 - buf.len() % 16) % 16;
    let mut rnd = [0u8; 16];
    rng.fill_bytes(&mut rnd[..pad]);
    buf.extend_from_slice(&rnd[..pad]);
    key.encrypt(&mut buf)?;
    Ok(buf)
}

/// Parse `sha1 ‖ record ‖ padding`, checking the hash over the bytes the
/// record actually spans.
fn parse_hashed<T: Deserializable>(plain: &[u8]) -> Result<T, Error> {
    if plain.len() < 20 {
        return Err(Error::InvalidEncryptedLength { len: plain.len() });
    }
    let mut got = [0u8; 20];
    got.copy_from_slice(&plain[..20]);
    let mut cursor = Cursor::from_slice(&plain[20..]);
    let value = T::deserialize(&mut cursor)?;
    let expected = sha1!(&plain[20..20 + cursor.pos()]);
    if got != expected {
        return Err(Error::InvalidAnswerHash { got, expected });
    }
    Ok(value)
}

/// Inverse of [`encrypt_hashed`].
fn decrypt_hashed<T: Deserializable>(data: &[u8], key: &AesKey) -> Result<T, Error> {
    if data.len() < 32 || data.len() % 16 != 0 {
        return Err(Error::InvalidEncryptedLength { len: data.len() });
    }
    let mut plain = data.to_vec();
    key.decrypt(&mut plain)?;
    parse_hashed(&plain)
}

/// `LE(new_nonce[0..8]) ^ LE(server_nonce[0..8])`.
pub fn server_salt(new_nonce: &[u8; 32], server_nonce: &[u8; 16]) -> i64 {
    let mut buf = [0u8; 8];
    for ((dst, a), b) in buf.iter_mut().zip(&new_nonce[..8]).zip(&server_nonce[..8]) {
        *dst = a ^ b;
    }
    i64::from_le_bytes(buf)
}

/// `peer ^ secret mod prime`, as an [`AuthKey`].
fn compute_auth_key(peer: &[u8], secret: &[u8], prime: &[u8]) -> Result<AuthKey, Error> {
    let value = mtp_crypto::mod_exp(peer, prime, secret);
    AuthKey::from_dh_result(&value).ok_or(Error::DhValueOutOfRange { name: "auth_key" })
}

/// `g` in 2..=7 and a 256-byte prime with the top bit set.
pub(crate) fn check_dh_group(prime: &[u8], g: u32) -> Result<(), Error> {
    if !(2..=7).contains(&g) {
        return Err(Error::InvalidG { g: g as i32 });
    }
    if prime.len() != 256 || prime[0] & 0x80 == 0 {
        return Err(Error::InvalidDhPrime { len: prime.len() });
    }
    Ok(())
}

/// `1 < value < prime - 1`, and at least 2^(2048-64) away from both ends.
fn check_dh_value(name: &'static str, value: &[u8], prime: &BigUint) -> Result<(), Error> {
    if value.len() > 256 {
        return Err(Error::DhValueOutOfRange { name });
    }
    let value = BigUint::from_bytes_be(value);
    let one = BigUint::one();
    let safety = &one << (2048 - 64);
    let ok = one < value
        && value < prime - &one
        && safety < value
        && value < prime - &safety;
    if ok { Ok(()) } else { Err(Error::DhValueOutOfRange { name }) }
}

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNonce { got: *got, expected: *expected })
    }
}

fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidServerNonce { got: *got, expected: *expected })
    }
}

fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected { Ok(()) } else {
        Err(Error::InvalidNewNonceHash { got: *got, expected: *expected })
    }
}
