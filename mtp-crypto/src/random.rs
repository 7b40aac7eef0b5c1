//! Injectable randomness.
//!
//! Every nonce, exponent and padding byte the protocol needs is drawn from a
//! [`RandomSource`], so tests can replay an exchange byte for byte.

use sha2::{Digest, Sha512};

/// A source of random bytes.
pub trait RandomSource {
    /// Fill `buf` entirely.
    fn fill_bytes(&mut self, buf: &mut [u8]);
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn fill_bytes(&mut self, buf: &mut [u8]) { (**self).fill_bytes(buf) }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn fill_bytes(&mut self, buf: &mut [u8]) { (**self).fill_bytes(buf) }
}

/// Draw a fixed-size array from `rng`.
pub fn random_array<const N: usize>(rng: &mut (impl RandomSource + ?Sized)) -> [u8; N] {
    let mut out = [0u8; N];
    rng.fill_bytes(&mut out);
    out
}

/// The operating system's CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        getrandom::getrandom(buf).expect("getrandom");
    }
}

/// Reproducible stream for tests: `state = SHA512(seed)`, emit `state`, then
/// `state = SHA512(state)` whenever the 64 bytes are used up.
#[derive(Clone)]
pub struct DeterministicRandomSource {
    state: [u8; 64],
    pos: usize,
}

impl DeterministicRandomSource {
    pub fn new(seed: &[u8]) -> Self {
        Self { state: Sha512::digest(seed).into(), pos: 0 }
    }
}

impl RandomSource for DeterministicRandomSource {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        for byte in buf {
            if self.pos == self.state.len() {
                self.state = Sha512::digest(self.state).into();
                self.pos = 0;
            }
            *byte = self.state[self.pos];
            self.pos += 1;
        }
    }
}

impl std::fmt::Debug for DeterministicRandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeterministicRandomSource")
    }
}
