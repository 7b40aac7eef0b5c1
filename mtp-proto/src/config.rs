//! Connection configuration.

use std::sync::Arc;

use mtp_crypto::{ProtocolVersion, RsaKey};
use num_bigint::BigUint;

/// The side of the key exchange a connection plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Client,
    Server,
}

impl RoleKind {
    /// The sender side used for key derivation of our own packets.
    pub fn side(self) -> mtp_crypto::Side {
        match self {
            RoleKind::Client => mtp_crypto::Side::Client,
            RoleKind::Server => mtp_crypto::Side::Server,
        }
    }
}

/// Hex digits of the 2048-bit safe prime handed out by production servers.
const DEFAULT_DH_PRIME: &str = concat!(
    "c71caeb9c6b1c9048e6c522f70f13f73980d40238e3e21c14934d037563d930f",
    "48198a0aa7c14058229493d22530f4dbfa336f6e0ac925139543aed44cce7c37",
    "20fd51f69458705ac68cd4fe6b6b13abdc9746512969328454f18faf8c595f64",
    "2477fe96bb2a941d5bcd1d4ac8cc49880708fa9b378e3c4f3a9060bee67cf9a4",
    "a4a695811051907e162753b56b0f6b410dba74d8a84b2a14b3144e0ef1284754",
    "fd17ed950d5965b4b9dd46582db1178d169c6bc465b0d6ff9ca3928fef5b9ae4",
    "e418fc15e83ebea0f87fa9ff5eed70050ded2849f47bf959d956850ce929851f",
    "0d8115f635b105ee2e4e15d04b2454bf6f4fadf034b10403119cd8e3b92fcc5b",
);

/// The Diffie-Hellman group a server hands out in `server_DH_inner_data`.
#[derive(Clone, PartialEq, Eq)]
pub struct DhGroup {
    /// 256-byte big-endian prime.
    pub prime: Vec<u8>,
    pub g: u32,
}

impl Default for DhGroup {
    fn default() -> Self {
        let prime = BigUint::parse_bytes(DEFAULT_DH_PRIME.as_bytes(), 16)
            .expect("constant prime is valid hex")
            .to_bytes_be();
        Self { prime, g: 3 }
    }
}

impl std::fmt::Debug for DhGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhGroup")
            .field("bits", &(self.prime.len() * 8))
            .field("g", &self.g)
            .finish()
    }
}

/// Everything a [`Connection`](crate::Connection) needs besides its I/O.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mtp_proto::{Config, ProtocolVersion};
/// # let key: mtp_crypto::RsaKey = unimplemented!();
///
/// let config = Config::client(Arc::new(key))
///     .with_protocol_version(ProtocolVersion::V1)
///     .with_max_dh_retries(2);
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// The server's RSA key. Servers need the secret exponent.
    pub server_rsa_key: Arc<RsaKey>,
    pub protocol_version: ProtocolVersion,
    pub role: RoleKind,
    /// How many `dh_gen_retry` answers a client tolerates before giving up.
    pub max_dh_retries: u32,
    /// Group used by the server role; ignored by clients.
    pub dh_group: DhGroup,
    /// Server role only: answer the first `set_client_DH_params` with
    /// `dh_gen_retry`.
    pub force_dh_retry: bool,
}

impl Config {
    pub const DEFAULT_MAX_DH_RETRIES: u32 = 5;

    pub fn client(server_rsa_key: Arc<RsaKey>) -> Self {
        Self::new(server_rsa_key, RoleKind::Client)
    }

    pub fn server(server_rsa_key: Arc<RsaKey>) -> Self {
        Self::new(server_rsa_key, RoleKind::Server)
    }

    fn new(server_rsa_key: Arc<RsaKey>, role: RoleKind) -> Self {
        Self {
            server_rsa_key,
            protocol_version: ProtocolVersion::default(),
            role,
            max_dh_retries: Self::DEFAULT_MAX_DH_RETRIES,
            dh_group: DhGroup::default(),
            force_dh_retry: false,
        }
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_max_dh_retries(mut self, retries: u32) -> Self {
        self.max_dh_retries = retries;
        self
    }

    pub fn with_dh_group(mut self, group: DhGroup) -> Self {
        self.dh_group = group;
        self
    }

    pub fn with_forced_dh_retry(mut self) -> Self {
        self.force_dh_retry = true;
        self
    }

    /// Check the configuration is usable for its role.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.server_rsa_key.is_valid() {
            return Err("server RSA key is invalid");
        }
        if self.server_rsa_key.byte_len() != 256 {
            return Err("server RSA key must be 2048 bits");
        }
        if self.role == RoleKind::Server {
            if !self.server_rsa_key.has_secret() {
                return Err("server role needs the RSA secret exponent");
            }
            crate::handshake::check_dh_group(&self.dh_group.prime, self.dh_group.g)
                .map_err(|_| "DH group must be a 2048-bit prime with g in 2..=7")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_group_is_2048_bits() {
        let g = DhGroup::default();
        assert_eq!(g.prime.len(), 256);
        assert!(g.prime[0] & 0x80 != 0);
        assert_eq!(g.prime[255], 0x5b);
        assert_eq!(g.g, 3);
    }
}
