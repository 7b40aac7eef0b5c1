#![allow(dead_code)]

use std::sync::Arc;

use hex_literal::hex;
use mtp_crypto::{DeterministicRandomSource, RandomSource, RsaKey};
use mtp_proto::{Config, HandshakeEngine, HandshakeOutput, Initiator, Responder};

pub const TEST_KEY_PEM: &str = "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAmmF9ZUcK2zRZ+hxGQE0MBKysM0e50VEccGQpcs0bTiGUZLhamADT
ie2K8BE8s9TMz71ehFWhuEl7zKMyd6FysYJyh8kkn48eO+78GC15qoHx2W3STbsQ
PC+StOmbmqG/ZNKxhlZUE3rCu2sesW7Rcqfh7emF9jG65S4b6IHRpa6PakbL/zDE
sPyqVExM/UNQ2vALua8L97IqlqtGB1gI9hsjSBoUNAWrZr8OhfEPU1SB3haJ6um1
xxFue0BawYPhzLXcbQ0Zn3P/OucpkRRRI6bKj3W6nUt6YJ40df96v0jxPdtWvsOA
QrvXTWN737Zs/V0/ZAjaCs40VVYeESl9wwIDAQAB
-----END RSA PUBLIC KEY-----";

pub const TEST_KEY_D: [u8; 256] = hex!(
    "017645e4176e36d15d75a18c33e9424f179863e28113eb07a7b3f7b3174406259c435debdd2438dca12be89889318f12909cca6b91b20904d1b48857fa390db081f2ad00f3250db0226598a32643abea58fa5882d521c27419bef2ffcba4609a309fe308ee26818a260219a6f4f95a0c92d9703f6c8bb540b6c8315c77aed5cc0a90c38e692296bbc91b2863966742034f7c12cfe7334e467ad6c2a99f3498712f1de5f7fdd1f96fa615656bb913eb92262fad3aae81cf2283201758c25cdf1a1ab2d0215227623c2fdf93336cf026e33da86d9e73448215a714fe407f0f4abe566a7f347a707f4e53a3741f435561c218d694ec3be524a69426b6c6f8bbe595"
);

pub const TEST_KEY_FINGERPRINT: i64 = 7123426011100850129;

/// The 2048-bit test key with its secret exponent (server side).
pub fn server_key() -> Arc<RsaKey> {
    Arc::new(RsaKey::from_pem(TEST_KEY_PEM).unwrap().with_secret_exponent(&TEST_KEY_D))
}

/// The same key as a client knows it.
pub fn client_key() -> Arc<RsaKey> {
    Arc::new(RsaKey::from_pem(TEST_KEY_PEM).unwrap())
}

pub fn rng(seed: &str) -> Box<dyn RandomSource + Send> {
    Box::new(DeterministicRandomSource::new(seed.as_bytes()))
}

pub fn client_config() -> Config {
    Config::client(client_key())
}

pub fn server_config() -> Config {
    Config::server(server_key())
}

/// Drive a client and a server engine against each other until neither has
/// anything left to say.
pub fn run_handshake(
    client: &mut HandshakeEngine<Initiator>,
    server: &mut HandshakeEngine<Responder>,
) -> Result<(HandshakeOutput, HandshakeOutput), mtp_proto::handshake::Error> {
    let mut to_server = client.start()?;
    while let Some(request) = to_server.take() {
        let Some(reply) = server.process_incoming(&request)? else { break };
        to_server = client.process_incoming(&reply)?;
    }
    Ok((
        client.output().cloned().expect("client finished"),
        server.output().cloned().expect("server finished"),
    ))
}
