//! MTProto loopback demo: key exchange plus encrypted echo, in one process.
//!
//! # What this does
//!
//! 1. Spawns a server thread holding the demo RSA key (secret exponent included)
//! 2. Connects a client over a pair of channels carrying abridged frames
//! 3. **Handshake** — `req_pq` → `req_DH_params` → `set_client_DH_params` → `dh_gen_ok`
//! 4. Sends a few encrypted pings; the server echoes every message back
//! 5. Prints what came back and shuts both sides down
//!
//! # Run
//! ```text
//! RUST_LOG=debug cargo run -p mtp-loopback -- [v1|v2] [pings]
//! ```

mod framing;

use std::error::Error;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use hex_literal::hex;
use mtp::{Config, Connection, ConnectionState, Deserializable, Message, ProtocolVersion, RsaKey, Serializable};

use framing::{Abridged, AbridgedReader};

type BoxError = Box<dyn Error + Send + Sync>;
type Link = Connection<Abridged<Sender<Vec<u8>>>, Vec<Message>>;

// ── Demo key ─────────────────────────────────────────────────────────────────

/// 2048-bit key used only by this demo and the test suites.
const SERVER_KEY_PEM: &str = "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAmmF9ZUcK2zRZ+hxGQE0MBKysM0e50VEccGQpcs0bTiGUZLhamADT
ie2K8BE8s9TMz71ehFWhuEl7zKMyd6FysYJyh8kkn48eO+78GC15qoHx2W3STbsQ
PC+StOmbmqG/ZNKxhlZUE3rCu2sesW7Rcqfh7emF9jG65S4b6IHRpa6PakbL/zDE
sPyqVExM/UNQ2vALua8L97IqlqtGB1gI9hsjSBoUNAWrZr8OhfEPU1SB3haJ6um1
xxFue0BawYPhzLXcbQ0Zn3P/OucpkRRRI6bKj3W6nUt6YJ40df96v0jxPdtWvsOA
QrvXTWN737Zs/V0/ZAjaCs40VVYeESl9wwIDAQAB
-----END RSA PUBLIC KEY-----";

const SERVER_KEY_D: [u8; 256] = hex!(
    "017645e4176e36d15d75a18c33e9424f179863e28113eb07a7b3f7b3174406259c435debdd2438dca12be89889318f12909cca6b91b20904d1b48857fa390db081f2ad00f3250db0226598a32643abea58fa5882d521c27419bef2ffcba4609a309fe308ee26818a260219a6f4f95a0c92d9703f6c8bb540b6c8315c77aed5cc0a90c38e692296bbc91b2863966742034f7c12cfe7334e467ad6c2a99f3498712f1de5f7fdd1f96fa615656bb913eb92262fad3aae81cf2283201758c25cdf1a1ab2d0215227623c2fdf93336cf026e33da86d9e73448215a714fe407f0f4abe566a7f347a707f4e53a3741f435561c218d694ec3be524a69426b6c6f8bbe595"
);

// ── Frame pump ───────────────────────────────────────────────────────────────

/// Block for one chunk from the peer and feed every complete frame in it.
/// Returns `false` once the peer has hung up.
fn pump(conn: &mut Link, rx: &Receiver<Vec<u8>>, reader: &mut AbridgedReader) -> Result<bool, BoxError> {
    let Ok(chunk) = rx.recv() else {
        return Ok(false);
    };
    reader.push(&chunk);
    while let Some(packet) = reader.next_packet() {
        conn.on_bytes_received(&packet)?;
    }
    Ok(true)
}

// ── Server ───────────────────────────────────────────────────────────────────

/// Echo every message back until the client disconnects. Returns how many
/// messages were echoed.
fn serve(config: Config, rx: Receiver<Vec<u8>>, tx: Sender<Vec<u8>>) -> Result<usize, BoxError> {
    let mut conn: Link = Connection::new(config, Abridged::new(tx), Vec::new())?;
    conn.start()?;
    let mut reader = AbridgedReader::new();
    let mut echoed = 0;
    while pump(&mut conn, &rx, &mut reader)? {
        for message in std::mem::take(conn.dispatcher_mut()) {
            conn.enqueue(&message.data)?;
            echoed += 1;
        }
    }
    log::info!("[loopback] server done, {echoed} message(s) echoed");
    Ok(echoed)
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Run one full session and return the echoed texts.
fn run(version: ProtocolVersion, pings: usize) -> Result<Vec<String>, BoxError> {
    let server_key = Arc::new(RsaKey::from_pem(SERVER_KEY_PEM)?.with_secret_exponent(&SERVER_KEY_D));
    let client_key = Arc::new(RsaKey::from_pem(SERVER_KEY_PEM)?);

    let (to_server, server_rx) = mpsc::channel();
    let (to_client, client_rx) = mpsc::channel();
    let server_config = Config::server(server_key).with_protocol_version(version);
    let server = thread::spawn(move || serve(server_config, server_rx, to_client));

    let config = Config::client(client_key).with_protocol_version(version);
    let mut conn: Link = Connection::new(config, Abridged::new(to_server), Vec::new())?;
    let mut reader = AbridgedReader::new();

    println!("[1] Sending req_pq …");
    conn.start()?;
    while conn.state() == ConnectionState::Handshaking {
        if !pump(&mut conn, &client_rx, &mut reader)? {
            return Err("server hung up during the handshake".into());
        }
    }
    let secure = conn.secure().ok_or("connection closed")?;
    println!("✓ Auth key established: {:?}", secure.auth_key());
    println!("  session_id = {:#018x}", secure.session_id());
    println!("  salt       = {:#018x}", secure.salt());

    println!("\n[2] Sending {pings} encrypted ping(s) ({version:?}) …");
    for i in 0..pings {
        let msg_id = conn.enqueue(&format!("ping #{i}").to_bytes())?;
        log::debug!("[loopback] ping #{i} sent as {msg_id:#x}");
    }

    let mut replies = Vec::with_capacity(pings);
    while replies.len() < pings {
        if !pump(&mut conn, &client_rx, &mut reader)? {
            return Err("server hung up before echoing everything".into());
        }
        for message in std::mem::take(conn.dispatcher_mut()) {
            let text = String::from_bytes(&message.data)?;
            println!("  ✓ {:#x}: {text}", message.message_id);
            replies.push(text);
        }
    }

    // dropping the connection drops its sender, which ends the server loop
    drop(conn);
    let echoed = server.join().map_err(|_| "server thread panicked")??;
    println!("\n✓ Server echoed {echoed} message(s)");
    Ok(replies)
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let version = match args.next().as_deref() {
        Some("v1") => ProtocolVersion::V1,
        Some("v2") | None => ProtocolVersion::V2,
        Some(other) => return Err(format!("unknown protocol version {other:?}, expected v1 or v2").into()),
    };
    let pings = match args.next() {
        Some(n) => n.parse()?,
        None => 3,
    };

    run(version, pings)?;
    println!("✓ Loopback complete");
    Ok(())
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_v2() {
        let replies = run(ProtocolVersion::V2, 4).unwrap();
        assert_eq!(replies, vec!["ping #0", "ping #1", "ping #2", "ping #3"]);
    }

    #[test]
    fn echo_v1() {
        assert_eq!(run(ProtocolVersion::V1, 1).unwrap(), vec!["ping #0"]);
    }

    #[test]
    fn demo_key_is_usable_by_a_server() {
        let key = Arc::new(RsaKey::from_pem(SERVER_KEY_PEM).unwrap().with_secret_exponent(&SERVER_KEY_D));
        assert!(Config::server(key).validate().is_ok());
    }
}
