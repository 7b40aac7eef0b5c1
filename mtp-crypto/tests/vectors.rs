use hex_literal::hex;
use mtp_crypto::{
    AuthKey, CryptoError, DequeBuffer, DeterministicRandomSource, ProtocolVersion, RsaKey, Side,
    aes, calc_key, decrypt_message, encrypt_message, generate_client_to_server_aes_key,
    generate_key_data_from_nonce, generate_server_to_client_aes_key, rsa,
};

/// Bytes 0..=191 followed by 64 zeros.
fn ramp_key() -> AuthKey {
    let mut data = [0u8; 256];
    for (i, b) in data.iter_mut().take(192).enumerate() {
        *b = i as u8;
    }
    AuthKey::from_bytes(data)
}

fn ramp_msg_key() -> [u8; 16] {
    core::array::from_fn(|i| i as u8)
}

// ── Key schedules ─────────────────────────────────────────────────────────────

#[test]
fn v1_key_derivation() {
    let ak = ramp_key();
    let mk = ramp_msg_key();
    let c2s = generate_client_to_server_aes_key(&ak, &mk, ProtocolVersion::V1);
    assert_eq!(c2s.key, hex!("17d7295ca9213d1ab656acdb1ad48b2ea7f3a8f7095098d5508b900bbd5fccfc"));
    assert_eq!(c2s.iv, hex!("2d7d16a65a84108e9805656caa474501cc580aa2edc33abfd0bfad785464d1c6"));
    let s2c = generate_server_to_client_aes_key(&ak, &mk, ProtocolVersion::V1);
    assert_eq!(s2c.key, hex!("bb17b07eb91110647098b069bd1a9b6fe5c4bcc3c31f8e67e831d07a61085f68"));
    assert_eq!(s2c.iv, hex!("5197fc1e25b41fe36f18b5a3a8b2b36cb2cb061f1f157b3514fe42e74fb58359"));
}

#[test]
fn v2_key_derivation() {
    let ak = ramp_key();
    let mk = ramp_msg_key();
    let c2s = calc_key(&ak, &mk, Side::Client, ProtocolVersion::V2);
    assert_eq!(c2s.key, hex!("704ed09c8b41668ae8f99d244738f71dbddc44469b6bbd4aa8573dd042bd059e"));
    assert_eq!(c2s.iv, hex!("4d266000a550edabbf4c7ce40fd0043cc92230184cd317a5cc9c2482fd3b9318"));
    let s2c = calc_key(&ak, &mk, Side::Server, ProtocolVersion::V2);
    assert_eq!(s2c.key, hex!("217725799b245806458174a1fcfbc883906807b15033fdd0ea2b4d69cf9c364e"));
    assert_eq!(s2c.iv, hex!("669a6538917a4fa56ca32360a431c9160be4ad887140980dab91ce7bdc47ffbc"));
}

#[test]
fn tmp_aes_key_from_nonces() {
    let server_nonce: [u8; 16] = core::array::from_fn(|i| 100 + i as u8);
    let new_nonce: [u8; 32] = core::array::from_fn(|i| 200 + i as u8);
    let k = generate_key_data_from_nonce(&server_nonce, &new_nonce);
    assert_eq!(k.key, hex!("0113c496acac66572c0617ecbfd0c132d7078371f9e5685759d0949077f90bec"));
    assert_eq!(k.iv, hex!("7c1b4cf35ca7b2544952fd081be113fb357cdd9dd48be70a98a2df99c8c9cacb"));
}

// ── AES-IGE ───────────────────────────────────────────────────────────────────

#[test]
fn ige_known_answer() {
    let key: [u8; 32] = core::array::from_fn(|i| i as u8);
    let iv: [u8; 32] = core::array::from_fn(|i| 32 + i as u8);
    let plain: Vec<u8> = (0..48).map(|i| (i * 7) as u8).collect();
    let mut data = plain.clone();
    aes::ige_encrypt(&mut data, &key, &iv).unwrap();
    assert_eq!(
        data,
        hex!("cc0c5d515adb2aaaae819c8bbd2731cf61b0d03bea09707d9ff68ee10dd151ad0298448342333558988043fdead0e3d8")
    );
    aes::ige_decrypt(&mut data, &key, &iv).unwrap();
    assert_eq!(data, plain);
}

#[test]
fn ige_rejects_partial_block() {
    let mut data = [0u8; 17];
    assert_eq!(
        aes::ige_encrypt(&mut data, &[0; 32], &[0; 32]),
        Err(CryptoError::UnalignedInput { len: 17 })
    );
}

// ── Packet encryption ─────────────────────────────────────────────────────────

fn plaintext(body_len: usize) -> Vec<u8> {
    let mut p = Vec::new();
    p.extend(7i64.to_le_bytes()); // salt
    p.extend(9i64.to_le_bytes()); // session
    p.extend(4i64.to_le_bytes()); // msg_id
    p.extend(1i32.to_le_bytes()); // seq_no
    p.extend((body_len as u32).to_le_bytes());
    p.extend((0..body_len).map(|i| i as u8));
    p
}

#[test]
fn encrypt_then_decrypt_both_versions() {
    let ak = ramp_key();
    let mut rng = DeterministicRandomSource::new(b"pad");
    for version in [ProtocolVersion::V1, ProtocolVersion::V2] {
        for body_len in [4usize, 16, 60] {
            let p = plaintext(body_len);
            let mut buf = DequeBuffer::from_body(&p, 24);
            encrypt_message(&mut buf, &ak, Side::Client, version, &mut rng);
            let mut packet = buf.into_vec();
            assert_eq!(&packet[..8], &ak.key_id());
            assert_eq!((packet.len() - 24) % 16, 0);
            let out = decrypt_message(&mut packet, &ak, Side::Client, version).unwrap();
            assert_eq!(&out[..p.len()], &p[..]);
            let pad = out.len() - p.len();
            match version {
                ProtocolVersion::V1 => assert!(pad < 16),
                ProtocolVersion::V2 => assert!((12..=1024).contains(&pad)),
            }
        }
    }
}

#[test]
fn wrong_direction_or_tamper_is_rejected() {
    let ak = ramp_key();
    let mut rng = DeterministicRandomSource::new(b"pad");
    let mut buf = DequeBuffer::from_body(&plaintext(8), 24);
    encrypt_message(&mut buf, &ak, Side::Server, ProtocolVersion::V2, &mut rng);
    let packet = buf.into_vec();

    let mut copy = packet.clone();
    assert_eq!(
        decrypt_message(&mut copy, &ak, Side::Client, ProtocolVersion::V2),
        Err(CryptoError::MessageKeyMismatch)
    );

    let mut copy = packet.clone();
    *copy.last_mut().unwrap() ^= 1;
    assert_eq!(
        decrypt_message(&mut copy, &ak, Side::Server, ProtocolVersion::V2),
        Err(CryptoError::MessageKeyMismatch)
    );

    let mut copy = packet.clone();
    copy[0] ^= 1;
    assert_eq!(
        decrypt_message(&mut copy, &ak, Side::Server, ProtocolVersion::V2),
        Err(CryptoError::AuthKeyMismatch)
    );

    let mut short = packet[..20].to_vec();
    assert_eq!(
        decrypt_message(&mut short, &ak, Side::Server, ProtocolVersion::V2),
        Err(CryptoError::InvalidBuffer)
    );
}

// ── RSA ───────────────────────────────────────────────────────────────────────

const TEST_KEY_PEM: &str = "-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAmmF9ZUcK2zRZ+hxGQE0MBKysM0e50VEccGQpcs0bTiGUZLhamADT
ie2K8BE8s9TMz71ehFWhuEl7zKMyd6FysYJyh8kkn48eO+78GC15qoHx2W3STbsQ
PC+StOmbmqG/ZNKxhlZUE3rCu2sesW7Rcqfh7emF9jG65S4b6IHRpa6PakbL/zDE
sPyqVExM/UNQ2vALua8L97IqlqtGB1gI9hsjSBoUNAWrZr8OhfEPU1SB3haJ6um1
xxFue0BawYPhzLXcbQ0Zn3P/OucpkRRRI6bKj3W6nUt6YJ40df96v0jxPdtWvsOA
QrvXTWN737Zs/V0/ZAjaCs40VVYeESl9wwIDAQAB
-----END RSA PUBLIC KEY-----";

const TEST_KEY_D: [u8; 256] = hex!(
    "017645e4176e36d15d75a18c33e9424f179863e28113eb07a7b3f7b3174406259c435debdd2438dca12be89889318f12909cca6b91b20904d1b48857fa390db081f2ad00f3250db0226598a32643abea58fa5882d521c27419bef2ffcba4609a309fe308ee26818a260219a6f4f95a0c92d9703f6c8bb540b6c8315c77aed5cc0a90c38e692296bbc91b2863966742034f7c12cfe7334e467ad6c2a99f3498712f1de5f7fdd1f96fa615656bb913eb92262fad3aae81cf2283201758c25cdf1a1ab2d0215227623c2fdf93336cf026e33da86d9e73448215a714fe407f0f4abe566a7f347a707f4e53a3741f435561c218d694ec3be524a69426b6c6f8bbe595"
);

#[test]
fn pem_key_fingerprint_and_roundtrip() {
    let key = RsaKey::from_pem(TEST_KEY_PEM).unwrap().with_secret_exponent(&TEST_KEY_D);
    assert_eq!(key.fingerprint(), 7123426011100850129);
    assert_eq!(key.byte_len(), 256);
    assert_eq!(key.exponent(), &[0x01, 0x00, 0x01]);

    let mut data = vec![0u8; 256];
    for (i, b) in data.iter_mut().enumerate().skip(1) {
        *b = (i * 13) as u8;
    }
    let cipher = rsa::encrypt(&data, &key).unwrap();
    assert_eq!(cipher.len(), 256);
    assert_ne!(cipher, data);
    assert_eq!(rsa::decrypt(&cipher, &key).unwrap(), data);
}
