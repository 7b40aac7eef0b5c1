mod common;

use common::rng;
use mtp_crypto::{AuthKey, ProtocolVersion, Side};
use mtp_proto::secure::Error;
use mtp_proto::{ErrorClass, HandshakeOutput, MessageType, SecureMessageLayer, SendMode};
use mtp_tl::{Serializable, enums, gzip, types};

fn output() -> HandshakeOutput {
    HandshakeOutput {
        auth_key: AuthKey::from_bytes(core::array::from_fn(|i| (i as u8).wrapping_mul(13).wrapping_add(5))),
        server_salt: -0x1122334455667788,
        time_offset: 0,
    }
}

fn pair(version: ProtocolVersion) -> (SecureMessageLayer, SecureMessageLayer) {
    let client = SecureMessageLayer::new(output(), version, Side::Client, rng("secure/client"));
    let server = SecureMessageLayer::new(output(), version, Side::Server, rng("secure/server"));
    (client, server)
}

/// A pair where the server already knows the client's session.
fn bound_pair(version: ProtocolVersion) -> (SecureMessageLayer, SecureMessageLayer) {
    let (mut client, mut server) = pair(version);
    let (packet, _) = client.send(&[0; 4], SendMode::NonContent, MessageType::ClientRequest).unwrap();
    server.receive(&packet).unwrap();
    (client, server)
}

fn body(tag: u32, len: usize) -> Vec<u8> {
    let mut out = tag.to_le_bytes().to_vec();
    out.extend((0..len).map(|i| i as u8));
    out.resize(out.len().div_ceil(4) * 4, 0);
    out
}

#[test]
fn roundtrip_both_versions() {
    for version in [ProtocolVersion::V1, ProtocolVersion::V2] {
        let (mut client, mut server) = pair(version);
        let payload = body(0xdeadbeef, 100);
        let (packet, msg_id) = client.send(&payload, SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
        assert_eq!(&packet[..8], &output().auth_key.key_id());
        assert_eq!((packet.len() - 24) % 16, 0);

        let messages = server.receive(&packet).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, msg_id);
        assert_eq!(messages[0].sequence_number, 1);
        assert_eq!(messages[0].data, payload);

        let reply = body(0x0badf00d, 3);
        let (packet, reply_id) = server.send(&reply, SendMode::ContentRelated, MessageType::ServerResponse).unwrap();
        assert_eq!(reply_id & 3, 1);
        let messages = client.receive(&packet).unwrap();
        assert_eq!(messages[0].data, reply);
    }
}

#[test]
fn v2_padding_is_at_least_twelve_bytes() {
    let (mut client, _) = pair(ProtocolVersion::V2);
    for len in [0usize, 4, 12, 16, 60, 64] {
        let payload = vec![7u8; len];
        let (packet, _) = client.send(&payload, SendMode::NonContent, MessageType::ClientRequest).unwrap();
        let padding = packet.len() - 24 - 32 - len;
        assert!((12..=1024).contains(&padding), "len={len} padding={padding}");
    }
}

#[test]
fn two_thousand_messages_are_sequenced() {
    let (mut client, mut server) = pair(ProtocolVersion::V2);
    let mut last_id = 0;
    for i in 0..2000 {
        let (packet, msg_id) = client
            .send(&(i as u32).to_bytes(), SendMode::ContentRelated, MessageType::ClientRequest)
            .unwrap();
        assert!(msg_id > last_id);
        assert_eq!(msg_id & 3, 0);
        last_id = msg_id;

        let messages = server.receive(&packet).unwrap();
        assert_eq!(messages[0].sequence_number, 2 * i + 1);
    }
    assert_eq!(client.content_messages(), 2000);
}

#[test]
fn non_content_seq_no_is_even() {
    let (mut client, mut server) = pair(ProtocolVersion::V2);
    let mut seqs = Vec::new();
    for mode in [SendMode::NonContent, SendMode::ContentRelated, SendMode::NonContent, SendMode::ContentRelated] {
        let (packet, _) = client.send(&[1, 0, 0, 0], mode, MessageType::ClientRequest).unwrap();
        seqs.push(server.receive(&packet).unwrap()[0].sequence_number);
    }
    assert_eq!(seqs, vec![0, 1, 2, 3]);
}

#[test]
fn short_or_unaligned_packets_leave_state_untouched() {
    let (_, mut server) = pair(ProtocolVersion::V2);
    for len in [0usize, 8, 23, 25, 41] {
        let err = server.receive(&vec![0u8; len]).unwrap_err();
        assert_eq!(err, Error::InvalidPacketLength { len });
        assert_eq!(err.class(), ErrorClass::TransportFatal);
    }
    assert_eq!(server.session_id(), 0);
}

#[test]
fn tampering_is_an_integrity_error() {
    let (mut client, mut server) = pair(ProtocolVersion::V2);
    let (packet, _) = client.send(&body(1, 40), SendMode::ContentRelated, MessageType::ClientRequest).unwrap();

    let mut bad_key = packet.clone();
    bad_key[0] ^= 1;
    let err = server.receive(&bad_key).unwrap_err();
    assert_eq!(err, Error::Crypto(mtp_crypto::CryptoError::AuthKeyMismatch));

    let mut bad_body = packet.clone();
    let last = bad_body.len() - 1;
    bad_body[last] ^= 1;
    let err = server.receive(&bad_body).unwrap_err();
    assert_eq!(err, Error::Crypto(mtp_crypto::CryptoError::MessageKeyMismatch));
    assert_eq!(err.class(), ErrorClass::Integrity);

    // the untouched packet still opens, and only now is the session adopted
    assert_eq!(server.session_id(), 0);
    server.receive(&packet).unwrap();
    assert_eq!(server.session_id(), client.session_id());
}

#[test]
fn wrong_session_is_rejected() {
    let (mut client, mut server) = bound_pair(ProtocolVersion::V2);
    let mut stranger = SecureMessageLayer::new(output(), ProtocolVersion::V2, Side::Client, rng("stranger"))
        .with_session_id(client.session_id() ^ 1);
    let (packet, _) = stranger.send(&[0; 4], SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
    assert!(matches!(server.receive(&packet), Err(Error::SessionMismatch { .. })));

    let (packet, _) = client.send(&[0; 4], SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
    assert_eq!(server.receive(&packet).unwrap().len(), 1);
}

#[test]
fn direction_matters() {
    let (mut client, _) = pair(ProtocolVersion::V2);
    let mut other_client = SecureMessageLayer::new(output(), ProtocolVersion::V2, Side::Client, rng("other"));
    let (packet, _) = client.send(&[0; 4], SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
    // a client cannot open a packet sealed by a client
    assert!(matches!(
        other_client.receive(&packet),
        Err(Error::Crypto(mtp_crypto::CryptoError::MessageKeyMismatch))
    ));
}

#[test]
fn server_initiated_ids_end_in_three() {
    let (mut client, mut server) = bound_pair(ProtocolVersion::V2);
    let (packet, id) = server.send(&[0; 4], SendMode::ContentRelated, MessageType::ServerInitiated).unwrap();
    assert_eq!(id & 3, 3);
    assert_eq!(client.receive(&packet).unwrap()[0].message_id, id);
}

#[test]
fn container_with_bad_entry() {
    let (mut client, mut server) = bound_pair(ProtocolVersion::V2);
    let messages = vec![
        types::Message { msg_id: 0x6000_0000_0000_0001, seqno: 1, body: body(10, 4) },
        // client parity inside a server packet
        types::Message { msg_id: 0x6000_0000_0000_0004, seqno: 3, body: body(11, 4) },
        types::Message { msg_id: 0x6000_0000_0000_0009, seqno: 5, body: body(12, 4) },
    ];
    let container = enums::MessageContainer::MsgContainer(types::MsgContainer { messages }).to_bytes();
    let (packet, _) = server.send(&container, SendMode::NonContent, MessageType::ServerResponse).unwrap();

    let mut delivered = Vec::new();
    let err = client.receive_with(&packet, |m| delivered.push(m)).unwrap_err();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].data, body(10, 4));
    assert_eq!(delivered[1].data, body(12, 4));
    match err {
        Error::ContainerPartiallyFailed { delivered, failures } => {
            assert_eq!(delivered, 2);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, 0x6000_0000_0000_0004);
            assert_eq!(failures[0].1, Error::InvalidMessageId { msg_id: 0x6000_0000_0000_0004 });
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn nested_container_is_an_entry_failure() {
    let (mut client, mut server) = bound_pair(ProtocolVersion::V2);
    let inner = enums::MessageContainer::MsgContainer(types::MsgContainer {
        messages: vec![types::Message { msg_id: 0x7000_0000_0000_0001, seqno: 1, body: body(1, 0) }],
    })
    .to_bytes();
    let outer = enums::MessageContainer::MsgContainer(types::MsgContainer {
        messages: vec![
            types::Message { msg_id: 0x7000_0000_0000_0005, seqno: 2, body: inner },
            types::Message { msg_id: 0x7000_0000_0000_0009, seqno: 3, body: body(2, 0) },
        ],
    })
    .to_bytes();
    let (packet, _) = server.send(&outer, SendMode::NonContent, MessageType::ServerResponse).unwrap();

    let mut delivered = Vec::new();
    let err = client.receive_with(&packet, |m| delivered.push(m)).unwrap_err();
    assert_eq!(delivered.len(), 1);
    let Error::ContainerPartiallyFailed { failures, .. } = err else { panic!("{err:?}") };
    assert_eq!(failures, vec![(0x7000_0000_0000_0005, Error::NestedContainer { msg_id: 0x7000_0000_0000_0005 })]);
}

#[test]
fn outbound_container_roundtrip() {
    let (mut client, mut server) = pair(ProtocolVersion::V1);
    let a = body(1, 8);
    let b = body(2, 0);
    let c = body(3, 300);
    let (packet, container_id, ids) = client
        .send_container(
            &[(a.as_slice(), SendMode::ContentRelated), (b.as_slice(), SendMode::NonContent), (c.as_slice(), SendMode::ContentRelated)],
            MessageType::ClientRequest,
        )
        .unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(container_id > ids[2]);

    let messages = server.receive(&packet).unwrap();
    let data: Vec<_> = messages.iter().map(|m| m.data.clone()).collect();
    assert_eq!(data, vec![a, b, c]);
    let seqs: Vec<_> = messages.iter().map(|m| m.sequence_number).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(messages.iter().map(|m| m.message_id).collect::<Vec<_>>(), ids);
}

#[test]
fn gzip_packed_is_unwrapped() {
    let (mut client, mut server) = pair(ProtocolVersion::V2);
    let inner = body(0x1234_5678, 4000);
    let packed = gzip::gzip_pack(&inner);
    assert!(packed.len() < inner.len());
    let (packet, msg_id) = client.send(&packed, SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
    let messages = server.receive(&packet).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_id, msg_id);
    assert_eq!(messages[0].data, inner);
}

#[test]
fn nested_gzip_packed_is_rejected() {
    let (mut client, mut server) = pair(ProtocolVersion::V2);
    let mut packed = body(0x1234_5678, 64);
    for _ in 0..3 {
        packed = gzip::gzip_pack(&packed);
    }
    let (packet, msg_id) = client.send(&packed, SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
    let err = server.receive(&packet).unwrap_err();
    assert_eq!(err, Error::NestedGzip { msg_id });
    assert_eq!(err.class(), ErrorClass::Integrity);

    // a single layer still goes through afterwards
    let inner = body(0x1234_5678, 64);
    let (packet, _) = client.send(&gzip::gzip_pack(&inner), SendMode::ContentRelated, MessageType::ClientRequest).unwrap();
    assert_eq!(server.receive(&packet).unwrap()[0].data, inner);
}

#[test]
fn salt_can_be_updated() {
    let (mut client, _) = pair(ProtocolVersion::V2);
    assert_eq!(client.salt(), output().server_salt);
    client.set_salt(42);
    assert_eq!(client.salt(), 42);
}
