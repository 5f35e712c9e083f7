// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Routing behavior: QoS handshakes, wildcard matching, unsubscribe.

use codec::{
    ControlPacket, PacketId, PublishAckPacket, PublishPacket, PublishReleasePacket, QoS,
    UnsubscribePacket,
};

mod common;
use common::{start_broker, TestClient};

#[tokio::test]
async fn test_qos0_routing() {
    const PORT: u16 = 18941;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-0").await;
    subscriber.subscribe("test", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::handshake(PORT, "pub-0").await;
    publisher.publish_qos0("test", b"hi").await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "test");
    assert_eq!(packet.message(), b"hi");
    assert_eq!(packet.qos(), QoS::AtMostOnce);
    assert!(!packet.retain());
}

#[tokio::test]
async fn test_qos1_handshake() {
    const PORT: u16 = 18942;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-1").await;
    subscriber.subscribe("news", QoS::AtLeastOnce, 1).await;

    let mut publisher = TestClient::handshake(PORT, "pub-1").await;
    let mut packet = PublishPacket::new("news", QoS::AtLeastOnce, b"flash").unwrap();
    packet.set_packet_id(PacketId::new(0x1234));
    publisher.send_packet(&packet).await;

    // The broker acknowledges the publisher with the same packet id.
    match publisher.read_packet().await {
        ControlPacket::PublishAck(ack) => {
            assert_eq!(ack.packet_id(), PacketId::new(0x1234));
        }
        other => panic!("expected publish ack, got {other:?}"),
    }

    // The subscriber receives the message at QoS 1 with a broker assigned
    // packet id, and completes the handshake.
    let delivery = subscriber.expect_publish().await;
    assert_eq!(delivery.qos(), QoS::AtLeastOnce);
    assert_eq!(delivery.message(), b"flash");
    assert_ne!(delivery.packet_id(), PacketId::new(0));
    subscriber
        .send_packet(&PublishAckPacket::new(delivery.packet_id()))
        .await;
}

#[tokio::test]
async fn test_qos_downgraded_to_granted() {
    const PORT: u16 = 18943;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-down").await;
    subscriber.subscribe("sensors/#", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::handshake(PORT, "pub-down").await;
    let mut packet = PublishPacket::new("sensors/a", QoS::AtLeastOnce, b"21.5").unwrap();
    packet.set_packet_id(PacketId::new(9));
    publisher.send_packet(&packet).await;

    let delivery = subscriber.expect_publish().await;
    // min(publisher QoS 1, granted QoS 0) = 0.
    assert_eq!(delivery.qos(), QoS::AtMostOnce);
}

#[tokio::test]
async fn test_single_level_wildcard() {
    const PORT: u16 = 18944;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-wild").await;
    subscriber.subscribe("a/+/c", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::handshake(PORT, "pub-wild").await;
    // Neither of these two match the filter.
    publisher.publish_qos0("a/b/d", b"no").await;
    publisher.publish_qos0("a/c", b"no").await;
    publisher.publish_qos0("a/b/c", b"yes").await;

    // Per-publisher ordering guarantees the first delivery is the match.
    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "a/b/c");
    assert_eq!(packet.message(), b"yes");
}

#[tokio::test]
async fn test_multi_level_wildcard() {
    const PORT: u16 = 18945;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-multi").await;
    subscriber.subscribe("a/#", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::handshake(PORT, "pub-multi").await;
    publisher.publish_qos0("b/x", b"no").await;
    publisher.publish_qos0("a", b"parent").await;
    publisher.publish_qos0("a/b", b"child").await;
    publisher.publish_qos0("a/b/c", b"grandchild").await;

    assert_eq!(subscriber.expect_publish().await.message(), b"parent");
    assert_eq!(subscriber.expect_publish().await.message(), b"child");
    assert_eq!(subscriber.expect_publish().await.message(), b"grandchild");
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    const PORT: u16 = 18946;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-gone").await;
    subscriber.subscribe("old", QoS::AtMostOnce, 1).await;
    subscriber.subscribe("marker", QoS::AtMostOnce, 2).await;

    let packet = UnsubscribePacket::new("old", PacketId::new(3)).unwrap();
    subscriber.send_packet(&packet).await;
    match subscriber.read_packet().await {
        ControlPacket::UnsubscribeAck(ack) => {
            assert_eq!(ack.packet_id(), PacketId::new(3));
        }
        other => panic!("expected unsubscribe ack, got {other:?}"),
    }

    let mut publisher = TestClient::handshake(PORT, "pub-gone").await;
    publisher.publish_qos0("old", b"lost").await;
    publisher.publish_qos0("marker", b"seen").await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "marker");
    assert_eq!(packet.message(), b"seen");
}

#[tokio::test]
async fn test_qos2_exactly_once() {
    const PORT: u16 = 18947;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sub-exact").await;
    subscriber.subscribe("once", QoS::AtMostOnce, 1).await;

    let mut publisher = TestClient::handshake(PORT, "pub-exact").await;
    let mut packet = PublishPacket::new("once", QoS::ExactOnce, b"x").unwrap();
    packet.set_packet_id(PacketId::new(5));
    publisher.send_packet(&packet).await;
    match publisher.read_packet().await {
        ControlPacket::PublishReceived(rec) => assert_eq!(rec.packet_id(), PacketId::new(5)),
        other => panic!("expected publish received, got {other:?}"),
    }

    // Re-send the same packet id before releasing: it must not be routed
    // a second time, but still gets a PUBREC.
    packet.set_dup(true);
    publisher.send_packet(&packet).await;
    match publisher.read_packet().await {
        ControlPacket::PublishReceived(rec) => assert_eq!(rec.packet_id(), PacketId::new(5)),
        other => panic!("expected publish received, got {other:?}"),
    }

    publisher
        .send_packet(&PublishReleasePacket::new(PacketId::new(5)))
        .await;
    match publisher.read_packet().await {
        ControlPacket::PublishComplete(comp) => assert_eq!(comp.packet_id(), PacketId::new(5)),
        other => panic!("expected publish complete, got {other:?}"),
    }

    // Exactly one copy arrived, followed directly by the marker.
    publisher.publish_qos0("once", b"marker").await;
    assert_eq!(subscriber.expect_publish().await.message(), b"x");
    assert_eq!(subscriber.expect_publish().await.message(), b"marker");
}
