// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Retained message laws, will publication and session takeover.

use codec::{
    ConnectFlags, ConnectPacket, ConnectReturnCode, DisconnectPacket, PublishPacket, QoS,
};

mod common;
use common::{start_broker, TestClient};

async fn publish_retained(client: &mut TestClient, topic: &str, payload: &[u8]) {
    let mut packet = PublishPacket::new(topic, QoS::AtMostOnce, payload).unwrap();
    packet.set_retain(true);
    client.send_packet(&packet).await;
}

#[tokio::test]
async fn test_retained_delivered_on_subscribe() {
    const PORT: u16 = 18951;
    start_broker(PORT).await;

    let mut publisher = TestClient::handshake(PORT, "retainer").await;
    publish_retained(&mut publisher, "status", b"on").await;

    // A later subscriber receives the stored message, flagged retained.
    let mut subscriber = TestClient::handshake(PORT, "late-sub").await;
    subscriber.subscribe("status", QoS::AtMostOnce, 1).await;
    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "status");
    assert_eq!(packet.message(), b"on");
    assert!(packet.retain());
}

#[tokio::test]
async fn test_retained_replaced_and_cleared() {
    const PORT: u16 = 18952;
    start_broker(PORT).await;

    let mut publisher = TestClient::handshake(PORT, "clearer").await;
    publish_retained(&mut publisher, "status", b"v1").await;
    publish_retained(&mut publisher, "status", b"v2").await;
    publish_retained(&mut publisher, "marker", b"m").await;

    // The second publish replaced the first.
    let mut subscriber = TestClient::handshake(PORT, "sub-a").await;
    subscriber.subscribe("status", QoS::AtMostOnce, 1).await;
    assert_eq!(subscriber.expect_publish().await.message(), b"v2");

    // A zero-byte payload clears the slot: a fresh subscriber only sees
    // the marker topic.
    publish_retained(&mut publisher, "status", b"").await;
    let mut subscriber = TestClient::handshake(PORT, "sub-b").await;
    subscriber.subscribe("status", QoS::AtMostOnce, 1).await;
    subscriber.subscribe("marker", QoS::AtMostOnce, 2).await;
    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "marker");
}

#[tokio::test]
async fn test_will_published_on_abrupt_close() {
    const PORT: u16 = 18953;
    start_broker(PORT).await;

    let mut watcher = TestClient::handshake(PORT, "watcher").await;
    watcher.subscribe("bye", QoS::AtMostOnce, 1).await;

    let mut packet = ConnectPacket::new("doomed").unwrap();
    let mut flags = ConnectFlags::default();
    flags.set_clean_session(true).set_will(true);
    packet.set_connect_flags(flags);
    packet.set_will_topic("bye").unwrap();
    packet.set_will_message(b"gone").unwrap();

    let mut doomed = TestClient::open(PORT).await;
    let ack = doomed.connect_packet(&packet).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);

    // Drop the socket without a Disconnect packet.
    drop(doomed);

    let will = watcher.expect_publish().await;
    assert_eq!(will.topic(), "bye");
    assert_eq!(will.message(), b"gone");
}

#[tokio::test]
async fn test_will_discarded_on_clean_disconnect() {
    const PORT: u16 = 18954;
    start_broker(PORT).await;

    let mut watcher = TestClient::handshake(PORT, "watcher-2").await;
    watcher.subscribe("bye", QoS::AtMostOnce, 1).await;
    watcher.subscribe("ctrl", QoS::AtMostOnce, 2).await;

    let mut packet = ConnectPacket::new("polite").unwrap();
    let mut flags = ConnectFlags::default();
    flags.set_clean_session(true).set_will(true);
    packet.set_connect_flags(flags);
    packet.set_will_topic("bye").unwrap();
    packet.set_will_message(b"gone").unwrap();

    let mut polite = TestClient::open(PORT).await;
    let ack = polite.connect_packet(&packet).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
    polite.send_packet(&DisconnectPacket::new()).await;
    drop(polite);

    // The will must not arrive; the self-published marker is the first
    // delivery the watcher sees.
    watcher.publish_qos0("ctrl", b"marker").await;
    let packet = watcher.expect_publish().await;
    assert_eq!(packet.topic(), "ctrl");
}

#[tokio::test]
async fn test_takeover_inherits_subscriptions() {
    const PORT: u16 = 18955;
    start_broker(PORT).await;

    let mut connect = ConnectPacket::new("nomad").unwrap();
    connect.set_connect_flags(ConnectFlags::default());

    let mut first = TestClient::open(PORT).await;
    let ack = first.connect_packet(&connect).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
    first.subscribe("inherit/x", QoS::AtMostOnce, 1).await;

    // Second connection with the same client id displaces the first and
    // resumes its state.
    let mut second = TestClient::open(PORT).await;
    let ack = second.connect_packet(&connect).await;
    assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
    assert!(ack.session_present());
    first.expect_close().await;

    // The inherited subscription routes without a fresh subscribe.
    let mut publisher = TestClient::handshake(PORT, "nomad-pub").await;
    publisher.publish_qos0("inherit/x", b"payload").await;
    let packet = second.expect_publish().await;
    assert_eq!(packet.topic(), "inherit/x");
    assert_eq!(packet.message(), b"payload");
}

#[tokio::test]
async fn test_sys_topics_hidden_from_wildcard() {
    const PORT: u16 = 18956;
    start_broker(PORT).await;

    let mut subscriber = TestClient::handshake(PORT, "sys-watch").await;
    subscriber.subscribe("#", QoS::AtMostOnce, 1).await;

    // $SYS style topics are invisible to the root wildcard; only the plain
    // topic arrives.
    let mut publisher = TestClient::handshake(PORT, "sys-pub").await;
    let packet = PublishPacket::new("$internal/x", QoS::AtMostOnce, b"hidden").unwrap();
    publisher.send_packet(&packet).await;
    publisher.publish_qos0("visible", b"shown").await;

    let packet = subscriber.expect_publish().await;
    assert_eq!(packet.topic(), "visible");
}
