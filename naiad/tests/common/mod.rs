// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Shared helpers: an in-process broker and a codec-level tcp client.

#![allow(dead_code)]

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use codec::{
    ByteArray, ConnectAckPacket, ConnectFlags, ConnectPacket, ConnectReturnCode, ControlPacket,
    DecodeError, EncodePacket, PacketId, PublishPacket, QoS, SubscribeAck, SubscribePacket,
};
use naiad::config::Config;
use naiad::server::ServerContext;

pub const MAX_PACKET_BYTES: usize = 2 * 1024 * 1024;
const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a broker on `127.0.0.1:port` inside the current runtime.
pub async fn start_broker(port: u16) {
    let content = format!(
        r#"
[general]
connect_timeout = 10

[listener]
host = "127.0.0.1"
port = {port}
"#
    );
    let config = Config::from_toml(&content).expect("invalid test config");
    let mut server = ServerContext::new(config);
    server.start().await.expect("failed to start broker");
}

/// Raw MQTT client speaking through the codec crate.
pub struct TestClient {
    stream: TcpStream,
    read_buf: Vec<u8>,
}

impl TestClient {
    /// Open a tcp connection without any MQTT handshake.
    pub async fn open(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("failed to connect to broker");
        Self {
            stream,
            read_buf: Vec::new(),
        }
    }

    /// Open a connection and finish a clean-session handshake.
    pub async fn handshake(port: u16, client_id: &str) -> Self {
        let mut packet = ConnectPacket::new(client_id).unwrap();
        let mut flags = ConnectFlags::default();
        flags.set_clean_session(true);
        packet.set_connect_flags(flags);

        let mut client = Self::open(port).await;
        let ack = client.connect_packet(&packet).await;
        assert_eq!(ack.return_code(), ConnectReturnCode::Accepted);
        client
    }

    /// Send a Connect packet and read the Connect ack.
    pub async fn connect_packet(&mut self, packet: &ConnectPacket) -> ConnectAckPacket {
        self.send_packet(packet).await;
        match self.read_packet().await {
            ControlPacket::ConnectAck(ack) => ack,
            other => panic!("expected connect ack, got {other:?}"),
        }
    }

    pub async fn send_packet<P: EncodePacket>(&mut self, packet: &P) {
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        self.send_raw(&buf).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        timeout(IO_TIMEOUT, self.stream.write_all(bytes))
            .await
            .expect("write timed out")
            .expect("write failed");
    }

    /// Read one complete control packet, buffering partial frames.
    pub async fn read_packet(&mut self) -> ControlPacket {
        loop {
            if !self.read_buf.is_empty() {
                let mut ba = ByteArray::new(&self.read_buf);
                match ControlPacket::decode(&mut ba, MAX_PACKET_BYTES) {
                    Ok(packet) => {
                        let consumed = ba.offset();
                        self.read_buf.drain(..consumed);
                        return packet;
                    }
                    Err(DecodeError::Incomplete) => (),
                    Err(err) => panic!("broker sent malformed packet: {err:?}"),
                }
            }

            let mut chunk = vec![0_u8; 1024];
            let n_recv = timeout(IO_TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("read timed out")
                .expect("read failed");
            assert!(n_recv > 0, "broker closed the connection");
            self.read_buf.extend_from_slice(&chunk[..n_recv]);
        }
    }

    /// Read until the connection is closed by the broker.
    pub async fn expect_close(&mut self) {
        loop {
            let mut chunk = vec![0_u8; 1024];
            let n_recv = timeout(IO_TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("read timed out")
                .expect("read failed");
            if n_recv == 0 {
                return;
            }
        }
    }

    pub async fn expect_publish(&mut self) -> PublishPacket {
        match self.read_packet().await {
            ControlPacket::Publish(packet) => packet,
            other => panic!("expected publish, got {other:?}"),
        }
    }

    /// Subscribe one filter and wait for the matching ack.
    pub async fn subscribe(&mut self, filter: &str, qos: QoS, packet_id: u16) {
        let packet = SubscribePacket::new(filter, qos, PacketId::new(packet_id)).unwrap();
        self.send_packet(&packet).await;
        match self.read_packet().await {
            ControlPacket::SubscribeAck(ack) => {
                assert_eq!(ack.packet_id(), PacketId::new(packet_id));
                assert_eq!(ack.acknowledgements(), &[SubscribeAck::QoS(qos)]);
            }
            other => panic!("expected subscribe ack, got {other:?}"),
        }
    }

    pub async fn publish_qos0(&mut self, topic: &str, payload: &[u8]) {
        let packet = PublishPacket::new(topic, QoS::AtMostOnce, payload).unwrap();
        self.send_packet(&packet).await;
    }
}
