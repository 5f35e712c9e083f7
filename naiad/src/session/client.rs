// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Handles packets arriving from the client socket.

use codec::{
    ByteArray, ConnectAckPacket, ConnectPacket, ConnectReturnCode, ControlPacket, DecodeError,
    DisconnectPacket, Packet, PingRequestPacket, PingResponsePacket, PublishAckPacket,
    PublishCompletePacket, PublishPacket, PublishReceivedPacket, PublishReleasePacket, QoS,
    SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
};

use super::{Session, Status};
use crate::commands::SessionToListenerCmd;
use crate::error::{Error, ErrorKind};

impl Session {
    /// Consume as many complete frames from the read buffer as possible.
    ///
    /// Returns an error on any protocol violation, which closes the
    /// connection without a reply [MQTT-4.8.0-1].
    pub(super) async fn process_read_buf(&mut self) -> Result<(), Error> {
        loop {
            if self.read_buf.is_empty() {
                return Ok(());
            }

            let mut ba = ByteArray::new(&self.read_buf);
            match ControlPacket::decode(&mut ba, self.config.max_packet_bytes()) {
                Ok(packet) => {
                    let consumed = ba.offset();
                    self.read_buf.drain(..consumed);
                    self.reset_instant();
                    self.packets_received += 1;
                    self.handle_client_packet(packet).await?;
                }
                Err(DecodeError::Incomplete) => return Ok(()),
                Err(err) => {
                    self.reply_to_malformed_connect(err).await;
                    return Err(err.into());
                }
            }
        }
    }

    /// A malformed Connect packet is the one place where a decode error
    /// still gets a reply: protocol level and client id problems carry a
    /// return code [MQTT-3.1.2-2], [MQTT-3.1.3-8]. Everything else is
    /// closed silently.
    async fn reply_to_malformed_connect(&mut self, err: DecodeError) {
        if self.status != Status::Invalid {
            return;
        }
        let return_code = match err {
            DecodeError::InvalidProtocolLevel | DecodeError::InvalidProtocolName => {
                ConnectReturnCode::UnacceptedProtocol
            }
            DecodeError::InvalidClientId => ConnectReturnCode::IdentifierRejected,
            _ => return,
        };
        let ack_packet = ConnectAckPacket::new(false, return_code);
        if let Err(err) = self.send(ack_packet).await {
            log::error!("session {}: Failed to send connect ack: {err}", self.id);
        }
    }

    async fn handle_client_packet(&mut self, packet: ControlPacket) -> Result<(), Error> {
        // Every packet but the first must arrive on a connected session.
        if self.status == Status::Invalid
            && !matches!(packet, ControlPacket::Connect(_))
        {
            return Err(Error::new(
                ErrorKind::StatusError,
                "session: First packet is not Connect",
            ));
        }

        match packet {
            ControlPacket::Connect(packet) => self.on_client_connect(packet).await,
            ControlPacket::Publish(packet) => self.on_client_publish(packet).await,
            ControlPacket::PublishAck(packet) => self.on_client_publish_ack(&packet),
            ControlPacket::PublishReceived(packet) => {
                self.on_client_publish_received(&packet).await
            }
            ControlPacket::PublishRelease(packet) => {
                self.on_client_publish_release(&packet).await
            }
            ControlPacket::PublishComplete(packet) => self.on_client_publish_complete(&packet),
            ControlPacket::Subscribe(packet) => self.on_client_subscribe(packet).await,
            ControlPacket::Unsubscribe(packet) => self.on_client_unsubscribe(packet).await,
            ControlPacket::PingRequest(packet) => self.on_client_ping(packet).await,
            ControlPacket::Disconnect(packet) => self.on_client_disconnect(packet),
            other => {
                // ConnectAck, SubscribeAck, UnsubscribeAck and PingResponse
                // only flow from broker to client.
                Err(Error::from_string(
                    ErrorKind::StatusError,
                    format!(
                        "session: Got server side packet {:?} from client",
                        other.packet_type()
                    ),
                ))
            }
        }
    }

    async fn on_client_connect(&mut self, mut packet: ConnectPacket) -> Result<(), Error> {
        // The Server MUST process a second CONNECT Packet sent from a
        // Client as a protocol violation and disconnect [MQTT-3.1.0-2].
        if self.status != Status::Invalid {
            return Err(Error::new(
                ErrorKind::StatusError,
                "session: Got a second Connect packet",
            ));
        }

        // A zero-byte client id is allowed with clean-session; the broker
        // assigns a unique id and proceeds [MQTT-3.1.3-6].
        if packet.client_id().is_empty() {
            if self.config.allow_empty_client_id() {
                let new_client_id = codec::utils::random_client_id();
                let _ret = packet.set_client_id(&new_client_id);
            } else {
                let ack_packet =
                    ConnectAckPacket::new(false, ConnectReturnCode::IdentifierRejected);
                self.send(ack_packet).await?;
                self.status = Status::Disconnected;
                return Ok(());
            }
        }
        self.client_id = packet.client_id().to_string();
        self.clean_session = packet.connect_flags().clean_session();
        self.config.apply_client_keep_alive(packet.keep_alive());

        if let Some(will_topic) = packet.will_topic() {
            let mut will = PublishPacket::new(
                will_topic,
                packet.connect_flags().will_qos(),
                packet.will_message().unwrap_or_default(),
            )?;
            will.set_retain(packet.connect_flags().will_retain());
            self.will = Some(will);
        }

        self.status = Status::Connecting;
        self.sender
            .send(SessionToListenerCmd::Connect(self.id, packet))
            .await
            .map_err(Into::into)
    }

    async fn on_client_publish(&mut self, packet: PublishPacket) -> Result<(), Error> {
        match packet.qos() {
            QoS::AtMostOnce => {
                self.sender
                    .send(SessionToListenerCmd::Publish(self.id, packet))
                    .await?;
            }
            QoS::AtLeastOnce => {
                let packet_id = packet.packet_id();
                // At-least-once: duplicates are routed again.
                self.sender
                    .send(SessionToListenerCmd::Publish(self.id, packet))
                    .await?;
                self.send(PublishAckPacket::new(packet_id)).await?;
            }
            QoS::ExactOnce => {
                let packet_id = packet.packet_id();
                // Route once per packet id, however often the client
                // re-sends it [MQTT-4.3.3-2].
                if !self.pub_recv_packets.contains(&packet_id) {
                    self.pub_recv_packets.insert(packet_id);
                    self.sender
                        .send(SessionToListenerCmd::Publish(self.id, packet))
                        .await?;
                }
                self.send(PublishReceivedPacket::new(packet_id)).await?;
            }
        }
        Ok(())
    }

    fn on_client_publish_ack(&mut self, packet: &PublishAckPacket) -> Result<(), Error> {
        if !self.inflight.acknowledge(packet.packet_id()) {
            log::warn!(
                "session {}: PublishAck with unknown packet id {}",
                self.id,
                packet.packet_id()
            );
        }
        Ok(())
    }

    async fn on_client_publish_received(
        &mut self,
        packet: &PublishReceivedPacket,
    ) -> Result<(), Error> {
        if self.inflight.mark_received(packet.packet_id()) {
            self.send(PublishReleasePacket::new(packet.packet_id()))
                .await
        } else {
            log::warn!(
                "session {}: PublishReceived with unknown packet id {}",
                self.id,
                packet.packet_id()
            );
            Ok(())
        }
    }

    async fn on_client_publish_release(
        &mut self,
        packet: &PublishReleasePacket,
    ) -> Result<(), Error> {
        if !self.pub_recv_packets.remove(&packet.packet_id()) {
            log::warn!(
                "session {}: PublishRelease with unknown packet id {}",
                self.id,
                packet.packet_id()
            );
        }
        // The receiver MUST respond with a PUBCOMP packet containing the
        // same packet id [MQTT-4.3.3-2].
        self.send(PublishCompletePacket::new(packet.packet_id()))
            .await
    }

    fn on_client_publish_complete(&mut self, packet: &PublishCompletePacket) -> Result<(), Error> {
        if !self.inflight.complete(packet.packet_id()) {
            log::warn!(
                "session {}: PublishComplete with unknown packet id {}",
                self.id,
                packet.packet_id()
            );
        }
        Ok(())
    }

    async fn on_client_subscribe(&mut self, packet: SubscribePacket) -> Result<(), Error> {
        self.pending_subscribes
            .insert(packet.packet_id(), packet.clone());
        self.sender
            .send(SessionToListenerCmd::Subscribe(self.id, packet))
            .await
            .map_err(Into::into)
    }

    async fn on_client_unsubscribe(&mut self, packet: UnsubscribePacket) -> Result<(), Error> {
        for topic in packet.topics() {
            self.subscriptions.remove(topic.as_ref());
        }
        let packet_id = packet.packet_id();
        self.sender
            .send(SessionToListenerCmd::Unsubscribe(self.id, packet))
            .await?;

        self.send(UnsubscribeAckPacket::new(packet_id)).await
    }

    async fn on_client_ping(&mut self, _packet: PingRequestPacket) -> Result<(), Error> {
        self.send(PingResponsePacket::new()).await
    }

    /// A clean disconnect discards the will [MQTT-3.14.4-3].
    fn on_client_disconnect(&mut self, _packet: DisconnectPacket) -> Result<(), Error> {
        self.will = None;
        self.status = Status::Disconnected;
        Ok(())
    }
}
