// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Handles commands arriving from the listener task.

use codec::{ConnectAckPacket, ConnectReturnCode, SubscribeAck, SubscribeAckPacket};

use super::{CachedSession, Session, Status};
use crate::commands::ListenerToSessionCmd;
use crate::error::Error;

impl Session {
    pub(super) async fn handle_listener_cmd(
        &mut self,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        match cmd {
            ListenerToSessionCmd::ConnectAck(packet, cached_session) => {
                self.on_listener_connect_ack(packet, cached_session).await
            }
            ListenerToSessionCmd::Publish(packet) => self.deliver_publish(packet).await,
            ListenerToSessionCmd::SubscribeAck(packet) => {
                self.on_listener_subscribe_ack(packet).await
            }
            ListenerToSessionCmd::Disconnect => {
                // Session takeover is a clean disconnect: the will is not
                // published.
                self.will = None;
                self.status = Status::Disconnected;
                Ok(())
            }
        }
    }

    async fn on_listener_connect_ack(
        &mut self,
        packet: ConnectAckPacket,
        cached_session: Option<CachedSession>,
    ) -> Result<(), Error> {
        if packet.return_code() == ConnectReturnCode::Accepted {
            self.status = Status::Connected;
            if let Some(cached_session) = cached_session {
                self.load_cached_session(cached_session);
            }
            self.send(packet).await
        } else {
            self.will = None;
            self.send(packet).await?;
            self.status = Status::Disconnected;
            Ok(())
        }
    }

    /// Resume state of a persistent session.
    ///
    /// Inflight entries become due for retransmission on the next timer
    /// tick and go out with the DUP flag set.
    fn load_cached_session(&mut self, cached_session: CachedSession) {
        log::info!(
            "session {}: Resume session state of client {}",
            self.id,
            cached_session.client_id()
        );
        let (subscriptions, inflight, pub_recv_packets) = cached_session.into_parts();
        self.subscriptions = subscriptions;
        self.inflight = inflight;
        self.pub_recv_packets = pub_recv_packets;
    }

    async fn on_listener_subscribe_ack(
        &mut self,
        packet: SubscribeAckPacket,
    ) -> Result<(), Error> {
        // Record granted subscriptions by zipping the pending subscribe
        // with the acknowledgement list, which preserves order
        // [MQTT-3.9.3-1].
        if let Some(subscribe_packet) = self.pending_subscribes.remove(&packet.packet_id()) {
            for (topic, ack) in subscribe_packet
                .topics()
                .iter()
                .zip(packet.acknowledgements())
            {
                if let SubscribeAck::QoS(granted) = ack {
                    self.subscriptions
                        .insert(topic.topic().to_string(), *granted);
                }
            }
        } else {
            log::warn!(
                "session {}: SubscribeAck with unknown packet id {}",
                self.id,
                packet.packet_id()
            );
        }
        self.send(packet).await
    }
}
