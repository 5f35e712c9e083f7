// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Outbound delivery bookkeeping for QoS 1 and QoS 2 messages.

use codec::{ControlPacket, PacketId, PublishPacket, PublishReleasePacket, QoS};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Position of an outbound message inside its delivery handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// QoS 1 publish sent, waiting for PUBACK.
    AwaitingAck,

    /// QoS 2 publish sent, waiting for PUBREC.
    AwaitingRec,

    /// PUBREL sent, waiting for PUBCOMP.
    AwaitingComp,
}

#[derive(Debug, Clone)]
struct InflightMessage {
    packet: PublishPacket,
    state: DeliveryState,
    sent_at: Instant,
}

/// Outbound inflight map plus the packet id allocator of one session.
///
/// Entries leave the map only on acknowledgement or session destruction,
/// never on timeout; a timeout re-sends the packet with its original
/// packet id and the DUP flag set.
#[derive(Debug, Clone)]
pub struct Inflight {
    messages: BTreeMap<u16, InflightMessage>,
    next_packet_id: u16,
}

impl Default for Inflight {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflight {
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: BTreeMap::new(),
            next_packet_id: 1,
        }
    }

    /// Allocate the next free packet id.
    ///
    /// Wraps past 65535 to 1, never returns 0, and skips ids still
    /// occupied by inflight messages [MQTT-2.3.1].
    pub fn next_packet_id(&mut self) -> PacketId {
        loop {
            let id = self.next_packet_id;
            self.next_packet_id = if id == u16::MAX { 1 } else { id + 1 };
            if !self.messages.contains_key(&id) {
                return PacketId::new(id);
            }
        }
    }

    /// Track an outbound QoS 1/2 publish which was just written to the
    /// socket. QoS 0 messages are not tracked.
    pub fn push(&mut self, packet: PublishPacket) {
        let state = match packet.qos() {
            QoS::AtMostOnce => return,
            QoS::AtLeastOnce => DeliveryState::AwaitingAck,
            QoS::ExactOnce => DeliveryState::AwaitingRec,
        };
        self.messages.insert(
            packet.packet_id().value(),
            InflightMessage {
                packet,
                state,
                sent_at: Instant::now(),
            },
        );
    }

    /// Handle a PUBACK from the client. Returns false when no matching
    /// QoS 1 entry exists.
    pub fn acknowledge(&mut self, packet_id: PacketId) -> bool {
        match self.messages.get(&packet_id.value()) {
            Some(msg) if msg.state == DeliveryState::AwaitingAck => {
                self.messages.remove(&packet_id.value());
                true
            }
            _ => false,
        }
    }

    /// Handle a PUBREC from the client, moving the entry to
    /// `AwaitingComp`. Returns true when a PUBREL reply is due, which
    /// includes a repeated PUBREC for an entry already released.
    pub fn mark_received(&mut self, packet_id: PacketId) -> bool {
        match self.messages.get_mut(&packet_id.value()) {
            Some(msg) if msg.state == DeliveryState::AwaitingRec => {
                msg.state = DeliveryState::AwaitingComp;
                msg.sent_at = Instant::now();
                true
            }
            Some(msg) => msg.state == DeliveryState::AwaitingComp,
            None => false,
        }
    }

    /// Handle a PUBCOMP from the client. Returns false when no matching
    /// QoS 2 entry exists.
    pub fn complete(&mut self, packet_id: PacketId) -> bool {
        match self.messages.get(&packet_id.value()) {
            Some(msg) if msg.state == DeliveryState::AwaitingComp => {
                self.messages.remove(&packet_id.value());
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Collect retransmissions for entries older than `timeout` and arm
    /// them for the next period.
    ///
    /// Publish entries are re-sent with DUP=1 and their original packet id;
    /// entries waiting for PUBCOMP re-send the PUBREL.
    pub fn retransmit_due(&mut self, timeout: Duration) -> Vec<ControlPacket> {
        let now = Instant::now();
        let mut packets = Vec::new();
        for msg in self.messages.values_mut() {
            if now.duration_since(msg.sent_at) < timeout {
                continue;
            }
            msg.sent_at = now;
            match msg.state {
                DeliveryState::AwaitingAck | DeliveryState::AwaitingRec => {
                    let mut packet = msg.packet.clone();
                    packet.set_dup(true);
                    packets.push(ControlPacket::Publish(packet));
                }
                DeliveryState::AwaitingComp => {
                    packets.push(ControlPacket::PublishRelease(PublishReleasePacket::new(
                        msg.packet.packet_id(),
                    )));
                }
            }
        }
        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(qos: QoS, packet_id: u16) -> PublishPacket {
        let mut packet = PublishPacket::new("t", qos, b"m").unwrap();
        packet.set_packet_id(PacketId::new(packet_id));
        packet
    }

    #[test]
    fn test_packet_id_skips_inflight_ids() {
        let mut inflight = Inflight::new();
        let first = inflight.next_packet_id();
        assert_eq!(first, PacketId::new(1));
        inflight.push(publish(QoS::AtLeastOnce, first.value()));

        // Force the counter to wrap onto the id in use.
        inflight.next_packet_id = 1;
        assert_eq!(inflight.next_packet_id(), PacketId::new(2));
    }

    #[test]
    fn test_packet_id_wraps_past_zero() {
        let mut inflight = Inflight::new();
        inflight.next_packet_id = u16::MAX;
        assert_eq!(inflight.next_packet_id(), PacketId::new(u16::MAX));
        assert_eq!(inflight.next_packet_id(), PacketId::new(1));
    }

    #[test]
    fn test_qos1_handshake() {
        let mut inflight = Inflight::new();
        inflight.push(publish(QoS::AtLeastOnce, 7));
        assert_eq!(inflight.len(), 1);

        // A PUBCOMP for a QoS 1 entry is ignored.
        assert!(!inflight.complete(PacketId::new(7)));
        assert!(inflight.acknowledge(PacketId::new(7)));
        assert!(inflight.is_empty());
        assert!(!inflight.acknowledge(PacketId::new(7)));
    }

    #[test]
    fn test_qos2_handshake() {
        let mut inflight = Inflight::new();
        inflight.push(publish(QoS::ExactOnce, 9));

        assert!(!inflight.acknowledge(PacketId::new(9)));
        assert!(inflight.mark_received(PacketId::new(9)));
        // Duplicate PUBREC still asks for a PUBREL reply.
        assert!(inflight.mark_received(PacketId::new(9)));
        assert!(inflight.complete(PacketId::new(9)));
        assert!(inflight.is_empty());
    }

    #[test]
    fn test_retransmit_sets_dup() {
        let mut inflight = Inflight::new();
        inflight.push(publish(QoS::AtLeastOnce, 3));
        inflight.push(publish(QoS::ExactOnce, 4));
        assert!(inflight.mark_received(PacketId::new(4)));

        // Nothing is due with a long timeout.
        assert!(inflight.retransmit_due(Duration::from_secs(60)).is_empty());

        let packets = inflight.retransmit_due(Duration::from_secs(0));
        assert_eq!(packets.len(), 2);
        match &packets[0] {
            ControlPacket::Publish(p) => {
                assert!(p.dup());
                assert_eq!(p.packet_id(), PacketId::new(3));
            }
            other => panic!("expected publish, got {other:?}"),
        }
        match &packets[1] {
            ControlPacket::PublishRelease(p) => {
                assert_eq!(p.packet_id(), PacketId::new(4));
            }
            other => panic!("expected pubrel, got {other:?}"),
        }

        // Entries stay inflight after a retransmission.
        assert_eq!(inflight.len(), 2);
    }
}
