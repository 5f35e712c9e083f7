// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Listener cmd handlers.

use codec::{QoS, SubscribeAck, SubscribeAckPacket, SubscribePacket, UnsubscribePacket};

use super::Dispatcher;
use crate::commands::{
    DispatcherToListenerCmd, DispatcherToMetricsCmd, ListenerToDispatcherCmd,
};
use crate::types::SessionId;

impl Dispatcher {
    pub(super) async fn handle_listener_cmd(&mut self, cmd: ListenerToDispatcherCmd) {
        match cmd {
            ListenerToDispatcherCmd::SessionAdded(session_id) => {
                log::info!("dispatcher: session {session_id} added");
                self.send_to_metrics(DispatcherToMetricsCmd::SessionAdded)
                    .await;
            }
            ListenerToDispatcherCmd::Publish(packet) => {
                self.send_to_metrics(DispatcherToMetricsCmd::PublishPacketReceived)
                    .await;
                self.publish_packet(&packet).await;
            }
            ListenerToDispatcherCmd::Subscribe(session_id, packet) => {
                self.on_listener_subscribe(session_id, &packet).await;
            }
            ListenerToDispatcherCmd::ResumeSubscriptions(session_id, subscriptions) => {
                self.on_listener_resume_subscriptions(session_id, &subscriptions);
            }
            ListenerToDispatcherCmd::Unsubscribe(session_id, packet) => {
                self.on_listener_unsubscribe(session_id, &packet).await;
            }
            ListenerToDispatcherCmd::PacketCounts(received, sent) => {
                if received > 0 {
                    self.send_to_metrics(DispatcherToMetricsCmd::PacketReceived(received))
                        .await;
                }
                if sent > 0 {
                    self.send_to_metrics(DispatcherToMetricsCmd::PacketSent(sent))
                        .await;
                }
            }
            ListenerToDispatcherCmd::SessionRemoved(session_id, filters) => {
                self.on_listener_session_removed(session_id, &filters).await;
            }
        }
    }

    /// Register subscriptions, reply the ack and deliver matching retained
    /// messages.
    ///
    /// A SUBSCRIBE packet with multiple filters is handled like a sequence
    /// of single-filter packets answered by one combined ack
    /// [MQTT-3.8.4-4].
    async fn on_listener_subscribe(&mut self, session_id: SessionId, packet: &SubscribePacket) {
        let mut ack_vec = Vec::with_capacity(packet.topics().len());
        let mut granted_filters = Vec::with_capacity(packet.topics().len());
        let mut added = 0;

        for topic in packet.topics() {
            let granted = topic.qos().min(self.maximum_qos);
            if self.sub_trie.subscribe(session_id, topic.topic(), granted) {
                added += 1;
            }
            ack_vec.push(SubscribeAck::QoS(granted));
            granted_filters.push((topic.topic().to_string(), granted));
        }

        self.send_to_listener(DispatcherToListenerCmd::SubscribeAck(
            session_id,
            SubscribeAckPacket::with_vec(packet.packet_id(), ack_vec),
        ))
        .await;
        if added > 0 {
            self.send_to_metrics(DispatcherToMetricsCmd::SubscriptionsAdded(added))
                .await;
        }

        // Retained messages go out after the ack, flagged as retained,
        // at the effective QoS of the new subscription [MQTT-3.3.1-8].
        for (filter, granted) in granted_filters {
            for mut to_subscriber in self.sub_trie.retained_matches(&filter) {
                to_subscriber.set_retain(true);
                to_subscriber.set_dup(false);
                let qos = to_subscriber.qos().min(granted);
                to_subscriber.set_qos(qos);
                self.send_to_listener(DispatcherToListenerCmd::Publish(
                    session_id,
                    to_subscriber,
                ))
                .await;
                self.send_to_metrics(DispatcherToMetricsCmd::PublishPacketSent)
                    .await;
            }
        }
    }

    /// Quietly re-register the filters of a resumed session. No ack, no
    /// retained re-delivery.
    fn on_listener_resume_subscriptions(
        &mut self,
        session_id: SessionId,
        subscriptions: &[(String, QoS)],
    ) {
        for (filter, qos) in subscriptions {
            self.sub_trie.subscribe(session_id, filter, *qos);
        }
    }

    async fn on_listener_unsubscribe(
        &mut self,
        session_id: SessionId,
        packet: &UnsubscribePacket,
    ) {
        let mut removed = 0;
        for topic in packet.topics() {
            if self.sub_trie.unsubscribe(session_id, topic.as_ref()) {
                removed += 1;
            } else {
                log::info!(
                    "dispatcher: session {session_id} not subscribed to {}",
                    topic.as_ref()
                );
            }
        }
        if removed > 0 {
            self.send_to_metrics(DispatcherToMetricsCmd::SubscriptionsRemoved(removed))
                .await;
        }
    }

    async fn on_listener_session_removed(&mut self, session_id: SessionId, filters: &[String]) {
        let removed = self.sub_trie.remove_session(session_id, filters);
        self.send_to_metrics(DispatcherToMetricsCmd::SessionRemoved)
            .await;
        if removed > 0 {
            self.send_to_metrics(DispatcherToMetricsCmd::SubscriptionsRemoved(removed))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use codec::{PacketId, PublishPacket, QoS, SubscribePacket};
    use tokio::sync::mpsc;

    use super::*;
    use crate::commands::MetricsToDispatcherCmd;

    fn dispatcher() -> (
        Dispatcher,
        mpsc::Sender<ListenerToDispatcherCmd>,
        mpsc::Receiver<DispatcherToListenerCmd>,
        mpsc::Receiver<DispatcherToMetricsCmd>,
        mpsc::Sender<MetricsToDispatcherCmd>,
    ) {
        let (to_dispatcher, listener_receiver) = mpsc::channel(32);
        let (listener_sender, from_dispatcher) = mpsc::channel(32);
        let (metrics_sender, metrics_receiver) = mpsc::channel(32);
        let (metrics_to_dispatcher, metrics_cmd_receiver) = mpsc::channel(32);
        let dispatcher = Dispatcher::new(
            QoS::ExactOnce,
            listener_sender,
            listener_receiver,
            metrics_sender,
            metrics_cmd_receiver,
        );
        (
            dispatcher,
            to_dispatcher,
            from_dispatcher,
            metrics_receiver,
            metrics_to_dispatcher,
        )
    }

    #[test]
    fn test_subscribe_then_publish() {
        tokio_test::block_on(async {
            let (mut dispatcher, _to, mut from_dispatcher, _metrics, _m) = dispatcher();

            let subscribe =
                SubscribePacket::new("a/+", QoS::AtLeastOnce, PacketId::new(1)).unwrap();
            dispatcher
                .handle_listener_cmd(ListenerToDispatcherCmd::Subscribe(7, subscribe))
                .await;
            match from_dispatcher.recv().await.unwrap() {
                DispatcherToListenerCmd::SubscribeAck(session_id, ack) => {
                    assert_eq!(session_id, 7);
                    assert_eq!(
                        ack.acknowledgements(),
                        &[SubscribeAck::QoS(QoS::AtLeastOnce)]
                    );
                }
                other => panic!("expected subscribe ack, got {other:?}"),
            }

            let publish = PublishPacket::new("a/b", QoS::ExactOnce, b"hi").unwrap();
            dispatcher
                .handle_listener_cmd(ListenerToDispatcherCmd::Publish(publish))
                .await;
            match from_dispatcher.recv().await.unwrap() {
                DispatcherToListenerCmd::Publish(session_id, packet) => {
                    assert_eq!(session_id, 7);
                    // Downgraded to the granted level.
                    assert_eq!(packet.qos(), QoS::AtLeastOnce);
                    assert!(!packet.retain());
                }
                other => panic!("expected publish, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_retained_delivered_after_ack() {
        tokio_test::block_on(async {
            let (mut dispatcher, _to, mut from_dispatcher, _metrics, _m) = dispatcher();

            let mut retained = PublishPacket::new("news", QoS::AtMostOnce, b"flash").unwrap();
            retained.set_retain(true);
            dispatcher
                .handle_listener_cmd(ListenerToDispatcherCmd::Publish(retained))
                .await;

            let subscribe =
                SubscribePacket::new("news", QoS::AtMostOnce, PacketId::new(2)).unwrap();
            dispatcher
                .handle_listener_cmd(ListenerToDispatcherCmd::Subscribe(3, subscribe))
                .await;

            assert!(matches!(
                from_dispatcher.recv().await.unwrap(),
                DispatcherToListenerCmd::SubscribeAck(3, _)
            ));
            match from_dispatcher.recv().await.unwrap() {
                DispatcherToListenerCmd::Publish(3, packet) => {
                    assert!(packet.retain());
                    assert_eq!(packet.message(), b"flash");
                }
                other => panic!("expected retained publish, got {other:?}"),
            }
        });
    }
}
