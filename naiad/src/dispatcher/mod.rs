// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Dispatcher is the message router. It is the single writer of the
//! subscription trie and the retained message store.

use codec::{PublishPacket, QoS};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::commands::{
    DispatcherToListenerCmd, DispatcherToMetricsCmd, ListenerToDispatcherCmd,
    MetricsToDispatcherCmd,
};

mod listener;
mod metrics;
mod trie;

pub use trie::{RetainedChange, SubTrie};

#[derive(Debug)]
pub struct Dispatcher {
    sub_trie: SubTrie,

    /// Cap on granted subscription QoS, from the `[general]` section.
    maximum_qos: QoS,

    listener_sender: Sender<DispatcherToListenerCmd>,
    listener_receiver: Receiver<ListenerToDispatcherCmd>,

    metrics_sender: Sender<DispatcherToMetricsCmd>,
    metrics_receiver: Receiver<MetricsToDispatcherCmd>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        maximum_qos: QoS,
        listener_sender: Sender<DispatcherToListenerCmd>,
        listener_receiver: Receiver<ListenerToDispatcherCmd>,
        metrics_sender: Sender<DispatcherToMetricsCmd>,
        metrics_receiver: Receiver<MetricsToDispatcherCmd>,
    ) -> Self {
        Self {
            sub_trie: SubTrie::new(),
            maximum_qos,
            listener_sender,
            listener_receiver,
            metrics_sender,
            metrics_receiver,
        }
    }

    pub async fn run_loop(&mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    self.handle_listener_cmd(cmd).await;
                }
                Some(cmd) = self.metrics_receiver.recv() => {
                    self.handle_metrics_cmd(cmd).await;
                }
                else => break,
            }
        }
    }

    async fn send_to_listener(&mut self, cmd: DispatcherToListenerCmd) {
        if let Err(err) = self.listener_sender.send(cmd).await {
            log::error!("dispatcher: Failed to send to listener: {err:?}");
        }
    }

    async fn send_to_metrics(&mut self, cmd: DispatcherToMetricsCmd) {
        if let Err(err) = self.metrics_sender.send(cmd).await {
            log::error!("dispatcher: Failed to send to metrics: {err:?}");
        }
    }

    /// Route one publish to every matching subscriber.
    ///
    /// Retained handling happens first so a subscriber arriving later
    /// observes the message even when nobody is subscribed right now.
    pub(crate) async fn publish_packet(&mut self, packet: &PublishPacket) {
        if packet.retain() {
            match self.sub_trie.retain(packet) {
                RetainedChange::Stored => {
                    self.send_to_metrics(DispatcherToMetricsCmd::RetainedMessageAdded)
                        .await;
                }
                RetainedChange::Removed => {
                    self.send_to_metrics(DispatcherToMetricsCmd::RetainedMessageRemoved)
                        .await;
                }
                RetainedChange::Replaced | RetainedChange::Unchanged => (),
            }
        }

        let matches = self.sub_trie.match_topic(packet.topic());
        if matches.is_empty() {
            self.send_to_metrics(DispatcherToMetricsCmd::PublishPacketDropped)
                .await;
            return;
        }

        for (session_id, granted) in matches {
            let mut to_subscriber = packet.clone();
            // Live forwarding clears the retain and dup flags; the
            // effective QoS is the lower of publisher and granted level
            // [MQTT-3.8.4-6].
            to_subscriber.set_retain(false);
            to_subscriber.set_dup(false);
            to_subscriber.set_qos(packet.qos().min(granted));
            self.send_to_listener(DispatcherToListenerCmd::Publish(session_id, to_subscriber))
                .await;
            self.send_to_metrics(DispatcherToMetricsCmd::PublishPacketSent)
                .await;
        }
    }
}
