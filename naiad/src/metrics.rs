// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Statistics counters, published periodically on `$SYS/broker/#` topics.

use codec::{PublishPacket, QoS};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::commands::{DispatcherToMetricsCmd, MetricsToDispatcherCmd};
use crate::types::Uptime;

const UPTIME_TOPIC: &str = "$SYS/broker/uptime";
const VERSION_TOPIC: &str = "$SYS/broker/version";
const CLIENTS_CONNECTED_TOPIC: &str = "$SYS/broker/clients/connected";
const SUBSCRIPTIONS_TOPIC: &str = "$SYS/broker/subscriptions/count";
const RETAINED_TOPIC: &str = "$SYS/broker/retained messages/count";
const MESSAGES_RECEIVED_TOPIC: &str = "$SYS/broker/messages/received";
const MESSAGES_SENT_TOPIC: &str = "$SYS/broker/messages/sent";
const PUBLISH_RECEIVED_TOPIC: &str = "$SYS/broker/publish/messages/received";
const PUBLISH_SENT_TOPIC: &str = "$SYS/broker/publish/messages/sent";
const PUBLISH_DROPPED_TOPIC: &str = "$SYS/broker/publish/messages/dropped";

#[derive(Debug, Default)]
struct SystemMetrics {
    sessions: u64,
    subscriptions: u64,
    retained_messages: u64,

    /// Control packets of any type, as counted by the sessions.
    messages_received: u64,
    messages_sent: u64,

    /// Publish messages routed by the dispatcher.
    publish_received: u64,
    publish_sent: u64,
    publish_dropped: u64,
}

#[derive(Debug)]
pub struct Metrics {
    /// Publication period; 0 disables $SYS messages while counters keep
    /// being collected.
    sys_interval: u32,

    startup: Instant,
    uptime: Uptime,

    system: SystemMetrics,

    dispatcher_sender: Sender<MetricsToDispatcherCmd>,
    dispatcher_receiver: Receiver<DispatcherToMetricsCmd>,
}

impl Metrics {
    #[must_use]
    pub fn new(
        sys_interval: u32,
        dispatcher_sender: Sender<MetricsToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToMetricsCmd>,
    ) -> Self {
        Self {
            sys_interval,
            startup: Instant::now(),
            uptime: 0,
            system: SystemMetrics::default(),
            dispatcher_sender,
            dispatcher_receiver,
        }
    }

    pub async fn run_loop(&mut self) {
        let sys_period = if self.sys_interval > 0 {
            Duration::from_secs(u64::from(self.sys_interval))
        } else {
            // Disabled; tick rarely and skip publication.
            Duration::from_secs(3600)
        };
        let mut uptime_timer = interval(Duration::from_secs(1));
        let mut sys_timer = interval(sys_period);

        loop {
            tokio::select! {
                Some(cmd) = self.dispatcher_receiver.recv() => {
                    self.handle_dispatcher_cmd(&cmd);
                }
                _ = uptime_timer.tick() => {
                    self.uptime = self.startup.elapsed().as_secs();
                }
                _ = sys_timer.tick() => {
                    if self.sys_interval > 0 {
                        self.publish_sys_messages().await;
                    }
                }
            }
        }
    }

    fn handle_dispatcher_cmd(&mut self, cmd: &DispatcherToMetricsCmd) {
        match cmd {
            DispatcherToMetricsCmd::SessionAdded => self.system.sessions += 1,
            DispatcherToMetricsCmd::SessionRemoved => {
                self.system.sessions = self.system.sessions.saturating_sub(1);
            }
            DispatcherToMetricsCmd::SubscriptionsAdded(count) => {
                self.system.subscriptions += *count as u64;
            }
            DispatcherToMetricsCmd::SubscriptionsRemoved(count) => {
                self.system.subscriptions =
                    self.system.subscriptions.saturating_sub(*count as u64);
            }
            DispatcherToMetricsCmd::RetainedMessageAdded => self.system.retained_messages += 1,
            DispatcherToMetricsCmd::RetainedMessageRemoved => {
                self.system.retained_messages = self.system.retained_messages.saturating_sub(1);
            }
            DispatcherToMetricsCmd::PacketReceived(count) => {
                self.system.messages_received += *count;
            }
            DispatcherToMetricsCmd::PacketSent(count) => {
                self.system.messages_sent += *count;
            }
            DispatcherToMetricsCmd::PublishPacketReceived => self.system.publish_received += 1,
            DispatcherToMetricsCmd::PublishPacketSent => self.system.publish_sent += 1,
            DispatcherToMetricsCmd::PublishPacketDropped => self.system.publish_dropped += 1,
        }
    }

    async fn publish_sys_messages(&mut self) {
        let messages = [
            (UPTIME_TOPIC, self.uptime.to_string()),
            (VERSION_TOPIC, env!("CARGO_PKG_VERSION").to_string()),
            (CLIENTS_CONNECTED_TOPIC, self.system.sessions.to_string()),
            (SUBSCRIPTIONS_TOPIC, self.system.subscriptions.to_string()),
            (RETAINED_TOPIC, self.system.retained_messages.to_string()),
            (
                MESSAGES_RECEIVED_TOPIC,
                self.system.messages_received.to_string(),
            ),
            (MESSAGES_SENT_TOPIC, self.system.messages_sent.to_string()),
            (
                PUBLISH_RECEIVED_TOPIC,
                self.system.publish_received.to_string(),
            ),
            (PUBLISH_SENT_TOPIC, self.system.publish_sent.to_string()),
            (
                PUBLISH_DROPPED_TOPIC,
                self.system.publish_dropped.to_string(),
            ),
        ];

        for (topic, value) in messages {
            match PublishPacket::new(topic, QoS::AtMostOnce, value.as_bytes()) {
                Ok(packet) => {
                    if let Err(err) = self
                        .dispatcher_sender
                        .send(MetricsToDispatcherCmd::Publish(packet))
                        .await
                    {
                        log::error!("metrics: Failed to send $SYS message: {err:?}");
                        return;
                    }
                }
                Err(err) => log::error!("metrics: Invalid $SYS packet: {err:?}"),
            }
        }
    }
}
