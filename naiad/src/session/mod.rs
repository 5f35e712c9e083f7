// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Per-connection task: socket framing, the connect state machine,
//! keep-alive and the outbound QoS delivery machinery.

use codec::{EncodePacket, Packet, PacketId, PublishPacket, QoS};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::interval;

use crate::commands::{ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::Error;
use crate::stream::Stream;
use crate::types::SessionId;

mod cache;
mod client;
mod config;
mod inflight;
mod listener;

pub use cache::CachedSession;
pub use config::SessionConfig;
pub use inflight::{DeliveryState, Inflight};

const TIMER_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No Connect packet received yet.
    Invalid,

    /// Connect packet forwarded to the listener, waiting for the verdict.
    Connecting,

    Connected,

    Disconnected,
}

/// A `Session` represents one client connection.
///
/// All per-connection protocol state lives here; the listener and the
/// dispatcher only ever see commands.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    stream: Stream,

    status: Status,
    client_id: String,
    clean_session: bool,

    /// Instant of the last packet received from the client.
    instant: Instant,

    /// Will Message registered at connect time. Cleared by a clean
    /// Disconnect packet; published by the listener when the session ends
    /// with it still set.
    will: Option<PublishPacket>,

    /// Granted subscriptions of this session, filter to granted QoS.
    subscriptions: HashMap<String, QoS>,

    /// Subscribe packets forwarded to the listener and not acked yet.
    pending_subscribes: HashMap<PacketId, codec::SubscribePacket>,

    /// Outbound QoS 1/2 bookkeeping and packet id allocation.
    inflight: Inflight,

    /// Inbound QoS 2 packet ids for which a PUBREC went out and no PUBREL
    /// came back yet.
    pub_recv_packets: HashSet<PacketId>,

    /// Control packets received/sent since the last counter flush.
    packets_received: u64,
    packets_sent: u64,

    /// Bytes read from the socket and not yet consumed as frames.
    read_buf: Vec<u8>,

    sender: Sender<SessionToListenerCmd>,
    receiver: Receiver<ListenerToSessionCmd>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        config: SessionConfig,
        stream: Stream,
        sender: Sender<SessionToListenerCmd>,
        receiver: Receiver<ListenerToSessionCmd>,
    ) -> Self {
        Self {
            id,
            config,
            stream,

            status: Status::Invalid,
            client_id: String::new(),
            clean_session: true,
            instant: Instant::now(),
            will: None,

            subscriptions: HashMap::new(),
            pending_subscribes: HashMap::new(),
            inflight: Inflight::new(),
            pub_recv_packets: HashSet::new(),

            packets_received: 0,
            packets_sent: 0,

            read_buf: Vec::new(),

            sender,
            receiver,
        }
    }

    pub async fn run_loop(mut self) {
        let mut buf = Vec::with_capacity(1024);
        let connect_instant = Instant::now();
        let mut timer = interval(TIMER_INTERVAL);

        loop {
            if self.status == Status::Disconnected {
                break;
            }

            tokio::select! {
                ret = self.stream.read_buf(&mut buf) => {
                    match ret {
                        Ok(n_recv) if n_recv > 0 => {
                            self.read_buf.extend_from_slice(&buf);
                            buf.clear();
                            if let Err(err) = self.process_read_buf().await {
                                log::error!("session {}: {err}", self.id);
                                break;
                            }
                        }
                        Ok(_) => {
                            // Socket closed without a Disconnect packet.
                            // The will, if set, stays armed.
                            log::info!("session {}: connection closed by peer", self.id);
                            break;
                        }
                        Err(err) => {
                            // An I/O error counts as an abrupt disconnect.
                            log::error!("session {}: read failed: {err}", self.id);
                            break;
                        }
                    }
                }
                Some(cmd) = self.receiver.recv() => {
                    if let Err(err) = self.handle_listener_cmd(cmd).await {
                        log::error!("session {}: {err}", self.id);
                        break;
                    }
                }
                _ = timer.tick() => {
                    if let Err(err) = self.on_timer_tick(connect_instant).await {
                        log::warn!("session {}: {err}", self.id);
                        break;
                    }
                }
            }
        }

        self.finish().await;
    }

    /// Ship the final state to the listener.
    async fn finish(mut self) {
        if let Err(err) = self.flush_packet_counts().await {
            log::warn!("session {}: Failed to flush counters: {err}", self.id);
        }

        let will = self.will.take();
        let state = CachedSession::new(
            self.client_id.clone(),
            self.clean_session,
            std::mem::take(&mut self.subscriptions),
            self.inflight.clone(),
            std::mem::take(&mut self.pub_recv_packets),
        );
        if let Err(err) = self
            .sender
            .send(SessionToListenerCmd::Disconnect {
                session_id: self.id,
                will,
                state,
            })
            .await
        {
            log::error!(
                "session {}: Failed to send disconnect cmd, err: {err:?}",
                self.id
            );
        }
    }

    /// Reset the keep alive clock; called whenever a packet arrives from
    /// the client.
    fn reset_instant(&mut self) {
        self.instant = Instant::now();
    }

    async fn send<P: EncodePacket + Packet>(&mut self, packet: P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.stream.write(&buf).await?;
        self.packets_sent += 1;
        Ok(())
    }

    /// Report control packet counters to the listener, as deltas.
    async fn flush_packet_counts(&mut self) -> Result<(), Error> {
        if self.packets_received == 0 && self.packets_sent == 0 {
            return Ok(());
        }
        let cmd = SessionToListenerCmd::PacketCounts(self.packets_received, self.packets_sent);
        self.packets_received = 0;
        self.packets_sent = 0;
        self.sender.send(cmd).await.map_err(Into::into)
    }

    /// Periodic work: connect timeout, keep alive expiry, inflight
    /// retransmission.
    async fn on_timer_tick(&mut self, connect_instant: Instant) -> Result<(), Error> {
        // If the broker does not receive a Connect packet, or cannot finish
        // the handshake, within a reasonable amount of time, it should
        // close the connection.
        if self.status != Status::Connected
            && self.config.connect_timeout() > 0
            && connect_instant.elapsed().as_secs() > self.config.connect_timeout()
        {
            return Err(Error::new(
                crate::error::ErrorKind::StatusError,
                "No finished connect handshake within connect_timeout",
            ));
        }

        self.flush_packet_counts().await?;

        if self.status != Status::Connected {
            return Ok(());
        }

        // From [MQTT-3.1.2-24]: with a nonzero keep alive, silence longer
        // than the granted grace period counts as a network failure, which
        // arms the will.
        if self.config.keep_alive() > 0
            && self.instant.elapsed().as_secs() > self.config.keep_alive()
        {
            return Err(Error::new(
                crate::error::ErrorKind::StatusError,
                "keep_alive expired",
            ));
        }

        for packet in self
            .inflight
            .retransmit_due(self.config.retransmit_interval())
        {
            log::info!(
                "session {}: retransmit {:?}",
                self.id,
                packet.packet_type()
            );
            self.send(packet).await?;
        }
        Ok(())
    }

    /// Deliver a routed publish message to this client, driving it through
    /// the outbound QoS machinery.
    async fn deliver_publish(&mut self, mut packet: PublishPacket) -> Result<(), Error> {
        if self.status != Status::Connected {
            log::info!(
                "session {}: Dropped publish for inactive session",
                self.id
            );
            return Ok(());
        }

        if packet.qos() != QoS::AtMostOnce {
            let packet_id = self.inflight.next_packet_id();
            packet.set_packet_id(packet_id);
            self.inflight.push(packet.clone());
        }
        self.send(packet).await
    }
}
