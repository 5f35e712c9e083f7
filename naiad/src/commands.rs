// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Command enums passed between the module tasks.
//!
//! Every edge of the task graph has its own enum, so a reader can tell from
//! the type alone which task produced a message and which consumes it.

use codec::{
    ConnectAckPacket, ConnectPacket, PublishPacket, QoS, SubscribeAckPacket, SubscribePacket,
    UnsubscribePacket,
};

use crate::session::CachedSession;
use crate::types::SessionId;

#[derive(Debug, Clone)]
pub enum SessionToListenerCmd {
    /// A validated Connect packet arrived on this connection.
    Connect(SessionId, ConnectPacket),

    Publish(SessionId, PublishPacket),

    Subscribe(SessionId, SubscribePacket),

    Unsubscribe(SessionId, UnsubscribePacket),

    /// Control packet counter deltas of one session: packets received,
    /// packets sent.
    PacketCounts(u64, u64),

    /// The connection ended.
    ///
    /// `will` is set when the session terminated abnormally and had a Will
    /// Message registered. `state` is the final session state snapshot,
    /// cached by the listener when clean-session is unset.
    Disconnect {
        session_id: SessionId,
        will: Option<PublishPacket>,
        state: CachedSession,
    },
}

#[derive(Debug, Clone)]
pub enum ListenerToSessionCmd {
    /// Accepted or not. Carries previous session state to be resumed,
    /// if there is any.
    ConnectAck(ConnectAckPacket, Option<CachedSession>),

    /// Deliver a publish message to this client. QoS is already capped at
    /// the granted level; the session assigns its own packet id.
    Publish(PublishPacket),

    SubscribeAck(SubscribeAckPacket),

    /// Another connection took over this client id; shut down quietly.
    Disconnect,
}

#[derive(Debug, Clone)]
pub enum ListenerToDispatcherCmd {
    /// A session finished the connect handshake.
    SessionAdded(SessionId),

    /// Route one publish message, from a client or a Will.
    Publish(PublishPacket),

    Subscribe(SessionId, SubscribePacket),

    /// Re-register the subscriptions of a resumed session under a new
    /// session id. No ack and no retained delivery is produced.
    ResumeSubscriptions(SessionId, Vec<(String, QoS)>),

    Unsubscribe(SessionId, UnsubscribePacket),

    /// Control packet counter deltas: packets received, packets sent.
    PacketCounts(u64, u64),

    /// Remove a session and prune its topic filters from the tree.
    SessionRemoved(SessionId, Vec<String>),
}

#[derive(Debug, Clone)]
pub enum DispatcherToListenerCmd {
    /// Deliver a routed publish message to one session.
    Publish(SessionId, PublishPacket),

    SubscribeAck(SessionId, SubscribeAckPacket),
}

#[derive(Debug, Clone)]
pub enum DispatcherToMetricsCmd {
    SessionAdded,
    SessionRemoved,

    SubscriptionsAdded(usize),
    SubscriptionsRemoved(usize),

    RetainedMessageAdded,
    RetainedMessageRemoved,

    /// Control packets of any type, as counted by the sessions.
    PacketReceived(u64),
    PacketSent(u64),

    PublishPacketReceived,
    PublishPacketSent,
    PublishPacketDropped,
}

#[derive(Debug, Clone)]
pub enum MetricsToDispatcherCmd {
    /// Route one $SYS statistics message.
    Publish(PublishPacket),
}
