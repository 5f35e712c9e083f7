// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Session cmd handlers.

use codec::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, PublishPacket, SubscribePacket,
    UnsubscribePacket,
};

use super::Listener;
use crate::commands::{ListenerToDispatcherCmd, ListenerToSessionCmd, SessionToListenerCmd};
use crate::error::Error;
use crate::session::CachedSession;
use crate::types::SessionId;

impl Listener {
    pub(super) async fn handle_session_cmd(
        &mut self,
        cmd: SessionToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            SessionToListenerCmd::Connect(session_id, packet) => {
                self.on_session_connect(session_id, packet).await
            }
            SessionToListenerCmd::Publish(session_id, packet) => {
                self.on_session_publish(session_id, packet).await
            }
            SessionToListenerCmd::Subscribe(session_id, packet) => {
                self.on_session_subscribe(session_id, packet).await
            }
            SessionToListenerCmd::Unsubscribe(session_id, packet) => {
                self.on_session_unsubscribe(session_id, packet).await
            }
            SessionToListenerCmd::PacketCounts(received, sent) => self
                .dispatcher_sender
                .send(ListenerToDispatcherCmd::PacketCounts(received, sent))
                .await
                .map_err(Into::into),
            SessionToListenerCmd::Disconnect {
                session_id,
                will,
                state,
            } => self.on_session_disconnect(session_id, will, state).await,
        }
    }

    async fn on_session_connect(
        &mut self,
        session_id: SessionId,
        packet: ConnectPacket,
    ) -> Result<(), Error> {
        let client_id = packet.client_id().to_string();

        // If the client id represents a client already connected, the
        // existing connection is disconnected first [MQTT-3.1.4-2]. The
        // new Connect waits until the displaced session has shipped its
        // final state, so resumption is race free.
        if let Some(&old_session_id) = self.client_ids.get(&client_id) {
            log::info!(
                "listener: client {client_id} takes over session {old_session_id} with {session_id}"
            );
            self.pending_takeovers
                .insert(client_id, (session_id, packet));
            return self.disconnect_session(old_session_id).await;
        }

        self.finish_connect(session_id, packet).await
    }

    async fn finish_connect(
        &mut self,
        session_id: SessionId,
        packet: ConnectPacket,
    ) -> Result<(), Error> {
        let client_id = packet.client_id().to_string();
        let clean_session = packet.connect_flags().clean_session();

        // A clean-session connect discards any stored state.
        let cached_session = match self.cached_sessions.remove(&client_id) {
            Some(cached) if !clean_session => Some(cached),
            _ => None,
        };
        // Session Present is set iff stored state is being resumed
        // [MQTT-3.2.2-2].
        let session_present = cached_session.is_some();

        self.client_ids.insert(client_id.clone(), session_id);
        self.session_client_ids.insert(session_id, client_id);

        if let Some(cached) = &cached_session {
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::ResumeSubscriptions(
                    session_id,
                    cached.subscription_list(),
                ))
                .await?;
        }
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::SessionAdded(session_id))
            .await?;

        let ack_packet = ConnectAckPacket::new(session_present, ConnectReturnCode::Accepted);
        self.send_to_session(
            session_id,
            ListenerToSessionCmd::ConnectAck(ack_packet, cached_session),
        )
        .await
    }

    async fn on_session_disconnect(
        &mut self,
        session_id: SessionId,
        will: Option<PublishPacket>,
        state: CachedSession,
    ) -> Result<(), Error> {
        log::info!("listener: session {session_id} disconnected");
        if self.session_senders.remove(&session_id).is_none() {
            log::error!("listener: No session sender for {session_id}");
        }

        let client_id = self.session_client_ids.remove(&session_id);
        if let Some(client_id) = &client_id {
            if self.client_ids.get(client_id) == Some(&session_id) {
                self.client_ids.remove(client_id);
            }
        }

        // Only sessions which completed the connect handshake own
        // subscriptions or count as connected clients.
        if client_id.is_some() {
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::SessionRemoved(
                    session_id,
                    state.filters(),
                ))
                .await?;
        }

        // The will of an abnormally terminated session is published as an
        // ordinary message originating from no session.
        if let Some(will) = will {
            log::info!(
                "listener: publish will of session {session_id} to {}",
                will.topic()
            );
            self.dispatcher_sender
                .send(ListenerToDispatcherCmd::Publish(will))
                .await?;
        }

        if let Some(client_id) = client_id {
            if !state.clean_session() {
                self.cached_sessions.insert(client_id.clone(), state);
            }

            // Continue a parked takeover connect.
            if let Some((new_session_id, packet)) = self.pending_takeovers.remove(&client_id) {
                return self.finish_connect(new_session_id, packet).await;
            }
        }
        Ok(())
    }

    async fn on_session_publish(
        &mut self,
        _session_id: SessionId,
        packet: PublishPacket,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Publish(packet))
            .await
            .map_err(Into::into)
    }

    async fn on_session_subscribe(
        &mut self,
        session_id: SessionId,
        packet: SubscribePacket,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Subscribe(session_id, packet))
            .await
            .map_err(Into::into)
    }

    async fn on_session_unsubscribe(
        &mut self,
        session_id: SessionId,
        packet: UnsubscribePacket,
    ) -> Result<(), Error> {
        self.dispatcher_sender
            .send(ListenerToDispatcherCmd::Unsubscribe(session_id, packet))
            .await
            .map_err(Into::into)
    }

    /// Ask a session to shut down quietly, for takeover.
    async fn disconnect_session(&mut self, session_id: SessionId) -> Result<(), Error> {
        self.send_to_session(session_id, ListenerToSessionCmd::Disconnect)
            .await
    }

    pub(super) async fn send_to_session(
        &mut self,
        session_id: SessionId,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        if let Some(session_sender) = self.session_senders.get(&session_id) {
            session_sender.send(cmd).await.map_err(Into::into)
        } else {
            Err(Error::session_error(session_id))
        }
    }
}
