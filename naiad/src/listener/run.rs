// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Handles commands and new connections.

use std::time::Duration;
use tokio::sync::mpsc;

use super::{Listener, CHANNEL_CAPACITY};
use crate::session::{Session, SessionConfig};
use crate::stream::Stream;
use crate::types::SessionId;

impl Listener {
    /// # Panics
    ///
    /// Raise panic if failed to unpack channel receivers.
    pub async fn run_loop(&mut self) {
        // Take ownership of mpsc receivers or else tokio select will raise
        // borrow errors.
        let mut session_receiver = self
            .session_receiver
            .take()
            .expect("Invalid session receiver");
        let mut dispatcher_receiver = self
            .dispatcher_receiver
            .take()
            .expect("Invalid dispatcher receiver");

        loop {
            tokio::select! {
                Ok(stream) = self.protocol.accept() => {
                    self.new_connection(stream);
                }

                Some(cmd) = session_receiver.recv() => {
                    if let Err(err) = self.handle_session_cmd(cmd).await {
                        log::error!("listener: handle session cmd failed: {err}");
                    }
                }

                Some(cmd) = dispatcher_receiver.recv() => {
                    if let Err(err) = self.handle_dispatcher_cmd(cmd).await {
                        log::error!("listener: handle dispatcher cmd failed: {err}");
                    }
                }
            }
        }
    }

    pub(super) fn next_session_id(&mut self) -> SessionId {
        self.current_session_id += 1;
        self.current_session_id
    }

    fn new_connection(&mut self, stream: Stream) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let session_id = self.next_session_id();
        self.session_senders.insert(session_id, sender);

        let general = self.config.general();
        let mut session_config = SessionConfig::new();
        session_config
            .set_keep_alive_grace(general.keep_alive_grace())
            .set_connect_timeout(general.connect_timeout())
            .set_allow_empty_client_id(general.allow_empty_client_id())
            .set_max_packet_bytes(general.max_packet_bytes())
            .set_retransmit_interval(Duration::from_millis(general.retransmit_interval_ms()));

        let session = Session::new(
            session_id,
            session_config,
            stream,
            self.session_sender.clone(),
            receiver,
        );
        tokio::spawn(session.run_loop());
    }
}
