// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::{Listener, Protocol, CHANNEL_CAPACITY};
use crate::commands::{DispatcherToListenerCmd, ListenerToDispatcherCmd};
use crate::config;
use crate::error::Error;

impl Listener {
    /// Bind the configured address and prepare the session registry.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound.
    pub async fn bind(
        config: config::Config,
        dispatcher_sender: Sender<ListenerToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToListenerCmd>,
    ) -> Result<Self, Error> {
        let protocol = Protocol::bind(config.listener()).await?;
        let (session_sender, session_receiver) = mpsc::channel(CHANNEL_CAPACITY);

        Ok(Self {
            config,
            protocol,
            current_session_id: 0,

            session_senders: HashMap::new(),
            session_client_ids: HashMap::new(),
            client_ids: BTreeMap::new(),
            cached_sessions: HashMap::new(),
            pending_takeovers: HashMap::new(),

            session_sender,
            session_receiver: Some(session_receiver),

            dispatcher_sender,
            dispatcher_receiver: Some(dispatcher_receiver),
        })
    }
}
