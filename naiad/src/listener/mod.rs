// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Listener accepts client connections, owns the session registry and the
//! client id table, and relays commands between sessions and the
//! dispatcher.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc::{Receiver, Sender};

use codec::ConnectPacket;

use crate::commands::{
    DispatcherToListenerCmd, ListenerToDispatcherCmd, ListenerToSessionCmd, SessionToListenerCmd,
};
use crate::config;
use crate::session::CachedSession;
use crate::types::SessionId;

mod dispatcher;
mod init;
mod protocol;
mod run;
mod session;

use protocol::Protocol;

pub(crate) const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
pub struct Listener {
    config: config::Config,
    protocol: Protocol,
    current_session_id: SessionId,

    session_senders: HashMap<SessionId, Sender<ListenerToSessionCmd>>,

    /// client id of each session which completed the connect handshake.
    session_client_ids: HashMap<SessionId, String>,

    /// Active connection per client id.
    client_ids: BTreeMap<String, SessionId>,

    /// State of clean-session=false clients which are currently offline.
    cached_sessions: HashMap<String, CachedSession>,

    /// Connect packets parked until the displaced session with the same
    /// client id has surrendered its state.
    pending_takeovers: HashMap<String, (SessionId, ConnectPacket)>,

    session_sender: Sender<SessionToListenerCmd>,
    session_receiver: Option<Receiver<SessionToListenerCmd>>,

    dispatcher_sender: Sender<ListenerToDispatcherCmd>,
    dispatcher_receiver: Option<Receiver<DispatcherToListenerCmd>>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if self.config.listener().protocol() == config::Protocol::Uds {
            let _ret = std::fs::remove_file(self.config.listener().socket_path());
        }
    }
}
