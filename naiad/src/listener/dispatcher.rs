// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Dispatcher cmd handlers.

use super::Listener;
use crate::commands::{DispatcherToListenerCmd, ListenerToSessionCmd};
use crate::error::Error;

impl Listener {
    pub(super) async fn handle_dispatcher_cmd(
        &mut self,
        cmd: DispatcherToListenerCmd,
    ) -> Result<(), Error> {
        match cmd {
            DispatcherToListenerCmd::Publish(session_id, packet) => {
                // The session may have gone away since routing; dropping
                // the message here matches QoS promises, as nothing was
                // acknowledged yet.
                self.send_to_session(session_id, ListenerToSessionCmd::Publish(packet))
                    .await
            }
            DispatcherToListenerCmd::SubscribeAck(session_id, packet) => {
                self.send_to_session(session_id, ListenerToSessionCmd::SubscribeAck(packet))
                    .await
            }
        }
    }
}
