// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use codec::{PacketId, QoS};
use std::collections::{HashMap, HashSet};

use super::inflight::Inflight;

/// Snapshot of session state, shipped to the listener when a connection
/// ends.
///
/// For clean-session clients only the filter list is looked at, for
/// pruning. For persistent clients the whole snapshot is stored under the
/// client id and handed to the next connection with the same id.
#[derive(Debug, Clone)]
pub struct CachedSession {
    client_id: String,
    clean_session: bool,
    subscriptions: HashMap<String, QoS>,
    inflight: Inflight,
    pub_recv_packets: HashSet<PacketId>,
}

impl CachedSession {
    #[must_use]
    pub fn new(
        client_id: String,
        clean_session: bool,
        subscriptions: HashMap<String, QoS>,
        inflight: Inflight,
        pub_recv_packets: HashSet<PacketId>,
    ) -> Self {
        Self {
            client_id,
            clean_session,
            subscriptions,
            inflight,
            pub_recv_packets,
        }
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Topic filters of this session, used for tree pruning.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.subscriptions.keys().cloned().collect()
    }

    /// Filter/granted-QoS pairs, used to re-register a resumed session.
    #[must_use]
    pub fn subscription_list(&self) -> Vec<(String, QoS)> {
        self.subscriptions
            .iter()
            .map(|(filter, qos)| (filter.clone(), *qos))
            .collect()
    }

    pub(crate) fn into_parts(self) -> (HashMap<String, QoS>, Inflight, HashSet<PacketId>) {
        (self.subscriptions, self.inflight, self.pub_recv_packets)
    }
}
