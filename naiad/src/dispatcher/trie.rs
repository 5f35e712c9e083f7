// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Subscription trie, keyed on `/`-separated topic levels.
//!
//! Nodes hold subscriber sets of topic filters and retained messages of
//! concrete topics; both shapes share the tree. A node survives only while
//! it has at least one child, subscriber or retained message.

use codec::{PublishPacket, QoS, TopicFilter, TopicPart};
use std::collections::HashMap;

use crate::types::SessionId;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,

    /// Sessions subscribed with the filter ending at this node, with
    /// their granted QoS.
    subscribers: HashMap<SessionId, QoS>,

    /// Last retained message published to the topic ending at this node.
    retained: Option<PublishPacket>,
}

impl TrieNode {
    fn is_removable(&self) -> bool {
        self.children.is_empty() && self.subscribers.is_empty() && self.retained.is_none()
    }

    fn collect_subscribers(&self, acc: &mut HashMap<SessionId, QoS>) {
        for (session_id, qos) in &self.subscribers {
            // Each session appears once, at its maximum granted QoS
            // across all matching filters.
            acc.entry(*session_id)
                .and_modify(|granted| *granted = (*granted).max(*qos))
                .or_insert(*qos);
        }
    }
}

/// Effect of a retained-message update, reported for statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetainedChange {
    /// A new retained message occupies a previously empty slot.
    Stored,

    /// An existing retained message was overwritten.
    Replaced,

    /// A zero-byte payload cleared the slot.
    Removed,

    /// A zero-byte payload arrived for a topic with no retained message.
    Unchanged,
}

#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct SubTrie {
    root: TrieNode,
}

impl SubTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a subscription. Returns true when the session was
    /// not yet subscribed to `filter`.
    pub fn subscribe(&mut self, session_id: SessionId, filter: &str, qos: QoS) -> bool {
        let mut node = &mut self.root;
        for level in filter.split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        node.subscribers.insert(session_id, qos).is_none()
    }

    /// Remove one subscription and prune emptied nodes. Returns true when
    /// the subscription existed.
    pub fn unsubscribe(&mut self, session_id: SessionId, filter: &str) -> bool {
        let levels: Vec<&str> = filter.split('/').collect();
        Self::remove_filter(&mut self.root, &levels, session_id)
    }

    fn remove_filter(node: &mut TrieNode, levels: &[&str], session_id: SessionId) -> bool {
        let Some(level) = levels.first() else {
            return node.subscribers.remove(&session_id).is_some();
        };
        let Some(child) = node.children.get_mut(*level) else {
            return false;
        };
        let removed = Self::remove_filter(child, &levels[1..], session_id);
        if child.is_removable() {
            node.children.remove(*level);
        }
        removed
    }

    /// Drop every subscription of a destroyed session, walking its filter
    /// list. Returns the number of removed subscriptions.
    pub fn remove_session(&mut self, session_id: SessionId, filters: &[String]) -> usize {
        filters
            .iter()
            .filter(|filter| self.unsubscribe(session_id, filter))
            .count()
    }

    /// Find all sessions whose filters match the concrete `topic`.
    #[must_use]
    pub fn match_topic(&self, topic: &str) -> Vec<(SessionId, QoS)> {
        let levels: Vec<&str> = topic.split('/').collect();
        // Topics starting with `$` are not matched by wildcards in the
        // first filter level [MQTT-4.7.2-1].
        let internal = levels[0].starts_with('$');

        let mut acc = HashMap::new();
        Self::match_node(&self.root, &levels, true, internal, &mut acc);
        acc.into_iter().collect()
    }

    fn match_node(
        node: &TrieNode,
        levels: &[&str],
        first: bool,
        internal: bool,
        acc: &mut HashMap<SessionId, QoS>,
    ) {
        let Some(level) = levels.first() else {
            node.collect_subscribers(acc);
            // A trailing `#` also matches its parent level, so `a/#`
            // receives a publish to `a`.
            if let Some(multi) = node.children.get("#") {
                multi.collect_subscribers(acc);
            }
            return;
        };

        if let Some(child) = node.children.get(*level) {
            Self::match_node(child, &levels[1..], false, internal, acc);
        }

        if first && internal {
            return;
        }
        if let Some(child) = node.children.get("+") {
            Self::match_node(child, &levels[1..], false, internal, acc);
        }
        if let Some(child) = node.children.get("#") {
            child.collect_subscribers(acc);
        }
    }

    /// Store, replace or clear the retained message for the topic of
    /// `packet`, as its payload dictates.
    pub fn retain(&mut self, packet: &PublishPacket) -> RetainedChange {
        if packet.message().is_empty() {
            let levels: Vec<&str> = packet.topic().split('/').collect();
            return if Self::clear_retained(&mut self.root, &levels) {
                RetainedChange::Removed
            } else {
                RetainedChange::Unchanged
            };
        }

        let mut node = &mut self.root;
        for level in packet.topic().split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        let replaced = node.retained.is_some();
        node.retained = Some(packet.clone());
        if replaced {
            RetainedChange::Replaced
        } else {
            RetainedChange::Stored
        }
    }

    fn clear_retained(node: &mut TrieNode, levels: &[&str]) -> bool {
        let Some(level) = levels.first() else {
            return node.retained.take().is_some();
        };
        let Some(child) = node.children.get_mut(*level) else {
            return false;
        };
        let removed = Self::clear_retained(child, &levels[1..]);
        if child.is_removable() {
            node.children.remove(*level);
        }
        removed
    }

    /// Collect retained messages whose topics match `filter`, for
    /// delivery to a fresh subscription.
    #[must_use]
    pub fn retained_matches(&self, filter: &str) -> Vec<PublishPacket> {
        let Ok(filter) = TopicFilter::parse(filter) else {
            return Vec::new();
        };
        let mut packets = Vec::new();
        Self::collect_retained(&self.root, filter.parts(), true, &mut packets);
        packets
    }

    fn collect_retained(
        node: &TrieNode,
        parts: &[TopicPart],
        first: bool,
        packets: &mut Vec<PublishPacket>,
    ) {
        let Some(part) = parts.first() else {
            if let Some(retained) = &node.retained {
                packets.push(retained.clone());
            }
            return;
        };

        match part {
            TopicPart::Normal(level) | TopicPart::Internal(level) => {
                if let Some(child) = node.children.get(level.as_str()) {
                    Self::collect_retained(child, &parts[1..], false, packets);
                }
            }
            TopicPart::Empty => {
                if let Some(child) = node.children.get("") {
                    Self::collect_retained(child, &parts[1..], false, packets);
                }
            }
            TopicPart::SingleWildcard => {
                for (level, child) in &node.children {
                    if first && level.starts_with('$') {
                        continue;
                    }
                    Self::collect_retained(child, &parts[1..], false, packets);
                }
            }
            TopicPart::MultiWildcard => {
                Self::collect_subtree(node, first, packets);
            }
        }
    }

    fn collect_subtree(node: &TrieNode, skip_internal: bool, packets: &mut Vec<PublishPacket>) {
        if let Some(retained) = &node.retained {
            packets.push(retained.clone());
        }
        for (level, child) in &node.children {
            if skip_internal && level.starts_with('$') {
                continue;
            }
            Self::collect_subtree(child, false, packets);
        }
    }
}
