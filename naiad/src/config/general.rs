// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use codec::QoS;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// General section in config.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct General {
    /// Time interval to send $SYS messages in seconds.
    ///
    /// Set to 0 to disable $SYS messages.
    ///
    /// Default is 0.
    #[serde(default = "General::default_sys_interval")]
    sys_interval: u32,

    /// Reject control packets whose remaining-length exceeds this value.
    ///
    /// MQTT itself imposes a maximum of 268435455 bytes.
    ///
    /// Default is 2MiB.
    #[serde(default = "General::default_max_packet_bytes")]
    max_packet_bytes: usize,

    /// Unacknowledged QoS 1/2 messages are re-sent with the DUP flag after
    /// this period, in milliseconds.
    ///
    /// Default is 20000.
    #[serde(default = "General::default_retransmit_interval_ms")]
    retransmit_interval_ms: u64,

    /// Multiplier on the keep-alive interval reported by each client.
    /// The connection is dropped when nothing arrives within
    /// `keep_alive * keep_alive_grace` seconds [MQTT-3.1.2-24].
    ///
    /// Default is 1.5.
    #[serde(default = "General::default_keep_alive_grace")]
    keep_alive_grace: f32,

    /// Close a connection when no Connect packet arrives within this many
    /// seconds. 0 disables the check.
    ///
    /// Default is 60.
    #[serde(default = "General::default_connect_timeout")]
    connect_timeout: u64,

    /// Assign a random client id to clients which connect with a zero-byte
    /// one and clean-session set. When disabled such clients are rejected
    /// with return code 2.
    ///
    /// Default is true.
    #[serde(default = "General::default_allow_empty_client_id")]
    allow_empty_client_id: bool,

    /// Cap on the QoS granted to subscriptions.
    ///
    /// Default is `exact_once`.
    #[serde(default = "General::default_maximum_qos")]
    maximum_qos: QoS,
}

impl General {
    #[must_use]
    pub const fn default_sys_interval() -> u32 {
        0
    }

    #[must_use]
    pub const fn default_max_packet_bytes() -> usize {
        2 * 1024 * 1024
    }

    #[must_use]
    pub const fn default_retransmit_interval_ms() -> u64 {
        20_000
    }

    #[must_use]
    pub const fn default_keep_alive_grace() -> f32 {
        1.5
    }

    #[must_use]
    pub const fn default_connect_timeout() -> u64 {
        60
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        true
    }

    #[must_use]
    pub const fn default_maximum_qos() -> QoS {
        QoS::ExactOnce
    }

    #[must_use]
    pub const fn sys_interval(&self) -> u32 {
        self.sys_interval
    }

    #[must_use]
    pub const fn max_packet_bytes(&self) -> usize {
        self.max_packet_bytes
    }

    #[must_use]
    pub const fn retransmit_interval_ms(&self) -> u64 {
        self.retransmit_interval_ms
    }

    #[must_use]
    pub const fn keep_alive_grace(&self) -> f32 {
        self.keep_alive_grace
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn maximum_qos(&self) -> QoS {
        self.maximum_qos
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.keep_alive_grace < 1.0 {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!(
                    "keep_alive_grace must be at least 1.0, got {}",
                    self.keep_alive_grace
                ),
            ));
        }
        if self.max_packet_bytes > codec::MAX_PACKET_LEN {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!(
                    "max_packet_bytes must not exceed {}, got {}",
                    codec::MAX_PACKET_LEN,
                    self.max_packet_bytes
                ),
            ));
        }
        if self.retransmit_interval_ms == 0 {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "retransmit_interval_ms must be nonzero",
            ));
        }
        Ok(())
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            sys_interval: Self::default_sys_interval(),
            max_packet_bytes: Self::default_max_packet_bytes(),
            retransmit_interval_ms: Self::default_retransmit_interval_ms(),
            keep_alive_grace: Self::default_keep_alive_grace(),
            connect_timeout: Self::default_connect_timeout(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
            maximum_qos: Self::default_maximum_qos(),
        }
    }
}
