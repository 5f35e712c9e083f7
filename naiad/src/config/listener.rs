// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Transport protocol the listener speaks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// MQTT over plain TCP.
    #[default]
    Mqtt,

    /// MQTT over a unix domain socket.
    #[cfg(unix)]
    Uds,
}

/// Listener section in config.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Listener {
    #[serde(default)]
    protocol: Protocol,

    /// Bind address.
    ///
    /// Default is `127.0.0.1`.
    #[serde(default = "Listener::default_host")]
    host: String,

    /// Bind port.
    ///
    /// Default is 1883.
    #[serde(default = "Listener::default_port")]
    port: u16,

    /// Unix domain socket path, only used with `protocol = "uds"`.
    #[serde(default = "Listener::default_socket_path")]
    socket_path: PathBuf,
}

impl Listener {
    #[must_use]
    pub fn default_host() -> String {
        "127.0.0.1".to_string()
    }

    #[must_use]
    pub const fn default_port() -> u16 {
        1883
    }

    #[must_use]
    pub fn default_socket_path() -> PathBuf {
        PathBuf::from("/tmp/naiad.sock")
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Get `host:port` pair used with tcp based protocols.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.host.is_empty() {
            return Err(Error::new(ErrorKind::ConfigError, "listener host is empty"));
        }
        if self.protocol == Protocol::Mqtt && self.port == 0 {
            return Err(Error::new(ErrorKind::ConfigError, "listener port is zero"));
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: Self::default_host(),
            port: Self::default_port(),
            socket_path: Self::default_socket_path(),
        }
    }
}
