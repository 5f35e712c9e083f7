// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Broker config, parsed from a toml file.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

mod general;
mod listener;
mod log;

pub use self::log::{Log, LogLevel};
pub use general::General;
pub use listener::{Listener, Protocol};

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    general: General,

    #[serde(default)]
    listener: Listener,

    #[serde(default)]
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub const fn listener(&self) -> &Listener {
        &self.listener
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Check config values.
    ///
    /// # Errors
    ///
    /// Returns error if some fields are out of range.
    pub fn validate(&self) -> Result<(), Error> {
        self.general.validate()?;
        self.listener.validate()
    }
}

impl Config {
    /// Parse and validate a toml config document.
    ///
    /// # Errors
    ///
    /// Returns error if `content` is not a valid config.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(content).map_err(|err| {
            Error::from_string(ErrorKind::ConfigError, format!("Invalid config: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.listener().address(), "127.0.0.1:1883");
        assert_eq!(config.general().max_packet_bytes(), 2 * 1024 * 1024);
        assert_eq!(config.general().retransmit_interval_ms(), 20_000);
        assert_eq!(config.general().sys_interval(), 0);
    }

    #[test]
    fn test_parse() {
        let content = r#"
[general]
sys_interval = 3
keep_alive_grace = 2.0

[listener]
host = "0.0.0.0"
port = 2883
"#;
        let config = Config::from_toml(content).unwrap();
        assert_eq!(config.listener().address(), "0.0.0.0:2883");
        assert_eq!(config.general().sys_interval(), 3);

        assert!(Config::from_toml("[general]\nkeep_alive_grace = 0.2").is_err());
        assert!(Config::from_toml("[listener]\nport = \"nope\"").is_err());
    }
}
