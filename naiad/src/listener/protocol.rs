// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use crate::config;
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;

/// Bound server socket of the configured transport.
#[derive(Debug)]
pub enum Protocol {
    Mqtt(TcpListener),
    #[cfg(unix)]
    Uds(UnixListener),
}

impl Protocol {
    /// Bind the address in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound.
    pub async fn bind(config: &config::Listener) -> Result<Self, Error> {
        match config.protocol() {
            config::Protocol::Mqtt => {
                let address = config.address();
                let listener = TcpListener::bind(&address).await.map_err(|err| {
                    Error::from_string(
                        ErrorKind::SocketError,
                        format!("Failed to listen at {address}, err: {err}"),
                    )
                })?;
                log::info!("Listening at {address}");
                Ok(Self::Mqtt(listener))
            }
            #[cfg(unix)]
            config::Protocol::Uds => {
                // A previous run may have left the socket file behind.
                let _ret = std::fs::remove_file(config.socket_path());
                let listener = UnixListener::bind(config.socket_path()).map_err(|err| {
                    Error::from_string(
                        ErrorKind::SocketError,
                        format!(
                            "Failed to listen at {:?}, err: {err}",
                            config.socket_path()
                        ),
                    )
                })?;
                log::info!("Listening at {:?}", config.socket_path());
                Ok(Self::Uds(listener))
            }
        }
    }

    /// Wait for the next client connection.
    ///
    /// # Errors
    ///
    /// Returns error if the server socket failed.
    pub async fn accept(&self) -> Result<Stream, Error> {
        match self {
            Self::Mqtt(listener) => {
                let (stream, address) = listener.accept().await?;
                log::info!("New connection from {address}");
                Ok(Stream::Mqtt(stream))
            }
            #[cfg(unix)]
            Self::Uds(listener) => {
                let (stream, _address) = listener.accept().await?;
                log::info!("New uds connection");
                Ok(Stream::Uds(stream))
            }
        }
    }
}
