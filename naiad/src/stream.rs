// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::error::Error;

/// Each Stream represents a duplex socket connection to a client.
///
/// This enum is the transport seam: the session layer above it only sees
/// bytes, so additional transports can be plugged in without touching the
/// protocol core.
#[derive(Debug)]
pub enum Stream {
    Mqtt(TcpStream),
    #[cfg(unix)]
    Uds(UnixStream),
}

impl Stream {
    /// Read some bytes from stream, appending them to `buf`.
    ///
    /// Returns 0 when the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns error if stream/socket gets error.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.read_buf(buf).await?),
            #[cfg(unix)]
            Self::Uds(uds_stream) => Ok(uds_stream.read_buf(buf).await?),
        }
    }

    /// Write the whole buffer to stream.
    ///
    /// # Errors
    ///
    /// Returns error if socket/stream gets error.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => {
                tcp_stream.write_all(buf).await?;
                Ok(buf.len())
            }
            #[cfg(unix)]
            Self::Uds(uds_stream) => {
                uds_stream.write_all(buf).await?;
                Ok(buf.len())
            }
        }
    }
}
