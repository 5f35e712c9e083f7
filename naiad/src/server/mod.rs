// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! `ServerContext` manages the lifetime of listener, dispatcher and
//! metrics tasks.

use crate::config::Config;
use crate::error::Error;

mod init;
pub mod run;

pub use run::{run_server, run_server_with_config};

pub const CHANNEL_CAPACITY: usize = 16;

pub struct ServerContext {
    config: Config,
}

impl ServerContext {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start all module tasks, then wait for a termination signal.
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be bound.
    pub async fn run_loop(&mut self) -> Result<(), Error> {
        self.start().await?;
        self.wait_for_signal().await
    }

    #[cfg(unix)]
    async fn wait_for_signal(&mut self) -> Result<(), Error> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm_stream = signal(SignalKind::terminate())?;
        let mut sigquit_stream = signal(SignalKind::quit())?;
        let mut sigint_stream = signal(SignalKind::interrupt())?;

        tokio::select! {
            Some(_) = sigterm_stream.recv() => {
                log::info!("Quit with SIGTERM");
            }
            Some(_) = sigquit_stream.recv() => {
                log::info!("Quit with SIGQUIT");
            }
            Some(_) = sigint_stream.recv() => {
                log::info!("Quit with SIGINT");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn wait_for_signal(&mut self) -> Result<(), Error> {
        tokio::signal::ctrl_c().await?;
        log::info!("Quit with ctrl-c");
        Ok(())
    }
}
