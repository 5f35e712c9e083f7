// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Init internal modules and wire their channels.

use tokio::sync::mpsc;

use super::{ServerContext, CHANNEL_CAPACITY};
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::listener::Listener;
use crate::metrics::Metrics;

impl ServerContext {
    /// Bind the listener and spawn all module tasks onto the current
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the listener address cannot be bound.
    pub async fn start(&mut self) -> Result<(), Error> {
        let (listener_to_dispatcher_sender, listener_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (dispatcher_to_listener_sender, dispatcher_to_listener_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (metrics_to_dispatcher_sender, metrics_to_dispatcher_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);
        let (dispatcher_to_metrics_sender, dispatcher_to_metrics_receiver) =
            mpsc::channel(CHANNEL_CAPACITY);

        // Listener module.
        let mut listener = Listener::bind(
            self.config.clone(),
            listener_to_dispatcher_sender,
            dispatcher_to_listener_receiver,
        )
        .await?;
        tokio::spawn(async move {
            listener.run_loop().await;
        });

        // Dispatcher module.
        let mut dispatcher = Dispatcher::new(
            self.config.general().maximum_qos(),
            dispatcher_to_listener_sender,
            listener_to_dispatcher_receiver,
            dispatcher_to_metrics_sender,
            metrics_to_dispatcher_receiver,
        );
        tokio::spawn(async move {
            dispatcher.run_loop().await;
        });

        // Metrics module.
        let mut metrics = Metrics::new(
            self.config.general().sys_interval(),
            metrics_to_dispatcher_sender,
            dispatcher_to_metrics_receiver,
        );
        tokio::spawn(async move {
            metrics.run_loop().await;
        });

        Ok(())
    }
}
