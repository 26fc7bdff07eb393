//! Spawning a bridge and stopping it again.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tandem_core::TandemConfig;
use tandem_net::{HomeEvent, HomeNetwork, ShadowConnector};

use crate::engine::RelayEngine;
use crate::error::{RelayError, Result};

/// Handle to a running bridge. Dropping it does not stop the bridge; call
/// [`BridgeHandle::shutdown`].
pub struct BridgeHandle {
    home_tx: mpsc::UnboundedSender<HomeEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Sender the network-A client pushes its events into.
    pub fn home_events(&self) -> mpsc::UnboundedSender<HomeEvent> {
        self.home_tx.clone()
    }

    pub fn send_home_event(&self, event: HomeEvent) -> Result<()> {
        self.home_tx.send(event).map_err(|_| RelayError::Stopped)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Release every shadow connection and wait for the engine to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "relay task ended abnormally");
        }
    }
}

/// Build a [`RelayEngine`] for `config` and run it on its own task.
///
/// Each call creates an independent bridge with its own pool and queue.
pub fn spawn_bridge(
    config: &TandemConfig,
    home: Arc<dyn HomeNetwork>,
    connector: Arc<dyn ShadowConnector>,
) -> Result<BridgeHandle> {
    let engine = RelayEngine::new(config, home, connector)?;
    let home_tx = engine.home_sender();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    info!(server = %config.network_b.server, "spawning bridge");
    let task = tokio::spawn(async move { engine.run(shutdown_rx).await });

    Ok(BridgeHandle {
        home_tx,
        shutdown_tx,
        task,
    })
}
