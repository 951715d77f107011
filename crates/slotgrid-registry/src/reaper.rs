//! Background purge of dead nodes
//!
//! The reaper runs [`GridModel::purge_dead_nodes`] on a fixed interval until
//! it is stopped or dropped.

use crate::model::GridModel;
use slotgrid_core::config::ReaperConfig;
use slotgrid_core::io::TimeProvider;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle to the periodic purge task
#[derive(Debug)]
pub struct Reaper {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl Reaper {
    /// Spawn the purge loop
    ///
    /// Sleeps go through `time`, so a simulated clock drives the sweeps in
    /// tests.
    pub fn start(model: Arc<GridModel>, config: &ReaperConfig, time: Arc<dyn TimeProvider>) -> Self {
        let interval_ms = config.interval_ms;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(interval_ms, "Starting node reaper");

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // Sender dropped counts as shutdown too
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = time.sleep_ms(interval_ms) => {
                        let report = model.purge_dead_nodes().await;
                        if !report.is_empty() {
                            debug!(
                                demoted = report.demoted.len(),
                                removed = report.removed.len(),
                                "Reaper sweep changed the registry"
                            );
                        }
                    }
                }
            }
            info!("Node reaper shutting down");
        });

        Self {
            handle: Some(handle),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Signal the task to stop
    ///
    /// A sweep already in progress finishes first.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }

    /// Stop and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}
