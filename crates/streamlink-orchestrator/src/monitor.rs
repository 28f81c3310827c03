//! Background cluster reachability sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;

/// Periodically pings every active cluster so `deploy` sees a current
/// `up`/`down` status.
pub struct ClusterMonitor {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
}

impl ClusterMonitor {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run until `shutdown` flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "cluster monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    info!("cluster monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Check every active cluster once. Returns how many were checked.
    pub async fn sweep(&self) -> usize {
        let clusters = match self.orchestrator.state().list_clusters() {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(error = %e, "cluster monitor could not list clusters");
                return 0;
            }
        };

        let mut checked = 0;
        for cluster in clusters.iter().filter(|c| c.is_active) {
            match self.orchestrator.check_cluster(&cluster.id).await {
                Ok(status) => {
                    checked += 1;
                    if status != cluster.status {
                        info!(cluster_id = %cluster.id, from = %cluster.status, to = %status, "cluster status changed");
                    } else {
                        debug!(cluster_id = %cluster.id, %status, "cluster status unchanged");
                    }
                }
                Err(e) => warn!(cluster_id = %cluster.id, error = %e, "cluster check failed"),
            }
        }
        checked
    }
}
