//! Bounded readiness polling.

use std::time::Duration;

use streamlink_core::{HealthStatus, ServiceHealth};
use streamlink_executor::{ClusterExecutor, ExecutorResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::classify;

/// Polls a workload until it is ready, has failed, or time runs out.
#[derive(Debug, Clone, Copy)]
pub struct HealthPoller {
    interval: Duration,
}

impl HealthPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One classification pass.
    pub async fn check(
        &self,
        executor: &dyn ClusterExecutor,
        deployed_name: &str,
        namespace: &str,
    ) -> ExecutorResult<ServiceHealth> {
        let snapshot = executor.get_instance_health(deployed_name, namespace).await?;
        Ok(classify(snapshot.as_ref()))
    }

    /// Wait for the workload to report `running`.
    ///
    /// Returns `false` as soon as it is classified `failed`, or once
    /// `timeout` has elapsed. Missing, pending, deploying and degraded
    /// workloads, as well as executor errors, are retried.
    pub async fn wait_ready(
        &self,
        executor: &dyn ClusterExecutor,
        deployed_name: &str,
        namespace: &str,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.check(executor, deployed_name, namespace).await {
                Ok(health) => {
                    debug!(%deployed_name, %namespace, attempt, status = %health.status, replicas = %health.replicas, "readiness poll");
                    match health.status {
                        HealthStatus::Running => {
                            info!(%deployed_name, attempt, "workload ready");
                            return true;
                        }
                        HealthStatus::Failed => {
                            warn!(%deployed_name, replicas = %health.replicas, "workload failed while waiting for readiness");
                            return false;
                        }
                        _ => {}
                    }
                }
                Err(e) => debug!(%deployed_name, %namespace, attempt, error = %e, "readiness poll error"),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(%deployed_name, ?timeout, attempt, "workload not ready before deadline");
                return false;
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}
