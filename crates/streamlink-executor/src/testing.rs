//! In-memory executor for tests.
//!
//! `FakeExecutor` records every call and answers health queries from a
//! per-workload script. The last scripted step repeats forever; workloads
//! without a script report healthy.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use streamlink_core::{
    ContainerSnapshot, ContainerState, PodPhase, PodSnapshot, WorkloadSnapshot,
};
use streamlink_state::ClusterRecord;

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{AppliedService, ClusterConnector, ClusterExecutor};

pub const FAKE_NAMESPACE: &str = "streamlink";

/// One scripted answer to `get_instance_health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStep {
    /// One ready replica out of one.
    Ready,
    /// Pod phase `Pending`, no containers.
    Pending,
    /// Pod phase `Failed`.
    Crashed,
    /// Deployment not found.
    Missing,
    /// The API call itself fails.
    Error,
}

#[derive(Default)]
struct FakeState {
    scripts: HashMap<String, VecDeque<HealthStep>>,
    health_calls: HashMap<String, usize>,
    failing_applies: HashSet<String>,
    failing_deletes: HashSet<String>,
    applied: Vec<String>,
    deleted: Vec<String>,
    apply_delay: Option<Duration>,
    node_address: Option<String>,
    unreachable: bool,
}

#[derive(Default)]
pub struct FakeExecutor {
    state: Mutex<FakeState>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn script_health(&self, name: &str, steps: impl IntoIterator<Item = HealthStep>) {
        self.state()
            .scripts
            .insert(name.to_string(), steps.into_iter().collect());
    }

    pub fn fail_apply(&self, name: &str) {
        self.state().failing_applies.insert(name.to_string());
    }

    pub fn fail_delete(&self, name: &str) {
        self.state().failing_deletes.insert(name.to_string());
    }

    /// Forget injected failures and health scripts; recorded calls are kept.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_applies.clear();
        state.failing_deletes.clear();
        state.scripts.clear();
    }

    pub fn set_apply_delay(&self, delay: Duration) {
        self.state().apply_delay = Some(delay);
    }

    pub fn set_node_address(&self, address: Option<&str>) {
        self.state().node_address = address.map(str::to_string);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    /// Catalog names passed to `apply_service_manifest`, in call order.
    pub fn applied(&self) -> Vec<String> {
        self.state().applied.clone()
    }

    /// Deployed names passed to `delete_service_resources`, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    pub fn health_calls(&self, name: &str) -> usize {
        self.state().health_calls.get(name).copied().unwrap_or(0)
    }

    fn next_step(&self, name: &str) -> HealthStep {
        let mut state = self.state();
        *state.health_calls.entry(name.to_string()).or_default() += 1;
        match state.scripts.get_mut(name) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(HealthStep::Ready),
            Some(steps) => steps.front().copied().unwrap_or(HealthStep::Ready),
            None => HealthStep::Ready,
        }
    }
}

fn api_error(code: u16, message: &str) -> ExecutorError {
    ExecutorError::Api {
        code,
        message: message.to_string(),
    }
}

fn single_pod(phase: PodPhase, ready: bool, state: ContainerState) -> Vec<PodSnapshot> {
    vec![PodSnapshot {
        name: "pod-0".to_string(),
        phase,
        containers: vec![ContainerSnapshot {
            name: "main".to_string(),
            ready,
            restart_count: 0,
            state,
            last_terminated: None,
        }],
    }]
}

#[async_trait]
impl ClusterExecutor for FakeExecutor {
    async fn apply_service_manifest(&self, catalog_name: &str) -> ExecutorResult<AppliedService> {
        let delay = self.state().apply_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.applied.push(catalog_name.to_string());
        if state.failing_applies.contains(catalog_name) {
            return Err(api_error(500, "injected apply failure"));
        }
        Ok(AppliedService {
            deployed_name: catalog_name.to_string(),
            namespace: FAKE_NAMESPACE.to_string(),
        })
    }

    async fn delete_service_resources(
        &self,
        deployed_name: &str,
        _namespace: &str,
    ) -> ExecutorResult<()> {
        let mut state = self.state();
        state.deleted.push(deployed_name.to_string());
        if state.failing_deletes.contains(deployed_name) {
            return Err(api_error(500, "injected delete failure"));
        }
        Ok(())
    }

    async fn get_instance_health(
        &self,
        deployed_name: &str,
        _namespace: &str,
    ) -> ExecutorResult<Option<WorkloadSnapshot>> {
        let snapshot = match self.next_step(deployed_name) {
            HealthStep::Ready => WorkloadSnapshot {
                desired_replicas: 1,
                available_replicas: 1,
                pods: single_pod(PodPhase::Running, true, ContainerState::Running),
            },
            HealthStep::Pending => WorkloadSnapshot {
                desired_replicas: 1,
                available_replicas: 0,
                pods: vec![PodSnapshot {
                    name: "pod-0".to_string(),
                    phase: PodPhase::Pending,
                    containers: Vec::new(),
                }],
            },
            HealthStep::Crashed => WorkloadSnapshot {
                desired_replicas: 1,
                available_replicas: 0,
                pods: single_pod(PodPhase::Failed, false, ContainerState::Unknown),
            },
            HealthStep::Missing => return Ok(None),
            HealthStep::Error => return Err(api_error(503, "injected health failure")),
        };
        Ok(Some(snapshot))
    }

    async fn get_node_address(&self) -> ExecutorResult<Option<String>> {
        Ok(self.state().node_address.clone())
    }

    async fn ping(&self) -> ExecutorResult<()> {
        if self.state().unreachable {
            return Err(ExecutorError::Client("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Connector that hands out the same fake executor for every cluster.
pub struct FakeConnector {
    executor: Arc<FakeExecutor>,
}

impl FakeConnector {
    pub fn new(executor: Arc<FakeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, _cluster: &ClusterRecord) -> ExecutorResult<Arc<dyn ClusterExecutor>> {
        Ok(self.executor.clone())
    }
}
