//! Conversion from Kubernetes API objects to workload snapshots.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ContainerState as K8sContainerState, ContainerStatus, Node, Pod,
};
use streamlink_core::{
    ContainerSnapshot, ContainerState, PodPhase, PodSnapshot, Termination, WorkloadSnapshot,
};

/// Label every catalog workload's pods carry.
pub fn app_selector(deployed_name: &str) -> String {
    format!("app={deployed_name}")
}

pub fn workload_snapshot(deployment: &Deployment, pods: &[Pod]) -> WorkloadSnapshot {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(0);
    let available = deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    WorkloadSnapshot {
        desired_replicas: clamp(desired),
        available_replicas: clamp(available),
        pods: pods.iter().map(pod_snapshot).collect(),
    }
}

pub fn pod_snapshot(pod: &Pod) -> PodSnapshot {
    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(PodPhase::parse)
        .unwrap_or(PodPhase::Unknown);
    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(container_snapshot).collect())
        .unwrap_or_default();
    PodSnapshot {
        name: pod.metadata.name.clone().unwrap_or_default(),
        phase,
        containers,
    }
}

fn container_snapshot(status: &ContainerStatus) -> ContainerSnapshot {
    let last_terminated = status
        .last_state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .map(|t| Termination {
            reason: t.reason.clone().unwrap_or_default(),
            exit_code: t.exit_code,
        });
    ContainerSnapshot {
        name: status.name.clone(),
        ready: status.ready,
        restart_count: clamp(status.restart_count),
        state: container_state(status.state.as_ref()),
        last_terminated,
    }
}

fn container_state(state: Option<&K8sContainerState>) -> ContainerState {
    let Some(state) = state else {
        return ContainerState::Unknown;
    };
    if let Some(waiting) = &state.waiting {
        ContainerState::Waiting {
            reason: waiting.reason.clone().unwrap_or_default(),
        }
    } else if let Some(terminated) = &state.terminated {
        ContainerState::Terminated(Termination {
            reason: terminated.reason.clone().unwrap_or_default(),
            exit_code: terminated.exit_code,
        })
    } else if state.running.is_some() {
        ContainerState::Running
    } else {
        ContainerState::Unknown
    }
}

/// First node's ExternalIP, falling back to its InternalIP.
pub fn node_address(nodes: &[Node]) -> Option<String> {
    let addresses = nodes.first()?.status.as_ref()?.addresses.as_ref()?;
    ["ExternalIP", "InternalIP"].iter().find_map(|wanted| {
        addresses
            .iter()
            .find(|a| a.type_ == *wanted)
            .map(|a| a.address.clone())
    })
}

fn clamp(n: i32) -> u32 {
    n.max(0) as u32
}
