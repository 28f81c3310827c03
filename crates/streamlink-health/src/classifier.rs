//! Workload health classification.
//!
//! Every pod and container is inspected first and the findings are folded
//! into a set of flags; only then is a status picked. The order of the
//! decision list matters: a crash anywhere outranks a pod that is still
//! starting elsewhere.

use streamlink_core::{
    ContainerSnapshot, ContainerState, HealthStatus, PodPhase, ServiceHealth, WorkloadSnapshot,
};

/// Restart count above which a container is considered crash-looping.
const MAX_RESTARTS: u32 = 2;

#[derive(Debug, Default, PartialEq, Eq)]
struct Flags {
    crash: bool,
    image_pull: bool,
    creating: bool,
    pending: bool,
    not_ready: bool,
}

/// Classify a workload. `None` means the Deployment does not exist.
pub fn classify(snapshot: Option<&WorkloadSnapshot>) -> ServiceHealth {
    let Some(snapshot) = snapshot else {
        return ServiceHealth {
            status: HealthStatus::NotFound,
            replicas: "0/0".to_string(),
        };
    };

    if snapshot.pods.is_empty() {
        return ServiceHealth {
            status: HealthStatus::Pending,
            replicas: format!("0/{}", snapshot.desired_replicas),
        };
    }

    let flags = collect_flags(snapshot);
    let status = if flags.crash || flags.image_pull {
        HealthStatus::Failed
    } else if flags.creating {
        HealthStatus::Deploying
    } else if flags.pending {
        HealthStatus::Pending
    } else if flags.not_ready {
        HealthStatus::Degraded
    } else if snapshot.desired_replicas > 0
        && snapshot.available_replicas == snapshot.desired_replicas
    {
        HealthStatus::Running
    } else {
        HealthStatus::Degraded
    };

    ServiceHealth {
        status,
        replicas: snapshot.replica_summary(),
    }
}

fn collect_flags(snapshot: &WorkloadSnapshot) -> Flags {
    let mut flags = Flags::default();
    for pod in &snapshot.pods {
        match pod.phase {
            // Container detail is not trusted once the pod itself is gone.
            PodPhase::Failed | PodPhase::Unknown => {
                flags.crash = true;
                continue;
            }
            PodPhase::Pending => flags.pending = true,
            PodPhase::Running | PodPhase::Succeeded => {}
        }
        for container in &pod.containers {
            inspect_container(container, &mut flags);
        }
    }
    flags
}

fn inspect_container(container: &ContainerSnapshot, flags: &mut Flags) {
    if container.restart_count > MAX_RESTARTS {
        flags.crash = true;
    }

    match &container.state {
        ContainerState::Waiting { reason } => {
            if reason.contains("CrashLoopBackOff") || reason.contains("Error") {
                flags.crash = true;
            } else if reason.contains("ImagePull") {
                flags.image_pull = true;
            } else if reason == "ContainerCreating" || reason == "PodInitializing" {
                flags.creating = true;
            }
        }
        ContainerState::Terminated(t) if t.exit_code != 0 => flags.crash = true,
        _ => {}
    }

    if let Some(last) = &container.last_terminated {
        if last.reason == "Error" || last.reason == "CrashLoopBackOff" || last.exit_code != 0 {
            flags.crash = true;
        }
    }

    if !container.ready {
        flags.not_ready = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamlink_core::{PodSnapshot, Termination};

    fn container(ready: bool, state: ContainerState) -> ContainerSnapshot {
        ContainerSnapshot {
            name: "main".to_string(),
            ready,
            restart_count: 0,
            state,
            last_terminated: None,
        }
    }

    fn waiting(reason: &str) -> ContainerSnapshot {
        container(
            false,
            ContainerState::Waiting {
                reason: reason.to_string(),
            },
        )
    }

    fn pod(phase: PodPhase, containers: Vec<ContainerSnapshot>) -> PodSnapshot {
        PodSnapshot {
            name: "pod".to_string(),
            phase,
            containers,
        }
    }

    fn workload(desired: u32, available: u32, pods: Vec<PodSnapshot>) -> WorkloadSnapshot {
        WorkloadSnapshot {
            desired_replicas: desired,
            available_replicas: available,
            pods,
        }
    }

    fn status_of(w: &WorkloadSnapshot) -> HealthStatus {
        classify(Some(w)).status
    }

    #[test]
    fn missing_deployment_is_not_found() {
        let health = classify(None);
        assert_eq!(health.status, HealthStatus::NotFound);
        assert_eq!(health.replicas, "0/0");
    }

    #[test]
    fn no_pods_is_pending() {
        let health = classify(Some(&workload(3, 0, vec![])));
        assert_eq!(health.status, HealthStatus::Pending);
        assert_eq!(health.replicas, "0/3");
    }

    #[test]
    fn all_ready_is_running() {
        let w = workload(1, 1, vec![pod(PodPhase::Running, vec![container(true, ContainerState::Running)])]);
        let health = classify(Some(&w));
        assert_eq!(health.status, HealthStatus::Running);
        assert_eq!(health.replicas, "1/1");
    }

    #[test]
    fn zero_desired_is_degraded() {
        let w = workload(0, 0, vec![pod(PodPhase::Running, vec![container(true, ContainerState::Running)])]);
        assert_eq!(status_of(&w), HealthStatus::Degraded);
    }

    #[test]
    fn partial_availability_is_degraded() {
        let w = workload(2, 1, vec![pod(PodPhase::Running, vec![container(true, ContainerState::Running)])]);
        assert_eq!(status_of(&w), HealthStatus::Degraded);
    }

    #[test]
    fn running_but_not_ready_is_degraded() {
        let w = workload(1, 0, vec![pod(PodPhase::Running, vec![container(false, ContainerState::Running)])]);
        assert_eq!(status_of(&w), HealthStatus::Degraded);
    }

    #[test]
    fn crash_loop_waiting_is_failed() {
        let w = workload(1, 0, vec![pod(PodPhase::Running, vec![waiting("CrashLoopBackOff")])]);
        assert_eq!(status_of(&w), HealthStatus::Failed);
    }

    #[test]
    fn image_pull_errors_are_failed() {
        for reason in ["ImagePullBackOff", "ErrImagePull"] {
            let w = workload(1, 0, vec![pod(PodPhase::Pending, vec![waiting(reason)])]);
            assert_eq!(status_of(&w), HealthStatus::Failed, "{reason}");
        }
    }

    #[test]
    fn creating_outranks_pending() {
        let w = workload(1, 0, vec![pod(PodPhase::Pending, vec![waiting("ContainerCreating")])]);
        assert_eq!(status_of(&w), HealthStatus::Deploying);

        let w = workload(1, 0, vec![pod(PodPhase::Pending, vec![waiting("PodInitializing")])]);
        assert_eq!(status_of(&w), HealthStatus::Deploying);
    }

    #[test]
    fn pending_pod_without_containers_is_pending() {
        let w = workload(1, 0, vec![pod(PodPhase::Pending, vec![])]);
        assert_eq!(status_of(&w), HealthStatus::Pending);
    }

    #[test]
    fn failed_or_unknown_phase_is_failed() {
        for phase in [PodPhase::Failed, PodPhase::Unknown] {
            let w = workload(1, 1, vec![pod(phase, vec![container(true, ContainerState::Running)])]);
            assert_eq!(status_of(&w), HealthStatus::Failed, "{phase:?}");
        }
    }

    #[test]
    fn high_restart_count_is_failed() {
        let mut c = container(true, ContainerState::Running);
        c.restart_count = 3;
        let w = workload(1, 1, vec![pod(PodPhase::Running, vec![c])]);
        assert_eq!(status_of(&w), HealthStatus::Failed);

        let mut c = container(true, ContainerState::Running);
        c.restart_count = 2;
        let w = workload(1, 1, vec![pod(PodPhase::Running, vec![c])]);
        assert_eq!(status_of(&w), HealthStatus::Running);
    }

    #[test]
    fn nonzero_termination_is_failed() {
        let term = ContainerState::Terminated(Termination {
            reason: "Completed".to_string(),
            exit_code: 1,
        });
        let w = workload(1, 0, vec![pod(PodPhase::Running, vec![container(false, term)])]);
        assert_eq!(status_of(&w), HealthStatus::Failed);
    }

    #[test]
    fn previous_crash_is_failed() {
        let mut c = container(true, ContainerState::Running);
        c.last_terminated = Some(Termination {
            reason: "Error".to_string(),
            exit_code: 0,
        });
        let w = workload(1, 1, vec![pod(PodPhase::Running, vec![c])]);
        assert_eq!(status_of(&w), HealthStatus::Failed);
    }

    #[test]
    fn crash_in_one_pod_outranks_creating_in_another() {
        let w = workload(
            2,
            0,
            vec![
                pod(PodPhase::Pending, vec![waiting("ContainerCreating")]),
                pod(PodPhase::Running, vec![waiting("CrashLoopBackOff")]),
            ],
        );
        assert_eq!(status_of(&w), HealthStatus::Failed);
    }
}
