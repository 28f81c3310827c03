//! Deployment preview.
//!
//! The planner answers "what would `deploy` do?" without touching the store
//! or the cluster.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use streamlink_core::ServiceCatalog;
use streamlink_state::StateStore;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::tracker::InstalledSetTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Installed,
    WillInstall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub name: String,
    pub display_name: String,
    pub state: PlanState,
}

/// Dependencies of `target` in install order, each marked installed or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub cluster_id: String,
    pub target: String,
    pub target_display_name: String,
    pub target_installed: bool,
    pub entries: Vec<PlanEntry>,
    /// Dependencies that would be installed before the target.
    pub to_install_count: usize,
    pub summary: String,
}

impl DeploymentPlan {
    pub fn will_install(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.state == PlanState::WillInstall)
            .map(|e| e.name.as_str())
    }
}

#[derive(Clone)]
pub struct DeploymentPlanner {
    catalog: Arc<ServiceCatalog>,
    state: StateStore,
    tracker: InstalledSetTracker,
}

impl DeploymentPlanner {
    pub fn new(catalog: Arc<ServiceCatalog>, state: StateStore) -> Self {
        let tracker = InstalledSetTracker::new(state.clone());
        Self {
            catalog,
            state,
            tracker,
        }
    }

    pub fn plan(&self, cluster_id: &str, catalog_name: &str) -> OrchestratorResult<DeploymentPlan> {
        if !self.catalog.contains(catalog_name) {
            return Err(OrchestratorError::ServiceNotFound(catalog_name.to_string()));
        }
        if self.state.get_cluster(cluster_id)?.is_none() {
            return Err(OrchestratorError::ClusterNotFound(cluster_id.to_string()));
        }

        let installed = self.tracker.usable_catalog_names(cluster_id)?;
        let entries: Vec<PlanEntry> = self
            .catalog
            .all_dependencies(catalog_name)
            .into_iter()
            .map(|name| PlanEntry {
                display_name: self.catalog.display_name(&name).to_string(),
                state: if installed.contains(&name) {
                    PlanState::Installed
                } else {
                    PlanState::WillInstall
                },
                name,
            })
            .collect();

        let mut plan = DeploymentPlan {
            cluster_id: cluster_id.to_string(),
            target: catalog_name.to_string(),
            target_display_name: self.catalog.display_name(catalog_name).to_string(),
            target_installed: installed.contains(catalog_name),
            to_install_count: entries
                .iter()
                .filter(|e| e.state == PlanState::WillInstall)
                .count(),
            entries,
            summary: String::new(),
        };
        plan.summary = summarize(&plan);
        Ok(plan)
    }
}

fn summarize(plan: &DeploymentPlan) -> String {
    let target = &plan.target_display_name;
    if plan.target_installed {
        return format!("{target} is already deployed");
    }
    if plan.entries.is_empty() {
        return format!("{target} has no dependencies and will be deployed directly");
    }
    if plan.to_install_count == 0 {
        return format!(
            "All {} dependencies of {target} are installed; only {target} will be deployed",
            plan.entries.len()
        );
    }
    let names: Vec<&str> = plan
        .entries
        .iter()
        .filter(|e| e.state == PlanState::WillInstall)
        .map(|e| e.display_name.as_str())
        .collect();
    format!(
        "{} of {} dependencies will be installed before {target}: {}",
        plan.to_install_count,
        plan.entries.len(),
        names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamlink_state::{ClusterRecord, DeployedServiceRecord};

    fn setup() -> (DeploymentPlanner, StateStore, String) {
        let state = StateStore::open_in_memory().unwrap();
        let cluster = ClusterRecord::new("local", "https://127.0.0.1:6443", String::new());
        state.put_new_cluster(&cluster).unwrap();
        let catalog = Arc::new(ServiceCatalog::streamlink().unwrap());
        (DeploymentPlanner::new(catalog, state.clone()), state, cluster.id)
    }

    fn install(state: &StateStore, cluster_id: &str, name: &str) {
        let record = DeployedServiceRecord::deploying(cluster_id, name, name, name, "streamlink");
        state.insert_active_service(&record).unwrap();
    }

    #[test]
    fn fresh_cluster_installs_everything() {
        let (planner, _, cluster_id) = setup();
        let plan = planner.plan(&cluster_id, "kafka-connect").unwrap();

        let names: Vec<&str> = plan.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["kafka", "schema-registry"]);
        assert_eq!(plan.to_install_count, 2);
        assert!(!plan.target_installed);
        assert_eq!(
            plan.summary,
            "2 of 2 dependencies will be installed before Kafka Connect: Apache Kafka, Schema Registry"
        );
    }

    #[test]
    fn installed_entries_are_marked() {
        let (planner, state, cluster_id) = setup();
        install(&state, &cluster_id, "kafka");

        let plan = planner.plan(&cluster_id, "kafka-connect").unwrap();
        assert_eq!(plan.entries[0].state, PlanState::Installed);
        assert_eq!(plan.entries[1].state, PlanState::WillInstall);
        assert_eq!(plan.will_install().collect::<Vec<_>>(), vec!["schema-registry"]);
        assert_eq!(plan.to_install_count, 1);
    }

    #[test]
    fn summary_variants() {
        let (planner, state, cluster_id) = setup();
        assert_eq!(
            planner.plan(&cluster_id, "kafka").unwrap().summary,
            "Apache Kafka has no dependencies and will be deployed directly"
        );

        install(&state, &cluster_id, "kafka");
        assert_eq!(
            planner.plan(&cluster_id, "schema-registry").unwrap().summary,
            "All 1 dependencies of Schema Registry are installed; only Schema Registry will be deployed"
        );

        let plan = planner.plan(&cluster_id, "kafka").unwrap();
        assert!(plan.target_installed);
        assert_eq!(plan.summary, "Apache Kafka is already deployed");
    }

    #[test]
    fn planning_writes_nothing() {
        let (planner, state, cluster_id) = setup();
        planner.plan(&cluster_id, "kafbat-ui").unwrap();
        assert!(state.list_services(&cluster_id).unwrap().is_empty());
    }

    #[test]
    fn unknown_service_and_cluster() {
        let (planner, _, cluster_id) = setup();
        assert!(matches!(
            planner.plan(&cluster_id, "redis"),
            Err(OrchestratorError::ServiceNotFound(name)) if name == "redis"
        ));
        assert!(matches!(
            planner.plan("missing", "kafka"),
            Err(OrchestratorError::ClusterNotFound(_))
        ));
    }
}
