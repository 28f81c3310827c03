//! Which catalog entries are installed on a cluster.

use std::collections::BTreeSet;

use streamlink_state::{StateResult, StateStore};

/// Read-only view of the active service records of a cluster.
#[derive(Clone)]
pub struct InstalledSetTracker {
    state: StateStore,
}

impl InstalledSetTracker {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Catalog names of every active record, whatever its status.
    pub fn installed_catalog_names(&self, cluster_id: &str) -> StateResult<BTreeSet<String>> {
        Ok(self
            .state
            .list_active_services(cluster_id)?
            .iter()
            .map(|r| r.catalog_key().to_string())
            .collect())
    }

    /// Like [`Self::installed_catalog_names`], minus records that ended up
    /// `failed` or are still waiting on their post-install hook. A deploy
    /// treats those as unfinished.
    pub fn usable_catalog_names(&self, cluster_id: &str) -> StateResult<BTreeSet<String>> {
        Ok(self
            .state
            .list_active_services(cluster_id)?
            .iter()
            .filter(|r| r.is_settled())
            .map(|r| r.catalog_key().to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamlink_state::{DeployedServiceRecord, ServiceStatus};

    fn record(cluster: &str, name: &str) -> DeployedServiceRecord {
        DeployedServiceRecord::deploying(cluster, name, name, name, "streamlink")
    }

    #[test]
    fn only_active_records_of_the_cluster_count() {
        let state = StateStore::open_in_memory().unwrap();
        let kafka = record("c1", "kafka");
        let postgres = record("c1", "postgres");
        state.insert_active_service(&kafka).unwrap();
        state.insert_active_service(&postgres).unwrap();
        state.insert_active_service(&record("c2", "keycloak")).unwrap();
        state.soft_delete_services(&[postgres.id.clone()]).unwrap();

        let tracker = InstalledSetTracker::new(state);
        let installed = tracker.installed_catalog_names("c1").unwrap();
        assert_eq!(installed.into_iter().collect::<Vec<_>>(), vec!["kafka"]);
        assert!(tracker.installed_catalog_names("c3").unwrap().is_empty());
    }

    #[test]
    fn legacy_records_use_deployed_name() {
        let state = StateStore::open_in_memory().unwrap();
        let mut legacy = record("c1", "kafka");
        legacy.catalog_name = None;
        legacy.deployed_name = "kafka".to_string();
        state.insert_active_service(&legacy).unwrap();

        let tracker = InstalledSetTracker::new(state);
        assert!(tracker.installed_catalog_names("c1").unwrap().contains("kafka"));
    }

    #[test]
    fn failed_records_are_not_usable() {
        let state = StateStore::open_in_memory().unwrap();
        let mut failed = record("c1", "schema-registry");
        failed.status = ServiceStatus::Failed;
        state.insert_active_service(&failed).unwrap();
        state.insert_active_service(&record("c1", "kafka")).unwrap();

        let tracker = InstalledSetTracker::new(state);
        assert_eq!(tracker.installed_catalog_names("c1").unwrap().len(), 2);
        let usable = tracker.usable_catalog_names("c1").unwrap();
        assert!(usable.contains("kafka"));
        assert!(!usable.contains("schema-registry"));
    }

    #[test]
    fn records_waiting_on_a_hook_are_not_usable() {
        let state = StateStore::open_in_memory().unwrap();
        let mut keycloak = record("c1", "keycloak");
        keycloak.status = ServiceStatus::Running;
        keycloak.hook_pending = true;
        state.insert_active_service(&keycloak).unwrap();

        let tracker = InstalledSetTracker::new(state);
        assert!(tracker.installed_catalog_names("c1").unwrap().contains("keycloak"));
        assert!(tracker.usable_catalog_names("c1").unwrap().is_empty());
    }
}
