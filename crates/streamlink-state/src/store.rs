//! StateStore: redb-backed state persistence for StreamLink.
//!
//! Provides typed operations over clusters, deployed services, OAuth clients
//! and the bootstrap flags. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(ACTIVE_SERVICES).map_err(map_err!(Table))?;
        txn.open_table(OAUTH_CLIENTS).map_err(map_err!(Table))?;
        txn.open_table(BOOTSTRAP).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Clusters ───────────────────────────────────────────────────

    /// Register a new cluster. Only one active cluster may exist.
    pub fn put_new_cluster(&self, cluster: &ClusterRecord) -> StateResult<()> {
        let value = serde_json::to_vec(cluster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, existing) = entry.map_err(map_err!(Read))?;
                let existing: ClusterRecord =
                    serde_json::from_slice(existing.value()).map_err(map_err!(Deserialize))?;
                if existing.is_active {
                    return Err(StateError::Conflict(format!(
                        "cluster {} is already registered",
                        existing.name
                    )));
                }
            }
            table
                .insert(cluster.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster_id = %cluster.id, name = %cluster.name, "cluster registered");
        Ok(())
    }

    /// Update an existing cluster record.
    pub fn put_cluster(&self, cluster: &ClusterRecord) -> StateResult<()> {
        let value = serde_json::to_vec(cluster).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(cluster.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Mark a cluster inactive. The record is kept; a new cluster may be
    /// registered afterwards.
    pub fn deactivate_cluster(&self, cluster_id: &str) -> StateResult<ClusterRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let cluster = {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            let mut cluster: ClusterRecord = match table.get(cluster_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StateError::NotFound(format!("cluster {cluster_id}"))),
            };
            cluster.is_active = false;
            cluster.updated_at = epoch_secs();
            let value = serde_json::to_vec(&cluster).map_err(map_err!(Serialize))?;
            table
                .insert(cluster_id, value.as_slice())
                .map_err(map_err!(Write))?;
            cluster
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%cluster_id, "cluster deactivated");
        Ok(cluster)
    }

    /// Get a cluster by ID.
    pub fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(cluster_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let cluster: ClusterRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(cluster))
            }
            None => Ok(None),
        }
    }

    /// List all clusters, active or not.
    pub fn list_clusters(&self) -> StateResult<Vec<ClusterRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let cluster: ClusterRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(cluster);
        }
        Ok(results)
    }

    // ── Deployed services ──────────────────────────────────────────

    /// Insert a new active service record and its index entry atomically.
    ///
    /// Fails with [`StateError::Conflict`] if an active record already exists
    /// for the same cluster and catalog entry.
    pub fn insert_active_service(&self, record: &DeployedServiceRecord) -> StateResult<()> {
        self.insert_active_service_requiring(record, &[])
    }

    /// Like [`Self::insert_active_service`], but only if every catalog entry
    /// in `prerequisites` still has an active record on the same cluster.
    /// A missing prerequisite fails with [`StateError::Inactive`] naming it,
    /// and nothing is written.
    pub fn insert_active_service_requiring(
        &self,
        record: &DeployedServiceRecord,
        prerequisites: &[String],
    ) -> StateResult<()> {
        let key = record.active_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut index = txn.open_table(ACTIVE_SERVICES).map_err(map_err!(Table))?;
            if index.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(format!(
                    "{key} already has an active service"
                )));
            }
            for name in prerequisites {
                let required = active_key(&record.cluster_id, name);
                if index.get(required.as_str()).map_err(map_err!(Read))?.is_none() {
                    return Err(StateError::Inactive(name.clone()));
                }
            }
            index
                .insert(key.as_str(), record.id.as_str())
                .map_err(map_err!(Write))?;

            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, id = %record.id, "active service inserted");
        Ok(())
    }

    /// Update an existing service record in place. The active index is not
    /// touched; use [`Self::soft_delete_services`] to deactivate.
    pub fn put_service(&self, record: &DeployedServiceRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Update an active record in place, but only while the index still
    /// points its key at this record. A record soft-deleted in the meantime
    /// is left untouched and [`StateError::Inactive`] is returned.
    pub fn update_active_service(&self, record: &DeployedServiceRecord) -> StateResult<()> {
        let key = record.active_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let index = txn.open_table(ACTIVE_SERVICES).map_err(map_err!(Table))?;
            let current = index
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_string());
            if current.as_deref() != Some(record.id.as_str()) {
                return Err(StateError::Inactive(format!("service record {} for {key}", record.id)));
            }

            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a service record by ID.
    pub fn get_service(&self, id: &str) -> StateResult<Option<DeployedServiceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DeployedServiceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Look up the active record for a cluster/catalog pair through the index.
    pub fn get_active_service(
        &self,
        cluster_id: &str,
        catalog_key: &str,
    ) -> StateResult<Option<DeployedServiceRecord>> {
        let key = active_key(cluster_id, catalog_key);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(ACTIVE_SERVICES).map_err(map_err!(Table))?;
        let id = match index.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        match table.get(id.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: DeployedServiceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Err(StateError::NotFound(format!("service record {id} for {key}"))),
        }
    }

    /// List all service records (active and soft-deleted) for a cluster.
    pub fn list_services(&self, cluster_id: &str) -> StateResult<Vec<DeployedServiceRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: DeployedServiceRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.cluster_id == cluster_id {
                results.push(record);
            }
        }
        Ok(results)
    }

    /// List only the active service records for a cluster.
    pub fn list_active_services(
        &self,
        cluster_id: &str,
    ) -> StateResult<Vec<DeployedServiceRecord>> {
        let mut records = self.list_services(cluster_id)?;
        records.retain(|r| r.is_active);
        Ok(records)
    }

    /// Soft-delete several records in one write transaction.
    ///
    /// Each record is marked inactive with status `deleted` and its index
    /// entry is removed. Either every record is deactivated or none is.
    /// Returns the updated records in the order given.
    pub fn soft_delete_services(&self, ids: &[String]) -> StateResult<Vec<DeployedServiceRecord>> {
        let now = epoch_secs();
        let mut deleted = Vec::with_capacity(ids.len());
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let mut index = txn.open_table(ACTIVE_SERVICES).map_err(map_err!(Table))?;
            for id in ids {
                let mut record: DeployedServiceRecord =
                    match table.get(id.as_str()).map_err(map_err!(Read))? {
                        Some(guard) => serde_json::from_slice(guard.value())
                            .map_err(map_err!(Deserialize))?,
                        None => return Err(StateError::NotFound(format!("service record {id}"))),
                    };
                record.is_active = false;
                record.status = ServiceStatus::Deleted;
                record.updated_at = now;

                let key = record.active_key();
                index.remove(key.as_str()).map_err(map_err!(Write))?;

                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                table
                    .insert(id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                deleted.push(record);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = deleted.len(), "services soft-deleted");
        Ok(deleted)
    }

    // ── OAuth clients ──────────────────────────────────────────────

    /// Insert or update an OAuth client registration.
    pub fn put_oauth_client(&self, client: &OAuthClientRecord) -> StateResult<()> {
        let value = serde_json::to_vec(client).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(OAUTH_CLIENTS).map_err(map_err!(Table))?;
            table
                .insert(client.client_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(client_id = %client.client_id, "oauth client stored");
        Ok(())
    }

    /// Get an OAuth client by client ID.
    pub fn get_oauth_client(&self, client_id: &str) -> StateResult<Option<OAuthClientRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OAUTH_CLIENTS).map_err(map_err!(Table))?;
        match table.get(client_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let client: OAuthClientRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(client))
            }
            None => Ok(None),
        }
    }

    /// List all OAuth client registrations.
    pub fn list_oauth_clients(&self) -> StateResult<Vec<OAuthClientRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(OAUTH_CLIENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let client: OAuthClientRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(client);
        }
        Ok(results)
    }

    // ── Bootstrap ──────────────────────────────────────────────────

    /// Current bootstrap flags. A fresh store reports all flags unset.
    pub fn bootstrap_state(&self) -> StateResult<BootstrapState> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BOOTSTRAP).map_err(map_err!(Table))?;
        match table.get(BOOTSTRAP_KEY).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(BootstrapState::default()),
        }
    }

    /// Read-modify-write the bootstrap flags in one transaction.
    pub fn update_bootstrap<F>(&self, update: F) -> StateResult<BootstrapState>
    where
        F: FnOnce(&mut BootstrapState),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let state = {
            let mut table = txn.open_table(BOOTSTRAP).map_err(map_err!(Table))?;
            let mut state: BootstrapState = match table.get(BOOTSTRAP_KEY).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => BootstrapState::default(),
            };
            update(&mut state);
            state.updated_at = epoch_secs();
            let value = serde_json::to_vec(&state).map_err(map_err!(Serialize))?;
            table
                .insert(BOOTSTRAP_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
            state
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(?state, "bootstrap state updated");
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(cluster_id: &str, catalog: &str) -> DeployedServiceRecord {
        DeployedServiceRecord::deploying(cluster_id, catalog, catalog, catalog, "streamlink")
    }

    fn test_client(client_id: &str) -> OAuthClientRecord {
        OAuthClientRecord {
            client_id: client_id.to_string(),
            client_secret: "ciphertext".to_string(),
            realm: "streamlink".to_string(),
            redirect_uris: vec!["http://localhost:3001/auth/callback".to_string()],
            description: None,
            is_active: true,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    // ── Clusters ───────────────────────────────────────────────────

    #[test]
    fn cluster_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let cluster = ClusterRecord::new("local", "https://127.0.0.1:6443", "enc".to_string());

        store.put_new_cluster(&cluster).unwrap();
        let retrieved = store.get_cluster(&cluster.id).unwrap();

        assert_eq!(retrieved, Some(cluster));
    }

    #[test]
    fn second_active_cluster_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_new_cluster(&ClusterRecord::new("one", "https://a", String::new()))
            .unwrap();

        let err = store
            .put_new_cluster(&ClusterRecord::new("two", "https://b", String::new()))
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        assert_eq!(store.list_clusters().unwrap().len(), 1);
    }

    #[test]
    fn inactive_cluster_does_not_block_registration() {
        let store = StateStore::open_in_memory().unwrap();
        let mut old = ClusterRecord::new("old", "https://a", String::new());
        store.put_new_cluster(&old).unwrap();
        old.is_active = false;
        store.put_cluster(&old).unwrap();

        store
            .put_new_cluster(&ClusterRecord::new("new", "https://b", String::new()))
            .unwrap();
        assert_eq!(store.list_clusters().unwrap().len(), 2);
    }

    #[test]
    fn deactivate_cluster_frees_the_slot() {
        let store = StateStore::open_in_memory().unwrap();
        let old = ClusterRecord::new("old", "https://a", String::new());
        store.put_new_cluster(&old).unwrap();

        let deactivated = store.deactivate_cluster(&old.id).unwrap();
        assert!(!deactivated.is_active);
        assert!(!store.get_cluster(&old.id).unwrap().unwrap().is_active);

        store
            .put_new_cluster(&ClusterRecord::new("new", "https://b", String::new()))
            .unwrap();
        let err = store.deactivate_cluster("missing").unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    // ── Deployed services ──────────────────────────────────────────

    #[test]
    fn insert_active_service_and_lookup() {
        let store = StateStore::open_in_memory().unwrap();
        let record = test_record("c1", "kafka");
        store.insert_active_service(&record).unwrap();

        let by_key = store.get_active_service("c1", "kafka").unwrap();
        assert_eq!(by_key, Some(record.clone()));
        assert_eq!(store.get_service(&record.id).unwrap(), Some(record));
        assert!(store.get_active_service("c2", "kafka").unwrap().is_none());
    }

    #[test]
    fn duplicate_active_service_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_active_service(&test_record("c1", "kafka")).unwrap();

        let dup = test_record("c1", "kafka");
        let err = store.insert_active_service(&dup).unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        // The losing record must not have been written.
        assert!(store.get_service(&dup.id).unwrap().is_none());
        assert_eq!(store.list_services("c1").unwrap().len(), 1);
    }

    #[test]
    fn same_catalog_on_other_cluster_is_allowed() {
        let store = StateStore::open_in_memory().unwrap();
        store.insert_active_service(&test_record("c1", "kafka")).unwrap();
        store.insert_active_service(&test_record("c2", "kafka")).unwrap();
        assert_eq!(store.list_active_services("c1").unwrap().len(), 1);
        assert_eq!(store.list_active_services("c2").unwrap().len(), 1);
    }

    #[test]
    fn put_service_updates_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut record = test_record("c1", "postgres");
        store.insert_active_service(&record).unwrap();

        record.status = ServiceStatus::Running;
        record.replicas = Some("1/1".to_string());
        store.put_service(&record).unwrap();

        let active = store.get_active_service("c1", "postgres").unwrap().unwrap();
        assert_eq!(active.status, ServiceStatus::Running);
        assert_eq!(active.replicas.as_deref(), Some("1/1"));
    }

    #[test]
    fn update_active_service_refuses_soft_deleted_record() {
        let store = StateStore::open_in_memory().unwrap();
        let mut record = test_record("c1", "schema-registry");
        store.insert_active_service(&record).unwrap();
        store.soft_delete_services(&[record.id.clone()]).unwrap();

        record.status = ServiceStatus::Running;
        let err = store.update_active_service(&record).unwrap_err();
        assert!(matches!(err, StateError::Inactive(_)));

        let stored = store.get_service(&record.id).unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.status, ServiceStatus::Deleted);
    }

    #[test]
    fn update_active_service_refuses_replaced_record() {
        let store = StateStore::open_in_memory().unwrap();
        let old = test_record("c1", "kafka");
        store.insert_active_service(&old).unwrap();
        store.soft_delete_services(&[old.id.clone()]).unwrap();
        let mut current = test_record("c1", "kafka");
        store.insert_active_service(&current).unwrap();

        assert!(matches!(
            store.update_active_service(&old).unwrap_err(),
            StateError::Inactive(_)
        ));
        current.status = ServiceStatus::Running;
        store.update_active_service(&current).unwrap();
        let active = store.get_active_service("c1", "kafka").unwrap().unwrap();
        assert_eq!(active.status, ServiceStatus::Running);
    }

    #[test]
    fn insert_requiring_checks_prerequisites() {
        let store = StateStore::open_in_memory().unwrap();
        let registry = test_record("c1", "schema-registry");
        let err = store
            .insert_active_service_requiring(&registry, &["kafka".to_string()])
            .unwrap_err();
        assert!(matches!(err, StateError::Inactive(ref name) if name == "kafka"));
        assert!(store.get_service(&registry.id).unwrap().is_none());

        store.insert_active_service(&test_record("c1", "kafka")).unwrap();
        store
            .insert_active_service_requiring(&registry, &["kafka".to_string()])
            .unwrap();
        assert_eq!(store.list_active_services("c1").unwrap().len(), 2);
    }

    #[test]
    fn soft_delete_deactivates_and_frees_key() {
        let store = StateStore::open_in_memory().unwrap();
        let kafka = test_record("c1", "kafka");
        let registry = test_record("c1", "schema-registry");
        store.insert_active_service(&kafka).unwrap();
        store.insert_active_service(&registry).unwrap();

        let deleted = store
            .soft_delete_services(&[registry.id.clone(), kafka.id.clone()])
            .unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(deleted[0].id, registry.id);
        assert!(deleted.iter().all(|r| !r.is_active && r.status == ServiceStatus::Deleted));

        assert!(store.list_active_services("c1").unwrap().is_empty());
        // Records are kept for history.
        assert_eq!(store.list_services("c1").unwrap().len(), 2);
        // The key is free again.
        store.insert_active_service(&test_record("c1", "kafka")).unwrap();
    }

    #[test]
    fn soft_delete_is_all_or_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let kafka = test_record("c1", "kafka");
        store.insert_active_service(&kafka).unwrap();

        let err = store
            .soft_delete_services(&[kafka.id.clone(), "missing".to_string()])
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));

        let still = store.get_active_service("c1", "kafka").unwrap().unwrap();
        assert!(still.is_active);
    }

    // ── OAuth clients ──────────────────────────────────────────────

    #[test]
    fn oauth_client_put_get_list() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_oauth_client(&test_client("streamlink-api")).unwrap();
        store.put_oauth_client(&test_client("kafbat-ui")).unwrap();

        let api = store.get_oauth_client("streamlink-api").unwrap().unwrap();
        assert_eq!(api.realm, "streamlink");
        assert_eq!(store.list_oauth_clients().unwrap().len(), 2);
        assert!(store.get_oauth_client("nope").unwrap().is_none());
    }

    // ── Bootstrap ──────────────────────────────────────────────────

    #[test]
    fn bootstrap_defaults_and_updates() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.bootstrap_state().unwrap(), BootstrapState::default());

        store.update_bootstrap(|s| s.postgres_deployed = true).unwrap();
        let state = store.update_bootstrap(|s| s.auth_enabled = true).unwrap();

        assert!(state.postgres_deployed);
        assert!(state.auth_enabled);
        assert!(!state.migration_complete);
        assert_eq!(store.bootstrap_state().unwrap(), state);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.insert_active_service(&test_record("c1", "postgres")).unwrap();
            store.update_bootstrap(|s| s.postgres_deployed = true).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let record = store.get_active_service("c1", "postgres").unwrap();
        assert!(record.is_some());
        assert!(store.bootstrap_state().unwrap().postgres_deployed);
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_clusters().unwrap().is_empty());
        assert!(store.list_services("any").unwrap().is_empty());
        assert!(store.list_oauth_clients().unwrap().is_empty());
        assert!(store.get_cluster("nope").unwrap().is_none());
        assert!(store.soft_delete_services(&[]).unwrap().is_empty());
    }
}
