//! Post-install and teardown hooks.
//!
//! Some catalog entries need extra work once their workload is running
//! (publishing credentials, provisioning an identity realm) and matching
//! cleanup when they are removed. The orchestrator looks hooks up by catalog
//! name in a [`HookRegistry`] and otherwise knows nothing about them.

mod keycloak;
mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use streamlink_executor::ClusterExecutor;
use streamlink_state::{DeployedServiceRecord, StateStore};

use crate::error::HookResult;

pub use keycloak::KeycloakHook;
pub use postgres::PostgresHook;

/// What a hook may touch while it runs.
pub struct HookContext<'a> {
    pub cluster_id: &'a str,
    pub executor: &'a dyn ClusterExecutor,
    pub state: &'a StateStore,
}

#[async_trait]
pub trait ServiceHook: Send + Sync {
    /// Called once the workload is ready. Changes made to `record` are
    /// persisted when the hook returns `Ok`.
    async fn on_running(
        &self,
        ctx: &HookContext<'_>,
        record: &mut DeployedServiceRecord,
    ) -> HookResult<()>;

    /// Called after the record has been soft-deleted and before the cluster
    /// resources are removed.
    async fn on_teardown(
        &self,
        ctx: &HookContext<'_>,
        record: &DeployedServiceRecord,
    ) -> HookResult<()>;
}

/// Catalog name → hook.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn ServiceHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, catalog_name: &str, hook: Arc<dyn ServiceHook>) -> &mut Self {
        self.hooks.insert(catalog_name.to_string(), hook);
        self
    }

    pub fn with(mut self, catalog_name: &str, hook: Arc<dyn ServiceHook>) -> Self {
        self.register(catalog_name, hook);
        self
    }

    pub fn get(&self, catalog_name: &str) -> Option<&Arc<dyn ServiceHook>> {
        self.hooks.get(catalog_name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// `http://{node}:{nodeport}` for a service exposed through a NodePort.
pub(crate) fn node_url(node: &str, port: u16) -> String {
    format!("http://{node}:{port}")
}

/// In-cluster DNS name of a service.
pub(crate) fn cluster_dns(deployed_name: &str, namespace: &str) -> String {
    format!("{deployed_name}.{namespace}.svc.cluster.local")
}
