//! kube-rs backed executor.

use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Node, PersistentVolumeClaim, Pod, Secret, Service};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use streamlink_core::WorkloadSnapshot;
use streamlink_secrets::SecretCodec;
use streamlink_state::ClusterRecord;
use tracing::{debug, info, warn};

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::{AppliedService, ClusterConnector, ClusterExecutor};
use crate::manifest::{ManifestDocument, ManifestLoader};
use crate::snapshot;

/// Field manager name used for server-side apply.
const FIELD_MANAGER: &str = "streamlink";

/// Settings shared by every executor the connector hands out.
#[derive(Debug, Clone)]
pub struct KubeSettings {
    pub manifest_dir: PathBuf,
    pub namespace: String,
    pub request_timeout: Duration,
}

/// Connects to clusters by decrypting their stored kubeconfig.
pub struct KubeConnector {
    codec: Arc<dyn SecretCodec>,
    settings: KubeSettings,
}

impl KubeConnector {
    pub fn new(codec: Arc<dyn SecretCodec>, settings: KubeSettings) -> Self {
        Self { codec, settings }
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, cluster: &ClusterRecord) -> ExecutorResult<Arc<dyn ClusterExecutor>> {
        let yaml = self.codec.decrypt(&cluster.kubeconfig)?;
        let kubeconfig = Kubeconfig::from_yaml(&yaml)
            .map_err(|e| ExecutorError::InvalidKubeconfig(e.to_string()))?;
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ExecutorError::InvalidKubeconfig(e.to_string()))?;
        config.connect_timeout = Some(self.settings.request_timeout);
        config.read_timeout = Some(self.settings.request_timeout);

        let client = Client::try_from(config)?;
        debug!(cluster_id = %cluster.id, api_server = %cluster.api_server, "kube client built");

        Ok(Arc::new(KubeExecutor::new(
            client,
            ManifestLoader::new(&self.settings.manifest_dir, &self.settings.namespace),
            self.settings.request_timeout,
        )))
    }
}

/// Executor bound to one cluster's API server.
pub struct KubeExecutor {
    client: Client,
    loader: ManifestLoader,
    request_timeout: Duration,
}

impl KubeExecutor {
    pub fn new(client: Client, loader: ManifestLoader, request_timeout: Duration) -> Self {
        Self {
            client,
            loader,
            request_timeout,
        }
    }

    /// Run one API call under the request timeout.
    async fn timed<T, F>(&self, operation: &'static str, call: F) -> ExecutorResult<T>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(ExecutorError::from),
            Err(_) => Err(ExecutorError::Timeout {
                operation,
                after: self.request_timeout,
            }),
        }
    }

    async fn apply_document(&self, doc: &ManifestDocument) -> ExecutorResult<()> {
        match doc.kind.as_str() {
            "Namespace" => {
                let obj: Namespace = decode(doc)?;
                let api: Api<Namespace> = Api::all(self.client.clone());
                self.timed("apply namespace", api.patch(&doc.name, &apply_params(), &Patch::Apply(&obj)))
                    .await?;
            }
            "Deployment" => self.apply_namespaced::<Deployment>(doc).await?,
            "Service" => self.apply_namespaced::<Service>(doc).await?,
            "ConfigMap" => self.apply_namespaced::<ConfigMap>(doc).await?,
            "Secret" => self.apply_namespaced::<Secret>(doc).await?,
            "PersistentVolumeClaim" => self.apply_namespaced::<PersistentVolumeClaim>(doc).await?,
            other => {
                warn!(kind = %other, name = %doc.name, "unsupported manifest kind skipped");
                return Ok(());
            }
        }
        debug!(kind = %doc.kind, name = %doc.name, "manifest document applied");
        Ok(())
    }

    async fn apply_namespaced<K>(&self, doc: &ManifestDocument) -> ExecutorResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + Debug
            + DeserializeOwned
            + Serialize,
        <K as Resource>::DynamicType: Default,
    {
        let obj: K = decode(doc)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), self.loader.namespace());
        self.timed("apply", api.patch(&doc.name, &apply_params(), &Patch::Apply(&obj)))
            .await?;
        Ok(())
    }

    /// Delete by name, treating "already gone" as success.
    async fn delete_namespaced<K>(&self, name: &str, namespace: &str) -> ExecutorResult<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match self
            .timed("delete", api.delete(name, &DeleteParams::foreground()))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(%name, %namespace, "resource already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ClusterExecutor for KubeExecutor {
    async fn apply_service_manifest(&self, catalog_name: &str) -> ExecutorResult<AppliedService> {
        let manifest = self.loader.load(catalog_name)?;
        for doc in &manifest.documents {
            self.apply_document(doc).await?;
        }
        let applied = AppliedService {
            deployed_name: manifest.deployed_name().to_string(),
            namespace: manifest.namespace.clone(),
        };
        info!(%catalog_name, deployed_name = %applied.deployed_name, namespace = %applied.namespace, "service manifest applied");
        Ok(applied)
    }

    async fn delete_service_resources(
        &self,
        deployed_name: &str,
        namespace: &str,
    ) -> ExecutorResult<()> {
        self.delete_namespaced::<Deployment>(deployed_name, namespace)
            .await?;
        self.delete_namespaced::<Service>(deployed_name, namespace)
            .await?;
        info!(%deployed_name, %namespace, "service resources deleted");
        Ok(())
    }

    async fn get_instance_health(
        &self,
        deployed_name: &str,
        namespace: &str,
    ) -> ExecutorResult<Option<WorkloadSnapshot>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = match self.timed("read deployment", deployments.get(deployed_name)).await {
            Ok(d) => d,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&snapshot::app_selector(deployed_name));
        let pods = self.timed("list pods", pods.list(&params)).await?;

        Ok(Some(snapshot::workload_snapshot(&deployment, &pods.items)))
    }

    async fn get_node_address(&self) -> ExecutorResult<Option<String>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let nodes = self
            .timed("list nodes", nodes.list(&ListParams::default()))
            .await?;
        Ok(snapshot::node_address(&nodes.items))
    }

    async fn ping(&self) -> ExecutorResult<()> {
        self.timed("ping", self.client.apiserver_version()).await?;
        Ok(())
    }
}

fn apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER).force()
}

fn decode<K: DeserializeOwned>(doc: &ManifestDocument) -> ExecutorResult<K> {
    serde_yaml::from_value(doc.body.clone())
        .map_err(|e| ExecutorError::Manifest(format!("{} {}: {e}", doc.kind, doc.name)))
}
