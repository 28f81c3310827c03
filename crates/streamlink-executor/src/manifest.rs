//! Service manifest loading.
//!
//! Each catalog entry ships a multi-document YAML file named
//! `<catalog-name>.yaml`. Documents are applied as-is except that namespaced
//! objects are moved into the configured namespace.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{ExecutorError, ExecutorResult};

/// One YAML document from a manifest file.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    pub kind: String,
    pub name: String,
    pub body: serde_yaml::Value,
}

/// All documents for one catalog entry, in file order.
#[derive(Debug, Clone)]
pub struct ServiceManifest {
    pub catalog_name: String,
    pub namespace: String,
    pub documents: Vec<ManifestDocument>,
}

impl ServiceManifest {
    /// Name of the workload to track: the first Deployment, else the catalog name.
    pub fn deployed_name(&self) -> &str {
        self.documents
            .iter()
            .find(|d| d.kind == "Deployment")
            .map(|d| d.name.as_str())
            .unwrap_or(self.catalog_name.as_str())
    }
}

/// Reads manifests from a directory.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    dir: PathBuf,
    namespace: String,
}

impl ManifestLoader {
    pub fn new(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path_for(&self, catalog_name: &str) -> PathBuf {
        self.dir.join(format!("{catalog_name}.yaml"))
    }

    pub fn load(&self, catalog_name: &str) -> ExecutorResult<ServiceManifest> {
        let path = self.path_for(catalog_name);
        if !path.exists() {
            return Err(ExecutorError::ManifestNotFound(path));
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ExecutorError::Manifest(format!("{}: {e}", path.display())))?;
        let documents = parse_documents(&content, &self.namespace, &path)?;
        debug!(%catalog_name, count = documents.len(), "manifest loaded");
        Ok(ServiceManifest {
            catalog_name: catalog_name.to_string(),
            namespace: self.namespace.clone(),
            documents,
        })
    }
}

fn parse_documents(
    content: &str,
    namespace: &str,
    path: &Path,
) -> ExecutorResult<Vec<ManifestDocument>> {
    let invalid = |msg: String| ExecutorError::Manifest(format!("{}: {msg}", path.display()));
    let mut documents = Vec::new();

    for doc in serde_yaml::Deserializer::from_str(content) {
        let mut body = serde_yaml::Value::deserialize(doc).map_err(|e| invalid(e.to_string()))?;
        if body.is_null() {
            continue;
        }
        let kind = body
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| invalid("document without kind".to_string()))?
            .to_string();

        let metadata = body
            .get_mut("metadata")
            .and_then(|m| m.as_mapping_mut())
            .ok_or_else(|| invalid(format!("{kind} without metadata")))?;
        if kind == "Namespace" {
            metadata.insert("name".into(), namespace.into());
        } else {
            metadata.insert("namespace".into(), namespace.into());
        }
        let name = metadata
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| invalid(format!("{kind} without metadata.name")))?
            .to_string();

        documents.push(ManifestDocument { kind, name, body });
    }

    if documents.is_empty() {
        return Err(invalid("no documents".to_string()));
    }
    Ok(documents)
}
