//! Service catalog and dependency graph.
//!
//! The catalog is a fixed, ordered mapping of service name to its direct
//! prerequisites. Every traversal follows declaration order, so install
//! plans are deterministic across runs.
//!
//! Cycle detection runs once, in [`ServiceCatalog::new`]. The closure
//! traversal keeps a visited set, so it terminates even on a graph that
//! was never validated.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("service '{0}' is declared twice")]
    Duplicate(String),
}

/// One deployable service type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub display_name: String,
    /// Direct prerequisites, in the order they should be visited.
    pub dependencies: Vec<String>,
}

impl CatalogEntry {
    pub fn new(name: &str, display_name: &str, dependencies: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Immutable, validated dependency graph over the service catalog.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    /// Topological order over the whole catalog.
    install_order: Vec<String>,
    install_rank: HashMap<String, usize>,
}

/// The services StreamLink knows how to deploy.
pub fn default_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("postgres", "PostgreSQL Database", &[]),
        CatalogEntry::new("keycloak", "Keycloak (Authentication)", &["postgres"]),
        CatalogEntry::new("kafka", "Apache Kafka", &[]),
        CatalogEntry::new("schema-registry", "Schema Registry", &["kafka"]),
        CatalogEntry::new(
            "kafka-connect",
            "Kafka Connect",
            &["kafka", "schema-registry"],
        ),
        CatalogEntry::new(
            "ksqldb",
            "ksqlDB",
            &["kafka", "schema-registry", "kafka-connect"],
        ),
        CatalogEntry::new(
            "kafka-rest",
            "Kafka REST Proxy",
            &["kafka", "schema-registry"],
        ),
        CatalogEntry::new(
            "kafbat-ui",
            "Kafbat UI",
            &["kafka", "schema-registry", "kafka-connect", "ksqldb", "keycloak"],
        ),
    ]
}

impl ServiceCatalog {
    /// Build a catalog, rejecting duplicates, dangling references and cycles.
    pub fn new(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let catalog = Self::unvalidated(entries)?;

        for entry in &catalog.entries {
            if let Some(dep) = entry.dependencies.iter().find(|d| !catalog.contains(d)) {
                return Err(CatalogError::UnknownDependency {
                    service: entry.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        if let Some(cycle) = catalog.detect_cycle() {
            return Err(CatalogError::CircularDependency(cycle));
        }

        Ok(catalog)
    }

    /// The shipped StreamLink catalog.
    pub fn streamlink() -> Result<Self, CatalogError> {
        Self::new(default_entries())
    }

    fn unvalidated(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.name.clone(), i).is_some() {
                return Err(CatalogError::Duplicate(entry.name.clone()));
            }
        }

        let mut catalog = Self {
            entries,
            index,
            install_order: Vec::new(),
            install_rank: HashMap::new(),
        };

        let order = {
            let mut visited = HashSet::new();
            let mut order = Vec::new();
            for entry in &catalog.entries {
                catalog.visit(&entry.name, &mut visited, &mut order);
            }
            order
        };
        catalog.install_rank = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        catalog.install_order = order;

        Ok(catalog)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Human-readable name, falling back to the catalog name itself.
    pub fn display_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.entry(name).map(|e| e.display_name.as_str()).unwrap_or(name)
    }

    /// Every catalog entry in a valid install order.
    pub fn install_order(&self) -> &[String] {
        &self.install_order
    }

    /// Configured prerequisites. Empty for unknown names.
    pub fn direct_dependencies(&self, name: &str) -> &[String] {
        self.entry(name)
            .map(|e| e.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Transitive prerequisites of `name` in install order, excluding `name`.
    ///
    /// Post-order DFS, deduplicated on first visit. Unknown names have no
    /// prerequisites.
    pub fn all_dependencies(&self, name: &str) -> Vec<String> {
        if !self.contains(name) {
            return Vec::new();
        }
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.visit(name, &mut visited, &mut order);
        order.retain(|s| s != name);
        order
    }

    /// `all_dependencies(name)` minus what is already installed, order kept.
    pub fn missing_dependencies(&self, name: &str, installed: &BTreeSet<String>) -> Vec<String> {
        self.all_dependencies(name)
            .into_iter()
            .filter(|dep| !installed.contains(dep))
            .collect()
    }

    /// Members of `candidates` that transitively depend on `name`.
    ///
    /// Returned in teardown order: the most dependent service first.
    pub fn dependents(&self, name: &str, candidates: &BTreeSet<String>) -> Vec<String> {
        let mut found: Vec<String> = candidates
            .iter()
            .filter(|member| member.as_str() != name)
            .filter(|member| self.all_dependencies(member).iter().any(|d| d == name))
            .cloned()
            .collect();
        found.sort_by_key(|member| Reverse(self.install_rank.get(member).copied()));
        found
    }

    /// Find a dependency cycle anywhere in the graph.
    ///
    /// Returns the prerequisite chain from the first repeated node back to
    /// itself, e.g. `["a", "b", "a"]`.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        for entry in &self.entries {
            if visited.contains(entry.name.as_str()) {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = self.find_cycle(&entry.name, &mut visited, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(&'a self, name: &'a str, visited: &mut HashSet<&'a str>, order: &mut Vec<String>) {
        if !visited.insert(name) {
            return;
        }
        for dep in self.direct_dependencies(name) {
            self.visit(dep, visited, order);
        }
        order.push(name.to_string());
    }

    fn find_cycle<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(name);
        stack.push(name);

        for dep in self.direct_dependencies(name) {
            if let Some(start) = stack.iter().position(|s| *s == dep.as_str()) {
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep.as_str()) {
                if let Some(cycle) = self.find_cycle(dep, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn abc() -> ServiceCatalog {
        ServiceCatalog::new(vec![
            CatalogEntry::new("a", "A", &[]),
            CatalogEntry::new("b", "B", &["a"]),
            CatalogEntry::new("c", "C", &["a", "b"]),
        ])
        .unwrap()
    }

    fn shipped() -> ServiceCatalog {
        ServiceCatalog::streamlink().unwrap()
    }

    #[test]
    fn shipped_catalog_has_no_cycle() {
        assert_eq!(shipped().detect_cycle(), None);
    }

    #[test]
    fn closure_orders_prerequisites_first() {
        assert_eq!(abc().all_dependencies("c"), vec!["a", "b"]);
    }

    #[test]
    fn missing_skips_installed() {
        assert_eq!(abc().missing_dependencies("c", &set(&["a"])), vec!["b"]);
    }

    #[test]
    fn unknown_service_has_no_dependencies() {
        let catalog = shipped();
        assert!(catalog.all_dependencies("redis").is_empty());
        assert!(catalog.direct_dependencies("redis").is_empty());
        assert_eq!(catalog.display_name("redis"), "redis");
    }

    #[test]
    fn kafbat_ui_install_order() {
        assert_eq!(
            shipped().all_dependencies("kafbat-ui"),
            vec![
                "kafka",
                "schema-registry",
                "kafka-connect",
                "ksqldb",
                "postgres",
                "keycloak"
            ]
        );
    }

    #[test]
    fn closure_is_topologically_valid_for_every_entry() {
        let catalog = shipped();
        for name in catalog.names() {
            let deps = catalog.all_dependencies(name);

            assert!(!deps.iter().any(|d| d == name), "{name} lists itself");

            let unique: HashSet<_> = deps.iter().collect();
            assert_eq!(unique.len(), deps.len(), "{name} has duplicates");

            for (i, dep) in deps.iter().enumerate() {
                for prereq in catalog.direct_dependencies(dep) {
                    let pos = deps.iter().position(|d| d == prereq);
                    assert!(
                        matches!(pos, Some(p) if p < i),
                        "{prereq} must precede {dep} in closure of {name}"
                    );
                }
            }
        }
    }

    #[test]
    fn missing_is_subset_and_empty_iff_closure_installed() {
        let catalog = shipped();
        let installed = set(&["kafka", "postgres"]);
        for name in catalog.names() {
            let all = catalog.all_dependencies(name);
            let missing = catalog.missing_dependencies(name, &installed);
            assert!(missing.iter().all(|m| all.contains(m)));
            let covered = all.iter().all(|d| installed.contains(d));
            assert_eq!(missing.is_empty(), covered, "{name}");
        }
    }

    #[test]
    fn cyclic_graph_is_rejected_with_path() {
        let err = ServiceCatalog::new(vec![
            CatalogEntry::new("a", "A", &["b"]),
            CatalogEntry::new("b", "B", &["a"]),
        ])
        .unwrap_err();

        match err {
            CatalogError::CircularDependency(path) => {
                assert!(path.contains(&"a".to_string()));
                assert!(path.contains(&"b".to_string()));
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn closure_terminates_on_unvalidated_cycle() {
        let catalog = ServiceCatalog::unvalidated(vec![
            CatalogEntry::new("a", "A", &["b"]),
            CatalogEntry::new("b", "B", &["a"]),
        ])
        .unwrap();
        assert_eq!(catalog.all_dependencies("a"), vec!["b"]);
        assert_eq!(
            catalog.detect_cycle(),
            Some(vec!["a".to_string(), "b".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let err = ServiceCatalog::new(vec![CatalogEntry::new("a", "A", &["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnknownDependency {
                service: "a".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn duplicate_entry_is_rejected() {
        let err = ServiceCatalog::new(vec![
            CatalogEntry::new("a", "A", &[]),
            CatalogEntry::new("a", "A again", &[]),
        ])
        .unwrap_err();
        assert_eq!(err, CatalogError::Duplicate("a".to_string()));
    }

    #[test]
    fn dependents_in_teardown_order() {
        let catalog = shipped();
        let installed = set(&["kafka", "schema-registry", "kafka-connect", "postgres"]);
        assert_eq!(
            catalog.dependents("kafka", &installed),
            vec!["kafka-connect", "schema-registry"]
        );
        assert!(catalog.dependents("postgres", &installed).is_empty());
    }

    #[test]
    fn dependents_ignore_the_service_itself() {
        let catalog = shipped();
        assert!(catalog.dependents("kafka", &set(&["kafka"])).is_empty());
    }

    #[test]
    fn install_order_covers_catalog() {
        let catalog = shipped();
        assert_eq!(catalog.install_order().len(), catalog.entries().len());
        assert_eq!(catalog.install_order()[0], "postgres");
        assert_eq!(catalog.install_order().last().unwrap(), "kafbat-ui");
    }
}
