//! Static registry of the cluster contexts discovered at startup.

use std::collections::BTreeSet;

use kube::config::{Context, Kubeconfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ClusterError;

const DEFAULT_NAMESPACE: &str = "default";

/// One reachable cluster context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    pub name: String,
    pub is_active: bool,
    pub display_context: String,
    pub default_namespace: String,
    pub user_identity: String,
}

/// Raw context entry, as read from a kubeconfig or supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterContextEntry {
    pub name: String,
    pub cluster: String,
    pub namespace: Option<String>,
    pub user: Option<String>,
}

impl ClusterContextEntry {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
            ..Self::default()
        }
    }
}

/// Read-only set of cluster descriptors in discovery order.
///
/// Membership never changes after construction. `is_active` on the stored
/// descriptors reflects the context that was current at discovery time; the
/// live view is owned by [`crate::ClusterRouter`].
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    descriptors: Vec<ClusterDescriptor>,
}

impl ClusterRegistry {
    /// Builds a registry from context entries. Duplicate names keep the first
    /// occurrence. The initially active context is `current` when it names a
    /// known entry, otherwise the first entry.
    pub fn from_entries(
        entries: Vec<ClusterContextEntry>,
        current: Option<&str>,
    ) -> Result<Self, ClusterError> {
        let mut seen = BTreeSet::new();
        let mut descriptors = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry.name.trim().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }
            descriptors.push(ClusterDescriptor {
                display_context: if entry.cluster.trim().is_empty() {
                    name.clone()
                } else {
                    entry.cluster.trim().to_string()
                },
                name,
                is_active: false,
                default_namespace: entry
                    .namespace
                    .filter(|namespace| !namespace.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
                user_identity: entry.user.unwrap_or_default(),
            });
        }
        if descriptors.is_empty() {
            return Err(ClusterError::Discovery(
                "no cluster contexts were found".to_string(),
            ));
        }

        let active_index = current
            .and_then(|current| descriptors.iter().position(|d| d.name == current))
            .unwrap_or(0);
        descriptors[active_index].is_active = true;
        Ok(Self { descriptors })
    }

    /// Builds a registry from every context in a parsed kubeconfig.
    pub fn from_kubeconfig(kubeconfig: &Kubeconfig) -> Result<Self, ClusterError> {
        let entries = kubeconfig
            .contexts
            .iter()
            .map(|named| {
                let mut entry = ClusterContextEntry {
                    name: named.name.clone(),
                    ..ClusterContextEntry::default()
                };
                if let Some(context) = named.context.as_ref() {
                    entry.cluster = context_field(context, "cluster").unwrap_or_default();
                    entry.namespace = context_field(context, "namespace");
                    entry.user = context_field(context, "user");
                }
                entry
            })
            .collect();
        Self::from_entries(entries, kubeconfig.current_context.as_deref())
    }

    /// Discovers contexts from `path`, or from kube's standard lookup when absent.
    pub fn discover(path: Option<&std::path::Path>) -> Result<Self, ClusterError> {
        let kubeconfig = crate::load_kubeconfig(path)?;
        Self::from_kubeconfig(&kubeconfig)
    }

    pub fn list(&self) -> &[ClusterDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Result<&ClusterDescriptor, ClusterError> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)
            .ok_or_else(|| ClusterError::NotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.name.clone())
            .collect()
    }

    /// Name of the context that was active at discovery time.
    pub fn initial_active(&self) -> &str {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.is_active)
            .map(|descriptor| descriptor.name.as_str())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// Read through serde so optional/required kubeconfig fields are handled the
// same way across kube releases.
fn context_field(context: &Context, key: &str) -> Option<String> {
    serde_json::to_value(context)
        .ok()?
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use kube::config::{Kubeconfig, NamedContext};

    use super::{ClusterContextEntry, ClusterRegistry};
    use crate::ClusterError;

    fn entry(name: &str, namespace: Option<&str>) -> ClusterContextEntry {
        ClusterContextEntry {
            name: name.to_string(),
            cluster: format!("{name}-cluster"),
            namespace: namespace.map(str::to_string),
            user: Some(format!("{name}-admin")),
        }
    }

    #[test]
    fn unit_registry_preserves_discovery_order_and_marks_current_active() {
        let registry = ClusterRegistry::from_entries(
            vec![entry("dev", None), entry("prod", Some("apps")), entry("minerva", None)],
            Some("prod"),
        )
        .expect("registry");

        assert_eq!(registry.names(), vec!["dev", "prod", "minerva"]);
        assert_eq!(registry.initial_active(), "prod");
        let active = registry
            .list()
            .iter()
            .filter(|descriptor| descriptor.is_active)
            .count();
        assert_eq!(active, 1);

        let prod = registry.get("prod").expect("prod");
        assert_eq!(prod.default_namespace, "apps");
        assert_eq!(prod.display_context, "prod-cluster");
        assert_eq!(prod.user_identity, "prod-admin");
        assert_eq!(registry.get("dev").expect("dev").default_namespace, "default");
    }

    #[test]
    fn unit_registry_falls_back_to_first_context_when_current_is_unknown() {
        let registry =
            ClusterRegistry::from_entries(vec![entry("dev", None), entry("prod", None)], Some("gone"))
                .expect("registry");
        assert_eq!(registry.initial_active(), "dev");
    }

    #[test]
    fn regression_registry_drops_duplicate_and_blank_names() {
        let registry = ClusterRegistry::from_entries(
            vec![entry("dev", None), entry("dev", Some("other")), entry("  ", None)],
            None,
        )
        .expect("registry");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("dev").expect("dev").default_namespace, "default");
    }

    #[test]
    fn unit_registry_rejects_empty_discovery() {
        let error = ClusterRegistry::from_entries(Vec::new(), None).expect_err("empty");
        assert!(matches!(error, ClusterError::Discovery(_)));
    }

    #[test]
    fn unit_registry_get_unknown_lists_registered_names() {
        let registry =
            ClusterRegistry::from_entries(vec![entry("dev", None), entry("prod", None)], None)
                .expect("registry");
        let error = registry.get("staging").expect_err("unknown");
        assert_eq!(
            error,
            ClusterError::NotFound {
                name: "staging".to_string(),
                available: vec!["dev".to_string(), "prod".to_string()],
            }
        );
        assert!(error.to_string().contains("dev, prod"));
    }

    #[test]
    fn functional_registry_reads_contexts_from_kubeconfig() {
        let kubeconfig = Kubeconfig {
            current_context: Some("minerva".to_string()),
            contexts: vec![
                NamedContext {
                    name: "dev".to_string(),
                    context: None,
                },
                NamedContext {
                    name: "minerva".to_string(),
                    context: None,
                },
            ],
            ..Kubeconfig::default()
        };
        let registry = ClusterRegistry::from_kubeconfig(&kubeconfig).expect("registry");
        assert_eq!(registry.initial_active(), "minerva");
        assert_eq!(registry.get("dev").expect("dev").display_context, "dev");
    }
}
