//! Metric catalog seam
//!
//! The catalog indexes the metrics exposed by loaded plugins. The manager
//! registers a plugin's metrics once it is loaded and deregisters them on
//! unload.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

use crate::plugin::{MetricDescriptor, PluginIdentity};

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("metric {namespace} (v{version}) is already provided by plugin [{owner}]")]
    Conflict {
        namespace: String,
        version: i64,
        owner: PluginIdentity,
    },

    #[error("metrics for plugin [{0}] are already registered")]
    AlreadyRegistered(PluginIdentity),
}

/// Collaborator that indexes plugin metrics
pub trait MetricCatalog: Send + Sync {
    /// Records the metrics exposed by `plugin`
    fn register(
        &self,
        plugin: &PluginIdentity,
        metrics: &[MetricDescriptor],
    ) -> Result<(), CatalogError>;

    /// Forgets every metric exposed by `plugin`
    fn deregister(&self, plugin: &PluginIdentity);
}

/// In-memory catalog keyed by plugin identity
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: RwLock<BTreeMap<PluginIdentity, Vec<MetricDescriptor>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics registered for `plugin`
    pub fn metrics_for(&self, plugin: &PluginIdentity) -> Option<Vec<MetricDescriptor>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin)
            .cloned()
    }

    /// Total number of registered metrics
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered metric with the plugin that provides it
    pub fn all(&self) -> Vec<(PluginIdentity, MetricDescriptor)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|(plugin, metrics)| metrics.iter().map(|m| (plugin.clone(), m.clone())))
            .collect()
    }
}

impl MetricCatalog for MemoryCatalog {
    fn register(
        &self,
        plugin: &PluginIdentity,
        metrics: &[MetricDescriptor],
    ) -> Result<(), CatalogError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.contains_key(plugin) {
            return Err(CatalogError::AlreadyRegistered(plugin.clone()));
        }

        // Same namespace and version from two plugins would be ambiguous
        for metric in metrics {
            for (owner, existing) in entries.iter() {
                if existing
                    .iter()
                    .any(|m| m.namespace == metric.namespace && m.version == metric.version)
                {
                    return Err(CatalogError::Conflict {
                        namespace: metric.namespace.clone(),
                        version: metric.version,
                        owner: owner.clone(),
                    });
                }
            }
        }

        entries.insert(plugin.clone(), metrics.to_vec());
        Ok(())
    }

    fn deregister(&self, plugin: &PluginIdentity) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(plugin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, version: i64) -> PluginIdentity {
        PluginIdentity {
            name: name.to_string(),
            version,
        }
    }

    #[test]
    fn register_and_deregister() {
        let catalog = MemoryCatalog::new();
        let plugin = identity("dummy1", 1);

        catalog
            .register(&plugin, &[MetricDescriptor::new("/intel/dummy/foo", 1)])
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.metrics_for(&plugin).is_some());

        catalog.deregister(&plugin);
        assert!(catalog.is_empty());
    }

    #[test]
    fn conflicting_namespace_is_rejected() {
        let catalog = MemoryCatalog::new();
        let metric = MetricDescriptor::new("/intel/dummy/foo", 1);

        catalog.register(&identity("a", 1), &[metric.clone()]).unwrap();
        let err = catalog.register(&identity("b", 1), &[metric]).unwrap_err();

        assert!(matches!(err, CatalogError::Conflict { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn same_namespace_different_version_is_allowed() {
        let catalog = MemoryCatalog::new();

        catalog
            .register(&identity("a", 1), &[MetricDescriptor::new("/x", 1)])
            .unwrap();
        catalog
            .register(&identity("a", 2), &[MetricDescriptor::new("/x", 2)])
            .unwrap();

        assert_eq!(catalog.all().len(), 2);
    }
}
