//! Loaded-plugins registry
//!
//! An ordered table of [`LoadedPlugin`]s. Entries are appended at the tail
//! and removal closes the gap, so an entry's index is its position among the
//! plugins still loaded. Freed positions are never handed out again.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::ControlError;
use super::loaded_plugin::LoadedPlugin;

/// Ordered, duplicate-free table of loaded plugins
#[derive(Debug, Default)]
pub struct LoadedPlugins {
    table: RwLock<Vec<Arc<LoadedPlugin>>>,
}

impl LoadedPlugins {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<LoadedPlugin>>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<LoadedPlugin>>> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `plugin` unless one with the same name and version is present
    pub fn append(&self, plugin: Arc<LoadedPlugin>) -> Result<(), ControlError> {
        let mut table = self.write();

        if let Some(index) = table
            .iter()
            .position(|p| p.name() == plugin.name() && p.version() == plugin.version())
        {
            let existing = &table[index];
            return Err(ControlError::DuplicateLoad {
                name: existing.name().to_string(),
                version: existing.version(),
                index,
            });
        }

        table.push(plugin);
        Ok(())
    }

    /// Returns the plugin at `index`
    pub fn get(&self, index: usize) -> Result<Arc<LoadedPlugin>, ControlError> {
        self.read()
            .get(index)
            .cloned()
            .ok_or(ControlError::IndexOutOfRange)
    }

    /// Removes the plugin at `index`, shifting later entries down by one
    ///
    /// Returns `None` and leaves the table untouched if `index` is out of range.
    pub fn splice(&self, index: usize) -> Option<Arc<LoadedPlugin>> {
        let mut table = self.write();
        if index < table.len() {
            Some(table.remove(index))
        } else {
            None
        }
    }

    /// Snapshot of the table in order
    pub fn table(&self) -> Vec<Arc<LoadedPlugin>> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Index of this exact instance, compared by identity rather than name
    pub fn position(&self, plugin: &Arc<LoadedPlugin>) -> Option<usize> {
        self.read().iter().position(|p| Arc::ptr_eq(p, plugin))
    }

    /// Locates this exact instance and splices it out under one lock
    pub fn remove(&self, plugin: &Arc<LoadedPlugin>) -> Option<usize> {
        let mut table = self.write();
        let index = table.iter().position(|p| Arc::ptr_eq(p, plugin))?;
        table.remove(index);
        Some(index)
    }
}
