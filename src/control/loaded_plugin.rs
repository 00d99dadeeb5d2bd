//! Loaded plugin entity
//!
//! A [`LoadedPlugin`] describes one running plugin instance. Its metadata is
//! fixed at creation; state, load time and the process handle are mutated
//! only by the [`PluginManager`](super::PluginManager).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plugin::{MetricDescriptor, PluginIdentity, PluginMeta, PluginProcess, PluginType};

/// Lifecycle state of a loaded plugin
///
/// Transitions only move forward: `Detected → Loaded → Unloaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Handshake completed, not yet registered
    Detected,
    /// Registered and running
    Loaded,
    /// Stopped and removed
    Unloaded,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Detected => "detected",
            PluginState::Loaded => "loaded",
            PluginState::Unloaded => "unloaded",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin instance tracked by the manager
pub struct LoadedPlugin {
    meta: PluginMeta,
    path: PathBuf,
    metrics: Vec<MetricDescriptor>,
    state: RwLock<PluginState>,
    loaded_time: RwLock<Option<DateTime<Utc>>>,
    process: Mutex<Option<Box<dyn PluginProcess>>>,
    busy: AtomicBool,
}

impl LoadedPlugin {
    /// Creates an entity in the `Detected` state
    pub(crate) fn new(
        meta: PluginMeta,
        path: impl Into<PathBuf>,
        metrics: Vec<MetricDescriptor>,
        process: Option<Box<dyn PluginProcess>>,
    ) -> Self {
        Self {
            meta,
            path: path.into(),
            metrics,
            state: RwLock::new(PluginState::Detected),
            loaded_time: RwLock::new(None),
            process: Mutex::new(process),
            busy: AtomicBool::new(false),
        }
    }

    /// Creates an entity with no process attached
    #[cfg(test)]
    pub(crate) fn detached(meta: PluginMeta) -> Self {
        Self::new(meta, PathBuf::new(), Vec::new(), None)
    }

    /// Name, version and type reported during the handshake
    pub fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    /// Short plugin name (e.g., "dummy1")
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Plugin version
    pub fn version(&self) -> i64 {
        self.meta.version
    }

    /// Kind of work the plugin performs
    pub fn plugin_type(&self) -> PluginType {
        self.meta.plugin_type
    }

    /// Lowercase label of the plugin type
    pub fn type_name(&self) -> &'static str {
        self.meta.plugin_type.as_str()
    }

    /// The `(name, version)` pair that is unique among loaded plugins
    pub fn identity(&self) -> PluginIdentity {
        self.meta.identity()
    }

    /// Key in the form `type:name:version`
    pub fn key(&self) -> String {
        self.meta.key()
    }

    /// Path of the binary this plugin was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Metrics advertised during the handshake
    pub fn metrics(&self) -> &[MetricDescriptor] {
        &self.metrics
    }

    /// Current lifecycle state
    pub fn state(&self) -> PluginState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lowercase label of the current state
    pub fn status(&self) -> &'static str {
        self.state().as_str()
    }

    /// When the plugin reached `Loaded`, if it has
    pub fn loaded_time(&self) -> Option<DateTime<Utc>> {
        *self.loaded_time.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unix timestamp (seconds) of the transition to `Loaded`, 0 before that
    pub fn loaded_timestamp(&self) -> i64 {
        self.loaded_time().map(|t| t.timestamp()).unwrap_or(0)
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(crate) fn set_loaded_time(&self, time: DateTime<Utc>) {
        *self.loaded_time.write().unwrap_or_else(PoisonError::into_inner) = Some(time);
    }

    /// Moves from `Detected` to `Loaded` and stamps the load time
    ///
    /// Returns false and changes nothing if the plugin is in any other state.
    pub(crate) fn mark_loaded(&self, time: DateTime<Utc>) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != PluginState::Detected {
            return false;
        }
        self.set_loaded_time(time);
        *state = PluginState::Loaded;
        true
    }

    /// Runs `f` against the process handle, if one is still attached
    pub(crate) fn with_process<T>(
        &self,
        f: impl FnOnce(&mut Box<dyn PluginProcess>) -> T,
    ) -> Option<T> {
        let mut guard = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_mut().map(f)
    }

    /// Detaches and drops the process handle
    pub(crate) fn release_process(&self) {
        self.process
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// OS process id, if a process is attached
    pub fn pid(&self) -> Option<u32> {
        self.with_process(|p| p.id()).flatten()
    }

    /// Claims the plugin for a load or unload in progress; false if already claimed
    pub(crate) fn claim(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("meta", &self.meta)
            .field("path", &self.path)
            .field("state", &self.state())
            .field("loaded_time", &self.loaded_time())
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of a loaded plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSummary {
    pub name: String,
    pub version: i64,
    #[serde(rename = "type")]
    pub type_name: String,
    pub status: String,
    pub loaded_timestamp: i64,
    pub path: PathBuf,
    pub metrics: Vec<MetricDescriptor>,
}

impl From<&LoadedPlugin> for PluginSummary {
    fn from(plugin: &LoadedPlugin) -> Self {
        Self {
            name: plugin.name().to_string(),
            version: plugin.version(),
            type_name: plugin.type_name().to_string(),
            status: plugin.status().to_string(),
            loaded_timestamp: plugin.loaded_timestamp(),
            path: plugin.path().to_path_buf(),
            metrics: plugin.metrics().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_plugin() -> LoadedPlugin {
        LoadedPlugin::detached(PluginMeta::new("test", 1, PluginType::Collector))
    }

    #[test]
    fn name_and_version_come_from_meta() {
        let lp = test_plugin();

        assert_eq!(lp.name(), "test");
        assert_eq!(lp.version(), 1);
    }

    #[test]
    fn type_name() {
        let lp = test_plugin();
        assert_eq!(lp.type_name(), "collector");

        let publisher =
            LoadedPlugin::detached(PluginMeta::new("file", 2, PluginType::Publisher));
        assert_eq!(publisher.type_name(), "publisher");
    }

    #[test]
    fn status_follows_state() {
        let lp = test_plugin();
        assert_eq!(lp.status(), "detected");

        lp.set_state(PluginState::Loaded);
        assert_eq!(lp.status(), "loaded");

        lp.set_state(PluginState::Unloaded);
        assert_eq!(lp.status(), "unloaded");
    }

    #[test]
    fn loaded_timestamp() {
        let lp = test_plugin();
        assert_eq!(lp.loaded_timestamp(), 0);

        let ts = Utc::now();
        lp.set_loaded_time(ts);
        assert_eq!(lp.loaded_timestamp(), ts.timestamp());
    }

    #[test]
    fn claim_is_exclusive() {
        let lp = test_plugin();

        assert!(lp.claim());
        assert!(!lp.claim());

        lp.release();
        assert!(lp.claim());
    }

    #[test]
    fn mark_loaded_only_from_detected() {
        let lp = test_plugin();
        assert!(lp.mark_loaded(Utc::now()));
        assert!(!lp.mark_loaded(Utc::now()));

        let unloaded = test_plugin();
        unloaded.set_state(PluginState::Unloaded);

        assert!(!unloaded.mark_loaded(Utc::now()));
        assert_eq!(unloaded.state(), PluginState::Unloaded);
        assert_eq!(unloaded.loaded_timestamp(), 0);
    }

    #[test]
    fn summary_snapshot() {
        let lp = test_plugin();
        lp.mark_loaded(Utc::now());

        let summary = PluginSummary::from(&lp);
        assert_eq!(summary.status, "loaded");
        assert_eq!(summary.type_name, "collector");
        assert!(summary.loaded_timestamp > 0);
    }
}
