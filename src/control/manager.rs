//! Plugin manager
//!
//! The single authority over the plugin lifecycle. Loading validates the
//! binary, spawns it, runs the handshake, records the plugin and registers
//! its metrics. Unloading reverses that. Every failure after a spawn kills
//! the child, so a failed load never leaves a process behind.

use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn, Dispatch};

use super::catalog::MetricCatalog;
use super::error::ControlError;
use super::loaded_plugin::{LoadedPlugin, PluginState};
use super::registry::LoadedPlugins;
use crate::config::ControlConfig;
use crate::plugin::{
    discover, is_executable, HandshakeRequest, PluginConfig, PluginExecutor, ProcessExecutor,
    StopOutcome,
};

/// Orchestrates loading and unloading of plugin processes
pub struct PluginManager {
    loaded: LoadedPlugins,
    catalog: RwLock<Option<Arc<dyn MetricCatalog>>>,
    executor: Arc<dyn PluginExecutor>,
    handshake_timeout: Duration,
    stop_timeout: Duration,
    max_config_bytes: usize,
    dispatch: Option<Dispatch>,
}

impl PluginManager {
    /// Creates a manager with default timeouts and the stdio executor
    pub fn new() -> Self {
        Self::from_config(&ControlConfig::default())
    }

    /// Creates a manager using the timeouts and limits in `config`
    pub fn from_config(config: &ControlConfig) -> Self {
        Self {
            loaded: LoadedPlugins::new(),
            catalog: RwLock::new(None),
            executor: Arc::new(ProcessExecutor::new()),
            handshake_timeout: config.handshake_timeout(),
            stop_timeout: config.stop_timeout(),
            max_config_bytes: config.max_plugin_config_bytes,
            dispatch: None,
        }
    }

    /// Replaces the executor used to spawn plugins
    pub fn with_executor(mut self, executor: Arc<dyn PluginExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Routes this manager's diagnostics to `dispatch`
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Overrides the handshake and stop timeouts taken from the config
    pub fn with_timeouts(mut self, handshake: Duration, stop: Duration) -> Self {
        self.handshake_timeout = handshake;
        self.stop_timeout = stop;
        self
    }

    /// Sets the catalog that receives plugin metrics, replacing any previous one
    pub fn set_metric_catalog(&self, catalog: Arc<dyn MetricCatalog>) {
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Some(catalog);
    }

    fn catalog(&self) -> Option<Arc<dyn MetricCatalog>> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The registry of loaded plugins
    pub fn loaded_plugins(&self) -> &LoadedPlugins {
        &self.loaded
    }

    fn scoped<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    /// Spawns the plugin at `path`, performs the handshake and registers it
    pub fn load_plugin(
        &self,
        path: impl AsRef<Path>,
        config: Option<&PluginConfig>,
    ) -> Result<Arc<LoadedPlugin>, ControlError> {
        let path = path.as_ref();
        self.scoped(|| {
            let result = self.load(path, config);
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "plugin load failed");
            }
            result
        })
    }

    fn load(
        &self,
        path: &Path,
        config: Option<&PluginConfig>,
    ) -> Result<Arc<LoadedPlugin>, ControlError> {
        validate_path(path)?;
        let request = self.handshake_request(config)?;
        let catalog = self.catalog().ok_or(ControlError::CatalogNotSet)?;

        let mut process = self
            .executor
            .spawn(path)
            .map_err(|source| ControlError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), pid = ?process.id(), "plugin spawned");

        let response = match process.handshake(&request, self.handshake_timeout) {
            Ok(response) => response,
            Err(source) => {
                if let Err(e) = process.kill() {
                    error!(path = %path.display(), error = %e, "failed to kill plugin after handshake error");
                }
                return Err(ControlError::Handshake {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let plugin = Arc::new(LoadedPlugin::new(
            response.meta,
            path,
            response.metrics,
            Some(process),
        ));
        // Held until registration finishes so shutdown leaves the entry alone
        plugin.claim();

        if let Err(e) = self.loaded.append(Arc::clone(&plugin)) {
            discard(&plugin);
            return Err(e);
        }

        if !plugin.mark_loaded(Utc::now()) {
            self.loaded.remove(&plugin);
            discard(&plugin);
            return Err(ControlError::Interrupted {
                name: plugin.name().to_string(),
                version: plugin.version(),
            });
        }

        if let Err(e) = catalog.register(&plugin.identity(), plugin.metrics()) {
            self.loaded.remove(&plugin);
            discard(&plugin);
            return Err(e.into());
        }
        plugin.release();

        info!(
            plugin = plugin.name(),
            version = plugin.version(),
            plugin_type = plugin.type_name(),
            pid = ?plugin.pid(),
            metrics = plugin.metrics().len(),
            "plugin loaded"
        );
        Ok(plugin)
    }

    fn handshake_request(
        &self,
        config: Option<&PluginConfig>,
    ) -> Result<HandshakeRequest, ControlError> {
        if let Some(config) = config {
            let encoded = serde_json::to_vec(config)
                .map_err(|e| ControlError::InvalidConfig(e.to_string()))?;
            if encoded.len() > self.max_config_bytes {
                return Err(ControlError::InvalidConfig(format!(
                    "{} bytes exceeds the limit of {} bytes",
                    encoded.len(),
                    self.max_config_bytes
                )));
            }
        }
        Ok(HandshakeRequest::new(config.cloned()))
    }

    /// Stops a loaded plugin and removes it from the registry
    pub fn unload_plugin(&self, plugin: &Arc<LoadedPlugin>) -> Result<(), ControlError> {
        self.scoped(|| self.unload(plugin))
    }

    fn unload(&self, plugin: &Arc<LoadedPlugin>) -> Result<(), ControlError> {
        let not_found = || ControlError::NotFound {
            name: plugin.name().to_string(),
            version: plugin.version(),
        };

        // Presence first: a second unload of the same instance is NotFound
        if self.loaded.position(plugin).is_none() {
            return Err(not_found());
        }
        // A successful unload never releases its claim, so racing callers
        // see NotFound rather than the Unloaded state
        if !plugin.claim() {
            return Err(not_found());
        }
        if plugin.state() != PluginState::Loaded {
            plugin.release();
            return Err(ControlError::State);
        }

        self.finish_unload(plugin)
    }

    /// Deregisters, stops and removes a plugin the caller has claimed
    fn finish_unload(&self, plugin: &Arc<LoadedPlugin>) -> Result<(), ControlError> {
        let catalog = self.catalog();
        if let Some(catalog) = &catalog {
            catalog.deregister(&plugin.identity());
        }

        match plugin.with_process(|p| p.stop(self.stop_timeout)) {
            Some(Ok(StopOutcome::Forced)) => {
                warn!(plugin = plugin.name(), version = plugin.version(), "plugin was force-killed on unload");
            }
            Some(Ok(outcome)) => {
                debug!(plugin = plugin.name(), version = plugin.version(), ?outcome, "plugin stopped");
            }
            Some(Err(source)) => {
                // Still running, so its metrics stay visible
                if let Some(catalog) = &catalog {
                    if let Err(e) = catalog.register(&plugin.identity(), plugin.metrics()) {
                        error!(plugin = plugin.name(), error = %e, "failed to restore plugin metrics");
                    }
                }
                plugin.release();
                return Err(ControlError::Stop {
                    name: plugin.name().to_string(),
                    version: plugin.version(),
                    source,
                });
            }
            None => {
                debug!(plugin = plugin.name(), "no process attached");
            }
        }
        plugin.release_process();

        plugin.set_state(PluginState::Unloaded);
        self.loaded.remove(plugin);

        info!(plugin = plugin.name(), version = plugin.version(), "plugin unloaded");
        Ok(())
    }

    /// Loads every plugin executable found in `dir`
    ///
    /// Failures are logged and skipped; the plugins that loaded are returned.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> anyhow::Result<Vec<Arc<LoadedPlugin>>> {
        let dir = dir.as_ref();
        let found = discover(dir)?;

        Ok(self.scoped(|| {
            debug!(dir = %dir.display(), count = found.len(), "discovered plugins");
            found
                .iter()
                .filter_map(|candidate| match self.load_plugin(&candidate.path, None) {
                    Ok(plugin) => Some(plugin),
                    Err(e) => {
                        error!(path = %candidate.path.display(), error = %e, "skipping plugin");
                        None
                    }
                })
                .collect()
        }))
    }

    /// Unloads every plugin, continuing past failures
    ///
    /// Returns the first error encountered. Plugins that never reached
    /// `Loaded` are killed and dropped.
    pub fn shutdown(&self) -> Result<(), ControlError> {
        self.scoped(|| {
            let mut first_error = None;

            for plugin in self.loaded.table() {
                // Claimed entries belong to a load or unload still in flight
                if !plugin.claim() {
                    debug!(plugin = plugin.name(), version = plugin.version(), "skipping plugin busy in another operation");
                    continue;
                }

                let result = match plugin.state() {
                    PluginState::Loaded => self.finish_unload(&plugin),
                    _ => {
                        if let Some(catalog) = self.catalog() {
                            catalog.deregister(&plugin.identity());
                        }
                        discard(&plugin);
                        self.loaded.remove(&plugin);
                        Ok(())
                    }
                };

                if let Err(e) = result {
                    error!(plugin = plugin.name(), version = plugin.version(), error = %e, "failed to unload plugin during shutdown");
                    first_error.get_or_insert(e);
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if !self.loaded.is_empty() {
            let _ = self.shutdown();
        }
    }
}

/// Kills the plugin's process (if any) and marks it unloaded
fn discard(plugin: &LoadedPlugin) {
    if let Some(Err(e)) = plugin.with_process(|p| p.kill()) {
        error!(plugin = plugin.name(), error = %e, "failed to kill plugin");
    }
    plugin.release_process();
    plugin.set_state(PluginState::Unloaded);
}

fn validate_path(path: &Path) -> Result<(), ControlError> {
    if path.as_os_str().is_empty() {
        return Err(ControlError::path(path, "path is empty"));
    }

    let meta = fs::metadata(path).map_err(|e| ControlError::path(path, e.to_string()))?;
    if !meta.is_file() {
        return Err(ControlError::path(path, "not a regular file"));
    }
    if !is_executable(path) {
        return Err(ControlError::path(path, "not executable"));
    }

    Ok(())
}
