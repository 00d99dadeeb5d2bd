//! Plugin manager tests against the real reference collector
//!
//! These drive `pulse-collector-dummy1` through the stdio protocol, so they
//! exercise spawning, the handshake and the stop sequence end to end.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use pulse::control::{ControlError, MemoryCatalog, PluginManager, PluginState};
use pulse::plugin::{PluginConfig, PluginType};
use tempfile::TempDir;

fn dummy_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pulse-collector-dummy1"))
}

fn manager() -> (PluginManager, Arc<MemoryCatalog>) {
    let catalog = Arc::new(MemoryCatalog::new());
    let manager = PluginManager::new();
    manager.set_metric_catalog(catalog.clone());
    (manager, catalog)
}

/// Copies the dummy collector into `dir` under a discoverable name
fn install_dummy(dir: &Path) -> PathBuf {
    let file_name = if cfg!(windows) {
        "pulse-collector-dummy1.exe"
    } else {
        "pulse-collector-dummy1"
    };
    let target = dir.join(file_name);
    std::fs::copy(dummy_path(), &target).unwrap();
    target
}

// =============================================================================
// Load
// =============================================================================

#[test]
fn load_dummy_collector() {
    let (manager, catalog) = manager();

    let lp = manager.load_plugin(dummy_path(), None).unwrap();
    let now = Utc::now().timestamp();

    assert_eq!(lp.name(), "dummy1");
    assert_eq!(lp.version(), 1);
    assert_eq!(lp.plugin_type(), PluginType::Collector);
    assert_eq!(lp.type_name(), "collector");
    assert_eq!(lp.state(), PluginState::Loaded);
    assert_eq!(lp.status(), "loaded");
    assert!((now - lp.loaded_timestamp()).abs() <= 2);
    assert!(lp.pid().is_some());

    assert_eq!(manager.loaded_plugins().len(), 1);
    assert_eq!(lp.metrics().len(), 2);
    assert_eq!(catalog.len(), 2);
}

#[test]
fn load_passes_config_through() {
    let (manager, _) = manager();
    let mut config = PluginConfig::new();
    config.insert("user".to_string(), serde_json::json!("root"));

    let lp = manager.load_plugin(dummy_path(), Some(&config)).unwrap();

    assert_eq!(lp.state(), PluginState::Loaded);
}

#[test]
fn load_bad_path() {
    let (manager, _) = manager();

    let err = manager
        .load_plugin("/this/plugin/does/not/exist", None)
        .unwrap_err();

    assert!(matches!(err, ControlError::Path { .. }));
    assert!(manager.loaded_plugins().is_empty());
}

#[test]
fn load_twice_is_a_duplicate() {
    let (manager, _) = manager();
    manager.load_plugin(dummy_path(), None).unwrap();

    let err = manager.load_plugin(dummy_path(), None).unwrap_err();

    assert_eq!(err.to_string(), "plugin [dummy1:1] already loaded at index 0");
    assert_eq!(manager.loaded_plugins().len(), 1);
}

#[test]
fn concurrent_loads_produce_one_entry() {
    let (manager, _) = manager();
    let manager = Arc::new(manager);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.load_plugin(dummy_path(), None).is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(manager.loaded_plugins().len(), 1);
}

#[test]
fn load_dir_finds_installed_plugins() {
    let dir = TempDir::new().unwrap();
    install_dummy(dir.path());
    let (manager, _) = manager();

    let loaded = manager.load_dir(dir.path()).unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name(), "dummy1");
}

// =============================================================================
// Registry access
// =============================================================================

#[test]
fn get_by_index() {
    let (manager, _) = manager();
    manager.load_plugin(dummy_path(), None).unwrap();

    let lp = manager.loaded_plugins().get(0).unwrap();
    assert_eq!(lp.name(), "dummy1");

    let err = manager.loaded_plugins().get(1).unwrap_err();
    assert_eq!(err.to_string(), "index out of range");
}

// =============================================================================
// Unload
// =============================================================================

#[test]
fn unload_dummy_collector() {
    let (manager, catalog) = manager();
    manager.load_plugin(dummy_path(), None).unwrap();
    let before = manager.loaded_plugins().len();

    let lp = manager.loaded_plugins().get(0).unwrap();
    manager.unload_plugin(&lp).unwrap();

    assert_eq!(manager.loaded_plugins().len(), before - 1);
    assert_eq!(lp.state(), PluginState::Unloaded);
    assert!(lp.pid().is_none());
    assert!(catalog.is_empty());
}

#[test]
fn unload_twice_is_not_found() {
    let (manager, _) = manager();
    let lp = manager.load_plugin(dummy_path(), None).unwrap();
    manager.unload_plugin(&lp).unwrap();

    let err = manager.unload_plugin(&lp).unwrap_err();

    assert_eq!(
        err.to_string(),
        "plugin [dummy1] -- [1] not found (has it already been unloaded?)"
    );
}

#[test]
fn reload_after_unload() {
    let (manager, _) = manager();
    let first = manager.load_plugin(dummy_path(), None).unwrap();
    manager.unload_plugin(&first).unwrap();

    let second = manager.load_plugin(dummy_path(), None).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(manager.loaded_plugins().len(), 1);
}

#[test]
fn shutdown_unloads_everything() {
    let (manager, catalog) = manager();
    let lp = manager.load_plugin(dummy_path(), None).unwrap();

    manager.shutdown().unwrap();

    assert!(manager.loaded_plugins().is_empty());
    assert_eq!(lp.state(), PluginState::Unloaded);
    assert!(catalog.is_empty());
}
