//! # Plugin Control
//!
//! Lifecycle core: loads plugin executables, tracks them while they run and
//! unloads them again.
//!
//! ## Lifecycle
//!
//! ```text
//! load_plugin(path)                          unload_plugin(plugin)
//!  │                                          │
//!  ├── validate path                          ├── present in registry?
//!  ├── spawn + handshake ──▶ Detected         ├── state == Loaded?
//!  ├── append to registry                     ├── deregister metrics
//!  ├── mark Loaded, register metrics          ├── stop (kill after timeout)
//!  └── return plugin ──────▶ Loaded           └── splice out ──▶ Unloaded
//! ```
//!
//! Any failure after the spawn kills the child before the error is returned.
//!
//! ## Concurrency
//!
//! [`PluginManager`] is `Send + Sync` and every operation takes `&self`.
//! The [`LoadedPlugins`] registry serializes appends and removals under one
//! lock, so two racing loads of the same name and version produce exactly
//! one success and one [`ControlError::DuplicateLoad`].
//!
//! ## Key Types
//!
//! - [`PluginManager`] - Load/unload orchestration
//! - [`LoadedPlugins`] - Ordered registry of loaded plugins
//! - [`LoadedPlugin`] - One running plugin instance
//! - [`MetricCatalog`] - Collaborator receiving plugin metrics

mod catalog;
mod error;
mod loaded_plugin;
mod manager;
mod registry;

pub use catalog::{CatalogError, MemoryCatalog, MetricCatalog};
pub use error::ControlError;
pub use loaded_plugin::{LoadedPlugin, PluginState, PluginSummary};
pub use manager::PluginManager;
pub use registry::LoadedPlugins;
