//! Pulse - plugin lifecycle management for a telemetry daemon
//!
//! Pulse runs collector, processor and publisher plugins as separate
//! executables. The [`control`] module loads them, tracks them in an ordered
//! registry and unloads them again; [`plugin`] holds the wire protocol and
//! process plumbing that sits underneath.

pub mod cli;
pub mod config;
pub mod control;
pub mod logging;
pub mod plugin;

pub use control::{ControlError, LoadedPlugin, LoadedPlugins, PluginManager, PluginState};
pub use plugin::{PluginMeta, PluginType};
