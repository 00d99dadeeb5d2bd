//! # Plugin Boundary
//!
//! Everything the host needs to know about plugin binaries without tracking
//! their lifecycle.
//!
//! ## Overview
//!
//! Plugins are separate executables that talk to Pulse via JSON over
//! stdin/stdout. Any language can implement one.
//!
//! ## Plugin Types
//!
//! | Type | Binary Pattern | Purpose |
//! |------|----------------|---------|
//! | Collector | `pulse-collector-{name}` | Gathers metrics |
//! | Processor | `pulse-processor-{name}` | Transforms metrics |
//! | Publisher | `pulse-publisher-{name}` | Ships metrics elsewhere |
//!
//! ## Protocol
//!
//! ```text
//! Host                               Plugin Binary
//!  │                                     │
//!  ├── Spawn: pulse-collector-dummy1     │
//!  │                                     │
//!  ├── Stdin:  {"protocol": 1, "config": {...}}
//!  │                                     │
//!  ├── Stdout: {"protocol": 1, "name": "dummy1", "version": 1, "type": "collector", "metrics": [...]}
//!  │                                     │
//!  └── Stdin:  {"operation": "stop"}
//! ```
//!
//! ## Key Types
//!
//! - [`PluginMeta`] - Name, version and type reported by a plugin
//! - [`PluginExecutor`] / [`PluginProcess`] - Spawn, handshake and stop
//! - [`ProcessExecutor`] - Stdio implementation of the executor
//! - [`discover`] - Finds plugin executables in a directory

mod discovery;
mod executor;
mod meta;
mod protocol;

#[cfg(all(test, unix))]
pub(crate) mod testing;

pub use discovery::{discover, is_executable, parse_binary_name, DiscoveredPlugin, BINARY_PREFIX};
pub use executor::{PluginExecutor, PluginProcess, ProcessExecutor, ProcessHandle, StopOutcome};
pub use meta::{MetricDescriptor, PluginIdentity, PluginMeta, PluginType, PluginTypeError};
pub use protocol::{
    ControlRequest, HandshakeError, HandshakeRequest, HandshakeResponse, Operation, PluginConfig,
    PROTOCOL_VERSION,
};
