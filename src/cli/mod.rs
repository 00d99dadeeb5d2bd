//! # Command-Line Interface
//!
//! Operator commands for exercising the plugin manager outside a daemon.
//!
//! ## Command Groups
//!
//! | Group  | Purpose                         | Examples                           |
//! |--------|---------------------------------|------------------------------------|
//! | Plugin | Load, inspect and find plugins  | `plugin check`, `plugin discover`  |
//! | Config | Inspect effective configuration | `config show`                      |
//!
//! ## Output Formats
//!
//! All commands support the `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Diagnostics from the plugin manager go to stderr through `tracing`.
//! `--verbose` raises the log level to `debug`; `RUST_LOG` overrides both.
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod config_cmd;
mod output;
mod plugin_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
