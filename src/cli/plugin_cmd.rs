//! Plugin management commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Serialize;

use super::output::Output;
use crate::config::Config;
use crate::control::{MemoryCatalog, PluginManager, PluginSummary};
use crate::logging;
use crate::plugin::{discover, PluginConfig};

#[derive(Subcommand)]
pub enum PluginCommands {
    /// Load plugins, report what they advertise, then unload them
    Check {
        /// Plugin executables to load
        paths: Vec<PathBuf>,

        /// Also load every plugin found in this directory
        #[arg(long)]
        dir: Option<PathBuf>,

        /// JSON object handed to each plugin during the handshake
        #[arg(long)]
        config: Option<String>,
    },

    /// List plugin executables in a directory
    Discover {
        /// Directory to scan (defaults to control.auto_discover_path)
        dir: Option<PathBuf>,
    },
}

pub fn run(cmd: PluginCommands, config: &Config, output: &Output) -> Result<()> {
    match cmd {
        PluginCommands::Check {
            paths,
            dir,
            config: plugin_config,
        } => check(config, output, paths, dir, plugin_config.as_deref()),
        PluginCommands::Discover { dir } => discover_plugins(config, output, dir),
    }
}

#[derive(Serialize)]
struct CheckFailure {
    path: PathBuf,
    error: String,
}

#[derive(Serialize)]
struct CheckReport {
    loaded: Vec<PluginSummary>,
    failed: Vec<CheckFailure>,
}

fn check(
    config: &Config,
    output: &Output,
    paths: Vec<PathBuf>,
    dir: Option<PathBuf>,
    plugin_config: Option<&str>,
) -> Result<()> {
    let plugin_config: Option<PluginConfig> = plugin_config
        .map(|raw| serde_json::from_str(raw).context("--config must be a JSON object"))
        .transpose()?;

    let mut targets = paths;
    let dir = dir.or_else(|| {
        targets
            .is_empty()
            .then(|| config.control.auto_discover_path.clone())
            .flatten()
    });
    if let Some(dir) = &dir {
        output.verbose_ctx("check", &format!("Scanning {}", dir.display()));
        targets.extend(discover(dir)?.into_iter().map(|p| p.path));
    }
    if targets.is_empty() {
        bail!("No plugins to check (pass paths or --dir)");
    }

    let manager =
        PluginManager::from_config(&config.control).with_dispatch(logging::dispatch(&config.log));
    let catalog = Arc::new(MemoryCatalog::new());
    manager.set_metric_catalog(catalog.clone());

    let mut failed = Vec::new();
    for path in &targets {
        output.verbose_ctx("check", &format!("Loading {}", path.display()));
        if let Err(e) = manager.load_plugin(path, plugin_config.as_ref()) {
            failed.push(CheckFailure {
                path: path.clone(),
                error: e.to_string(),
            });
        }
    }

    let loaded: Vec<PluginSummary> = manager
        .loaded_plugins()
        .table()
        .iter()
        .map(|p| PluginSummary::from(p.as_ref()))
        .collect();
    output.verbose_ctx(
        "check",
        &format!("{} metric(s) registered", catalog.len()),
    );

    manager.shutdown().context("Failed to unload plugins")?;

    let failures = failed.len();
    let total = targets.len();
    let report = CheckReport { loaded, failed };

    if output.is_json() {
        output.data(&report);
    } else {
        print_report(&report, output);
    }

    if failures > 0 {
        bail!("{} of {} plugin(s) failed to load", failures, total);
    }
    Ok(())
}

fn print_report(report: &CheckReport, output: &Output) {
    if !report.loaded.is_empty() {
        println!(
            "{:<20} {:<8} {:<10} {:<9} {:<11} {}",
            "NAME", "VERSION", "TYPE", "STATUS", "LOADED", "PATH"
        );
        println!("{}", "-".repeat(80));
        for plugin in &report.loaded {
            println!(
                "{:<20} {:<8} {:<10} {:<9} {:<11} {}",
                plugin.name,
                plugin.version,
                plugin.type_name,
                plugin.status,
                plugin.loaded_timestamp,
                plugin.path.display()
            );
            for metric in &plugin.metrics {
                match &metric.unit {
                    Some(unit) => println!("    {} (v{}, {})", metric.namespace, metric.version, unit),
                    None => println!("    {} (v{})", metric.namespace, metric.version),
                }
            }
        }
        println!();
    }

    for failure in &report.failed {
        output.error(&format!("{}: {}", failure.path.display(), failure.error));
    }

    if report.failed.is_empty() {
        output.success(&format!(
            "{} plugin(s) loaded and unloaded cleanly",
            report.loaded.len()
        ));
    }
}

fn discover_plugins(config: &Config, output: &Output, dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir.or_else(|| config.control.auto_discover_path.clone()) {
        Some(dir) => dir,
        None => bail!("No directory given and control.auto_discover_path is not set"),
    };

    let plugins = discover(&dir)?;

    if output.is_json() {
        let items: Vec<_> = plugins
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "type": p.plugin_type,
                    "path": p.path.display().to_string(),
                })
            })
            .collect();
        output.data(&items);
    } else if plugins.is_empty() {
        print_empty(&dir);
    } else {
        println!("{:<24} {:<10} {}", "NAME", "TYPE", "PATH");
        println!("{}", "-".repeat(70));
        for plugin in &plugins {
            println!(
                "{:<24} {:<10} {}",
                plugin.name,
                plugin.plugin_type,
                plugin.path.display()
            );
        }
    }

    Ok(())
}

fn print_empty(dir: &Path) {
    println!("No plugins found in {}.", dir.display());
    println!();
    println!("Plugins are executables named 'pulse-<type>-<name>',");
    println!("where <type> is collector, processor or publisher.");
}
