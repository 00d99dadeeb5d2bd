//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::output::{Output, OutputFormat};
use super::{config_cmd, plugin_cmd};
use crate::config::Config;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(author, version, about = "Plugin lifecycle manager for the Pulse telemetry daemon")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', global = true, env = "PULSE_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load, inspect and discover plugins
    #[command(subcommand)]
    Plugin(plugin_cmd::PluginCommands),

    /// Inspect configuration
    #[command(subcommand)]
    Config(config_cmd::ConfigCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(cli.format, cli.verbose);

    output.verbose("Pulse CLI starting");

    let mut config = Config::load(cli.config_file.as_deref())?;
    if cli.verbose {
        config.log.level = "debug".to_string();
    }
    output.verbose_ctx(
        "config",
        &match &cli.config_file {
            Some(path) => format!("Loaded {}", path.display()),
            None => "Using default config location".to_string(),
        },
    );

    match cli.command {
        Commands::Plugin(cmd) => plugin_cmd::run(cmd, &config, &output)?,
        Commands::Config(cmd) => config_cmd::run(cmd, &config, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}
