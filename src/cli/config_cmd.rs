//! Configuration commands

use anyhow::Result;
use clap::Subcommand;

use super::output::Output;
use crate::config::Config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the default config file location
    Path,
}

pub fn run(cmd: ConfigCommands, config: &Config, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(config, output),
        ConfigCommands::Path => path(output),
    }
}

fn show(config: &Config, output: &Output) -> Result<()> {
    if output.is_json() {
        output.data(config);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn path(output: &Output) -> Result<()> {
    let path = Config::default_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine a config directory for this user"))?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "path": path.display().to_string(),
            "exists": path.exists(),
        }));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}
