//! Plugin discovery
//!
//! Plugin executables follow the naming pattern `pulse-{type}-{name}`
//! (e.g., `pulse-collector-dummy1`) and are found by scanning a directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::meta::PluginType;

/// Prefix shared by all plugin executables
pub const BINARY_PREFIX: &str = "pulse-";

/// A plugin executable found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPlugin {
    /// Name portion of the file name (e.g., "dummy1")
    pub name: String,

    /// Type encoded in the file name
    pub plugin_type: PluginType,

    /// Path to the executable
    pub path: PathBuf,
}

/// Splits a file name of the form `pulse-{type}-{name}`
pub fn parse_binary_name(file_name: &str) -> Option<(PluginType, String)> {
    let rest = file_name.strip_prefix(BINARY_PREFIX)?;
    let (type_part, name) = rest.split_once('-')?;
    let plugin_type = type_part.parse().ok()?;

    // Windows executables carry an extension
    let name = name.strip_suffix(".exe").unwrap_or(name);
    if name.is_empty() {
        return None;
    }

    Some((plugin_type, name.to_string()))
}

/// Scans `dir` for plugin executables, sorted by file name
///
/// A missing directory yields an empty list.
pub fn discover(dir: &Path) -> Result<Vec<DiscoveredPlugin>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read plugin directory: {}", dir.display()))?;

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some((plugin_type, name)) = parse_binary_name(file_name) {
            if path.is_file() && is_executable(&path) {
                found.push(DiscoveredPlugin {
                    name,
                    plugin_type,
                    path,
                });
            }
        }
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// Checks if a file is executable
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = path.metadata() {
            return meta.permissions().mode() & 0o111 != 0;
        }
    }

    #[cfg(windows)]
    {
        if let Some(ext) = path.extension() {
            return ext == "exe" || ext == "bat" || ext == "cmd";
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_names() {
        assert_eq!(
            parse_binary_name("pulse-collector-dummy1"),
            Some((PluginType::Collector, "dummy1".to_string()))
        );
        assert_eq!(
            parse_binary_name("pulse-publisher-influx-db"),
            Some((PluginType::Publisher, "influx-db".to_string()))
        );
        assert_eq!(parse_binary_name("pulse-collector-"), None);
        assert_eq!(parse_binary_name("pulse-exporter-x"), None);
        assert_eq!(parse_binary_name("telegraf-input-cpu"), None);
    }

    #[test]
    fn discover_missing_dir() {
        let dir = TempDir::new().unwrap();
        let plugins = discover(&dir.path().join("nope")).unwrap();

        assert!(plugins.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn discover_only_executable_plugins() {
        use crate::plugin::testing::write_script;

        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "pulse-collector-b", "exit 0");
        write_script(dir.path(), "pulse-processor-a", "exit 0");
        write_script(dir.path(), "unrelated-tool", "exit 0");
        fs::write(dir.path().join("pulse-publisher-noexec"), "#!/bin/sh\n").unwrap();

        let plugins = discover(dir.path()).unwrap();
        let names: Vec<_> = plugins.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(plugins[1].plugin_type, PluginType::Processor);
    }
}
