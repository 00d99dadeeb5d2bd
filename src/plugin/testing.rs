//! Helpers for tests that need real plugin executables

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script named `name` into `dir`
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Script body for a well-behaved plugin reporting `name:version` as `plugin_type`
pub fn plugin_body(name: &str, version: i64, plugin_type: &str) -> String {
    format!(
        "read req\necho '{{\"protocol\":1,\"name\":\"{}\",\"version\":{},\"type\":\"{}\",\"metrics\":[{{\"namespace\":\"/test/{}/value\",\"version\":1}}]}}'\nread op\nexit 0",
        name, version, plugin_type, name
    )
}
