//! Plugin identity types
//!
//! A plugin reports its [`PluginMeta`] and the metrics it exposes during the
//! handshake. Both are immutable for the lifetime of a loaded plugin.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PluginTypeError {
    #[error("Unknown plugin type: '{0}'")]
    UnknownName(String),

    #[error("Unknown plugin type code: {0}")]
    UnknownCode(i64),
}

/// Kind of work a plugin performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Collector,
    Processor,
    Publisher,
}

impl PluginType {
    /// Canonical lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Collector => "collector",
            PluginType::Processor => "processor",
            PluginType::Publisher => "publisher",
        }
    }

    /// Numeric code used by older plugins (collector = 0)
    pub fn code(&self) -> i64 {
        match self {
            PluginType::Collector => 0,
            PluginType::Processor => 1,
            PluginType::Publisher => 2,
        }
    }

    /// Maps a numeric code back to a type
    pub fn from_code(code: i64) -> Result<Self, PluginTypeError> {
        match code {
            0 => Ok(PluginType::Collector),
            1 => Ok(PluginType::Processor),
            2 => Ok(PluginType::Publisher),
            other => Err(PluginTypeError::UnknownCode(other)),
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = PluginTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collector" => Ok(PluginType::Collector),
            "processor" => Ok(PluginType::Processor),
            "publisher" => Ok(PluginType::Publisher),
            _ => Err(PluginTypeError::UnknownName(s.to_string())),
        }
    }
}

// Plugins may report either the label or the numeric code
impl<'de> Deserialize<'de> for PluginType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Code(i64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => name.parse().map_err(serde::de::Error::custom),
            Repr::Code(code) => PluginType::from_code(code).map_err(serde::de::Error::custom),
        }
    }
}

/// Immutable identity of a plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginMeta {
    /// Short plugin name (e.g., "dummy1")
    pub name: String,

    /// Plugin version
    pub version: i64,

    /// Plugin type
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
}

impl PluginMeta {
    pub fn new(name: impl Into<String>, version: i64, plugin_type: PluginType) -> Self {
        Self {
            name: name.into(),
            version,
            plugin_type,
        }
    }

    /// Returns the `(name, version)` pair that must be unique among loaded plugins
    pub fn identity(&self) -> PluginIdentity {
        PluginIdentity {
            name: self.name.clone(),
            version: self.version,
        }
    }

    /// Key in the form `type:name:version`
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.plugin_type, self.name, self.version)
    }
}

/// The `(name, version)` pair identifying a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginIdentity {
    pub name: String,
    pub version: i64,
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// A metric a plugin advertises during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// Metric namespace (e.g., "/intel/dummy/foo")
    pub namespace: String,

    /// Metric version
    #[serde(default)]
    pub version: i64,

    /// Unit of measurement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MetricDescriptor {
    pub fn new(namespace: impl Into<String>, version: i64) -> Self {
        Self {
            namespace: namespace.into(),
            version,
            unit: None,
        }
    }
}
