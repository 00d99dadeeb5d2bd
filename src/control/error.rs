//! Errors raised by the plugin control core

use std::path::PathBuf;

use thiserror::Error;

use super::catalog::CatalogError;
use crate::plugin::HandshakeError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid plugin path '{}': {reason}", path.display())]
    Path { path: PathBuf, reason: String },

    #[error("invalid plugin config: {0}")]
    InvalidConfig(String),

    #[error("no metric catalog set on the plugin manager")]
    CatalogNotSet,

    #[error("failed to spawn plugin '{}': {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake with '{}' failed: {source}", path.display())]
    Handshake {
        path: PathBuf,
        #[source]
        source: HandshakeError,
    },

    #[error("plugin [{name}:{version}] already loaded at index {index}")]
    DuplicateLoad {
        name: String,
        version: i64,
        index: usize,
    },

    #[error("Plugin must be in a LoadedState")]
    State,

    #[error("plugin [{name}] -- [{version}] not found (has it already been unloaded?)")]
    NotFound { name: String, version: i64 },

    #[error("plugin [{name}:{version}] was unloaded before it finished loading")]
    Interrupted { name: String, version: i64 },

    #[error("index out of range")]
    IndexOutOfRange,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to stop plugin [{name}:{version}]: {source}")]
    Stop {
        name: String,
        version: i64,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    pub(crate) fn path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ControlError::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
