//! Plugin protocol types
//!
//! Plugins communicate via newline-delimited JSON over stdin/stdout.
//! The host opens with a [`HandshakeRequest`]; the plugin answers with a
//! single [`HandshakeResponse`] line. Afterwards the host may send
//! [`ControlRequest`] lines, of which only `stop` is defined.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::meta::{MetricDescriptor, PluginMeta};

/// Version of the handshake protocol spoken by this host
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("plugin did not complete the handshake within {0:?}")]
    Timeout(Duration),

    #[error("plugin exited before completing the handshake ({0})")]
    Exited(String),

    #[error("malformed handshake response: {0}")]
    Malformed(String),

    #[error("plugin speaks protocol version {found}, expected {expected}")]
    ProtocolMismatch { expected: u32, found: u32 },

    #[error("handshake I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Opaque configuration passed through to a plugin at startup
pub type PluginConfig = serde_json::Map<String, serde_json::Value>;

/// First message sent to a freshly spawned plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// Protocol version the host speaks
    pub protocol: u32,

    /// Plugin configuration, if any
    #[serde(default)]
    pub config: Option<PluginConfig>,
}

impl HandshakeRequest {
    pub fn new(config: Option<PluginConfig>) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            config,
        }
    }
}

/// The plugin's self-description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Protocol version the plugin speaks
    pub protocol: u32,

    /// Name, version and type
    #[serde(flatten)]
    pub meta: PluginMeta,

    /// Metrics the plugin exposes
    #[serde(default)]
    pub metrics: Vec<MetricDescriptor>,
}

impl HandshakeResponse {
    pub fn new(meta: PluginMeta, metrics: Vec<MetricDescriptor>) -> Self {
        Self {
            protocol: PROTOCOL_VERSION,
            meta,
            metrics,
        }
    }

    /// Parses and validates one response line
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let response: HandshakeResponse = serde_json::from_str(line.trim())
            .map_err(|e| HandshakeError::Malformed(e.to_string()))?;

        if response.protocol != PROTOCOL_VERSION {
            return Err(HandshakeError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                found: response.protocol,
            });
        }

        if response.meta.name.trim().is_empty() {
            return Err(HandshakeError::Malformed("plugin name is empty".to_string()));
        }

        Ok(response)
    }
}

/// Operations the host can request after the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Stop,
}

/// A control message sent to a running plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub operation: Operation,
}

impl ControlRequest {
    pub fn stop() -> Self {
        Self {
            operation: Operation::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginType;

    #[test]
    fn request_carries_protocol_and_config() {
        let mut config = PluginConfig::new();
        config.insert("password".to_string(), serde_json::json!("secret"));

        let json = serde_json::to_string(&HandshakeRequest::new(Some(config))).unwrap();

        assert!(json.contains("\"protocol\":1"));
        assert!(json.contains("secret"));
    }

    #[test]
    fn parse_valid_response() {
        let line = r#"{"protocol":1,"name":"dummy1","version":1,"type":"collector","metrics":[{"namespace":"/intel/dummy/foo","version":1}]}"#;
        let response = HandshakeResponse::parse(line).unwrap();

        assert_eq!(response.meta.name, "dummy1");
        assert_eq!(response.meta.version, 1);
        assert_eq!(response.meta.plugin_type, PluginType::Collector);
        assert_eq!(response.metrics.len(), 1);
    }

    #[test]
    fn parse_accepts_numeric_type() {
        let line = r#"{"protocol":1,"name":"file","version":3,"type":2}"#;
        let response = HandshakeResponse::parse(line).unwrap();

        assert_eq!(response.meta.plugin_type, PluginType::Publisher);
        assert!(response.metrics.is_empty());
    }

    #[test]
    fn parse_rejects_protocol_mismatch() {
        let line = r#"{"protocol":2,"name":"dummy1","version":1,"type":"collector"}"#;
        let err = HandshakeResponse::parse(line).unwrap_err();

        assert!(matches!(
            err,
            HandshakeError::ProtocolMismatch { expected: 1, found: 2 }
        ));
    }

    #[test]
    fn parse_rejects_garbage_and_empty_name() {
        assert!(matches!(
            HandshakeResponse::parse("hello"),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            HandshakeResponse::parse(r#"{"protocol":1,"name":" ","version":1,"type":"collector"}"#),
            Err(HandshakeError::Malformed(_))
        ));
        assert!(matches!(
            HandshakeResponse::parse(r#"{"protocol":1,"name":"x","version":1,"type":"exporter"}"#),
            Err(HandshakeError::Malformed(_))
        ));
    }

    #[test]
    fn stop_request_serialization() {
        let json = serde_json::to_string(&ControlRequest::stop()).unwrap();
        assert_eq!(json, r#"{"operation":"stop"}"#);
    }
}
