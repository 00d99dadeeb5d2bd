//! Tribe (cluster membership) settings
//!
//! Pulse only parses this section; the gossip layer that consumes it lives
//! elsewhere. Defaults are derived from the host: its name and the IPv4
//! address of its default route.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::error;
use uuid::Uuid;

use super::ConfigError;

const DEFAULT_BIND_PORT: u16 = 6000;
const DEFAULT_PUSH_PULL_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_REST_API_PROTO: &str = "http";
const DEFAULT_REST_API_PORT: u16 = 8181;
const DEFAULT_REST_API_INSECURE_SKIP_VERIFY: &str = "true";
const FALLBACK_IP: &str = "127.0.0.1";

/// Cluster membership configuration
///
/// Deserializes through the same key-by-key overlay as
/// [`merge_json`](TribeConfig::merge_json), so a config file gets the same
/// defaults and the same field-naming errors.
#[derive(Debug, Clone, Serialize)]
pub struct TribeConfig {
    /// Node name advertised to peers
    pub name: String,

    /// Join a tribe at all
    pub enable: bool,

    /// Address the gossip listener binds to
    pub bind_addr: String,

    /// Port the gossip listener binds to
    pub bind_port: u16,

    /// Peer to contact when joining
    pub seed: String,

    /// Full state sync interval
    #[serde(skip)]
    pub push_pull_interval: Duration,

    #[serde(skip)]
    pub rest_api_proto: String,

    #[serde(skip)]
    pub rest_api_password: String,

    #[serde(skip)]
    pub rest_api_port: u16,

    #[serde(skip)]
    pub rest_api_insecure_skip_verify: String,
}

impl Default for TribeConfig {
    fn default() -> Self {
        Self {
            name: hostname(),
            enable: false,
            bind_addr: local_ipv4(),
            bind_port: DEFAULT_BIND_PORT,
            seed: String::new(),
            push_pull_interval: DEFAULT_PUSH_PULL_INTERVAL,
            rest_api_proto: DEFAULT_REST_API_PROTO.to_string(),
            rest_api_password: String::new(),
            rest_api_port: DEFAULT_REST_API_PORT,
            rest_api_insecure_skip_verify: DEFAULT_REST_API_INSECURE_SKIP_VERIFY.to_string(),
        }
    }
}

impl TribeConfig {
    /// Overlays the keys present in a JSON object onto this config
    ///
    /// Unknown keys are ignored. A value of the wrong type fails with an
    /// error naming the key.
    pub fn merge_json(&mut self, data: &str) -> Result<(), ConfigError> {
        let fields: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(data).map_err(|e| ConfigError::Parse(e.to_string()))?;

        self.merge_fields(fields)
    }

    fn merge_fields(
        &mut self,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ConfigError> {
        for (key, value) in fields {
            match key.as_str() {
                "name" => self.name = field(&key, value)?,
                "enable" => self.enable = field(&key, value)?,
                "bind_addr" => self.bind_addr = field(&key, value)?,
                "bind_port" => self.bind_port = field(&key, value)?,
                "seed" => self.seed = field(&key, value)?,
                _ => {}
            }
        }

        Ok(())
    }
}

impl<'de> Deserialize<'de> for TribeConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;

        let mut config = TribeConfig::default();
        config.merge_fields(fields).map_err(de::Error::custom)?;
        Ok(config)
    }
}

fn field<T: de::DeserializeOwned>(
    key: &str,
    value: serde_json::Value,
) -> Result<T, ConfigError> {
    serde_json::from_value(value).map_err(|e| ConfigError::Field {
        section: "tribe".to_string(),
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Host name, or a random UUID if it cannot be determined
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// IPv4 address this host uses for outbound traffic, or 127.0.0.1
///
/// Interfaces are not enumerated: on a multi-homed host this is the address
/// of the default route, not necessarily the first interface listed. Without
/// a default route the loopback fallback is used.
fn local_ipv4() -> String {
    match outbound_ipv4() {
        Ok(Some(ip)) => ip.to_string(),
        Ok(None) => FALLBACK_IP.to_string(),
        Err(e) => {
            error!(block = "local_ipv4", error = %e, "failed to determine local address");
            FALLBACK_IP.to_string()
        }
    }
}

// Connecting a UDP socket sends nothing; it only asks the OS which local
// address routes outward.
fn outbound_ipv4() -> std::io::Result<Option<Ipv4Addr>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(Some(ip)),
        _ => Ok(None),
    }
}
