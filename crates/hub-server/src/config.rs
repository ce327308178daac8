//! Configuration for the hub server.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The binary applies its CLI flags last.
//!
//! - `HUB_BIND_ADDR`           (default: "0.0.0.0")
//! - `HUB_PORT`                (default: "1333")
//! - `HUB_WS_PATH`             (default: "/ws")
//! - `HUB_MAX_CLIENTS`         (default: "1024", 0 = unlimited)
//! - `HUB_ALLOWED_ORIGINS`     (comma separated, default: empty = any origin)
//! - `HUB_OUTBOUND_CAPACITY`   (default: "256")
//! - `HUB_EVENT_CAPACITY`      (default: "1024")
//! - `HUB_ANNOUNCE_PRESENCE`   (default: "false")
//! - `HUB_IDLE_TIMEOUT_SECS`   (default: "0", disabled)
//! - `HUB_HEARTBEAT_SECS`      (default: "0", disabled)
//! - `HUB_CLOSE_TIMEOUT_MS`    (default: "2000")
//! - `HUB_HANDSHAKE_TIMEOUT_MS` (default: "5000")
//! - `HUB_SHUTDOWN_TIMEOUT_MS` (default: "5000")

use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientConfig;
use crate::hub::HubConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid bind address {0:?}")]
    InvalidAddr(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Request path accepted for the WebSocket upgrade.
    pub ws_path: String,

    /// Maximum number of simultaneously connected clients (0 = unlimited).
    pub max_clients: usize,

    /// Origins allowed to upgrade. Empty accepts any origin.
    pub allowed_origins: Vec<String>,

    /// Per-client outbound queue capacity.
    pub outbound_capacity: usize,

    /// Capacity of the hub's event channel.
    pub event_capacity: usize,

    /// Send welcome/join/leave notifications.
    pub announce_presence: bool,

    /// Drop a client after this long without inbound frames (0 = never).
    pub idle_timeout_secs: u64,

    /// Ping idle clients at this interval (0 = never).
    pub heartbeat_interval_secs: u64,

    /// How long to wait for the peer to finish the close handshake.
    pub close_timeout_ms: u64,

    /// How long a new socket may take to complete the WebSocket upgrade.
    pub handshake_timeout_ms: u64,

    /// How long shutdown waits for clients to close.
    pub shutdown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 1333,
            ws_path: "/ws".to_string(),
            max_clients: 1024,
            allowed_origins: Vec::new(),
            outbound_capacity: 256,
            event_capacity: 1024,
            announce_presence: false,
            idle_timeout_secs: 0,
            heartbeat_interval_secs: 0,
            close_timeout_ms: 2000,
            handshake_timeout_ms: 5000,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()?.validate()
    }

    /// Optional TOML file, then environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.apply_env()?.validate()
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `HUB_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_vars(|key| env::var(key).ok())
    }

    /// Apply `HUB_*` variables from an arbitrary lookup.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HUB_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("HUB_WS_PATH") {
            self.ws_path = v;
        }
        if let Some(v) = lookup("HUB_ALLOWED_ORIGINS") {
            self.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        read_var(&lookup, "HUB_PORT", &mut self.port)?;
        read_var(&lookup, "HUB_MAX_CLIENTS", &mut self.max_clients)?;
        read_var(&lookup, "HUB_OUTBOUND_CAPACITY", &mut self.outbound_capacity)?;
        read_var(&lookup, "HUB_EVENT_CAPACITY", &mut self.event_capacity)?;
        read_var(&lookup, "HUB_IDLE_TIMEOUT_SECS", &mut self.idle_timeout_secs)?;
        read_var(&lookup, "HUB_HEARTBEAT_SECS", &mut self.heartbeat_interval_secs)?;
        read_var(&lookup, "HUB_CLOSE_TIMEOUT_MS", &mut self.close_timeout_ms)?;
        read_var(&lookup, "HUB_HANDSHAKE_TIMEOUT_MS", &mut self.handshake_timeout_ms)?;
        read_var(&lookup, "HUB_SHUTDOWN_TIMEOUT_MS", &mut self.shutdown_timeout_ms)?;

        if let Some(v) = lookup("HUB_ANNOUNCE_PRESENCE") {
            self.announce_presence = parse_flag(&v).ok_or(ConfigError::InvalidEnv {
                key: "HUB_ANNOUNCE_PRESENCE",
                value: v,
            })?;
        }

        Ok(self)
    }

    /// Reject values the hub cannot run with.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.bind_addr.parse::<IpAddr>().is_err() {
            return Err(ConfigError::InvalidAddr(self.bind_addr));
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Invalid("outbound_capacity must be > 0".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be > 0".into()));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid("handshake_timeout_ms must be > 0".into()));
        }
        // A healthy idle client must get at least one ping before it is cut.
        if self.idle_timeout_secs > 0
            && self.heartbeat_interval_secs > 0
            && self.idle_timeout_secs <= self.heartbeat_interval_secs
        {
            return Err(ConfigError::Invalid(format!(
                "idle_timeout_secs ({}) must exceed heartbeat_interval_secs ({})",
                self.idle_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/', got {:?}",
                self.ws_path
            )));
        }
        Ok(self)
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            event_capacity: self.event_capacity,
            announce_presence: self.announce_presence,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            outbound_capacity: self.outbound_capacity,
            idle_timeout: non_zero_secs(self.idle_timeout_secs),
            heartbeat_interval: non_zero_secs(self.heartbeat_interval_secs),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn read_var<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *slot = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value })?;
    }
    Ok(())
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
