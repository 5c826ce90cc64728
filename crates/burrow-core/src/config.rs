//! Configuration system for burrow.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BURROW_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/burrow/config.toml
//!   3. ~/.config/burrow/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::wire::{DEFAULT_SECRET, PEER_RENDEZVOUS};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BurrowConfig {
    pub rendezvous: RendezvousConfig,
    pub server: ServerConfig,
    pub network: NetworkConfig,
    pub nat: NatConfig,
    pub tunnel: TunnelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Base URL of the rendezvous API, without a trailing slash.
    pub server_url: String,
    /// Shared secret. Only its digest goes over the wire.
    pub secret: String,
    /// Group name this peer advertises under.
    pub namespace: String,
    /// Stable handle for this peer. Empty = random per run.
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port for the rendezvous API (server mode only).
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Listen address for peer-to-peer streams.
    pub listen_addr: String,
    /// Address advertised in place of loopback binds. Empty = look it up.
    pub public_ip: String,
    pub reachability: ReachabilityMode,
}

/// How the host classifies its own reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReachabilityMode {
    /// Stay `Unknown` until something reports a classification.
    #[default]
    Auto,
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatConfig {
    /// Seconds to wait after going private before re-advertising.
    pub settle_secs: u64,
    /// Keep watching after the first private transition.
    pub rearm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// SOCKS5 ingress listen address. Empty = no ingress.
    pub socks_addr: String,
    /// Fingerprint of the exit peer. Empty = dial targets directly.
    pub exit_fingerprint: String,
    /// Seconds the surviving direction may keep flushing after the other ends.
    pub linger_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            secret: DEFAULT_SECRET.into(),
            namespace: PEER_RENDEZVOUS.into(),
            fingerprint: String::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { api_port: 8080 }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4001".into(),
            public_ip: String::new(),
            reachability: ReachabilityMode::Auto,
        }
    }
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            settle_secs: 5,
            rearm: false,
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            socks_addr: String::new(),
            exit_fingerprint: String::new(),
            linger_secs: 5,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("burrow")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BurrowConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read one file, falling back to defaults when it does not exist.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BURROW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        Self::write_default_to(&path)?;
        Ok(path)
    }

    fn write_default_to(path: &Path) -> Result<(), ConfigError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text =
            toml::to_string_pretty(&Self::default()).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(path, text).map_err(|e| ConfigError::WriteFailed(path.to_path_buf(), e))
    }

    /// Reject configurations the daemon cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rendezvous.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rendezvous.server_url is empty"));
        }
        if self.rendezvous.secret.is_empty() {
            return Err(ConfigError::Invalid("rendezvous.secret is empty"));
        }
        Ok(())
    }

    /// Apply BURROW_* overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = lookup("BURROW_RENDEZVOUS__SERVER_URL") {
            self.rendezvous.server_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("BURROW_RENDEZVOUS__SECRET") {
            self.rendezvous.secret = v;
        }
        if let Some(v) = lookup("BURROW_RENDEZVOUS__NAMESPACE") {
            self.rendezvous.namespace = v;
        }
        if let Some(v) = lookup("BURROW_RENDEZVOUS__FINGERPRINT") {
            self.rendezvous.fingerprint = v;
        }
        if let Some(p) = lookup("BURROW_SERVER__API_PORT").and_then(|v| v.parse().ok()) {
            self.server.api_port = p;
        }
        if let Some(v) = lookup("BURROW_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = lookup("BURROW_NETWORK__PUBLIC_IP") {
            self.network.public_ip = v;
        }
        if let Some(v) = lookup("BURROW_NETWORK__REACHABILITY") {
            match v.as_str() {
                "public" => self.network.reachability = ReachabilityMode::Public,
                "private" => self.network.reachability = ReachabilityMode::Private,
                "auto" => self.network.reachability = ReachabilityMode::Auto,
                _ => {}
            }
        }
        if let Some(s) = lookup("BURROW_NAT__SETTLE_SECS").and_then(|v| v.parse().ok()) {
            self.nat.settle_secs = s;
        }
        if let Some(v) = lookup("BURROW_NAT__REARM") {
            self.nat.rearm = flag(v);
        }
        if let Some(v) = lookup("BURROW_TUNNEL__SOCKS_ADDR") {
            self.tunnel.socks_addr = v;
        }
        if let Some(v) = lookup("BURROW_TUNNEL__EXIT_FINGERPRINT") {
            self.tunnel.exit_fingerprint = v;
        }
        if let Some(s) = lookup("BURROW_TUNNEL__LINGER_SECS").and_then(|v| v.parse().ok()) {
            self.tunnel.linger_secs = s;
        }
    }
}
