use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, ensure};
use nullroute_resolver::exchange::Timeouts;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Environment variable overriding the config location.
pub const CONFIG_PATH_ENV: &str = "NULLROUTE_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// IP address to listen on for DNS queries.
    #[serde(default = "default_server_ip")]
    pub ip: IpAddr,
    /// UDP port; absent or 0 disables the UDP listener.
    #[serde(default)]
    pub udp_port: Option<u16>,
    /// TCP port; absent or 0 disables the TCP listener.
    #[serde(default)]
    pub tcp_port: Option<u16>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_tcp_idle_timeout_ms")]
    pub tcp_idle_timeout_ms: u64,
}

impl ServerConfig {
    pub fn udp_port(&self) -> Option<u16> {
        self.udp_port.filter(|&p| p > 0)
    }

    pub fn tcp_port(&self) -> Option<u16> {
        self.tcp_port.filter(|&p| p > 0)
    }

    pub fn tcp_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_idle_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            udp_port: Some(53),
            tcp_port: Some(53),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            tcp_idle_timeout_ms: default_tcp_idle_timeout_ms(),
        }
    }
}

/// How queries reach the upstream nameservers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
    /// DNS over TLS
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Queried round-robin in the given order.
    #[serde(default)]
    pub nameservers: Vec<IpAddr>,
    #[serde(default)]
    pub transport: Transport,
    /// Name checked against the upstream certificate; required for TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_server_name: Option<String>,
    /// Defaults to 53, or 853 for TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_timeout_ms")]
    pub dial_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn port(&self) -> u16 {
        match (self.port, self.transport) {
            (Some(port), _) => port,
            (None, Transport::Tls) => 853,
            (None, _) => 53,
        }
    }

    /// Nameserver addresses with duplicates removed, first occurrence kept.
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        let port = self.port();
        let mut addrs: Vec<SocketAddr> = Vec::with_capacity(self.nameservers.len());
        for ip in &self.nameservers {
            let addr = SocketAddr::new(*ip, port);
            if !addrs.contains(&addr) {
                addrs.push(addr);
            }
        }
        addrs
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.dial_timeout_ms),
            read: Duration::from_millis(self.read_timeout_ms),
            write: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            nameservers: vec![IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)), IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))],
            transport: Transport::default(),
            tls_server_name: None,
            port: None,
            dial_timeout_ms: default_timeout_ms(),
            read_timeout_ms: default_timeout_ms(),
            write_timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct BlocklistConfig {
    /// One pattern per line; no blocking when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Refuse to start on a malformed line instead of skipping it.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
}

impl Config {
    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.server.udp_port().is_some() || self.server.tcp_port().is_some(),
            "at least one port for TCP or UDP must be specified"
        );
        ensure!(!self.upstream.nameservers.is_empty(), "at least one nameserver required");

        if self.upstream.transport == Transport::Tls {
            match self.upstream.tls_server_name.as_deref() {
                Some(name) if !name.trim().is_empty() => {}
                _ => bail!("upstream.tls_server_name is required for the tls transport"),
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found")]
    NotFound,
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoding config: {0}")]
    Decode(String),
}

fn decode_from_path(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigError::NotFound,
        _ => ConfigError::Io(e),
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::Decode(e.message().into()))
}

/// Load the config, writing the default one to `config_path` if it is missing.
pub fn load_config(config_path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = config_path.as_ref();
    match decode_from_path(path) {
        Ok(cfg) => Ok(cfg),
        Err(ConfigError::NotFound) => create_default_config(path),
        Err(e) => Err(e.into()),
    }
}

pub fn create_default_config(path: &Path) -> anyhow::Result<Config> {
    let cfg = Config::default();
    let toml_str = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(cfg)
}

fn default_server_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_tcp_idle_timeout_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    2_000
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
