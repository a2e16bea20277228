use pae_net::MacAddr;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::CoreError;

/// The log level for the application, corresponding to syslog levels.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Crit | LogLevel::Err => {
                tracing::Level::ERROR
            }
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Notice | LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

// Helper functions for default values
fn default_loglevel() -> LogLevel { LogLevel::Info }
fn default_interface() -> String { "eth0".to_string() }
fn default_group_address() -> String { "01:80:c2:00:00:03".to_string() }
fn default_radiuslisten() -> Ipv4Addr { Ipv4Addr::UNSPECIFIED }
fn default_radiusserver() -> Ipv4Addr { Ipv4Addr::LOCALHOST }
fn default_radiussecret() -> String { "testing123".to_string() }
fn default_radiusauthport() -> u16 { 1812 }
fn default_radiustimeout() -> u32 { 10 }
fn default_radiusretry() -> u32 { 3 }
fn default_max_clients() -> usize { 1024 }
fn default_client_idle_timeout() -> u64 { 3600 }

/// The main configuration for the authenticator.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_loglevel")]
    pub loglevel: LogLevel,

    /// Interface the raw link socket is bound to.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Destination of frames sent to supplicants.
    #[serde(default = "default_group_address")]
    pub group_address: String,

    #[serde(default = "default_radiuslisten")]
    pub radiuslisten: Ipv4Addr,
    /// Local RADIUS port, 0 picks an ephemeral one.
    #[serde(default)]
    pub radiuslistenport: u16,
    #[serde(default = "default_radiusserver")]
    pub radiusserver: Ipv4Addr,
    #[serde(default = "default_radiusauthport")]
    pub radiusauthport: u16,
    #[serde(default = "default_radiussecret")]
    pub radiussecret: String,
    /// Seconds before an unanswered Access-Request is retransmitted.
    #[serde(default = "default_radiustimeout")]
    pub radiustimeout: u32,
    #[serde(default = "default_radiusretry")]
    pub radiusretry: u32,

    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Seconds without traffic after which a client's state is dropped.
    #[serde(default = "default_client_idle_timeout")]
    pub client_idle_timeout: u64,

    /// Script run when a supplicant authenticates.
    pub conup: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            interface: default_interface(),
            group_address: default_group_address(),
            radiuslisten: default_radiuslisten(),
            radiuslistenport: 0,
            radiusserver: default_radiusserver(),
            radiusauthport: default_radiusauthport(),
            radiussecret: default_radiussecret(),
            radiustimeout: default_radiustimeout(),
            radiusretry: default_radiusretry(),
            max_clients: default_max_clients(),
            client_idle_timeout: default_client_idle_timeout(),
            conup: None,
        }
    }
}

impl Config {
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn group_mac(&self) -> Result<MacAddr, CoreError> {
        self.group_address
            .parse()
            .map_err(|_| CoreError::InvalidGroupAddress(self.group_address.clone()))
    }

    pub fn radius_server_addr(&self) -> SocketAddr {
        SocketAddr::from((self.radiusserver, self.radiusauthport))
    }

    pub fn radius_listen_addr(&self) -> SocketAddr {
        SocketAddr::from((self.radiuslisten, self.radiuslistenport))
    }

    pub fn radius_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.radiustimeout))
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_timeout)
    }
}
