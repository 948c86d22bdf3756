//! src/config.rs
//!
//! Defines the strongly-typed `Config` struct for all runtime parameters,
//! loaded from a file and environment variables via `figment`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Top-level struct holding all application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub node_id: Option<String>,
    pub bind_addr: SocketAddr,
    pub peers: Vec<SocketAddr>,
    pub ack_timeout_ms: u64,
    pub ack_check_interval_ms: u64,
    pub max_retries: u32,
    pub anti_entropy_interval_ms: u64,
    pub peer_health_check_interval_ms: u64,
    pub peer_timeout_ms: u64,
    pub status_server: Option<StatusServerConfig>,
}

/// Configuration for the optional read-only status/introspection server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusServerConfig {
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Loads configuration from `config.toml` and `GOSSIP_`-prefixed
    /// environment variables, layered over `Config::default()`.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("GOSSIP_"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: None,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9001),
            peers: Vec::new(),
            ack_timeout_ms: 2000,
            ack_check_interval_ms: 1000,
            max_retries: 3,
            anti_entropy_interval_ms: 2000,
            peer_health_check_interval_ms: 5000,
            peer_timeout_ms: 15000,
            status_server: None,
        }
    }
}
