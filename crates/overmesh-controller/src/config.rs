//! Controller configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use overmesh_lease::pool::MAX_BLOCK_PREFIX_LEN;
use overmesh_observability::ObservabilityConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authority::{DEFAULT_LEASE_EXPIRATION_SECS, DEFAULT_MAX_ACQUIRE_ATTEMPTS};

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid network '{0}'")]
    InvalidNetwork(String),

    #[error("subnet_prefix_length {prefix} must be longer than the network prefix {network_prefix} and at most {max}")]
    InvalidPrefix {
        prefix: u8,
        network_prefix: u8,
        max: u8,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// HTTP bind address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// SQLite database file (or directory)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Overlay network range
    #[serde(default = "default_network")]
    pub network: String,

    /// Prefix length of each block lease
    #[serde(default = "default_subnet_prefix_length")]
    pub subnet_prefix_length: u8,

    /// Blocks at the top of the range reserved for single-IP leases
    #[serde(default)]
    pub single_ip_blocks: u32,

    /// Seconds without renewal after which a lease is expired
    #[serde(default = "default_lease_expiration_seconds")]
    pub lease_expiration_seconds: i64,

    /// Allocation attempts per acquire request
    #[serde(default = "default_max_acquire_attempts")]
    pub max_acquire_attempts: u32,

    /// Interval between lease usage reports
    #[serde(default = "default_metrics_emit_interval_seconds")]
    pub metrics_emit_interval_seconds: u64,

    /// Serve Swagger UI at /swagger-ui
    #[serde(default)]
    pub swagger_enabled: bool,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4103))
}

fn default_database_path() -> PathBuf {
    PathBuf::from("/var/lib/overmesh/leases.sqlite")
}

fn default_network() -> String {
    "10.255.0.0/16".to_string()
}

fn default_subnet_prefix_length() -> u8 {
    24
}

fn default_lease_expiration_seconds() -> i64 {
    DEFAULT_LEASE_EXPIRATION_SECS
}

fn default_max_acquire_attempts() -> u32 {
    DEFAULT_MAX_ACQUIRE_ATTEMPTS
}

fn default_metrics_emit_interval_seconds() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_path: default_database_path(),
            network: default_network(),
            subnet_prefix_length: default_subnet_prefix_length(),
            single_ip_blocks: 0,
            lease_expiration_seconds: default_lease_expiration_seconds(),
            max_acquire_attempts: default_max_acquire_attempts(),
            metrics_emit_interval_seconds: default_metrics_emit_interval_seconds(),
            swagger_enabled: false,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Check the values that deserialization cannot
    ///
    /// Pool layout errors (too few blocks, oversized reservation) are
    /// reported when the pool is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let network: ipnet::Ipv4Net = self
            .network
            .parse()
            .map_err(|_| ConfigError::InvalidNetwork(self.network.clone()))?;

        if self.subnet_prefix_length <= network.prefix_len()
            || self.subnet_prefix_length > MAX_BLOCK_PREFIX_LEN
        {
            return Err(ConfigError::InvalidPrefix {
                prefix: self.subnet_prefix_length,
                network_prefix: network.prefix_len(),
                max: MAX_BLOCK_PREFIX_LEN,
            });
        }
        if self.lease_expiration_seconds <= 0 {
            return Err(ConfigError::Zero("lease_expiration_seconds"));
        }
        if self.max_acquire_attempts == 0 {
            return Err(ConfigError::Zero("max_acquire_attempts"));
        }
        if self.metrics_emit_interval_seconds == 0 {
            return Err(ConfigError::Zero("metrics_emit_interval_seconds"));
        }
        Ok(())
    }
}
