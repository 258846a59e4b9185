//! Daemon configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use overmesh_lease::parse_underlay_ip;
use overmesh_observability::ObservabilityConfig;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::vtep::{DEFAULT_MTU, DEFAULT_VNI, DEFAULT_VTEP_NAME};

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// This host's underlay IPv4 address
    #[serde(default)]
    pub underlay_ip: String,

    /// Base URL of the controller
    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// Request a single overlay address instead of a block
    #[serde(default)]
    pub single_ip_only: bool,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// How long renewals may fail before the daemon gives up
    #[serde(default = "default_partition_tolerance_seconds")]
    pub partition_tolerance_seconds: u64,

    /// Per-request timeout towards the controller
    #[serde(default = "default_client_timeout_seconds")]
    pub client_timeout_seconds: u64,

    #[serde(default = "default_vtep_name")]
    pub vtep_name: String,

    #[serde(default = "default_vni")]
    pub vni: u32,

    #[serde(default = "default_mtu")]
    pub mtu: u32,

    /// Directory holding the persisted lease
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Bind address of the local health endpoint
    #[serde(default = "default_health_listen_addr")]
    pub health_listen_addr: SocketAddr,

    /// Release the lease when stopped by a signal
    #[serde(default)]
    pub release_on_shutdown: bool,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_controller_url() -> String {
    "http://127.0.0.1:4103".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_partition_tolerance_seconds() -> u64 {
    30 * 60
}

fn default_client_timeout_seconds() -> u64 {
    5
}

fn default_vtep_name() -> String {
    DEFAULT_VTEP_NAME.to_string()
}

fn default_vni() -> u32 {
    DEFAULT_VNI
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/overmesh")
}

fn default_health_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4104))
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            underlay_ip: String::new(),
            controller_url: default_controller_url(),
            single_ip_only: false,
            poll_interval_seconds: default_poll_interval_seconds(),
            partition_tolerance_seconds: default_partition_tolerance_seconds(),
            client_timeout_seconds: default_client_timeout_seconds(),
            vtep_name: default_vtep_name(),
            vni: default_vni(),
            mtu: default_mtu(),
            data_dir: default_data_dir(),
            health_listen_addr: default_health_listen_addr(),
            release_on_shutdown: false,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn partition_tolerance(&self) -> Duration {
        Duration::from_secs(self.partition_tolerance_seconds)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        parse_underlay_ip(&self.underlay_ip)
            .map_err(|e| AgentError::Configuration(format!("underlay_ip: {}", e)))?;

        if !(self.controller_url.starts_with("http://") || self.controller_url.starts_with("https://")) {
            return Err(AgentError::Configuration(format!(
                "controller_url '{}' must be an http(s) URL",
                self.controller_url
            )));
        }
        if self.poll_interval_seconds == 0 {
            return Err(AgentError::Configuration(
                "poll_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.vtep_name.is_empty() {
            return Err(AgentError::Configuration(
                "vtep_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
