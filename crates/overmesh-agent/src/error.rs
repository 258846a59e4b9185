//! Agent-specific errors

use overmesh_lease::{ErrorKind, LeaseError};
use thiserror::Error;

/// Errors from talking to the controller
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Controller refused the lease (409)
    #[error("Lease rejected by controller: {0}")]
    Rejected(String),

    /// Any other non-success response
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Rejected(_) => ErrorKind::NonRetriable,
            ClientError::Http(_) | ClientError::Api { .. } | ClientError::Deserialize(_) => {
                ErrorKind::Transient
            }
        }
    }
}

/// Errors from installing routes
#[derive(Debug, Error)]
pub enum RouteError {
    /// The routing command could not be started
    #[error("Failed to run {cmd}: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    /// The routing command exited non-zero
    #[error("Command {cmd} failed: {stderr}")]
    Command { cmd: String, stderr: String },
}

/// Errors from one convergence pass
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// A lease carried an unparsable overlay subnet
    #[error("lease for {underlay_ip} has invalid overlay subnet '{subnet}'")]
    InvalidSubnet { underlay_ip: String, subnet: String },

    #[error("failed to replace route to {destination}: {source}")]
    Route {
        destination: String,
        #[source]
        source: RouteError,
    },

    /// A route to a subnet that left the active set could not be deleted
    #[error("failed to delete stale route to {destination}: {source}")]
    StaleRoute {
        destination: String,
        #[source]
        source: RouteError,
    },
}

/// Errors from one planner cycle
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Renewal failed in a way the agent cannot recover from in-process
    #[error("fatal renew failure: {0}")]
    Fatal(#[source] ClientError),

    #[error("failed to renew lease: {0}")]
    Renew(#[source] ClientError),

    #[error("failed to fetch active leases: {0}")]
    FetchLeases(#[source] ClientError),

    #[error("failed to converge routes: {0}")]
    Converge(#[from] ConvergeError),
}

impl PlannerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlannerError::Fatal(_) => ErrorKind::Fatal,
            _ => ErrorKind::Transient,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Invalid lease: {0}")]
    Lease(#[from] LeaseError),

    /// Persisted lease state could not be read or written
    #[error("Lease state error: {0}")]
    State(String),

    /// Configuration error (missing or invalid configuration)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The health server task panicked or was cancelled
    #[error("Health server error: {0}")]
    HealthServer(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Client(e) => e.kind(),
            AgentError::Planner(e) => e.kind(),
            AgentError::Lease(e) => e.kind(),
            AgentError::Configuration(_) => ErrorKind::Validation,
            AgentError::State(_) | AgentError::Io(_) => ErrorKind::Storage,
            AgentError::HealthServer(_) => ErrorKind::Fatal,
        }
    }
}

/// Result type for agent operations
pub type Result<T, E = AgentError> = std::result::Result<T, E>;
