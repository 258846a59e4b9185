//! Error types for lease and pool operations

use thiserror::Error;

/// Broad classification shared by every Overmesh error type.
///
/// Callers branch on the kind instead of on concrete error types: the agent's
/// fatal error detector and the controller's HTTP layer both rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input; retrying the same request can never succeed
    Validation,
    /// The authority rejected the request (e.g. lease mismatch)
    NonRetriable,
    /// Contention or temporary exhaustion; a later attempt may succeed
    Transient,
    /// Storage or transport failure
    Storage,
    /// The agent must stop and be restarted by its supervisor
    Fatal,
}

impl ErrorKind {
    /// Whether callers must stop retrying the same request
    pub fn is_non_retriable(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::NonRetriable | ErrorKind::Fatal
        )
    }
}

/// Errors produced while parsing or validating lease data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseError {
    /// Underlay IP is not an IP address
    #[error("invalid underlay ip '{0}'")]
    InvalidUnderlayIp(String),

    /// Underlay IP parsed but is not IPv4
    #[error("underlay ip '{0}' is not an IPv4 address")]
    NotIpv4(String),

    /// Overlay subnet is not a CIDR
    #[error("invalid overlay subnet '{0}'")]
    InvalidOverlaySubnet(String),

    /// Hardware address is not a MAC address
    #[error("invalid overlay hardware address '{0}'")]
    InvalidHardwareAddr(String),

    /// Network range could not be parsed
    #[error("invalid network range: {0}")]
    InvalidCidr(String),

    /// Prefix length does not fit the network range
    #[error("invalid prefix length /{prefix} for network {network}")]
    InvalidPrefix { network: String, prefix: u8 },

    /// Single-IP reservation does not fit the network range
    #[error("cannot reserve {requested} single-ip blocks, only {available} usable blocks in {network}")]
    ReservationTooLarge {
        network: String,
        requested: u32,
        available: u32,
    },
}

impl LeaseError {
    /// Every lease error describes malformed input or configuration
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Result type alias for lease operations
pub type Result<T> = std::result::Result<T, LeaseError>;
