//! Overmesh Lease - shared lease model for the overlay control plane
//!
//! Everything here is pure and performs no I/O:
//!
//! - [`lease`] - The lease record exchanged over the wire and persisted by the controller
//! - [`validator`] - Structural lease validation
//! - [`hwaddr`] - VTEP hardware address type and derivation
//! - [`pool`] - Enumeration of allocatable overlay subnets
//! - [`error`] - Error types and the shared [`ErrorKind`] classification
//!
//! # Example
//!
//! ```
//! use std::collections::HashSet;
//! use overmesh_lease::{CidrPool, Lease};
//!
//! let pool = CidrPool::new("10.255.0.0/16", 24, 0).unwrap();
//! let subnet = pool.get_available_block(&HashSet::new()).unwrap();
//! let lease = Lease::new("192.168.1.10".parse().unwrap(), subnet);
//!
//! assert!(pool.is_member(&lease.overlay_subnet));
//! overmesh_lease::validate(&lease).unwrap();
//! ```

pub mod error;
pub mod hwaddr;
pub mod lease;
pub mod pool;
pub mod validator;

pub use error::{ErrorKind, LeaseError, Result};
pub use hwaddr::{generate_for_vtep, HardwareAddr, VTEP_HWADDR_PREFIX};
pub use lease::{is_single_ip_subnet, parse_underlay_ip, Lease};
pub use pool::CidrPool;
pub use validator::validate;
