//! Overmesh Controller - overlay subnet lease authority
//!
//! Hands out overlay subnets to hosts identified by their underlay IP and
//! serves the set of active leases that daemons turn into routes.
//!
//! - [`authority`] - Acquire, renew, release and list leases
//! - [`storage`] - The lease store (SQLite or in-memory)
//! - [`usage`] - Periodic pool occupancy gauges
//! - [`router`], [`server`], [`handlers`] - The HTTP API
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use overmesh_controller::{LeaseController, SqliteLeaseStore};
//! use overmesh_lease::CidrPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteLeaseStore::open("/var/lib/overmesh").await?);
//! let pool = Arc::new(CidrPool::new("10.255.0.0/16", 24, 0)?);
//! let controller = LeaseController::new(store, pool);
//!
//! let lease = controller.acquire_subnet_lease("192.168.1.10", false).await?;
//! println!("{} -> {}", lease.underlay_ip, lease.overlay_subnet);
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod router;
pub mod server;
pub mod storage;
pub mod usage;

pub use authority::{ControllerError, LeaseController};
pub use config::{ConfigError, ControllerConfig};
pub use error::{ApiError, ErrorResponse};
pub use openapi::ApiDoc;
pub use router::build_router;
pub use server::ApiServer;
pub use storage::{InMemoryLeaseStore, LeaseStore, SqliteLeaseStore, StoreError};
pub use usage::{LeaseUsage, UsageReporter};
