//! Overmesh Agent - per-host lease renewal and route convergence
//!
//! Each host runs one daemon that holds a lease from the controller and
//! keeps a route to every other host's overlay subnet through the local VTEP.
//!
//! ```text
//! Poller --tick--> ConvergencePlanner --renew/list--> ControllerClient
//!                          |
//!                          +--> RouteConverger --replace--> RoutingAdapter
//! ```
//!
//! Renewal failures are judged by the [`FatalErrorDetector`]; a fatal cycle
//! ends the poll loop so the process can exit and be restarted.

pub mod client;
pub mod config;
pub mod converger;
pub mod daemon;
pub mod discovery;
pub mod error;
pub mod fatal;
pub mod health;
pub mod planner;
pub mod poller;
pub mod routes;
pub mod state;
pub mod vtep;

pub use client::{ControllerClient, HttpControllerClient, MockControllerClient};
pub use config::DaemonConfig;
pub use converger::RouteConverger;
pub use daemon::Daemon;
pub use discovery::discover_lease;
pub use error::{AgentError, ClientError, ConvergeError, PlannerError, Result, RouteError};
pub use fatal::FatalErrorDetector;
pub use health::build_health_router;
pub use planner::ConvergencePlanner;
pub use poller::Poller;
pub use routes::{CommandRoutingAdapter, RecordingRoutingAdapter, Route, RoutingAdapter};
pub use state::LeaseState;
pub use vtep::VtepConfig;
