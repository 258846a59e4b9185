//! Route installation through the host's routing table

use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::RouteError;

/// An on-link route to a peer's overlay subnet through the local VTEP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Net,
    /// The peer VTEP's overlay address
    pub gateway: Ipv4Addr,
    pub device: String,
    /// Local overlay address used as the preferred source
    pub source: Ipv4Addr,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} dev {} src {}",
            self.destination, self.gateway, self.device, self.source
        )
    }
}

/// Applies routes to the host
///
/// Implementations must be idempotent: replacing an identical route or
/// deleting an absent one is a no-op.
#[async_trait]
pub trait RoutingAdapter: Send + Sync {
    async fn replace_route(&self, route: &Route) -> Result<(), RouteError>;

    async fn delete_route(&self, route: &Route) -> Result<(), RouteError>;
}

/// Routing adapter that shells out to iproute2
#[derive(Debug, Clone)]
pub struct CommandRoutingAdapter {
    ip_binary: String,
}

impl CommandRoutingAdapter {
    pub fn new() -> Self {
        Self {
            ip_binary: "ip".to_string(),
        }
    }

    /// Use a different `ip` executable
    #[must_use]
    pub fn with_binary(mut self, ip_binary: impl Into<String>) -> Self {
        self.ip_binary = ip_binary.into();
        self
    }

    /// Arguments for `ip route replace ... onlink`
    pub fn replace_args(route: &Route) -> Vec<String> {
        vec![
            "route".to_string(),
            "replace".to_string(),
            route.destination.to_string(),
            "via".to_string(),
            route.gateway.to_string(),
            "dev".to_string(),
            route.device.clone(),
            "src".to_string(),
            route.source.to_string(),
            "onlink".to_string(),
        ]
    }

    /// Arguments for `ip route del`
    pub fn delete_args(route: &Route) -> Vec<String> {
        vec![
            "route".to_string(),
            "del".to_string(),
            route.destination.to_string(),
            "dev".to_string(),
            route.device.clone(),
        ]
    }

    async fn run_command(&self, args: &[String]) -> Result<(), RouteError> {
        let cmd = format!("{} {}", self.ip_binary, args.join(" "));
        let output = tokio::process::Command::new(&self.ip_binary)
            .args(args)
            .output()
            .await
            .map_err(|source| RouteError::Spawn {
                cmd: cmd.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RouteError::Command {
                cmd,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl Default for CommandRoutingAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoutingAdapter for CommandRoutingAdapter {
    async fn replace_route(&self, route: &Route) -> Result<(), RouteError> {
        debug!(%route, "Replacing route");
        self.run_command(&Self::replace_args(route)).await
    }

    async fn delete_route(&self, route: &Route) -> Result<(), RouteError> {
        debug!(%route, "Deleting route");
        match self.run_command(&Self::delete_args(route)).await {
            // Already gone
            Err(RouteError::Command { stderr, .. }) if stderr.contains("No such process") => Ok(()),
            other => other,
        }
    }
}

/// Routing adapter that records routes instead of applying them
#[derive(Debug, Default)]
pub struct RecordingRoutingAdapter {
    routes: Mutex<Vec<Route>>,
    deleted: Mutex<Vec<Route>>,
    fail_on: Mutex<Option<Ipv4Net>>,
}

impl RecordingRoutingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every replace or delete for `destination` fail
    pub fn fail_on(&self, destination: Ipv4Net) {
        *self.fail_on.lock() = Some(destination);
    }

    /// Stop failing calls
    pub fn clear_failure(&self) {
        *self.fail_on.lock() = None;
    }

    /// Routes replaced so far, in call order
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }

    /// Routes deleted so far, in call order
    pub fn deleted(&self) -> Vec<Route> {
        self.deleted.lock().clone()
    }

    fn check(&self, op: &str, route: &Route) -> Result<(), RouteError> {
        if *self.fail_on.lock() == Some(route.destination) {
            return Err(RouteError::Command {
                cmd: format!("ip route {op} {route}"),
                stderr: "RTNETLINK answers: Network is unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RoutingAdapter for RecordingRoutingAdapter {
    async fn replace_route(&self, route: &Route) -> Result<(), RouteError> {
        self.check("replace", route)?;
        self.routes.lock().push(route.clone());
        Ok(())
    }

    async fn delete_route(&self, route: &Route) -> Result<(), RouteError> {
        self.check("del", route)?;
        self.deleted.lock().push(route.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route {
            destination: "10.255.7.0/24".parse().unwrap(),
            gateway: Ipv4Addr::new(10, 255, 7, 0),
            device: "overmesh-vtep".to_string(),
            source: Ipv4Addr::new(10, 255, 30, 0),
        }
    }

    #[test]
    fn test_replace_args() {
        assert_eq!(
            CommandRoutingAdapter::replace_args(&route()).join(" "),
            "route replace 10.255.7.0/24 via 10.255.7.0 dev overmesh-vtep src 10.255.30.0 onlink"
        );
    }

    #[test]
    fn test_delete_args() {
        assert_eq!(
            CommandRoutingAdapter::delete_args(&route()).join(" "),
            "route del 10.255.7.0/24 dev overmesh-vtep"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let adapter = CommandRoutingAdapter::new().with_binary("/nonexistent/overmesh-ip");
        let err = adapter.replace_route(&route()).await.unwrap_err();
        assert!(matches!(err, RouteError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_failing_command_reports_stderr() {
        // `false` ignores its arguments and exits 1
        let adapter = CommandRoutingAdapter::new().with_binary("false");
        let err = adapter.replace_route(&route()).await.unwrap_err();
        assert!(matches!(err, RouteError::Command { .. }));
    }
}
