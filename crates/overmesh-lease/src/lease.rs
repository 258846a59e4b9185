//! The lease record exchanged between controller and daemons

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{LeaseError, Result};
use crate::hwaddr::generate_for_vtep;

/// Binding of a host (underlay IP) to an overlay subnet
///
/// Fields are kept in their wire representation so that a malformed record
/// received from a peer or read from storage can still be carried around and
/// reported; use [`crate::validator::validate`] before trusting them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Lease {
    /// Host's real network address, the lease key
    #[schema(example = "192.168.1.10")]
    pub underlay_ip: String,
    /// Overlay range assigned to the host, in CIDR notation
    #[schema(example = "10.255.30.0/24")]
    pub overlay_subnet: String,
    /// VTEP hardware address derived from the subnet's network address
    pub overlay_hardware_addr: String,
}

impl Lease {
    /// Build a lease for `underlay_ip` on `subnet`, deriving the hardware address
    pub fn new(underlay_ip: Ipv4Addr, subnet: Ipv4Net) -> Self {
        Self {
            underlay_ip: underlay_ip.to_string(),
            overlay_subnet: subnet.to_string(),
            overlay_hardware_addr: generate_for_vtep(subnet.network()).to_string(),
        }
    }

    /// Parse the overlay subnet
    pub fn subnet(&self) -> Result<Ipv4Net> {
        self.overlay_subnet
            .parse()
            .map_err(|_| LeaseError::InvalidOverlaySubnet(self.overlay_subnet.clone()))
    }

    /// Whether this lease holds a single overlay address rather than a block
    pub fn is_single_ip(&self) -> bool {
        is_single_ip_subnet(&self.overlay_subnet)
    }
}

/// Single-IP leases are stored as host routes (`/32`)
pub fn is_single_ip_subnet(subnet: &str) -> bool {
    subnet.ends_with("/32")
}

/// Parse an underlay address, requiring IPv4
pub fn parse_underlay_ip(raw: &str) -> Result<Ipv4Addr> {
    match raw.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(ip)) => Ok(ip),
        Ok(std::net::IpAddr::V6(_)) => Err(LeaseError::NotIpv4(raw.to_string())),
        Err(_) => Err(LeaseError::InvalidUnderlayIp(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_hardware_addr() {
        let lease = Lease::new(
            Ipv4Addr::new(192, 168, 1, 10),
            "10.255.30.0/24".parse().unwrap(),
        );
        assert_eq!(lease.underlay_ip, "192.168.1.10");
        assert_eq!(lease.overlay_subnet, "10.255.30.0/24");
        assert_eq!(lease.overlay_hardware_addr, "ee:ee:0a:ff:1e:00");
        assert!(!lease.is_single_ip());
    }

    #[test]
    fn test_single_ip_lease() {
        let lease = Lease::new(
            Ipv4Addr::new(192, 168, 1, 10),
            "10.255.255.7/32".parse().unwrap(),
        );
        assert!(lease.is_single_ip());
        assert_eq!(lease.overlay_hardware_addr, "ee:ee:0a:ff:ff:07");
    }

    #[test]
    fn test_json_field_names() {
        let lease = Lease::new(
            Ipv4Addr::new(192, 168, 1, 10),
            "10.255.30.0/24".parse().unwrap(),
        );
        let json = serde_json::to_value(&lease).unwrap();
        assert_eq!(json["underlay_ip"], "192.168.1.10");
        assert_eq!(json["overlay_subnet"], "10.255.30.0/24");
        assert_eq!(json["overlay_hardware_addr"], "ee:ee:0a:ff:1e:00");
    }

    #[test]
    fn test_parse_underlay_ip() {
        assert!(parse_underlay_ip("10.0.0.1").is_ok());
        assert_eq!(
            parse_underlay_ip("::1"),
            Err(LeaseError::NotIpv4("::1".to_string()))
        );
        assert_eq!(
            parse_underlay_ip("banana"),
            Err(LeaseError::InvalidUnderlayIp("banana".to_string()))
        );
    }
}
