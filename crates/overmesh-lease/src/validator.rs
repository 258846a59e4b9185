//! Structural lease validation
//!
//! Only checks that each field parses. Uniqueness and pool membership are
//! the controller's concern.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::{LeaseError, Result};
use crate::hwaddr::HardwareAddr;
use crate::lease::Lease;

/// Validate a lease, returning the first malformed field
pub fn validate(lease: &Lease) -> Result<()> {
    lease
        .underlay_ip
        .parse::<IpAddr>()
        .map_err(|_| LeaseError::InvalidUnderlayIp(lease.underlay_ip.clone()))?;

    lease
        .overlay_subnet
        .parse::<IpNet>()
        .map_err(|_| LeaseError::InvalidOverlaySubnet(lease.overlay_subnet.clone()))?;

    lease.overlay_hardware_addr.parse::<HardwareAddr>()?;

    Ok(())
}
