//! Local VTEP settings derived from the host's lease

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use overmesh_lease::{HardwareAddr, Lease, LeaseError};

/// Default VTEP device name
pub const DEFAULT_VTEP_NAME: &str = "overmesh-vtep";

/// Default VXLAN network identifier
pub const DEFAULT_VNI: u32 = 1;

/// Default VTEP MTU (1500 minus VXLAN encapsulation)
pub const DEFAULT_MTU: u32 = 1450;

/// VTEP device configuration for the local host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtepConfig {
    /// Link name routes are installed on
    pub device_name: String,
    /// VXLAN network identifier
    pub vni: u32,
    pub mtu: u32,
    /// Overlay subnet leased to this host
    pub local_subnet: Ipv4Net,
    /// Address assigned to the VTEP (network address of the local subnet)
    pub overlay_ip: Ipv4Addr,
    /// VTEP link-layer address
    pub hardware_addr: HardwareAddr,
}

impl VtepConfig {
    pub fn from_lease(
        lease: &Lease,
        device_name: impl Into<String>,
        vni: u32,
        mtu: u32,
    ) -> Result<Self, LeaseError> {
        let local_subnet = lease.subnet()?;
        let hardware_addr: HardwareAddr = lease.overlay_hardware_addr.parse()?;

        Ok(Self {
            device_name: device_name.into(),
            vni,
            mtu,
            local_subnet,
            overlay_ip: local_subnet.network(),
            hardware_addr,
        })
    }
}
