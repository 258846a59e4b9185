//! Overlay hardware (MAC) addresses

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::LeaseError;

/// Locally administered prefix used for every VTEP hardware address
pub const VTEP_HWADDR_PREFIX: [u8; 2] = [0xee, 0xee];

/// A 48-bit MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareAddr([u8; 6]);

impl HardwareAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

/// Derive the VTEP hardware address for an overlay address
///
/// Pure function of the address: the fixed prefix followed by the four
/// octets of `overlay_ip`.
///
/// # Example
/// ```
/// use overmesh_lease::hwaddr::generate_for_vtep;
///
/// let mac = generate_for_vtep("10.255.30.0".parse().unwrap());
/// assert_eq!(mac.to_string(), "ee:ee:0a:ff:1e:00");
/// ```
pub fn generate_for_vtep(overlay_ip: Ipv4Addr) -> HardwareAddr {
    let [a, b, c, d] = overlay_ip.octets();
    HardwareAddr([VTEP_HWADDR_PREFIX[0], VTEP_HWADDR_PREFIX[1], a, b, c, d])
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for HardwareAddr {
    type Err = LeaseError;

    /// Accepts colon or dash separated hex octets, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LeaseError::InvalidHardwareAddr(s.to_string());

        let sep = if s.contains('-') { '-' } else { ':' };
        let mut octets = [0u8; 6];
        let mut count = 0;

        for part in s.split(sep) {
            if count == octets.len() || part.len() != 2 {
                return Err(invalid());
            }
            octets[count] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            count += 1;
        }

        if count != octets.len() {
            return Err(invalid());
        }

        Ok(Self(octets))
    }
}
