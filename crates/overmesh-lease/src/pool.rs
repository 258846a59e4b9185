//! CIDR pool for overlay subnet allocation
//!
//! Enumerates the allocatable overlay subnets inside a network range. The
//! pool never tracks which entries are in use: callers pass the taken set
//! explicitly, and the lease store remains the only allocation state.
//!
//! Layout of a range split into `n` blocks:
//!
//! ```text
//! [0] boundary | [1 .. n-1-k) block pool | [n-1-k .. n-1) single-ip pool | [n-1] boundary
//! ```
//!
//! where `k` is the number of blocks reserved for single-IP leases. Each
//! reserved block contributes its host addresses (network and broadcast
//! excluded) as `/32` entries.

use std::collections::HashSet;

use ipnet::Ipv4Net;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LeaseError, Result};

/// Longest block prefix that still leaves host addresses inside a block
pub const MAX_BLOCK_PREFIX_LEN: u8 = 30;

/// Prefix length of single-IP pool entries
pub const SINGLE_IP_PREFIX_LEN: u8 = 32;

/// Immutable enumeration of allocatable overlay subnets
#[derive(Debug)]
pub struct CidrPool {
    /// Configured overlay network range
    network: Ipv4Net,
    /// Prefix length of block entries
    block_prefix_len: u8,
    /// Block partition, ascending
    blocks: Vec<Ipv4Net>,
    /// Single-IP partition, ascending
    single_ips: Vec<Ipv4Net>,
    /// Union of both partitions
    members: HashSet<Ipv4Net>,
    /// Selection source
    rng: Mutex<StdRng>,
}

impl CidrPool {
    /// Create a pool seeded from the operating system's entropy source
    ///
    /// # Arguments
    /// * `network` - Overlay network range (e.g., "10.255.0.0/16")
    /// * `block_prefix_len` - Prefix length of each block lease (e.g., 24)
    /// * `single_ip_blocks` - Number of blocks reserved for single-IP leases
    ///
    /// # Example
    /// ```
    /// use overmesh_lease::pool::CidrPool;
    ///
    /// let pool = CidrPool::new("10.255.0.0/16", 24, 0).unwrap();
    /// assert_eq!(pool.block_pool_size(), 254);
    /// ```
    pub fn new(network: &str, block_prefix_len: u8, single_ip_blocks: u32) -> Result<Self> {
        Self::with_rng(
            network,
            block_prefix_len,
            single_ip_blocks,
            StdRng::from_os_rng(),
        )
    }

    /// Create a pool with an explicit random source
    pub fn with_rng(
        network: &str,
        block_prefix_len: u8,
        single_ip_blocks: u32,
        rng: StdRng,
    ) -> Result<Self> {
        let network: Ipv4Net = network
            .parse()
            .map_err(|e| LeaseError::InvalidCidr(format!("{}: {}", network, e)))?;
        let network = network.trunc();

        let invalid_prefix = || LeaseError::InvalidPrefix {
            network: network.to_string(),
            prefix: block_prefix_len,
        };

        if block_prefix_len < network.prefix_len() || block_prefix_len > MAX_BLOCK_PREFIX_LEN {
            return Err(invalid_prefix());
        }

        let all_blocks: Vec<Ipv4Net> = network
            .subnets(block_prefix_len)
            .map_err(|_| invalid_prefix())?
            .collect();

        // Drop the boundary blocks on both ends of the range
        let usable = match all_blocks.len() {
            0..=2 => return Err(invalid_prefix()),
            n => &all_blocks[1..n - 1],
        };

        let reserved = single_ip_blocks as usize;
        if reserved > usable.len() {
            return Err(LeaseError::ReservationTooLarge {
                network: network.to_string(),
                requested: single_ip_blocks,
                available: usable.len() as u32,
            });
        }

        let (block_part, single_part) = usable.split_at(usable.len() - reserved);
        let blocks = block_part.to_vec();
        let single_ips: Vec<Ipv4Net> = single_part
            .iter()
            .flat_map(|block| block.hosts())
            .map(|ip| Ipv4Net::new_assert(ip, SINGLE_IP_PREFIX_LEN))
            .collect();

        let members = blocks.iter().chain(single_ips.iter()).copied().collect();

        Ok(Self {
            network,
            block_prefix_len,
            blocks,
            single_ips,
            members,
            rng: Mutex::new(rng),
        })
    }

    /// Number of entries in the block partition
    pub fn block_pool_size(&self) -> usize {
        self.blocks.len()
    }

    /// Number of entries in the single-IP partition
    pub fn single_pool_size(&self) -> usize {
        self.single_ips.len()
    }

    /// Pick a block not present in `taken`
    ///
    /// Returns `None` when every block is taken.
    pub fn get_available_block(&self, taken: &HashSet<Ipv4Net>) -> Option<Ipv4Net> {
        self.pick(&self.blocks, taken)
    }

    /// Pick a single-IP entry not present in `taken`
    ///
    /// Returns `None` when every single-IP entry is taken.
    pub fn get_available_single_ip(&self, taken: &HashSet<Ipv4Net>) -> Option<Ipv4Net> {
        self.pick(&self.single_ips, taken)
    }

    /// Check whether `subnet` is exactly one of the pool entries
    ///
    /// Unparsable input is never a member.
    pub fn is_member(&self, subnet: &str) -> bool {
        subnet
            .parse::<Ipv4Net>()
            .map(|net| self.members.contains(&net))
            .unwrap_or(false)
    }

    /// Get the overlay network range
    pub fn network(&self) -> Ipv4Net {
        self.network
    }

    /// Get the block prefix length
    pub fn block_prefix_len(&self) -> u8 {
        self.block_prefix_len
    }

    /// Iterate the block partition in ascending order
    pub fn blocks(&self) -> impl Iterator<Item = &Ipv4Net> {
        self.blocks.iter()
    }

    /// Iterate the single-IP partition in ascending order
    pub fn single_ips(&self) -> impl Iterator<Item = &Ipv4Net> {
        self.single_ips.iter()
    }

    fn pick(&self, entries: &[Ipv4Net], taken: &HashSet<Ipv4Net>) -> Option<Ipv4Net> {
        let available: Vec<Ipv4Net> = entries
            .iter()
            .filter(|entry| !taken.contains(entry))
            .copied()
            .collect();

        if available.is_empty() {
            return None;
        }

        let index = self.rng.lock().random_range(0..available.len());
        Some(available[index])
    }
}
