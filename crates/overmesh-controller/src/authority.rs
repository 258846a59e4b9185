//! Lease authority: acquire, renew and release overlay subnet leases
//!
//! The controller keeps no allocation state of its own. Each call reads the
//! store, asks the [`CidrPool`] for a free entry and inserts; concurrent
//! callers are serialized only by the store's unique constraints, so a lost
//! race shows up as a [`StoreError::Conflict`] and the attempt is retried.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnet::Ipv4Net;
use overmesh_lease::{parse_underlay_ip, validate, CidrPool, ErrorKind, Lease, LeaseError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::storage::{LeaseStore, StoreError};

/// Default lease expiration window (1 hour)
pub const DEFAULT_LEASE_EXPIRATION_SECS: i64 = 3600;

/// Default bound on allocation attempts per acquire call
pub const DEFAULT_MAX_ACQUIRE_ATTEMPTS: u32 = 10;

/// Errors returned by the lease authority
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Malformed underlay IP or lease
    #[error(transparent)]
    Validation(#[from] LeaseError),

    /// Renewed lease differs from the stored one
    #[error("lease mismatch for {underlay_ip}: stored {stored_subnet}, requested {requested_subnet}")]
    LeaseMismatch {
        underlay_ip: String,
        stored_subnet: String,
        requested_subnet: String,
    },

    /// Renew-as-acquire collided with another host's lease
    #[error("subnet {overlay_subnet} requested by {underlay_ip} is held by another host")]
    SubnetTaken {
        underlay_ip: String,
        overlay_subnet: String,
    },

    /// Pool exhausted and nothing to reclaim
    #[error("no lease available")]
    NoLeaseAvailable,

    /// Insert lost a race with a concurrent acquirer
    #[error("lease conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Validation(e) => e.kind(),
            ControllerError::LeaseMismatch { .. } | ControllerError::SubnetTaken { .. } => {
                ErrorKind::NonRetriable
            }
            ControllerError::NoLeaseAvailable | ControllerError::Conflict(_) => {
                ErrorKind::Transient
            }
            ControllerError::Store { source, .. } => source.kind(),
        }
    }
}

fn store_err(context: &'static str) -> impl FnOnce(StoreError) -> ControllerError {
    move |source| ControllerError::Store { context, source }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

/// The lease authority
pub struct LeaseController {
    store: Arc<dyn LeaseStore>,
    pool: Arc<CidrPool>,
    lease_expiration_secs: i64,
    max_acquire_attempts: u32,
}

impl LeaseController {
    pub fn new(store: Arc<dyn LeaseStore>, pool: Arc<CidrPool>) -> Self {
        Self {
            store,
            pool,
            lease_expiration_secs: DEFAULT_LEASE_EXPIRATION_SECS,
            max_acquire_attempts: DEFAULT_MAX_ACQUIRE_ATTEMPTS,
        }
    }

    /// Set the renewal window after which a lease is expired
    #[must_use]
    pub fn with_lease_expiration(mut self, secs: i64) -> Self {
        self.lease_expiration_secs = secs;
        self
    }

    /// Set the allocation attempt bound (at least one attempt is always made)
    #[must_use]
    pub fn with_max_acquire_attempts(mut self, attempts: u32) -> Self {
        self.max_acquire_attempts = attempts.max(1);
        self
    }

    pub fn pool(&self) -> &CidrPool {
        &self.pool
    }

    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    pub fn lease_expiration_secs(&self) -> i64 {
        self.lease_expiration_secs
    }

    /// Get or allocate the lease for `underlay_ip`
    ///
    /// Returns the stored lease unchanged when it is still a pool member.
    pub async fn acquire_subnet_lease(
        &self,
        underlay_ip: &str,
        single_overlay_ip: bool,
    ) -> Result<Lease> {
        let ip = parse_underlay_ip(underlay_ip)?;
        let key = ip.to_string();

        let mut last_err = ControllerError::NoLeaseAvailable;
        for attempt in 1..=self.max_acquire_attempts {
            match self.try_acquire(ip, single_overlay_ip).await {
                Ok(lease) => {
                    info!(
                        underlay_ip = %key,
                        subnet = %lease.overlay_subnet,
                        attempt,
                        "Acquired lease"
                    );
                    return Ok(lease);
                }
                Err(e) => {
                    debug!(underlay_ip = %key, attempt, error = %e, "Acquire attempt failed");
                    last_err = e;
                }
            }
        }

        warn!(
            underlay_ip = %key,
            attempts = self.max_acquire_attempts,
            error = %last_err,
            "Giving up on lease acquisition"
        );
        Err(last_err)
    }

    /// One allocation attempt
    ///
    /// The existing-lease check runs on every attempt so that a caller racing
    /// itself (two requests for one host) converges on the winner's lease.
    async fn try_acquire(&self, ip: Ipv4Addr, single_overlay_ip: bool) -> Result<Lease> {
        let key = ip.to_string();

        if let Some(existing) = self
            .store
            .lease_for_underlay_ip(&key)
            .await
            .map_err(store_err("failed to look up existing lease"))?
        {
            if self.pool.is_member(&existing.overlay_subnet) {
                debug!(underlay_ip = %key, subnet = %existing.overlay_subnet, "Returning existing lease");
                return Ok(existing);
            }

            warn!(
                underlay_ip = %key,
                subnet = %existing.overlay_subnet,
                "Existing lease is outside the pool, replacing it"
            );
            self.store
                .delete_entry(&key)
                .await
                .map_err(store_err("failed to delete stale lease"))?;
        }

        let held = if single_overlay_ip {
            self.store.all_single_ip_subnets().await
        } else {
            self.store.all_block_subnets().await
        }
        .map_err(store_err("failed to list leases"))?;

        let taken: HashSet<Ipv4Net> = held.iter().filter_map(|l| l.subnet().ok()).collect();

        let available = if single_overlay_ip {
            self.pool.get_available_single_ip(&taken)
        } else {
            self.pool.get_available_block(&taken)
        };

        let subnet = match available {
            Some(subnet) => subnet,
            None => self
                .reclaim_expired(single_overlay_ip)
                .await?
                .ok_or(ControllerError::NoLeaseAvailable)?,
        };

        let lease = Lease::new(ip, subnet);
        match self.store.add_entry(&lease).await {
            Ok(()) => Ok(lease),
            Err(StoreError::Conflict(msg)) => Err(ControllerError::Conflict(msg)),
            Err(e) => Err(store_err("failed to insert lease")(e)),
        }
    }

    /// Delete the oldest expired lease of the category and hand back its subnet
    async fn reclaim_expired(&self, single_overlay_ip: bool) -> Result<Option<Ipv4Net>> {
        let expired = if single_overlay_ip {
            self.store
                .oldest_expired_single_ip(self.lease_expiration_secs)
                .await
        } else {
            self.store
                .oldest_expired_block_subnet(self.lease_expiration_secs)
                .await
        }
        .map_err(store_err("failed to find expired lease"))?;

        let Some(expired) = expired else {
            return Ok(None);
        };

        let deleted = self
            .store
            .delete_expired_entry(&expired, self.lease_expiration_secs)
            .await
            .map_err(store_err("failed to delete expired lease"))?;
        if deleted == 0 {
            // Renewed or replaced since the lookup
            return Err(ControllerError::Conflict(format!(
                "expired lease of {} changed before it could be reclaimed",
                expired.underlay_ip
            )));
        }

        info!(
            underlay_ip = %expired.underlay_ip,
            subnet = %expired.overlay_subnet,
            "Reclaimed expired lease"
        );

        if !self.pool.is_member(&expired.overlay_subnet) {
            return Ok(None);
        }
        Ok(expired.subnet().ok())
    }

    /// Refresh a lease held by a daemon
    ///
    /// An unknown underlay IP is inserted as-is, which lets daemons recover
    /// after the store was wiped. A lease that differs from the stored one is
    /// rejected without touching storage.
    pub async fn renew_subnet_lease(&self, lease: &Lease) -> Result<()> {
        validate(lease)?;

        let stored = self
            .store
            .lease_for_underlay_ip(&lease.underlay_ip)
            .await
            .map_err(store_err("failed to look up lease"))?;

        let stored = match stored {
            Some(stored) => stored,
            None => match self.store.add_entry(lease).await {
                Ok(()) => {
                    info!(
                        underlay_ip = %lease.underlay_ip,
                        subnet = %lease.overlay_subnet,
                        "Renewed unknown lease as new entry"
                    );
                    return Ok(());
                }
                // A concurrent renew of the same lease may have won the insert
                Err(StoreError::Conflict(_)) => self
                    .store
                    .lease_for_underlay_ip(&lease.underlay_ip)
                    .await
                    .map_err(store_err("failed to look up lease"))?
                    .ok_or_else(|| ControllerError::SubnetTaken {
                        underlay_ip: lease.underlay_ip.clone(),
                        overlay_subnet: lease.overlay_subnet.clone(),
                    })?,
                Err(e) => return Err(store_err("failed to insert renewed lease")(e)),
            },
        };

        if stored != *lease {
            warn!(
                underlay_ip = %lease.underlay_ip,
                stored = %stored.overlay_subnet,
                requested = %lease.overlay_subnet,
                "Lease mismatch on renew"
            );
            return Err(ControllerError::LeaseMismatch {
                underlay_ip: lease.underlay_ip.clone(),
                stored_subnet: stored.overlay_subnet,
                requested_subnet: lease.overlay_subnet.clone(),
            });
        }

        self.store
            .renew_lease_for_underlay_ip(&lease.underlay_ip)
            .await
            .map_err(store_err("failed to renew lease"))?;

        let renewed_at = self
            .store
            .last_renewed_at_for_underlay_ip(&lease.underlay_ip)
            .await
            .map_err(store_err("failed to read renewal time"))?;

        debug!(
            underlay_ip = %lease.underlay_ip,
            subnet = %lease.overlay_subnet,
            renewed_at,
            "Renewed lease"
        );
        Ok(())
    }

    /// Drop the lease for `underlay_ip`; releasing an unknown host succeeds
    pub async fn release_subnet_lease(&self, underlay_ip: &str) -> Result<()> {
        let key = parse_underlay_ip(underlay_ip)?.to_string();

        let deleted = self
            .store
            .delete_entry(&key)
            .await
            .map_err(store_err("failed to release lease"))?;

        match deleted {
            0 => debug!(underlay_ip = %key, "No lease to release"),
            1 => info!(underlay_ip = %key, "Released lease"),
            n => warn!(
                underlay_ip = %key,
                rows = n,
                "Release removed more than one lease for a single underlay ip"
            ),
        }
        Ok(())
    }

    /// Leases renewed within the expiration window
    pub async fn routable_leases(&self) -> Result<Vec<Lease>> {
        self.store
            .all_active(self.lease_expiration_secs)
            .await
            .map_err(store_err("failed to list active leases"))
    }

    /// Every stored lease, expired ones included
    pub async fn all_leases(&self) -> Result<Vec<Lease>> {
        self.store
            .all()
            .await
            .map_err(store_err("failed to list leases"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryLeaseStore, ManualClock};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct Fixture {
        controller: LeaseController,
        store: Arc<InMemoryLeaseStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(network: &str, prefix: u8, single_ip_blocks: u32) -> Fixture {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(InMemoryLeaseStore::new().with_clock(clock.clone()));
        let pool = CidrPool::with_rng(network, prefix, single_ip_blocks, StdRng::seed_from_u64(7))
            .unwrap();
        let controller = LeaseController::new(store.clone(), Arc::new(pool))
            .with_lease_expiration(100)
            .with_max_acquire_attempts(5);
        Fixture {
            controller,
            store,
            clock,
        }
    }

    /// Delegating store that injects a concurrent writer at chosen points
    struct RacingStore {
        inner: Arc<InMemoryLeaseStore>,
        /// Renew the expired lease right after it is looked up for reclaim
        renew_after_expired_lookup: AtomicBool,
        /// Insert this lease just before the next `add_entry`
        insert_before_add: Mutex<Option<Lease>>,
    }

    impl RacingStore {
        fn new(inner: Arc<InMemoryLeaseStore>) -> Self {
            Self {
                inner,
                renew_after_expired_lookup: AtomicBool::new(false),
                insert_before_add: Mutex::new(None),
            }
        }
    }

    #[async_trait::async_trait]
    impl LeaseStore for RacingStore {
        async fn add_entry(&self, lease: &Lease) -> std::result::Result<(), StoreError> {
            let pending = self.insert_before_add.lock().unwrap().take();
            if let Some(pending) = pending {
                self.inner.add_entry(&pending).await?;
            }
            self.inner.add_entry(lease).await
        }

        async fn delete_entry(&self, underlay_ip: &str) -> std::result::Result<u64, StoreError> {
            self.inner.delete_entry(underlay_ip).await
        }

        async fn delete_expired_entry(
            &self,
            lease: &Lease,
            expiration_secs: i64,
        ) -> std::result::Result<u64, StoreError> {
            self.inner.delete_expired_entry(lease, expiration_secs).await
        }

        async fn lease_for_underlay_ip(
            &self,
            underlay_ip: &str,
        ) -> std::result::Result<Option<Lease>, StoreError> {
            self.inner.lease_for_underlay_ip(underlay_ip).await
        }

        async fn renew_lease_for_underlay_ip(
            &self,
            underlay_ip: &str,
        ) -> std::result::Result<(), StoreError> {
            self.inner.renew_lease_for_underlay_ip(underlay_ip).await
        }

        async fn last_renewed_at_for_underlay_ip(
            &self,
            underlay_ip: &str,
        ) -> std::result::Result<i64, StoreError> {
            self.inner.last_renewed_at_for_underlay_ip(underlay_ip).await
        }

        async fn all(&self) -> std::result::Result<Vec<Lease>, StoreError> {
            self.inner.all().await
        }

        async fn all_block_subnets(&self) -> std::result::Result<Vec<Lease>, StoreError> {
            self.inner.all_block_subnets().await
        }

        async fn all_single_ip_subnets(&self) -> std::result::Result<Vec<Lease>, StoreError> {
            self.inner.all_single_ip_subnets().await
        }

        async fn all_active(
            &self,
            expiration_secs: i64,
        ) -> std::result::Result<Vec<Lease>, StoreError> {
            self.inner.all_active(expiration_secs).await
        }

        async fn oldest_expired_block_subnet(
            &self,
            expiration_secs: i64,
        ) -> std::result::Result<Option<Lease>, StoreError> {
            let found = self.inner.oldest_expired_block_subnet(expiration_secs).await?;
            if let Some(lease) = &found {
                if self.renew_after_expired_lookup.swap(false, Ordering::SeqCst) {
                    self.inner
                        .renew_lease_for_underlay_ip(&lease.underlay_ip)
                        .await?;
                }
            }
            Ok(found)
        }

        async fn oldest_expired_single_ip(
            &self,
            expiration_secs: i64,
        ) -> std::result::Result<Option<Lease>, StoreError> {
            self.inner.oldest_expired_single_ip(expiration_secs).await
        }
    }

    fn racing_fixture(network: &str, prefix: u8) -> (LeaseController, Arc<RacingStore>, Fixture) {
        let f = fixture(network, prefix, 0);
        let racing = Arc::new(RacingStore::new(f.store.clone()));
        let pool = CidrPool::with_rng(network, prefix, 0, StdRng::seed_from_u64(7)).unwrap();
        let controller = LeaseController::new(racing.clone(), Arc::new(pool))
            .with_lease_expiration(100)
            .with_max_acquire_attempts(5);
        (controller, racing, f)
    }

    #[tokio::test]
    async fn test_acquire_returns_pool_member() {
        let f = fixture("10.255.0.0/16", 24, 0);

        let lease = f
            .controller
            .acquire_subnet_lease("192.168.1.10", false)
            .await
            .unwrap();

        assert_eq!(lease.underlay_ip, "192.168.1.10");
        assert!(f.controller.pool().is_member(&lease.overlay_subnet));
        assert!(!lease.is_single_ip());
        validate(&lease).unwrap();
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let f = fixture("10.255.0.0/16", 24, 0);

        let first = f
            .controller
            .acquire_subnet_lease("192.168.1.10", false)
            .await
            .unwrap();
        f.clock.advance(50);
        let second = f
            .controller
            .acquire_subnet_lease("192.168.1.10", false)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.all().await.unwrap().len(), 1);
        // No write: the timestamp is untouched
        assert_eq!(
            f.store
                .last_renewed_at_for_underlay_ip("192.168.1.10")
                .await
                .unwrap(),
            10_000
        );
    }

    #[tokio::test]
    async fn test_acquire_rejects_invalid_ip() {
        let f = fixture("10.255.0.0/16", 24, 0);

        for bad in ["", "banana", "fe80::1"] {
            let err = f
                .controller
                .acquire_subnet_lease(bad, false)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bad}");
        }
        assert!(f.store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_replaces_non_member_lease() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let outside = Lease::new(
            Ipv4Addr::new(192, 168, 1, 10),
            "10.1.0.0/24".parse().unwrap(),
        );
        f.store.add_entry(&outside).await.unwrap();

        let lease = f
            .controller
            .acquire_subnet_lease("192.168.1.10", false)
            .await
            .unwrap();

        assert_ne!(lease.overlay_subnet, "10.1.0.0/24");
        assert!(f.controller.pool().is_member(&lease.overlay_subnet));
        assert_eq!(f.store.all().await.unwrap(), vec![lease]);
    }

    #[tokio::test]
    async fn test_single_ip_acquire() {
        let f = fixture("10.255.0.0/16", 24, 1);

        let lease = f
            .controller
            .acquire_subnet_lease("192.168.1.10", true)
            .await
            .unwrap();

        assert!(lease.is_single_ip());
        assert!(f.controller.pool().is_member(&lease.overlay_subnet));
        assert_eq!(f.store.all_single_ip_subnets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_without_expired() {
        // /28 in /26 gives four blocks, two usable
        let f = fixture("10.255.0.0/26", 28, 0);

        f.controller.acquire_subnet_lease("10.0.0.1", false).await.unwrap();
        f.controller.acquire_subnet_lease("10.0.0.2", false).await.unwrap();

        let err = f
            .controller
            .acquire_subnet_lease("10.0.0.3", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NoLeaseAvailable));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_reclaims_oldest_expired() {
        let f = fixture("10.255.0.0/26", 28, 0);

        let old = f
            .controller
            .acquire_subnet_lease("10.0.0.1", false)
            .await
            .unwrap();
        f.clock.advance(60);
        f.controller.acquire_subnet_lease("10.0.0.2", false).await.unwrap();

        // Only the first lease has expired
        f.clock.advance(60);
        let lease = f
            .controller
            .acquire_subnet_lease("10.0.0.3", false)
            .await
            .unwrap();

        assert_eq!(lease.overlay_subnet, old.overlay_subnet);
        assert!(f
            .store
            .lease_for_underlay_ip("10.0.0.1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reclaim_spares_lease_renewed_meanwhile() {
        let (controller, racing, f) = racing_fixture("10.255.0.0/26", 28);

        let a = controller
            .acquire_subnet_lease("10.0.0.1", false)
            .await
            .unwrap();
        f.clock.advance(60);
        controller.acquire_subnet_lease("10.0.0.2", false).await.unwrap();
        f.clock.advance(60);

        // 10.0.0.1 is expired when found, but renews before the delete
        racing.renew_after_expired_lookup.store(true, Ordering::SeqCst);
        let err = controller
            .acquire_subnet_lease("10.0.0.3", false)
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::NoLeaseAvailable));
        assert_eq!(
            f.store.lease_for_underlay_ip("10.0.0.1").await.unwrap(),
            Some(a)
        );
        assert_eq!(
            f.store
                .last_renewed_at_for_underlay_ip("10.0.0.1")
                .await
                .unwrap(),
            10_120
        );
        assert!(f
            .store
            .lease_for_underlay_ip("10.0.0.3")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_renew_unknown_tolerates_concurrent_insert() {
        let (controller, racing, f) = racing_fixture("10.255.0.0/16", 24);
        let lease = Lease::new(Ipv4Addr::new(10, 0, 0, 5), "10.255.9.0/24".parse().unwrap());

        // An overlapping renew of the same lease wins the insert
        *racing.insert_before_add.lock().unwrap() = Some(lease.clone());
        f.clock.advance(5);
        controller.renew_subnet_lease(&lease).await.unwrap();

        assert_eq!(f.store.all().await.unwrap(), vec![lease]);
        assert_eq!(
            f.store
                .last_renewed_at_for_underlay_ip("10.0.0.5")
                .await
                .unwrap(),
            10_005
        );
    }

    #[tokio::test]
    async fn test_renew_unknown_loses_insert_to_other_lease() {
        let (controller, racing, f) = racing_fixture("10.255.0.0/16", 24);
        let lease = Lease::new(Ipv4Addr::new(10, 0, 0, 5), "10.255.9.0/24".parse().unwrap());
        let winner = Lease::new(Ipv4Addr::new(10, 0, 0, 5), "10.255.10.0/24".parse().unwrap());

        *racing.insert_before_add.lock().unwrap() = Some(winner.clone());
        let err = controller.renew_subnet_lease(&lease).await.unwrap_err();

        assert!(matches!(err, ControllerError::LeaseMismatch { .. }));
        assert_eq!(f.store.all().await.unwrap(), vec![winner]);
    }

    #[tokio::test]
    async fn test_renew_refreshes_timestamp() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let lease = f
            .controller
            .acquire_subnet_lease("10.0.0.1", false)
            .await
            .unwrap();

        f.clock.advance(90);
        f.controller.renew_subnet_lease(&lease).await.unwrap();

        assert_eq!(
            f.store
                .last_renewed_at_for_underlay_ip("10.0.0.1")
                .await
                .unwrap(),
            10_090
        );
    }

    #[tokio::test]
    async fn test_renew_mismatch_is_non_retriable() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let lease = f
            .controller
            .acquire_subnet_lease("10.0.0.1", false)
            .await
            .unwrap();

        let mut other = lease.clone();
        other.overlay_subnet = if lease.overlay_subnet == "10.255.7.0/24" {
            "10.255.8.0/24".to_string()
        } else {
            "10.255.7.0/24".to_string()
        };
        other.overlay_hardware_addr =
            overmesh_lease::generate_for_vtep(other.subnet().unwrap().network()).to_string();

        f.clock.advance(10);
        let err = f.controller.renew_subnet_lease(&other).await.unwrap_err();

        assert!(matches!(err, ControllerError::LeaseMismatch { .. }));
        assert!(err.kind().is_non_retriable());
        assert_eq!(f.store.all().await.unwrap(), vec![lease]);
        assert_eq!(
            f.store
                .last_renewed_at_for_underlay_ip("10.0.0.1")
                .await
                .unwrap(),
            10_000
        );
    }

    #[tokio::test]
    async fn test_renew_unknown_inserts() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let lease = Lease::new(Ipv4Addr::new(10, 0, 0, 5), "10.255.9.0/24".parse().unwrap());

        f.controller.renew_subnet_lease(&lease).await.unwrap();

        assert_eq!(f.controller.routable_leases().await.unwrap(), vec![lease]);
    }

    #[tokio::test]
    async fn test_renew_unknown_with_taken_subnet() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let held = f
            .controller
            .acquire_subnet_lease("10.0.0.1", false)
            .await
            .unwrap();

        let mut stolen = held.clone();
        stolen.underlay_ip = "10.0.0.2".to_string();

        let err = f.controller.renew_subnet_lease(&stolen).await.unwrap_err();
        assert!(matches!(err, ControllerError::SubnetTaken { .. }));
        assert_eq!(err.kind(), ErrorKind::NonRetriable);
    }

    #[tokio::test]
    async fn test_renew_invalid_lease() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let lease = Lease {
            underlay_ip: "10.0.0.1".to_string(),
            overlay_subnet: "not-a-cidr".to_string(),
            overlay_hardware_addr: "ee:ee:0a:ff:01:00".to_string(),
        };

        let err = f.controller.renew_subnet_lease(&lease).await.unwrap_err();
        assert!(err.kind().is_non_retriable());
        assert!(f.store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let f = fixture("10.255.0.0/16", 24, 0);
        f.controller.acquire_subnet_lease("10.0.0.1", false).await.unwrap();

        f.controller.release_subnet_lease("10.0.0.1").await.unwrap();
        f.controller.release_subnet_lease("10.0.0.1").await.unwrap();

        assert!(f.store.all().await.unwrap().is_empty());
        assert!(f.controller.release_subnet_lease("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_lease_not_routable_but_held() {
        let f = fixture("10.255.0.0/16", 24, 0);
        let stale = f
            .controller
            .acquire_subnet_lease("10.0.0.1", false)
            .await
            .unwrap();
        f.clock.advance(101);
        let fresh = f
            .controller
            .acquire_subnet_lease("10.0.0.2", false)
            .await
            .unwrap();

        assert_eq!(f.controller.routable_leases().await.unwrap(), vec![fresh]);
        assert_eq!(f.controller.all_leases().await.unwrap().len(), 2);

        // Still occupies its subnet until reclaimed
        let held = f.store.all_block_subnets().await.unwrap();
        assert!(held.contains(&stale));
    }
}
