//! Lease storage traits and implementations
//!
//! The store is the only allocation state and the only serialization point
//! between concurrent acquirers: every backend must reject an insert whose
//! underlay IP, overlay subnet or hardware address already exists, atomically.
//!
//! # Example
//!
//! ```no_run
//! use overmesh_controller::storage::{LeaseStore, SqliteLeaseStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteLeaseStore::open("/var/lib/overmesh/leases.sqlite").await?;
//! let active = store.all_active(3600).await?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod memory;
mod sqlite;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::InMemoryLeaseStore;
pub use sqlite::SqliteLeaseStore;

use async_trait::async_trait;
use overmesh_lease::{ErrorKind, Lease};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique key (underlay IP, overlay subnet or hardware address) is already taken
    #[error("Duplicate entry: {0}")]
    Conflict(String),

    /// No row for the given underlay IP
    #[error("No lease for underlay ip {0}")]
    NotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Conflict(_) => ErrorKind::Transient,
            StoreError::NotFound(_) | StoreError::Database(_) => ErrorKind::Storage,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Database handler for leases
///
/// Timestamps are unix seconds. A lease is *active* while
/// `now - last_renewed_at <= expiration_secs` and *expired* afterwards.
/// Single-IP leases are the rows whose subnet is a `/32`.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Insert a new lease, stamped as renewed now
    async fn add_entry(&self, lease: &Lease) -> Result<(), StoreError>;

    /// Delete the lease for `underlay_ip`, returning the number of rows removed
    async fn delete_entry(&self, underlay_ip: &str) -> Result<u64, StoreError>;

    /// Delete `lease` only if it is stored unchanged and still expired
    ///
    /// Returns 0 when the row was renewed, replaced or removed in the meantime.
    async fn delete_expired_entry(
        &self,
        lease: &Lease,
        expiration_secs: i64,
    ) -> Result<u64, StoreError>;

    /// Get the lease held by `underlay_ip`
    async fn lease_for_underlay_ip(&self, underlay_ip: &str) -> Result<Option<Lease>, StoreError>;

    /// Mark the lease for `underlay_ip` as renewed now
    async fn renew_lease_for_underlay_ip(&self, underlay_ip: &str) -> Result<(), StoreError>;

    /// Get the renewal timestamp of the lease for `underlay_ip`
    async fn last_renewed_at_for_underlay_ip(&self, underlay_ip: &str) -> Result<i64, StoreError>;

    /// Every stored lease, expired ones included
    async fn all(&self) -> Result<Vec<Lease>, StoreError>;

    /// Every stored block lease
    async fn all_block_subnets(&self) -> Result<Vec<Lease>, StoreError>;

    /// Every stored single-IP lease
    async fn all_single_ip_subnets(&self) -> Result<Vec<Lease>, StoreError>;

    /// Leases renewed within the last `expiration_secs`
    async fn all_active(&self, expiration_secs: i64) -> Result<Vec<Lease>, StoreError>;

    /// The block lease with the oldest renewal among expired ones
    async fn oldest_expired_block_subnet(
        &self,
        expiration_secs: i64,
    ) -> Result<Option<Lease>, StoreError>;

    /// The single-IP lease with the oldest renewal among expired ones
    async fn oldest_expired_single_ip(
        &self,
        expiration_secs: i64,
    ) -> Result<Option<Lease>, StoreError>;
}

#[cfg(test)]
mod tests {
    //! Behaviour shared by every backend, run against both implementations.

    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn lease(host: u8, subnet: &str) -> Lease {
        Lease::new(Ipv4Addr::new(10, 0, 0, host), subnet.parse().unwrap())
    }

    async fn backends(clock: Arc<ManualClock>) -> Vec<(&'static str, Box<dyn LeaseStore>)> {
        vec![
            (
                "memory",
                Box::new(InMemoryLeaseStore::new().with_clock(clock.clone())),
            ),
            (
                "sqlite",
                Box::new(
                    SqliteLeaseStore::in_memory()
                        .await
                        .unwrap()
                        .with_clock(clock.clone()),
                ),
            ),
        ]
    }

    #[tokio::test]
    async fn test_add_and_get() {
        for (name, store) in backends(Arc::new(ManualClock::new(1_000))).await {
            let l = lease(1, "10.255.1.0/24");
            store.add_entry(&l).await.unwrap();

            let got = store.lease_for_underlay_ip("10.0.0.1").await.unwrap();
            assert_eq!(got, Some(l), "{name}");
            assert_eq!(
                store.last_renewed_at_for_underlay_ip("10.0.0.1").await.unwrap(),
                1_000,
                "{name}"
            );
            assert!(store
                .lease_for_underlay_ip("10.0.0.9")
                .await
                .unwrap()
                .is_none());
        }
    }

    #[tokio::test]
    async fn test_unique_keys() {
        for (name, store) in backends(Arc::new(ManualClock::new(1_000))).await {
            store.add_entry(&lease(1, "10.255.1.0/24")).await.unwrap();

            // Same underlay ip
            let err = store.add_entry(&lease(1, "10.255.2.0/24")).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)), "{name}: {err}");

            // Same overlay subnet
            let err = store.add_entry(&lease(2, "10.255.1.0/24")).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)), "{name}: {err}");
            assert_eq!(err.kind(), ErrorKind::Transient);

            assert_eq!(store.all().await.unwrap().len(), 1, "{name}");
        }
    }

    #[tokio::test]
    async fn test_delete_reports_rows() {
        for (name, store) in backends(Arc::new(ManualClock::new(1_000))).await {
            store.add_entry(&lease(1, "10.255.1.0/24")).await.unwrap();

            assert_eq!(store.delete_entry("10.0.0.1").await.unwrap(), 1, "{name}");
            assert_eq!(store.delete_entry("10.0.0.1").await.unwrap(), 0, "{name}");
        }
    }

    #[tokio::test]
    async fn test_delete_expired_entry_only_while_expired() {
        let clock = Arc::new(ManualClock::new(0));
        for (name, store) in backends(clock.clone()).await {
            clock.set(1_000);
            let l = lease(1, "10.255.1.0/24");
            store.add_entry(&l).await.unwrap();

            // Not yet expired
            clock.set(1_050);
            assert_eq!(store.delete_expired_entry(&l, 100).await.unwrap(), 0, "{name}");

            // Expired, but renewed before the delete lands
            clock.set(1_200);
            store.renew_lease_for_underlay_ip("10.0.0.1").await.unwrap();
            assert_eq!(store.delete_expired_entry(&l, 100).await.unwrap(), 0, "{name}");

            // A different lease for the same host is left alone
            clock.set(1_400);
            let other = lease(1, "10.255.2.0/24");
            assert_eq!(store.delete_expired_entry(&other, 100).await.unwrap(), 0, "{name}");

            assert_eq!(store.delete_expired_entry(&l, 100).await.unwrap(), 1, "{name}");
            assert!(store.all().await.unwrap().is_empty(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_renew_updates_timestamp() {
        let clock = Arc::new(ManualClock::new(1_000));
        for (name, store) in backends(clock.clone()).await {
            clock.set(1_000);
            store.add_entry(&lease(1, "10.255.1.0/24")).await.unwrap();

            clock.advance(30);
            store.renew_lease_for_underlay_ip("10.0.0.1").await.unwrap();
            assert_eq!(
                store.last_renewed_at_for_underlay_ip("10.0.0.1").await.unwrap(),
                1_030,
                "{name}"
            );

            let err = store.renew_lease_for_underlay_ip("10.0.0.2").await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_categories() {
        for (name, store) in backends(Arc::new(ManualClock::new(1_000))).await {
            store.add_entry(&lease(1, "10.255.1.0/24")).await.unwrap();
            store.add_entry(&lease(2, "10.255.254.7/32")).await.unwrap();

            let blocks = store.all_block_subnets().await.unwrap();
            let singles = store.all_single_ip_subnets().await.unwrap();
            assert_eq!(blocks.len(), 1, "{name}");
            assert_eq!(blocks[0].overlay_subnet, "10.255.1.0/24");
            assert_eq!(singles.len(), 1, "{name}");
            assert_eq!(singles[0].overlay_subnet, "10.255.254.7/32");
        }
    }

    #[tokio::test]
    async fn test_active_and_expired() {
        let clock = Arc::new(ManualClock::new(0));
        for (name, store) in backends(clock.clone()).await {
            clock.set(1_000);
            store.add_entry(&lease(1, "10.255.1.0/24")).await.unwrap();
            clock.set(1_010);
            store.add_entry(&lease(2, "10.255.2.0/24")).await.unwrap();
            store.add_entry(&lease(3, "10.255.254.3/32")).await.unwrap();

            // Exactly at the window edge still counts as active
            clock.set(1_100);
            assert_eq!(store.all_active(100).await.unwrap().len(), 3, "{name}");
            assert!(store
                .oldest_expired_block_subnet(100)
                .await
                .unwrap()
                .is_none());

            clock.set(1_120);
            let active = store.all_active(100).await.unwrap();
            assert_eq!(active.len(), 0, "{name}");

            let oldest = store.oldest_expired_block_subnet(100).await.unwrap();
            assert_eq!(oldest.unwrap().underlay_ip, "10.0.0.1", "{name}");

            let single = store.oldest_expired_single_ip(100).await.unwrap();
            assert_eq!(single.unwrap().underlay_ip, "10.0.0.3", "{name}");

            // Expired rows are still stored
            assert_eq!(store.all().await.unwrap().len(), 3, "{name}");
        }
    }
}
