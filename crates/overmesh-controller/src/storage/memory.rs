//! In-memory lease store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use overmesh_lease::Lease;
use tokio::sync::RwLock;

use super::{Clock, LeaseStore, StoreError, SystemClock};

#[derive(Debug, Clone)]
struct Row {
    id: u64,
    lease: Lease,
    last_renewed_at: i64,
}

#[derive(Debug, Default)]
struct Table {
    next_id: u64,
    rows: HashMap<String, Row>,
}

impl Table {
    fn sorted(&self) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.values().collect();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

/// In-memory storage for testing and single-process development
///
/// Enforces the same uniqueness rules as the SQLite store; the check and the
/// insert happen under one write lock.
pub struct InMemoryLeaseStore {
    table: RwLock<Table>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for renewal timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn set_last_renewed_at(&self, underlay_ip: &str, at: i64) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(underlay_ip)
            .ok_or_else(|| StoreError::NotFound(underlay_ip.to_string()))?;
        row.last_renewed_at = at;
        Ok(())
    }

    async fn select<F>(&self, pred: F) -> Vec<Lease>
    where
        F: Fn(&Row) -> bool,
    {
        let table = self.table.read().await;
        table
            .sorted()
            .into_iter()
            .filter(|r| pred(r))
            .map(|r| r.lease.clone())
            .collect()
    }

    async fn oldest<F>(&self, pred: F) -> Option<Lease>
    where
        F: Fn(&Row) -> bool,
    {
        let table = self.table.read().await;
        table
            .rows
            .values()
            .filter(|r| pred(r))
            .min_by_key(|r| (r.last_renewed_at, r.id))
            .map(|r| r.lease.clone())
    }
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn add_entry(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut table = self.table.write().await;

        if table.rows.contains_key(&lease.underlay_ip) {
            return Err(StoreError::Conflict(format!(
                "underlay_ip {} already leased",
                lease.underlay_ip
            )));
        }
        if let Some(row) = table.rows.values().find(|r| {
            r.lease.overlay_subnet == lease.overlay_subnet
                || r.lease.overlay_hardware_addr == lease.overlay_hardware_addr
        }) {
            return Err(StoreError::Conflict(format!(
                "overlay subnet {} already leased to {}",
                lease.overlay_subnet, row.lease.underlay_ip
            )));
        }

        table.next_id += 1;
        let row = Row {
            id: table.next_id,
            lease: lease.clone(),
            last_renewed_at: self.clock.now(),
        };
        table.rows.insert(lease.underlay_ip.clone(), row);
        Ok(())
    }

    async fn delete_entry(&self, underlay_ip: &str) -> Result<u64, StoreError> {
        let mut table = self.table.write().await;
        Ok(u64::from(table.rows.remove(underlay_ip).is_some()))
    }

    async fn delete_expired_entry(
        &self,
        lease: &Lease,
        expiration_secs: i64,
    ) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        let mut table = self.table.write().await;

        let expired = table
            .rows
            .get(&lease.underlay_ip)
            .is_some_and(|r| r.lease == *lease && r.last_renewed_at < cutoff);
        if !expired {
            return Ok(0);
        }

        table.rows.remove(&lease.underlay_ip);
        Ok(1)
    }

    async fn lease_for_underlay_ip(&self, underlay_ip: &str) -> Result<Option<Lease>, StoreError> {
        let table = self.table.read().await;
        Ok(table.rows.get(underlay_ip).map(|r| r.lease.clone()))
    }

    async fn renew_lease_for_underlay_ip(&self, underlay_ip: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.set_last_renewed_at(underlay_ip, now).await
    }

    async fn last_renewed_at_for_underlay_ip(&self, underlay_ip: &str) -> Result<i64, StoreError> {
        let table = self.table.read().await;
        table
            .rows
            .get(underlay_ip)
            .map(|r| r.last_renewed_at)
            .ok_or_else(|| StoreError::NotFound(underlay_ip.to_string()))
    }

    async fn all(&self) -> Result<Vec<Lease>, StoreError> {
        Ok(self.select(|_| true).await)
    }

    async fn all_block_subnets(&self) -> Result<Vec<Lease>, StoreError> {
        Ok(self.select(|r| !r.lease.is_single_ip()).await)
    }

    async fn all_single_ip_subnets(&self) -> Result<Vec<Lease>, StoreError> {
        Ok(self.select(|r| r.lease.is_single_ip()).await)
    }

    async fn all_active(&self, expiration_secs: i64) -> Result<Vec<Lease>, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        Ok(self.select(|r| r.last_renewed_at >= cutoff).await)
    }

    async fn oldest_expired_block_subnet(
        &self,
        expiration_secs: i64,
    ) -> Result<Option<Lease>, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        Ok(self
            .oldest(|r| r.last_renewed_at < cutoff && !r.lease.is_single_ip())
            .await)
    }

    async fn oldest_expired_single_ip(
        &self,
        expiration_secs: i64,
    ) -> Result<Option<Lease>, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        Ok(self
            .oldest(|r| r.last_renewed_at < cutoff && r.lease.is_single_ip())
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_set_last_renewed_at() {
        let store = InMemoryLeaseStore::new();
        let lease = Lease::new(Ipv4Addr::new(10, 0, 0, 1), "10.255.1.0/24".parse().unwrap());
        store.add_entry(&lease).await.unwrap();

        store.set_last_renewed_at("10.0.0.1", 42).await.unwrap();
        assert_eq!(
            store.last_renewed_at_for_underlay_ip("10.0.0.1").await.unwrap(),
            42
        );
        assert!(store.set_last_renewed_at("10.0.0.2", 1).await.is_err());
    }
}
