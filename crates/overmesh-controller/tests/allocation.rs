//! Allocation behaviour against the SQLite store

use std::collections::HashSet;
use std::sync::Arc;

use overmesh_controller::storage::ManualClock;
use overmesh_controller::{LeaseController, LeaseStore, SqliteLeaseStore};
use overmesh_lease::CidrPool;
use tempfile::TempDir;

async fn sqlite_controller(
    dir: &TempDir,
    network: &str,
    prefix: u8,
    clock: Arc<ManualClock>,
) -> (Arc<LeaseController>, Arc<SqliteLeaseStore>) {
    let store = Arc::new(
        SqliteLeaseStore::open(dir.path().join("leases.sqlite"))
            .await
            .unwrap()
            .with_clock(clock),
    );
    let pool = Arc::new(CidrPool::new(network, prefix, 0).unwrap());
    let controller = LeaseController::new(store.clone(), pool)
        .with_lease_expiration(100)
        .with_max_acquire_attempts(50);
    (Arc::new(controller), store)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_get_distinct_subnets() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    // 14 usable /28 blocks in a /24
    let (controller, store) = sqlite_controller(&dir, "10.255.0.0/24", 28, clock).await;

    let mut handles = Vec::new();
    for host in 1..=10u8 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller
                .acquire_subnet_lease(&format!("192.168.0.{host}"), false)
                .await
        }));
    }

    let mut subnets = HashSet::new();
    for handle in handles {
        let lease = handle.await.unwrap().unwrap();
        assert!(controller.pool().is_member(&lease.overlay_subnet));
        assert!(subnets.insert(lease.overlay_subnet), "subnet handed out twice");
    }

    let stored = store.all().await.unwrap();
    assert_eq!(stored.len(), 10);
    let stored_subnets: HashSet<_> = stored.into_iter().map(|l| l.overlay_subnet).collect();
    assert_eq!(stored_subnets, subnets);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_same_host_converge() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let (controller, store) = sqlite_controller(&dir, "10.255.0.0/16", 24, clock).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.acquire_subnet_lease("192.168.0.7", false).await
        }));
    }

    let mut leases = HashSet::new();
    for handle in handles {
        leases.insert(handle.await.unwrap().unwrap());
    }

    // Racing requests for one host all end up with the winner's lease
    assert_eq!(leases.len(), 1);
    assert_eq!(store.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reclamation_when_exhausted() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    // Two usable /26 blocks in a /24
    let (controller, store) = sqlite_controller(&dir, "10.255.0.0/24", 26, clock.clone()).await;

    let stale = controller
        .acquire_subnet_lease("192.168.0.1", false)
        .await
        .unwrap();
    clock.advance(150);
    let fresh = controller
        .acquire_subnet_lease("192.168.0.2", false)
        .await
        .unwrap();

    let reclaimed = controller
        .acquire_subnet_lease("192.168.0.3", false)
        .await
        .unwrap();

    assert_eq!(reclaimed.overlay_subnet, stale.overlay_subnet);
    assert_ne!(reclaimed.overlay_subnet, fresh.overlay_subnet);
    assert!(store
        .lease_for_underlay_ip("192.168.0.1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_renew_keeps_lease_routable() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1_000));
    let (controller, _store) = sqlite_controller(&dir, "10.255.0.0/16", 24, clock.clone()).await;

    let lease = controller
        .acquire_subnet_lease("192.168.0.1", false)
        .await
        .unwrap();

    for _ in 0..5 {
        clock.advance(80);
        controller.renew_subnet_lease(&lease).await.unwrap();
    }

    assert_eq!(controller.routable_leases().await.unwrap(), vec![lease]);

    clock.advance(101);
    assert!(controller.routable_leases().await.unwrap().is_empty());
}
