//! SQLite lease store using SQLx
//!
//! WAL mode with a busy timeout so the controller can share the file with
//! inspection tools. Uniqueness of the three lease keys is enforced by the
//! schema; a violating insert surfaces as [`StoreError::Conflict`].

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use overmesh_lease::Lease;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::{Clock, LeaseStore, StoreError, SystemClock};

/// Default database filename used when a directory is provided
const DEFAULT_DB_FILENAME: &str = "leases.sqlite";

const SELECT_LEASE: &str = "SELECT underlay_ip, overlay_subnet, overlay_hwaddr FROM subnets";

/// Lease store backed by SQLite
pub struct SqliteLeaseStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteLeaseStore {
    /// Open or create the database at `path`
    ///
    /// If `path` is an existing directory the database is created as
    /// `leases.sqlite` inside it.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let db_path = if path.is_dir() {
            path.join(DEFAULT_DB_FILENAME)
        } else {
            path.to_path_buf()
        };

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Database(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let connect_options =
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path.display()))
                .map_err(|e| StoreError::Database(format!("invalid database path: {}", e)))?
                .pragma("journal_mode", "WAL")
                .pragma("busy_timeout", "5000")
                .pragma("synchronous", "NORMAL")
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Database(format!("failed to open database: {}", e)))?;

        Self::init_schema(&pool).await?;

        info!("Opened lease database at {:?}", db_path);

        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create a private in-memory database
    ///
    /// The pool is pinned to a single connection that never recycles, since
    /// each SQLite in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Database(format!("invalid database url: {}", e)))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Database(format!("failed to open database: {}", e)))?;

        Self::init_schema(&pool).await?;

        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source used for renewal timestamps
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subnets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                underlay_ip TEXT NOT NULL UNIQUE,
                overlay_subnet TEXT NOT NULL UNIQUE,
                overlay_hwaddr TEXT NOT NULL UNIQUE,
                last_renewed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::Database(format!("failed to create subnets table: {}", e)))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subnets_last_renewed_at ON subnets(last_renewed_at)
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| StoreError::Database(format!("failed to create index: {}", e)))?;

        Ok(())
    }

    async fn fetch_leases(&self, sql: &str, cutoff: Option<i64>) -> Result<Vec<Lease>, StoreError> {
        let mut query = sqlx::query(sql);
        if let Some(cutoff) = cutoff {
            query = query.bind(cutoff);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_lease).collect()
    }

    async fn fetch_oldest(&self, sql: &str, cutoff: i64) -> Result<Option<Lease>, StoreError> {
        let row = sqlx::query(sql)
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_lease).transpose()
    }
}

fn row_to_lease(row: &SqliteRow) -> Result<Lease, StoreError> {
    Ok(Lease {
        underlay_ip: row.try_get("underlay_ip")?,
        overlay_subnet: row.try_get("overlay_subnet")?,
        overlay_hardware_addr: row.try_get("overlay_hwaddr")?,
    })
}

#[async_trait]
impl LeaseStore for SqliteLeaseStore {
    async fn add_entry(&self, lease: &Lease) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subnets (underlay_ip, overlay_subnet, overlay_hwaddr, last_renewed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&lease.underlay_ip)
        .bind(&lease.overlay_subnet)
        .bind(&lease.overlay_hardware_addr)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_entry(&self, underlay_ip: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM subnets WHERE underlay_ip = ?")
            .bind(underlay_ip)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_entry(
        &self,
        lease: &Lease,
        expiration_secs: i64,
    ) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        let result = sqlx::query(
            r#"
            DELETE FROM subnets
            WHERE underlay_ip = ? AND overlay_subnet = ? AND overlay_hwaddr = ?
              AND last_renewed_at < ?
            "#,
        )
        .bind(&lease.underlay_ip)
        .bind(&lease.overlay_subnet)
        .bind(&lease.overlay_hardware_addr)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn lease_for_underlay_ip(&self, underlay_ip: &str) -> Result<Option<Lease>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_LEASE} WHERE underlay_ip = ?"))
            .bind(underlay_ip)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_lease).transpose()
    }

    async fn renew_lease_for_underlay_ip(&self, underlay_ip: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subnets SET last_renewed_at = ? WHERE underlay_ip = ?")
            .bind(self.clock.now())
            .bind(underlay_ip)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(underlay_ip.to_string()));
        }

        Ok(())
    }

    async fn last_renewed_at_for_underlay_ip(&self, underlay_ip: &str) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT last_renewed_at FROM subnets WHERE underlay_ip = ?")
            .bind(underlay_ip)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(underlay_ip.to_string()))
    }

    async fn all(&self) -> Result<Vec<Lease>, StoreError> {
        self.fetch_leases(&format!("{SELECT_LEASE} ORDER BY id"), None)
            .await
    }

    async fn all_block_subnets(&self) -> Result<Vec<Lease>, StoreError> {
        self.fetch_leases(
            &format!("{SELECT_LEASE} WHERE overlay_subnet NOT LIKE '%/32' ORDER BY id"),
            None,
        )
        .await
    }

    async fn all_single_ip_subnets(&self) -> Result<Vec<Lease>, StoreError> {
        self.fetch_leases(
            &format!("{SELECT_LEASE} WHERE overlay_subnet LIKE '%/32' ORDER BY id"),
            None,
        )
        .await
    }

    async fn all_active(&self, expiration_secs: i64) -> Result<Vec<Lease>, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        self.fetch_leases(
            &format!("{SELECT_LEASE} WHERE last_renewed_at >= ? ORDER BY id"),
            Some(cutoff),
        )
        .await
    }

    async fn oldest_expired_block_subnet(
        &self,
        expiration_secs: i64,
    ) -> Result<Option<Lease>, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        self.fetch_oldest(
            &format!(
                "{SELECT_LEASE} WHERE last_renewed_at < ? AND overlay_subnet NOT LIKE '%/32' \
                 ORDER BY last_renewed_at ASC, id ASC LIMIT 1"
            ),
            cutoff,
        )
        .await
    }

    async fn oldest_expired_single_ip(
        &self,
        expiration_secs: i64,
    ) -> Result<Option<Lease>, StoreError> {
        let cutoff = self.clock.now() - expiration_secs;
        self.fetch_oldest(
            &format!(
                "{SELECT_LEASE} WHERE last_renewed_at < ? AND overlay_subnet LIKE '%/32' \
                 ORDER BY last_renewed_at ASC, id ASC LIMIT 1"
            ),
            cutoff,
        )
        .await
    }
}
