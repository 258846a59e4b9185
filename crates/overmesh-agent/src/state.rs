//! Local persistence of the host's lease

use std::path::{Path, PathBuf};

use overmesh_lease::Lease;
use tracing::debug;

use crate::error::{AgentError, Result};

/// File name of the persisted lease inside the data directory
pub const LEASE_FILENAME: &str = "lease.json";

/// The lease file in a data directory
#[derive(Debug, Clone)]
pub struct LeaseState {
    path: PathBuf,
}

impl LeaseState {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(LEASE_FILENAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted lease, `None` if nothing was saved
    pub async fn load(&self) -> Result<Option<Lease>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let lease = serde_json::from_str(&contents).map_err(|e| {
            AgentError::State(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(lease))
    }

    /// Save the lease, creating the data directory if needed
    pub async fn save(&self, lease: &Lease) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(lease)
            .map_err(|e| AgentError::State(format!("failed to encode lease: {}", e)))?;

        // Atomic replace
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), "Saved lease state");
        Ok(())
    }

    /// Remove the persisted lease; a missing file is fine
    pub async fn remove(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
