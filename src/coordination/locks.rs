//! Advisory lock manager.
//!
//! Leases are single JSON files under `locks/`, one per resource. Mutual
//! exclusion is cooperative: every coordinator code path that touches a
//! shared resource acquires the matching lease first, but nothing stops a
//! non-cooperating process from ignoring it. Expired and unparseable leases
//! are reclaimed by the next acquirer.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::fs_util::{self, RecordRead};
use super::types::LockLease;
use super::CoordinationError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct LockManager {
    locks_dir: PathBuf,
}

impl LockManager {
    pub fn new(locks_dir: impl Into<PathBuf>) -> Self {
        Self {
            locks_dir: locks_dir.into(),
        }
    }

    fn lease_path(&self, resource: &str) -> PathBuf {
        self.locks_dir.join(format!("{resource}.lock"))
    }

    /// Poll until the resource is free, reclaiming expired or corrupt leases
    /// along the way. Returns false if the deadline elapses first. The lease
    /// created on success expires `timeout` after acquisition, so a crashed
    /// holder never blocks the resource forever.
    ///
    /// Lease files are created with O_EXCL, never temp+rename: a rename
    /// would silently replace a lease another acquirer created between our
    /// read and our write, handing the lock to two holders at once.
    pub async fn acquire(
        &self,
        resource: &str,
        holder: &str,
        timeout: Duration,
    ) -> Result<bool, CoordinationError> {
        fs::create_dir_all(&self.locks_dir).await?;
        let path = self.lease_path(resource);
        let deadline = Instant::now() + timeout;

        let mut poll = interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            poll.tick().await;

            match fs_util::read_json_lenient::<LockLease>(&path).await {
                RecordRead::Missing => {
                    let now = Utc::now();
                    let lease = LockLease {
                        resource: resource.to_string(),
                        holder: holder.to_string(),
                        acquired_at: now,
                        expires_at: now
                            + chrono::Duration::from_std(timeout)
                                .unwrap_or(chrono::Duration::MAX),
                    };
                    if try_create_lease(&path, &lease).await? {
                        debug!(resource = %resource, holder = %holder, "Lock acquired");
                        return Ok(true);
                    }
                    // Lost the creation race; the winner's lease is on disk
                    debug!(resource = %resource, holder = %holder, "Lease creation contended");
                }
                RecordRead::Corrupt => {
                    // Unparseable lease counts as expired
                    remove_lease(&path).await;
                }
                RecordRead::Value(lease) => {
                    if lease.is_expired(Utc::now()) {
                        debug!(
                            resource = %resource,
                            stale_holder = %lease.holder,
                            "Discarding expired lease"
                        );
                        remove_lease(&path).await;
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(resource = %resource, holder = %holder, "Lock acquisition timed out");
                return Ok(false);
            }
        }
    }

    /// Delete the lease, but only if `holder` is the recorded holder. A late
    /// caller whose lease already expired and was taken over gets false and
    /// leaves the new holder's lease intact.
    pub async fn release(&self, resource: &str, holder: &str) -> Result<bool, CoordinationError> {
        let path = self.lease_path(resource);
        match fs_util::read_json_lenient::<LockLease>(&path).await {
            RecordRead::Missing => Ok(true),
            RecordRead::Corrupt => {
                warn!(resource = %resource, "Release found corrupted lease");
                Ok(false)
            }
            RecordRead::Value(lease) => {
                if lease.holder == holder {
                    remove_lease(&path).await;
                    debug!(resource = %resource, holder = %holder, "Lock released");
                    Ok(true)
                } else {
                    warn!(
                        resource = %resource,
                        holder = %holder,
                        current_holder = %lease.holder,
                        "Lock release denied: not the holder"
                    );
                    Ok(false)
                }
            }
        }
    }

    /// Current lease for a resource, if one exists and parses.
    pub async fn current_lease(&self, resource: &str) -> Option<LockLease> {
        match fs_util::read_json_lenient::<LockLease>(&self.lease_path(resource)).await {
            RecordRead::Value(lease) => Some(lease),
            _ => None,
        }
    }
}

/// Write the lease behind O_EXCL. Returns false when another acquirer won
/// the race and the file already exists.
async fn try_create_lease(path: &Path, lease: &LockLease) -> Result<bool, CoordinationError> {
    let serialized = serde_json::to_string_pretty(lease)?;
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(mut file) => {
            file.write_all(serialized.as_bytes()).await?;
            file.flush().await?;
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn remove_lease(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "Failed to remove lease file");
        }
    }
}
