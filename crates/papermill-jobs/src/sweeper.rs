//! The retention sweeper.
//!
//! A periodic loop that walks every storage area and reclaims entries older
//! than the retention threshold. Individual entry failures are logged and
//! skipped; a failed pass never stops the loop. Symbolic links are unlinked
//! rather than followed, so nothing outside the managed tree is ever
//! touched.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use papermill_core::config::retention::RetentionConfig;
use papermill_store::{ArtifactStore, StorageArea};

/// Outcome counts for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries removed.
    pub removed: usize,
    /// Entries younger than the threshold or inaccessible, left alone.
    pub skipped: usize,
    /// Entries past the threshold that could not be removed.
    pub failed: usize,
}

impl SweepStats {
    fn absorb(&mut self, other: SweepStats) {
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Periodic reclaimer of aged artifacts across all storage areas.
#[derive(Debug)]
pub struct RetentionSweeper {
    store: Arc<ArtifactStore>,
    config: RetentionConfig,
}

impl RetentionSweeper {
    /// Create a sweeper over the given store.
    pub fn new(store: Arc<ArtifactStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Run until the shutdown signal flips to `true`.
    ///
    /// The first pass runs one full interval after startup; every pass is
    /// caught at the iteration boundary so the loop survives anything a
    /// single sweep throws at it.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.sweep_interval_secs,
            max_age_secs = self.config.max_age_secs,
            "Retention sweeper started"
        );
        let mut ticker = time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; consume it so passes
        // start one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.sweep_once().await;
                    debug!(
                        removed = stats.removed,
                        skipped = stats.skipped,
                        failed = stats.failed,
                        "Sweep pass complete"
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Retention sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Sweep every storage area once.
    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        for area in StorageArea::ALL {
            stats.absorb(self.sweep_area(area).await);
        }
        stats
    }

    async fn sweep_area(&self, area: StorageArea) -> SweepStats {
        let root = self.store.area_root(area);
        let mut stats = SweepStats::default();

        let mut entries = match fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(err) => {
                error!(area = %area, error = %err, "Failed to list storage area");
                return stats;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    error!(area = %area, error = %err, "Failed to read area entry");
                    stats.failed += 1;
                    break;
                }
            };
            let path = entry.path();

            // symlink_metadata so links are seen as links, never followed.
            let meta = match fs::symlink_metadata(&path).await {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Skipping inaccessible entry");
                    stats.skipped += 1;
                    continue;
                }
            };
            match self.entry_age(&meta) {
                Some(age) if age > self.config.max_age() => {}
                Some(_) => {
                    stats.skipped += 1;
                    continue;
                }
                None => {
                    warn!(path = %path.display(), "Skipping entry with unreadable mtime");
                    stats.skipped += 1;
                    continue;
                }
            }

            let removed = if meta.file_type().is_symlink() {
                self.remove_symlink(&path).await
            } else if meta.is_dir() {
                self.remove_directory(&path).await
            } else {
                self.remove_file_with_retries(&path).await
            };
            if removed {
                debug!(area = %area, path = %path.display(), "Reclaimed expired entry");
                stats.removed += 1;
            } else {
                stats.failed += 1;
            }
        }
        stats
    }

    fn entry_age(&self, meta: &std::fs::Metadata) -> Option<Duration> {
        let modified = meta.modified().ok()?;
        SystemTime::now().duration_since(modified).ok()
    }

    /// Delete a plain file, retrying a bounded number of times for files
    /// locked or otherwise busy. The delay suspends only the sweep task.
    async fn remove_file_with_retries(&self, path: &Path) -> bool {
        let attempts = self.config.delete_retries.max(1);
        for attempt in 1..=attempts {
            match fs::remove_file(path).await {
                Ok(()) => return true,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return true,
                Err(err) if attempt < attempts => {
                    info!(
                        path = %path.display(),
                        attempt,
                        error = %err,
                        "File is busy, retrying delete"
                    );
                    time::sleep(self.config.delete_retry_delay()).await;
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        attempts,
                        error = %err,
                        "Could not remove file after retries"
                    );
                }
            }
        }
        false
    }

    async fn remove_directory(&self, path: &Path) -> bool {
        match fs::remove_dir_all(path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to remove directory");
                false
            }
        }
    }

    async fn remove_symlink(&self, path: &Path) -> bool {
        match fs::remove_file(path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to unlink symlink");
                false
            }
        }
    }
}
