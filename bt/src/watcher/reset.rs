//! Admin reset flag watcher

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::{Reconciler, RecoveryStats};

/// Create the reset flag file so a running daemon picks it up on its next poll
pub fn request_reset(flag_path: &Path) -> Result<()> {
    debug!(?flag_path, "request_reset: called");
    if let Some(parent) = flag_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create reset flag directory")?;
    }
    let stamp = chrono::Local::now().to_rfc3339();
    std::fs::write(flag_path, stamp).context(format!("Failed to write reset flag {}", flag_path.display()))?;
    Ok(())
}

/// Polls for the reset flag file
pub struct ResetWatcher {
    flag_path: PathBuf,
    poll: Duration,
    reconciler: Arc<Reconciler>,
}

impl ResetWatcher {
    pub fn new(flag_path: PathBuf, poll: Duration, reconciler: Arc<Reconciler>) -> Self {
        Self {
            flag_path,
            poll,
            reconciler,
        }
    }

    pub fn flag_path(&self) -> &Path {
        &self.flag_path
    }

    /// Consume the flag if present and reset; None when there was nothing to do
    ///
    /// The flag is removed before resetting so a failure cannot trigger a
    /// reset on every poll.
    pub async fn check_once(&self) -> Option<RecoveryStats> {
        if !self.flag_path.exists() {
            return None;
        }

        info!(flag = %self.flag_path.display(), "Reset flag found");
        if let Err(e) = std::fs::remove_file(&self.flag_path) {
            warn!(flag = %self.flag_path.display(), error = %e, "Failed to remove reset flag, skipping reset");
            return None;
        }

        Some(self.reconciler.reset().await)
    }

    /// Poll until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            flag = %self.flag_path.display(),
            poll_secs = self.poll.as_secs(),
            "Reset watcher started"
        );

        loop {
            if let Some(stats) = self.check_once().await {
                info!("Admin reset: {}", stats);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("Reset watcher stopped");
    }
}
