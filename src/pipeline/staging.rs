//! Staged artifacts — print-ready documents held on local disk while a fax
//! is in flight.
//!
//! Files are named by receipt timestamp + fax identifier, so concurrently
//! staged faxes can never collide even if the consumer is parallelized
//! later. Deletion happens only after a confirmed notification; everything
//! else is left for the retention sweeper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::DateTime;

/// Scoped staging directory for print-ready fax documents.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the staging directory if missing. Called once at startup.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)
    }

    /// Deterministic per-fax path: `fax_<YYYYmmdd_HHMMSS>_<id>.pdf`.
    pub fn path_for(&self, fax_id: &str, received_at: i64) -> PathBuf {
        let stamp = DateTime::from_timestamp(received_at, 0)
            .map(|t| t.format("%Y%m%d_%H%M%S").to_string())
            .unwrap_or_else(|| received_at.to_string());
        // Provider ids are opaque strings; keep only filename-safe chars.
        let safe_id: String = fax_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            .collect();
        self.dir.join(format!("fax_{stamp}_{safe_id}.pdf"))
    }

    /// Write the print-ready bytes for one fax, returning the staged path.
    pub async fn stage(
        &self,
        fax_id: &str,
        received_at: i64,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(fax_id, received_at);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(fax_id, path = %path.display(), size = bytes.len(), "Fax staged");
        Ok(path)
    }

    /// Remove a staged file after confirmed dispatch.
    pub async fn remove(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await?;
        tracing::info!(path = %path.display(), "Staged file deleted");
        Ok(())
    }

    /// Delete staged PDFs whose modification time is older than `max_age`.
    /// Safety net for files retained after notification failures. Returns
    /// the number of files removed.
    pub fn sweep_stale(&self, max_age: Duration) -> std::io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let now = std::time::SystemTime::now();
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pdf") {
                continue;
            }

            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .map_or(false, |age| age >= max_age);

            if stale {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::info!(path = %path.display(), "Swept stale staged file");
                        removed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Sweep failed to remove file");
                    }
                }
            }
        }
        Ok(removed)
    }
}

/// Periodic retention sweep over the staging area. Runs until the process
/// exits; sweep errors are logged, never fatal.
pub fn spawn_retention_sweeper(
    area: StagingArea,
    retention: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so a fresh boot doesn't race
        // files staged during startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match area.sweep_stale(retention) {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Retention sweep complete"),
                Err(e) => tracing::warn!(error = %e, "Retention sweep failed"),
            }
        }
    })
}
