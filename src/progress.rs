use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScrapeError;

/// Jobs that keep a resumable position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Detail,
    Court,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Detail, JobKind::Court];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Detail => "detail",
            JobKind::Court => "court",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    pub status: RunStatus,
    /// Items already handled in the current pass.
    pub current_offset: usize,
    pub total_count: usize,
    pub total_processed: usize,
    pub total_found: usize,
    pub total_saved: usize,
    pub total_failed: usize,
    /// Row id of the last handled item.
    pub last_key: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ProgressState {
    fn default() -> Self {
        let now = Utc::now();
        ProgressState {
            status: RunStatus::Running,
            current_offset: 0,
            total_count: 0,
            total_processed: 0,
            total_found: 0,
            total_saved: 0,
            total_failed: 0,
            last_key: None,
            started_at: now,
            last_updated: now,
        }
    }
}

impl ProgressState {
    pub fn percent_complete(&self) -> f64 {
        if self.total_count == 0 {
            return if self.status == RunStatus::Completed { 100.0 } else { 0.0 };
        }
        let pct = self.current_offset as f64 * 100.0 / self.total_count as f64;
        (pct.min(100.0) * 10.0).round() / 10.0
    }
}

/// What the status page reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: String,
    pub total_processed: usize,
    pub total_found: usize,
    pub total_saved: usize,
    pub total_failed: usize,
    pub percent_complete: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One JSON document per job under the state directory.
pub struct ProgressTracker {
    path: PathBuf,
}

impl ProgressTracker {
    pub fn new(state_dir: &Path, job: JobKind) -> Self {
        ProgressTracker {
            path: state_dir.join(format!("{}_progress.json", job)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved state, or a fresh one when nothing usable is on disk.
    pub fn load(&self) -> ProgressState {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return ProgressState::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable progress file, starting over");
                ProgressState::default()
            }
        }
    }

    /// Write to a sibling temp file, then rename over the target.
    pub fn save(&self, state: &mut ProgressState) -> Result<(), ScrapeError> {
        state.last_updated = Utc::now();
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| ScrapeError::Configuration(format!("cannot encode progress: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), offset = state.current_offset, "progress saved");
        Ok(())
    }

    pub fn reset(&self) -> Result<bool, ScrapeError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    pub fn status(&self) -> StatusReport {
        if !self.path.exists() {
            return StatusReport {
                status: "idle".to_string(),
                total_processed: 0,
                total_found: 0,
                total_saved: 0,
                total_failed: 0,
                percent_complete: 0.0,
                last_updated: None,
            };
        }
        let state = self.load();
        StatusReport {
            status: match state.status {
                RunStatus::Running => "running",
                RunStatus::Completed => "completed",
            }
            .to_string(),
            total_processed: state.total_processed,
            total_found: state.total_found,
            total_saved: state.total_saved,
            total_failed: state.total_failed,
            percent_complete: state.percent_complete(),
            last_updated: Some(state.last_updated),
        }
    }

    // The state directory is operator-provided; failing to write it is a setup problem.
    fn io_error(&self, e: std::io::Error) -> ScrapeError {
        ScrapeError::Configuration(format!("progress file {}: {}", self.path.display(), e))
    }
}
