/// Status file: a JSON snapshot of the watcher rewritten after every cycle.
///
/// Uses atomic write pattern: write to temp file then rename.
use crate::watcher::CycleReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Watcher states written to the status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherState {
    Starting,
    Polling,
    Idle,
    Stopped,
}

/// Counts from the most recent cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleCounts {
    pub descriptors: usize,
    pub kernels: usize,
    pub referenced: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    pub escalations: usize,
}

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub pid: u32,
    pub state: WatcherState,
    pub runtime_dir: String,
    pub cycle: u64,
    pub last_cycle: CycleCounts,
    pub total_deleted: u64,
    pub total_escalations: u64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Manages the status file lifecycle.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    /// Create a new StatusFile writer for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write status data to the status file.
    ///
    /// Writes to a temporary file in the same directory, then renames
    /// so readers never see a partial write.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = dir.join(format!(".kernel-watcher.status.tmp.{}", std::process::id()));

        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| StatusError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| StatusError::Rename {
            from: tmp_path,
            to: self.path.clone(),
            source: e,
        })?;

        Ok(())
    }

    /// Remove the status file (on clean shutdown).
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Accumulates cycle results and writes a snapshot on each update.
pub struct StatusTracker {
    file: StatusFile,
    pid: u32,
    runtime_dir: String,
    cycle: u64,
    last_cycle: CycleCounts,
    total_deleted: u64,
    total_escalations: u64,
    started_at: DateTime<Utc>,
}

impl StatusTracker {
    pub fn new(status_path: PathBuf, runtime_dir: &Path) -> Self {
        Self {
            file: StatusFile::new(status_path),
            pid: std::process::id(),
            runtime_dir: runtime_dir.display().to_string(),
            cycle: 0,
            last_cycle: CycleCounts::default(),
            total_deleted: 0,
            total_escalations: 0,
            started_at: Utc::now(),
        }
    }

    /// Fold one finished cycle into the counters.
    pub fn record_cycle(&mut self, report: &CycleReport) {
        self.cycle += 1;
        self.last_cycle = CycleCounts {
            descriptors: report.descriptors,
            kernels: report.kernels.len(),
            referenced: report.referenced,
            deleted: report.reaped.deleted.len(),
            delete_failures: report.reaped.failed.len(),
            escalations: report.escalations.len(),
        };
        self.total_deleted += report.reaped.deleted.len() as u64;
        self.total_escalations += report.escalations.len() as u64;
    }

    fn snapshot(&self, state: WatcherState) -> StatusData {
        StatusData {
            pid: self.pid,
            state,
            runtime_dir: self.runtime_dir.clone(),
            cycle: self.cycle,
            last_cycle: self.last_cycle.clone(),
            total_deleted: self.total_deleted,
            total_escalations: self.total_escalations,
            started_at: self.started_at,
            last_update: Utc::now(),
        }
    }

    /// Write the status file with the given state. Failures are logged only.
    pub fn update(&self, state: WatcherState) {
        if let Err(e) = self.file.write(&self.snapshot(state)) {
            tracing::warn!(error = %e, "failed to write status file");
        }
    }

    /// Mark the watcher stopped, then remove the status file.
    pub fn finish(&self) {
        self.update(WatcherState::Stopped);
        self.file.remove();
    }
}

/// Errors from status file operations.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => write!(f, "failed to serialize status: {source}"),
            StatusError::Write { path, source } => {
                write!(
                    f,
                    "failed to write temp status file {}: {source}",
                    path.display()
                )
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} -> {}: {source}",
                    from.display(),
                    to.display()
                )
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}
