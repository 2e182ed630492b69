/// Operator-facing event trail: the append-only log file and best-effort
/// desktop notifications.
use crate::process::{Pid, SignalError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Something the watcher did or observed that belongs in the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Started {
        runtime_dir: PathBuf,
        interval: Duration,
        max_age_secs: u64,
    },
    Deleted {
        path: PathBuf,
    },
    DeleteFailed {
        path: PathBuf,
        error: String,
    },
    LongRunning {
        pid: Pid,
        elapsed_secs: u64,
        max_age_secs: u64,
    },
    InterruptSent {
        pid: Pid,
    },
    AlreadyExited {
        pid: Pid,
    },
    InterruptDenied {
        pid: Pid,
    },
    InterruptFailed {
        pid: Pid,
        error: SignalError,
    },
    ExitedAfterInterrupt {
        pid: Pid,
    },
    TerminateSent {
        pid: Pid,
    },
    TerminateFailed {
        pid: Pid,
        error: SignalError,
    },
    ExitedAfterTerminate {
        pid: Pid,
    },
    KillSent {
        pid: Pid,
    },
    KillFailed {
        pid: Pid,
        error: SignalError,
    },
    GaveUp {
        pid: Pid,
    },
    Stopped,
}

impl std::fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchEvent::Started {
                runtime_dir,
                interval,
                max_age_secs,
            } => write!(
                f,
                "Starting kernel_watcher (runtime={}, interval={}, max_age={})",
                runtime_dir.display(),
                interval.as_secs(),
                max_age_secs
            ),
            WatchEvent::Deleted { path } => write!(f, "Deleted stale file: {}", path.display()),
            WatchEvent::DeleteFailed { path, error } => {
                write!(f, "Failed to delete {}: {}", path.display(), error)
            }
            WatchEvent::LongRunning {
                pid,
                elapsed_secs,
                max_age_secs,
            } => write!(
                f,
                "PID {pid} running for {elapsed_secs}s (>= {max_age_secs}s) - attempting gentle shutdown (unreferenced)"
            ),
            WatchEvent::InterruptSent { pid } => write!(f, "SIGINT sent to {pid}"),
            WatchEvent::AlreadyExited { pid } => {
                write!(f, "Process {pid} does not exist (already exited)")
            }
            WatchEvent::InterruptDenied { pid } => {
                write!(f, "Permission denied sending SIGINT to {pid}")
            }
            WatchEvent::InterruptFailed { pid, error } => {
                write!(f, "Failed to send SIGINT to {pid}: {error}")
            }
            WatchEvent::ExitedAfterInterrupt { pid } => {
                write!(f, "Process {pid} exited after SIGINT")
            }
            WatchEvent::TerminateSent { pid } => write!(f, "SIGTERM sent to {pid}"),
            WatchEvent::TerminateFailed { pid, error } => {
                write!(f, "Failed to send SIGTERM to {pid}: {error}")
            }
            WatchEvent::ExitedAfterTerminate { pid } => {
                write!(f, "Process {pid} exited after SIGTERM")
            }
            WatchEvent::KillSent { pid } => write!(f, "SIGKILL sent to {pid}"),
            WatchEvent::KillFailed { pid, error } => write!(f, "Failed to SIGKILL {pid}: {error}"),
            WatchEvent::GaveUp { pid } => write!(
                f,
                "Process {pid} still alive after SIGTERM; not killing (force disabled)"
            ),
            WatchEvent::Stopped => write!(f, "kernel_watcher stopped by user"),
        }
    }
}

/// Injected logging/notification capability shared by every stage of a cycle.
pub trait EventSink {
    /// Append one event to the audit trail.
    fn record(&self, event: &WatchEvent);

    /// Fire-and-forget desktop notification. Must never block or fail.
    fn notify(&self, title: &str, message: &str);
}

/// Format one log-file line: `[<UTC ISO-8601>Z] <event>`.
pub fn format_line(timestamp: chrono::DateTime<chrono::Utc>, event: &WatchEvent) -> String {
    format!(
        "[{}] {}",
        timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
        event
    )
}

/// Production sink: appends to the log file, mirrors to `tracing`, and hands
/// notifications to the desktop notifier.
pub struct FileEventLog {
    path: PathBuf,
    notifier: Option<DesktopNotifier>,
}

impl FileEventLog {
    /// Create a sink writing to `path`. The parent directory is created
    /// best-effort; failure shows up later as per-line write warnings.
    pub fn new(path: PathBuf, notifier: Option<DesktopNotifier>) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, dir = %parent.display(), "failed to create log directory");
            }
        }
        Self { path, notifier }
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl EventSink for FileEventLog {
    fn record(&self, event: &WatchEvent) {
        tracing::info!("{event}");
        let line = format_line(chrono::Utc::now(), event);
        if let Err(e) = self.append(&line) {
            tracing::warn!(error = %e, path = %self.path.display(), "failed to append to log file");
        }
    }

    fn notify(&self, title: &str, message: &str) {
        if let Some(notifier) = &self.notifier {
            notifier.send(title, message);
        }
    }
}

/// Desktop notifications via `notify-send`, if it is installed.
pub struct DesktopNotifier {
    command: PathBuf,
}

impl DesktopNotifier {
    const COMMAND: &'static str = "notify-send";

    /// Locate `notify-send` on `PATH`. Returns `None` when it is not installed.
    pub fn discover() -> Option<Self> {
        let command = which::which(Self::COMMAND).ok()?;
        tracing::debug!(command = %command.display(), "desktop notifications enabled");
        Some(Self { command })
    }

    /// Spawn the notifier and return immediately. Needs a tokio runtime to
    /// reap the child; outside one the notification is dropped.
    pub fn send(&self, title: &str, message: &str) {
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let spawned = tokio::process::Command::new(&self.command)
            .arg(title)
            .arg(message)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        if let Err(e) = spawned {
            tracing::debug!(error = %e, "desktop notification failed");
        }
    }
}

#[cfg(test)]
pub mod recording {
    //! Sink that keeps everything in memory for assertions.
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    pub struct RecordingSink {
        events: RefCell<Vec<WatchEvent>>,
        notifications: RefCell<Vec<(String, String)>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<WatchEvent> {
            self.events.borrow().clone()
        }

        pub fn lines(&self) -> Vec<String> {
            self.events.borrow().iter().map(|e| e.to_string()).collect()
        }

        pub fn notifications(&self) -> Vec<(String, String)> {
            self.notifications.borrow().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn record(&self, event: &WatchEvent) {
            self.events.borrow_mut().push(event.clone());
        }

        fn notify(&self, title: &str, message: &str) {
            self.notifications
                .borrow_mut()
                .push((title.to_string(), message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_lines() {
        assert_eq!(
            WatchEvent::Deleted {
                path: PathBuf::from("/run/rt/kernel-abc.json")
            }
            .to_string(),
            "Deleted stale file: /run/rt/kernel-abc.json"
        );
        assert_eq!(
            WatchEvent::GaveUp { pid: 42 }.to_string(),
            "Process 42 still alive after SIGTERM; not killing (force disabled)"
        );
        assert_eq!(
            WatchEvent::TerminateFailed {
                pid: 7,
                error: SignalError::PermissionDenied
            }
            .to_string(),
            "Failed to send SIGTERM to 7: permission denied"
        );
        assert_eq!(
            WatchEvent::Started {
                runtime_dir: PathBuf::from("/run/rt"),
                interval: Duration::from_secs(10),
                max_age_secs: 300,
            }
            .to_string(),
            "Starting kernel_watcher (runtime=/run/rt, interval=10, max_age=300)"
        );
    }

    #[test]
    fn test_format_line_timestamp() {
        let ts = chrono::Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 30, 5)
            .unwrap();
        assert_eq!(
            format_line(ts, &WatchEvent::Stopped),
            "[2026-03-01T12:30:05.000000Z] kernel_watcher stopped by user"
        );
    }

    #[test]
    fn test_file_log_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("watcher.log");
        let log = FileEventLog::new(path.clone(), None);

        log.record(&WatchEvent::InterruptSent { pid: 1 });
        log.record(&WatchEvent::Stopped);
        // Without a notifier this is a no-op
        log.notify("title", "message");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] SIGINT sent to 1"));
        assert!(lines[1].ends_with("] kernel_watcher stopped by user"));
    }

    #[test]
    fn test_file_log_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for append
        let log = FileEventLog::new(dir.path().to_path_buf(), None);
        log.record(&WatchEvent::Stopped);
    }

    #[test]
    fn test_discover_resolves_absolute_notify_send() {
        // Absent on most CI hosts; when present it must be the real binary
        if let Some(notifier) = DesktopNotifier::discover() {
            assert!(notifier.command.is_absolute());
            assert!(notifier.command.ends_with("notify-send"));
        }
    }

    #[test]
    fn test_notifier_outside_runtime_is_noop() {
        let notifier = DesktopNotifier {
            command: PathBuf::from("/nonexistent/notify-send"),
        };
        notifier.send("title", "message");
    }

    #[tokio::test]
    async fn test_notifier_spawn_failure_is_swallowed() {
        let notifier = DesktopNotifier {
            command: PathBuf::from("/nonexistent/notify-send"),
        };
        notifier.send("title", "message");
    }
}
