/// Process-table access: listing kernel candidates, per-process introspection
/// and signal delivery.
///
/// Everything the watcher knows about live processes goes through the
/// `ProcessTable` trait so the discovery and escalation logic can be driven by
/// a scripted table in tests.
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use regex::Regex;
use std::cell::RefCell;
use std::ffi::OsString;
use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessesToUpdate, System};

/// OS process id.
pub type Pid = i32;

/// Metadata for one live process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub ppid: Pid,
    /// Argument vector joined with single spaces.
    pub cmdline: String,
    /// Seconds since the process started.
    pub elapsed_secs: u64,
    pub owner_uid: u32,
}

/// Signals used by the escalation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
    Kill,
}

impl SignalKind {
    pub fn as_signal(self) -> Signal {
        match self {
            SignalKind::Interrupt => Signal::SIGINT,
            SignalKind::Terminate => Signal::SIGTERM,
            SignalKind::Kill => Signal::SIGKILL,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_signal().as_str())
    }
}

/// Errors from delivering a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The process no longer exists.
    NotFound,
    /// The process exists but we may not signal it.
    PermissionDenied,
    Other(Errno),
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::NotFound => write!(f, "no such process"),
            SignalError::PermissionDenied => write!(f, "permission denied"),
            SignalError::Other(errno) => write!(f, "{}", errno.desc()),
        }
    }
}

impl std::error::Error for SignalError {}

impl From<Errno> for SignalError {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::ESRCH => SignalError::NotFound,
            Errno::EPERM => SignalError::PermissionDenied,
            other => SignalError::Other(other),
        }
    }
}

/// Matches process command lines the way `pgrep -f` does.
///
/// The pattern is tried as a regular expression first; a pattern that does
/// not compile is matched as a literal substring instead.
#[derive(Debug, Clone)]
pub enum CommandMatcher {
    Pattern(Regex),
    Literal(String),
}

impl CommandMatcher {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => CommandMatcher::Pattern(re),
            Err(e) => {
                tracing::debug!(pattern, error = %e, "match pattern is not a regex, using literal match");
                CommandMatcher::Literal(pattern.to_string())
            }
        }
    }

    pub fn is_match(&self, cmdline: &str) -> bool {
        match self {
            CommandMatcher::Pattern(re) => re.is_match(cmdline),
            CommandMatcher::Literal(s) => cmdline.contains(s.as_str()),
        }
    }
}

/// Read-mostly view of the host process table.
///
/// Every query tolerates the process having already exited: the answer is
/// simply "nothing" rather than an error.
pub trait ProcessTable {
    /// Ids of processes whose command line matches, ascending and unique.
    fn list(&self, matcher: &CommandMatcher) -> Vec<Pid>;

    /// Metadata for `pid`, or `None` if it cannot be read.
    fn describe(&self, pid: Pid) -> Option<ProcessInfo>;

    /// Whether `pid` currently exists, probed without side effects.
    fn exists(&self, pid: Pid) -> bool;

    /// Deliver `kind` to `pid`.
    fn signal(&self, pid: Pid, kind: SignalKind) -> Result<(), SignalError>;

    /// Command line of `pid`, empty if unavailable.
    fn command_line(&self, pid: Pid) -> String {
        self.describe(pid).map(|p| p.cmdline).unwrap_or_default()
    }

    /// Seconds `pid` has been running, 0 if unavailable.
    fn elapsed_secs(&self, pid: Pid) -> u64 {
        self.describe(pid).map(|p| p.elapsed_secs).unwrap_or(0)
    }

    /// Owning uid of `pid`, `None` if unavailable.
    fn owner_uid(&self, pid: Pid) -> Option<u32> {
        self.describe(pid).map(|p| p.owner_uid)
    }
}

/// `ProcessTable` backed by `sysinfo`, with `kill(2)` for probing and
/// signalling.
pub struct LinuxProcessTable {
    system: RefCell<System>,
    self_pid: Pid,
}

impl LinuxProcessTable {
    pub fn new() -> Self {
        Self {
            system: RefCell::new(System::new()),
            self_pid: std::process::id() as Pid,
        }
    }

    /// Refresh `targets`, dropping entries for processes that have exited.
    fn refresh(&self, targets: ProcessesToUpdate<'_>) {
        self.system.borrow_mut().refresh_processes_specifics(
            targets,
            true,
            ProcessRefreshKind::everything(),
        );
    }
}

impl Default for LinuxProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for LinuxProcessTable {
    fn list(&self, matcher: &CommandMatcher) -> Vec<Pid> {
        self.refresh(ProcessesToUpdate::All);
        let system = self.system.borrow();

        let mut pids: Vec<Pid> = system
            .processes()
            .iter()
            // Threads share their leader's command line
            .filter(|(_, process)| process.thread_kind().is_none())
            .filter(|(_, process)| matcher.is_match(&join_cmd(process.cmd())))
            .filter_map(|(pid, _)| Pid::try_from(pid.as_u32()).ok())
            .filter(|pid| *pid != self.self_pid)
            .collect();
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    fn describe(&self, pid: Pid) -> Option<ProcessInfo> {
        let sys_pid = SysPid::from_u32(u32::try_from(pid).ok()?);
        self.refresh(ProcessesToUpdate::Some(&[sys_pid]));
        let system = self.system.borrow();
        let process = system.process(sys_pid)?;

        Some(ProcessInfo {
            pid,
            ppid: process
                .parent()
                .and_then(|parent| Pid::try_from(parent.as_u32()).ok())
                .unwrap_or(0),
            cmdline: join_cmd(process.cmd()),
            elapsed_secs: process.run_time(),
            owner_uid: process.user_id().map(|uid| **uid)?,
        })
    }

    fn exists(&self, pid: Pid) -> bool {
        match kill(nix::unistd::Pid::from_raw(pid), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn signal(&self, pid: Pid, kind: SignalKind) -> Result<(), SignalError> {
        kill(nix::unistd::Pid::from_raw(pid), kind.as_signal()).map_err(SignalError::from)
    }
}

/// Argument vector joined with single spaces, lossy UTF-8.
fn join_cmd(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
