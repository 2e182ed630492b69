use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from kernel-watcher.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WatcherConfig {
    pub watch: WatchConfig,
    pub escalation: EscalationConfig,
    pub log: LogConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub runtime_dir: PathBuf,
    pub interval_secs: u64,
    pub max_age_secs: u64,
    pub match_cmd: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub grace_secs: u64,
    pub force_kill: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub file: PathBuf,
    pub notify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct StatusConfig {
    pub file: Option<PathBuf>,
}

/// Errors that can occur while loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: the watcher runs on defaults plus
    /// whatever the command line overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        let mut config: WatcherConfig = toml::from_str(text)?;
        config.expand_paths();
        Ok(config)
    }

    /// Expand a leading `~/` in every configured path.
    pub fn expand_paths(&mut self) {
        self.watch.runtime_dir = expand_home(&self.watch.runtime_dir);
        self.log.file = expand_home(&self.log.file);
        if let Some(file) = self.status.file.take() {
            self.status.file = Some(expand_home(&file));
        }
    }
}

impl EscalationConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl WatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Replace a leading `~/` with `$HOME/`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

/// Per-user runtime directory used by the notebook front-end.
fn default_runtime_dir() -> PathBuf {
    let uid = nix::unistd::getuid().as_raw();
    PathBuf::from(format!("/run/user/{uid}/jupyter/runtime"))
}

// --- Default implementations ---

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            interval_secs: 10,
            max_age_secs: 300,
            match_cmd: "ipykernel_launcher".to_string(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            grace_secs: 4,
            force_kill: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: expand_home(Path::new("~/.cache/kernel_watcher.log")),
            notify: true,
        }
    }
}
