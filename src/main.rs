mod config;
mod descriptor;
mod escalation;
mod events;
mod process;
mod reaper;
mod resolver;
mod signals;
mod status;
mod watcher;

use clap::Parser;
use config::{expand_home, WatcherConfig};
use escalation::EscalationPolicy;
use events::{DesktopNotifier, FileEventLog};
use process::{CommandMatcher, LinuxProcessTable};
use status::StatusTracker;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use watcher::{WatchSettings, Watcher};

/// Watch a Jupyter runtime directory: delete kernel connection files no live
/// kernel references, and gently shut down unreferenced kernels that have
/// been running too long.
#[derive(Parser, Debug)]
#[command(name = "kernel-watcher", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "kernel-watcher.toml")]
    config: PathBuf,

    /// Runtime directory to watch (overrides config)
    #[arg(long)]
    runtime: Option<PathBuf>,

    /// Polling interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Max elapsed seconds before an unreferenced kernel is shut down (overrides config)
    #[arg(long)]
    max_age: Option<u64>,

    /// Log file path (overrides config)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Send SIGKILL to kernels that survive SIGTERM
    #[arg(long)]
    force_kill: bool,

    /// Command-line pattern identifying kernel processes, as for `pgrep -f` (overrides config)
    #[arg(long)]
    match_cmd: Option<String>,

    /// Seconds to wait after SIGINT and after SIGTERM (overrides config)
    #[arg(long)]
    grace: Option<u64>,

    /// Disable desktop notifications
    #[arg(long)]
    no_notify: bool,

    /// Write a JSON status snapshot to this path after every cycle (overrides config)
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Print resolved settings and exit without touching files or processes
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-cycle counts, skipped processes)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut WatcherConfig) {
        if let Some(runtime) = &self.runtime {
            config.watch.runtime_dir = expand_home(runtime);
        }
        if let Some(interval) = self.interval {
            config.watch.interval_secs = interval;
        }
        if let Some(max_age) = self.max_age {
            config.watch.max_age_secs = max_age;
        }
        if let Some(log) = &self.log {
            config.log.file = expand_home(log);
        }
        if self.force_kill {
            config.escalation.force_kill = true;
        }
        if let Some(match_cmd) = &self.match_cmd {
            config.watch.match_cmd = match_cmd.clone();
        }
        if let Some(grace) = self.grace {
            config.escalation.grace_secs = grace;
        }
        if self.no_notify {
            config.log.notify = false;
        }
        if let Some(status_file) = &self.status_file {
            config.status.file = Some(expand_home(status_file));
        }
    }
}

fn settings_from(config: &WatcherConfig) -> WatchSettings {
    WatchSettings {
        runtime_dir: config.watch.runtime_dir.clone(),
        interval: config.watch.interval(),
        max_age_secs: config.watch.max_age_secs,
        matcher: CommandMatcher::new(&config.watch.match_cmd),
        escalation: EscalationPolicy {
            grace: config.escalation.grace(),
            force_kill: config.escalation.force_kill,
        },
        operator_uid: nix::unistd::getuid().as_raw(),
    }
}

fn print_settings(config: &WatcherConfig) {
    println!("kernel-watcher v{}", env!("CARGO_PKG_VERSION"));
    println!("runtime dir:   {}", config.watch.runtime_dir.display());
    println!("interval:      {}s", config.watch.interval_secs);
    println!("max age:       {}s", config.watch.max_age_secs);
    println!("match cmd:     {}", config.watch.match_cmd);
    println!("grace:         {}s", config.escalation.grace_secs);
    println!("force kill:    {}", config.escalation.force_kill);
    println!("log file:      {}", config.log.file.display());
    println!("notify:        {}", config.log.notify);
    match &config.status.file {
        Some(path) => println!("status file:   {}", path.display()),
        None => println!("status file:   (none)"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::debug!(?cli, "parsed CLI arguments");

    let mut config = match WatcherConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    if cli.dry_run {
        print_settings(&config);
        return;
    }

    let notifier = if config.log.notify {
        DesktopNotifier::discover()
    } else {
        None
    };
    let sink = FileEventLog::new(config.log.file.clone(), notifier);
    tracing::info!(log = %sink.path().display(), "kernel-watcher starting");

    let table = LinuxProcessTable::new();
    let settings = settings_from(&config);
    let mut watcher = Watcher::new(settings, &table, &sink);
    if let Some(path) = &config.status.file {
        watcher = watcher.with_status(StatusTracker::new(path.clone(), &config.watch.runtime_dir));
    }

    watcher
        .run(
            async {
                let signal = signals::shutdown_signal().await;
                tracing::debug!(?signal, "shutdown requested");
            },
            cli.once,
        )
        .await;
}
