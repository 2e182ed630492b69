/// The watch loop: on a fixed interval, reap descriptor files nobody
/// references and escalate against unreferenced kernels that have outlived
/// the configured age.
///
/// All state is recomputed every cycle. A referenced kernel is never
/// signalled and a referenced descriptor is never deleted, and a process not
/// owned by the operator is never touched.
use crate::descriptor::list_descriptors;
use crate::escalation::{escalate, EscalationOutcome, EscalationPolicy};
use crate::events::{EventSink, WatchEvent};
use crate::process::{CommandMatcher, Pid, ProcessTable};
use crate::reaper::{reap_stale, ReapSummary};
use crate::resolver::{descriptor_reference, referenced_set};
use crate::status::{StatusTracker, WatcherState};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Resolved settings for one watcher run.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub runtime_dir: PathBuf,
    pub interval: Duration,
    pub max_age_secs: u64,
    pub matcher: CommandMatcher,
    pub escalation: EscalationPolicy,
    /// Only processes owned by this uid are ever signalled.
    pub operator_uid: u32,
}

/// What one poll cycle saw and did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub descriptors: usize,
    pub kernels: Vec<Pid>,
    pub referenced: usize,
    pub reaped: ReapSummary,
    pub escalations: Vec<(Pid, EscalationOutcome)>,
}

pub struct Watcher<'a> {
    settings: WatchSettings,
    table: &'a dyn ProcessTable,
    sink: &'a dyn EventSink,
    status: Option<StatusTracker>,
}

impl<'a> Watcher<'a> {
    pub fn new(
        settings: WatchSettings,
        table: &'a dyn ProcessTable,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            settings,
            table,
            sink,
            status: None,
        }
    }

    /// Write a status snapshot after every cycle.
    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = Some(status);
        self
    }

    /// Run one full cycle: scan, find, resolve, reap, then age-check and
    /// escalate.
    pub async fn run_cycle(&self) -> CycleReport {
        let settings = &self.settings;
        let descriptors = list_descriptors(&settings.runtime_dir);
        let kernels = self.table.list(&settings.matcher);
        let refs = referenced_set(self.table, &kernels, &settings.runtime_dir);
        tracing::debug!(
            descriptors = descriptors.len(),
            kernels = kernels.len(),
            referenced = refs.len(),
            "cycle scanned"
        );

        let reaped = reap_stale(&descriptors, &refs, self.sink);

        let mut escalations = Vec::new();
        for &pid in &kernels {
            match self.table.owner_uid(pid) {
                Some(owner) if owner == settings.operator_uid => {}
                Some(owner) => {
                    tracing::debug!(pid, owner, "skipping process owned by another user");
                    continue;
                }
                None => continue,
            }
            let cmdline = self.table.command_line(pid);
            if let Some(base) = descriptor_reference(&cmdline, &settings.runtime_dir) {
                if refs.contains(&base) {
                    continue;
                }
            }

            let elapsed_secs = self.table.elapsed_secs(pid);
            if elapsed_secs < settings.max_age_secs {
                continue;
            }
            let ppid = self.table.describe(pid).map(|p| p.ppid);
            tracing::debug!(pid, ?ppid, elapsed_secs, "unreferenced kernel over age");
            self.sink.record(&WatchEvent::LongRunning {
                pid,
                elapsed_secs,
                max_age_secs: settings.max_age_secs,
            });
            self.sink.notify(
                "Kernel watcher - long-running kernel",
                &format!("PID {pid} running for {elapsed_secs}s (unreferenced)"),
            );
            let outcome = escalate(self.table, self.sink, pid, settings.escalation).await;
            escalations.push((pid, outcome));
        }

        CycleReport {
            descriptors: descriptors.len(),
            kernels,
            referenced: refs.len(),
            reaped,
            escalations,
        }
    }

    /// Poll until `shutdown` resolves (or after one cycle when `once` is set).
    ///
    /// Shutdown is honoured at every suspension point, including the grace
    /// waits inside an escalation.
    pub async fn run<F>(mut self, shutdown: F, once: bool)
    where
        F: Future,
    {
        self.sink.record(&WatchEvent::Started {
            runtime_dir: self.settings.runtime_dir.clone(),
            interval: self.settings.interval,
            max_age_secs: self.settings.max_age_secs,
        });
        self.update_status(WatcherState::Starting);

        tokio::pin!(shutdown);
        let mut interrupted = false;
        loop {
            self.update_status(WatcherState::Polling);
            let report = tokio::select! {
                report = self.run_cycle() => report,
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
            };
            if let Some(status) = self.status.as_mut() {
                status.record_cycle(&report);
            }
            self.update_status(WatcherState::Idle);

            if once {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = &mut shutdown => {
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            self.sink.record(&WatchEvent::Stopped);
        } else {
            tracing::info!("single cycle complete");
        }
        if let Some(status) = &self.status {
            status.finish();
        }
    }

    fn update_status(&self, state: WatcherState) {
        if let Some(status) = &self.status {
            status.update(state);
        }
    }
}
