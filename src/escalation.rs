/// Graduated shutdown of one kernel process: SIGINT, then SIGTERM, then
/// (optionally) SIGKILL, with a grace period and liveness check between
/// stages.
///
/// One invocation runs the whole sequence to a terminal outcome. A process
/// that survives is not retried here; the next poll cycle re-evaluates it and
/// may start again from SIGINT.
use crate::events::{EventSink, WatchEvent};
use crate::process::{Pid, ProcessTable, SignalError, SignalKind};
use std::time::Duration;

/// Knobs for the escalation sequence.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    /// Wait after SIGINT and again after SIGTERM.
    pub grace: Duration,
    /// Send SIGKILL when SIGTERM did not end the process.
    pub force_kill: bool,
}

/// Terminal state of one escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    /// The process was gone before SIGINT could be delivered.
    AlreadyExited,
    /// SIGINT could not be delivered; later stages were skipped.
    Aborted,
    /// The process exited within the grace period after `SignalKind`.
    Exited(SignalKind),
    /// SIGKILL was delivered.
    Killed,
    /// Still alive after SIGTERM and SIGKILL was disabled or failed.
    GaveUp,
}

/// Stages the sequence passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Targeted,
    WaitingAfter(SignalKind),
    Finished(EscalationOutcome),
}

/// Drive the escalation sequence for `pid` to completion.
pub async fn escalate(
    table: &dyn ProcessTable,
    sink: &dyn EventSink,
    pid: Pid,
    policy: EscalationPolicy,
) -> EscalationOutcome {
    let mut stage = Stage::Targeted;
    loop {
        stage = match stage {
            Stage::Targeted => interrupt(table, sink, pid),
            Stage::WaitingAfter(sent) => {
                tokio::time::sleep(policy.grace).await;
                if !table.exists(pid) {
                    sink.record(&exited_after(pid, sent));
                    Stage::Finished(EscalationOutcome::Exited(sent))
                } else if sent == SignalKind::Interrupt {
                    terminate(table, sink, pid)
                } else {
                    after_terminate(table, sink, pid, policy.force_kill)
                }
            }
            Stage::Finished(outcome) => {
                tracing::debug!(pid, ?outcome, "escalation finished");
                return outcome;
            }
        };
    }
}

fn interrupt(table: &dyn ProcessTable, sink: &dyn EventSink, pid: Pid) -> Stage {
    match table.signal(pid, SignalKind::Interrupt) {
        Ok(()) => {
            sink.record(&WatchEvent::InterruptSent { pid });
            sink.notify(
                "Kernel watcher - shutting down",
                &format!("SIGINT sent to {pid}"),
            );
            Stage::WaitingAfter(SignalKind::Interrupt)
        }
        Err(SignalError::NotFound) => {
            sink.record(&WatchEvent::AlreadyExited { pid });
            Stage::Finished(EscalationOutcome::AlreadyExited)
        }
        Err(SignalError::PermissionDenied) => {
            sink.record(&WatchEvent::InterruptDenied { pid });
            Stage::Finished(EscalationOutcome::Aborted)
        }
        Err(error) => {
            sink.record(&WatchEvent::InterruptFailed { pid, error });
            Stage::Finished(EscalationOutcome::Aborted)
        }
    }
}

fn terminate(table: &dyn ProcessTable, sink: &dyn EventSink, pid: Pid) -> Stage {
    match table.signal(pid, SignalKind::Terminate) {
        Ok(()) => sink.record(&WatchEvent::TerminateSent { pid }),
        Err(error) => sink.record(&WatchEvent::TerminateFailed { pid, error }),
    }
    Stage::WaitingAfter(SignalKind::Terminate)
}

fn after_terminate(
    table: &dyn ProcessTable,
    sink: &dyn EventSink,
    pid: Pid,
    force_kill: bool,
) -> Stage {
    if !force_kill {
        sink.record(&WatchEvent::GaveUp { pid });
        return Stage::Finished(EscalationOutcome::GaveUp);
    }
    match table.signal(pid, SignalKind::Kill) {
        Ok(()) => {
            sink.record(&WatchEvent::KillSent { pid });
            Stage::Finished(EscalationOutcome::Killed)
        }
        Err(SignalError::NotFound) => {
            sink.record(&WatchEvent::ExitedAfterTerminate { pid });
            Stage::Finished(EscalationOutcome::Exited(SignalKind::Terminate))
        }
        Err(error) => {
            sink.record(&WatchEvent::KillFailed { pid, error });
            Stage::Finished(EscalationOutcome::GaveUp)
        }
    }
}

fn exited_after(pid: Pid, sent: SignalKind) -> WatchEvent {
    match sent {
        SignalKind::Interrupt => WatchEvent::ExitedAfterInterrupt { pid },
        _ => WatchEvent::ExitedAfterTerminate { pid },
    }
}
