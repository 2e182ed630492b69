/// Stale descriptor removal.
use crate::descriptor::basename;
use crate::events::{EventSink, WatchEvent};
use crate::resolver::ReferencedSet;
use std::path::PathBuf;

/// Outcome of one reaping pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapSummary {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Delete every descriptor whose basename nobody references.
///
/// Failures are recorded and skipped; a file that vanished on its own
/// (the kernel exited cleanly mid-cycle) shows up as a failed delete.
pub fn reap_stale(
    descriptors: &[PathBuf],
    referenced: &ReferencedSet,
    sink: &dyn EventSink,
) -> ReapSummary {
    let mut summary = ReapSummary::default();
    for path in descriptors {
        let Some(base) = basename(path) else {
            continue;
        };
        if referenced.contains(base) {
            continue;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                sink.record(&WatchEvent::Deleted { path: path.clone() });
                sink.notify("Kernel watcher - deleted file", base);
                summary.deleted.push(path.clone());
            }
            Err(e) => {
                sink.record(&WatchEvent::DeleteFailed {
                    path: path.clone(),
                    error: e.to_string(),
                });
                summary.failed.push(path.clone());
            }
        }
    }
    summary
}
