/// Reference resolution: which descriptor files are still claimed by a live
/// kernel process.
///
/// A kernel is launched with its descriptor path on the command line, so a
/// descriptor is "referenced" when some candidate's command line mentions the
/// watched directory and carries a `kernel-*.json` token. The match is purely
/// textual; an argument that happens to look like a descriptor path counts.
use crate::descriptor::{DESCRIPTOR_PREFIX, DESCRIPTOR_SUFFIX};
use crate::process::{Pid, ProcessTable};
use std::collections::BTreeSet;
use std::path::Path;

/// Descriptor basenames referenced during one poll cycle.
pub type ReferencedSet = BTreeSet<String>;

/// Descriptor basename referenced by `cmdline`, first match wins.
pub fn descriptor_reference(cmdline: &str, runtime_dir: &Path) -> Option<String> {
    let dir = runtime_dir.to_string_lossy();
    if dir.is_empty() || !cmdline.contains(dir.as_ref()) {
        return None;
    }
    cmdline
        .split_whitespace()
        .filter(|token| token.contains(DESCRIPTOR_PREFIX) && token.ends_with(DESCRIPTOR_SUFFIX))
        .find_map(|token| token.rsplit('/').next())
        .map(str::to_string)
}

/// Resolve the set of referenced descriptor basenames for `pids`.
///
/// Recomputed from scratch every cycle; processes that vanished since they
/// were listed simply contribute nothing.
pub fn referenced_set(
    table: &dyn ProcessTable,
    pids: &[Pid],
    runtime_dir: &Path,
) -> ReferencedSet {
    let mut refs = ReferencedSet::new();
    for &pid in pids {
        let cmdline = table.command_line(pid);
        if let Some(base) = descriptor_reference(&cmdline, runtime_dir) {
            tracing::debug!(pid, descriptor = %base, "descriptor referenced");
            refs.insert(base);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessTable;

    const RT: &str = "/run/user/1000/jupyter/runtime";

    #[test]
    fn test_reference_from_launcher_cmdline() {
        let cl = format!("python -m ipykernel_launcher -f {RT}/kernel-abc.json");
        assert_eq!(
            descriptor_reference(&cl, Path::new(RT)),
            Some("kernel-abc.json".to_string())
        );
    }

    #[test]
    fn test_no_reference_outside_runtime_dir() {
        let cl = "python -m ipykernel_launcher -f /tmp/other/kernel-abc.json";
        assert_eq!(descriptor_reference(cl, Path::new(RT)), None);
    }

    #[test]
    fn test_no_reference_without_descriptor_token() {
        let cl = format!("python -m ipykernel_launcher --runtime-dir {RT}");
        assert_eq!(descriptor_reference(&cl, Path::new(RT)), None);
    }

    #[test]
    fn test_first_descriptor_token_wins() {
        let cl = format!(
            "python -m ipykernel_launcher -f {RT}/kernel-one.json {RT}/kernel-two.json"
        );
        assert_eq!(
            descriptor_reference(&cl, Path::new(RT)),
            Some("kernel-one.json".to_string())
        );
    }

    #[test]
    fn test_relative_token_counts_when_dir_is_mentioned() {
        let cl = format!("launcher --runtime-dir {RT} kernel-x.json");
        assert_eq!(
            descriptor_reference(&cl, Path::new(RT)),
            Some("kernel-x.json".to_string())
        );
    }

    #[test]
    fn test_empty_cmdline() {
        assert_eq!(descriptor_reference("", Path::new(RT)), None);
    }

    #[test]
    fn test_referenced_set_over_table() {
        let table = FakeProcessTable::new();
        table.add(
            1,
            &format!("python -m ipykernel_launcher -f {RT}/kernel-a.json"),
            10,
            1000,
        );
        table.add(
            2,
            &format!("python -m ipykernel_launcher -f {RT}/kernel-b.json"),
            10,
            1000,
        );
        table.add(3, "python -m ipykernel_launcher", 10, 1000);

        // Pid 4 was listed but has since exited
        let refs = referenced_set(&table, &[1, 2, 3, 4], Path::new(RT));
        let expected: ReferencedSet = ["kernel-a.json", "kernel-b.json"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(refs, expected);
    }
}
