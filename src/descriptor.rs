/// Descriptor directory scanning and descriptor-name matching.
use std::path::{Path, PathBuf};

pub const DESCRIPTOR_PREFIX: &str = "kernel-";
pub const DESCRIPTOR_SUFFIX: &str = ".json";

/// Whether `name` follows the `kernel-<id>.json` convention.
pub fn is_descriptor_name(name: &str) -> bool {
    name.starts_with(DESCRIPTOR_PREFIX) && name.ends_with(DESCRIPTOR_SUFFIX)
}

/// List descriptor files in `dir`, sorted by path.
///
/// A missing directory yields an empty list: the front-end creates its
/// runtime directory lazily and the watcher may start first.
pub fn list_descriptors(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, dir = %dir.display(), "failed to list runtime directory");
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_str().is_some_and(is_descriptor_name))
        .map(|entry| dir.join(entry.file_name()))
        .collect();
    paths.sort();
    paths
}

/// Basename of a descriptor path as a string, if it has one.
pub fn basename(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}
