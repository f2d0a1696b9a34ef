//! Removal of old on-disk version directories

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::version::{Version, VersionKind, compare};

/// Delete version directories under `repository_dir` beyond the newest `keep`.
///
/// Directories are ranked with the version comparator. `current` is never
/// removed, and directories whose name is an opaque version are left alone
/// because they cannot be ranked. Returns the removed paths.
pub fn prune_versions(
    repository_dir: &Path,
    keep: usize,
    current: &str,
) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(repository_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut ranked: Vec<(Version, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let version = Version::parse(&name);
        if matches!(version.kind(), VersionKind::Opaque(_)) {
            debug!("Leaving unrankable directory {}", entry.path().display());
            continue;
        }
        ranked.push((version, entry.path()));
    }

    // Newest first
    ranked.sort_by(|(a, _), (b, _)| compare(b, a).unwrap_or(Ordering::Equal));

    let mut removed = Vec::new();
    for (version, path) in ranked.into_iter().skip(keep.max(1)) {
        if version.raw() == current {
            continue;
        }
        std::fs::remove_dir_all(&path)?;
        info!("Removed old version directory {}", path.display());
        removed.push(path);
    }
    Ok(removed)
}
