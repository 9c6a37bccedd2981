//! Modification-time staleness test.
//!
//! A target is stale when it is missing or when any dependency was modified
//! strictly after it. Dependencies whose mtime cannot be read count as newer:
//! a spurious rebuild is acceptable, a missed one is not.

use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tracing::trace;

pub fn needs_rebuild<P: AsRef<Path>>(dependencies: &[P], target: &Path) -> bool {
    let Some(target_time) = modified(target) else {
        trace!("{} missing", target.display());
        return true;
    };
    dependencies.iter().any(|dep| {
        let dep = dep.as_ref();
        match modified(dep) {
            Some(dep_time) => dep_time > target_time,
            None => {
                trace!("no mtime for dependency {}", dep.display());
                true
            }
        }
    })
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
