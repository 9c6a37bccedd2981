//! Artifact removal, driven by the same source enumeration and target
//! mapping the build uses.

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::stages::{Stage, planned_artifacts};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<BuildError>,
}

impl CleanReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Remove every artifact `stages` would produce. Stages are visited in
/// reverse so later stages still see the intermediate files earlier stages
/// produced. Missing artifacts are skipped.
pub fn clean(ctx: &BuildContext, stages: &[&dyn Stage]) -> CleanReport {
    let mut report = CleanReport::default();
    for stage in stages.iter().rev() {
        let kind = stage.kind();
        let mut artifacts: Vec<PathBuf> = planned_artifacts(*stage, ctx)
            .into_iter()
            .map(|(_, target)| target)
            .collect();
        artifacts.extend(stage.auxiliary_artifacts(ctx));
        debug!(stage = kind.as_str(), "{} artifacts to remove", artifacts.len());
        for artifact in artifacts {
            match remove_artifact(&artifact) {
                Ok(true) => {
                    info!(stage = kind.as_str(), "removed {}", artifact.display());
                    report.removed.push(artifact);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(stage = kind.as_str(), "{err}");
                    report.failures.push(err);
                }
            }
        }
    }
    report
}

fn remove_artifact(path: &Path) -> Result<bool, BuildError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BuildError::filesystem("remove", path, err)),
    }
}
