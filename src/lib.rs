pub mod clean;
pub mod context;
pub mod error;
pub mod imaging;
pub mod manifest;
pub mod meta;
pub mod overlay;
pub mod pipeline;
pub mod resolve;
mod schema_loader;
pub mod stages;
pub mod staleness;
pub mod tools;

use anyhow::{Result, bail};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub use clean::{CleanReport, clean};
pub use context::{BuildContext, ConversionUnit, ProjectLayout, resolver_from_arg};
pub use error::{BINARY_NOT_FOUND, BuildError, BuildResult};
pub use manifest::{BuildManifest, MANIFEST_FILE};
pub use meta::AssetMeta;
pub use overlay::expand;
pub use pipeline::{Pipeline, PipelineReport, Target};
pub use resolve::locate::{BinaryPath, PathRef, ResourcePath};
pub use resolve::{DependencyPath, PathTag, PrefixResolver, Resolver, ResolverChain, default_chain};
pub use stages::{Stage, StageKind, StageReport, run_stage};
pub use staleness::needs_rebuild;
pub use tools::{CommandSpec, ToolKind, ToolSet};

pub const ROOT_ENV: &str = "ASSETBAKE_ROOT";
const RAW_ASSETS_SENTINEL: &str = "src/rawassets";

fn is_project_root(candidate: &Path) -> bool {
    candidate.join(MANIFEST_FILE).is_file() || candidate.join(RAW_ASSETS_SENTINEL).is_dir()
}

fn explicit_root(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    let path = PathBuf::from(raw);
    if !path.exists() || !is_project_root(&path) {
        return None;
    }
    fs::canonicalize(path).ok()
}

fn search_upwards(start: &Path) -> Option<PathBuf> {
    let mut dir = fs::canonicalize(start).ok()?;
    loop {
        if is_project_root(&dir) {
            return Some(dir);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

/// Locate the project being built: `ASSETBAKE_ROOT`, then the nearest
/// ancestor of the working directory with a manifest or raw asset tree.
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(env_root) = env::var(ROOT_ENV) {
        if let Some(root) = explicit_root(&env_root) {
            return Ok(root);
        }
    }

    if let Ok(cwd) = env::current_dir() {
        if let Some(root) = search_upwards(&cwd) {
            return Ok(root);
        }
    }

    bail!(
        "Unable to locate a project root. Run from inside the project, pass --project-root, or set {ROOT_ENV}."
    );
}
