//! Conversion stages.
//!
//! A stage enumerates its sources (overlays included), maps each source to
//! exactly one artifact, and builds the converter invocations for a stale
//! artifact. [`run_stage`] drives any stage the same way: locate the stage's
//! converters (aborting the stage if one is missing), run its preparation,
//! then convert every stale source in order, carrying on past per-file
//! failures. Build and clean share [`Stage::target`], so clean never guesses
//! artifact names independently.

pub mod anim;
pub mod flatbuffers;
pub mod mesh;
pub mod texture;

use crate::context::BuildContext;
use crate::error::{BuildError, BuildResult};
use crate::overlay::canonical_relative;
use crate::staleness::needs_rebuild;
use crate::tools::{CommandSpec, ToolKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub use anim::AnimStage;
pub use flatbuffers::FlatbuffersStage;
pub use mesh::MeshStage;
pub use texture::{TextureEncodeStage, TexturePrepassStage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Png,
    Mesh,
    Anim,
    Flatbuffers,
    Webp,
}

impl StageKind {
    /// Build order. Mesh and anim may add textures the webp encode must see.
    pub const ORDER: [StageKind; 5] = [
        StageKind::Png,
        StageKind::Mesh,
        StageKind::Anim,
        StageKind::Flatbuffers,
        StageKind::Webp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Png => "png",
            StageKind::Mesh => "mesh",
            StageKind::Anim => "anim",
            StageKind::Flatbuffers => "flatbuffers",
            StageKind::Webp => "webp",
        }
    }

    /// Stages in a lower phase always finish before a higher phase starts.
    pub fn phase(&self) -> u8 {
        match self {
            StageKind::Png => 1,
            StageKind::Mesh | StageKind::Anim => 2,
            StageKind::Flatbuffers => 3,
            StageKind::Webp => 4,
        }
    }
}

impl TryFrom<&str> for StageKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        StageKind::ORDER
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("no rule to build target {value}"))
    }
}

/// Converter paths located for one stage run.
#[derive(Debug, Default)]
pub struct ToolPaths(BTreeMap<ToolKind, PathBuf>);

impl ToolPaths {
    /// Path for `kind`. Stages only ask for tools they declared, which
    /// [`run_stage`] located before calling them.
    pub fn get(&self, kind: ToolKind) -> BuildResult<&Path> {
        self.0
            .get(&kind)
            .map(PathBuf::as_path)
            .ok_or_else(|| BuildError::missing_binary(vec![kind.executable().into()]))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.0.values().map(PathBuf::as_path)
    }
}

pub trait Stage {
    fn kind(&self) -> StageKind;

    /// Converters the stage cannot run without.
    fn tools(&self) -> &'static [ToolKind];

    /// Sources in processing order: canonical inputs, then overlay hits.
    fn sources(&self, ctx: &BuildContext) -> Vec<PathBuf>;

    /// The artifact produced from `source`, or `None` when this stage does
    /// not know the source.
    fn target(&self, ctx: &BuildContext, source: &Path) -> Option<PathBuf>;

    /// Work that must succeed before any source is converted.
    fn prepare(&self, _ctx: &BuildContext) -> BuildResult<()> {
        Ok(())
    }

    /// Staleness inputs beyond the source and the stage's converters.
    fn dependencies(&self, _ctx: &BuildContext, _source: &Path) -> BuildResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Invocations that turn `source` into `target`, run in order.
    fn commands(
        &self,
        ctx: &BuildContext,
        tools: &ToolPaths,
        source: &Path,
        target: &Path,
    ) -> BuildResult<Vec<CommandSpec>>;

    /// Files the stage writes that are not per-source artifacts.
    fn auxiliary_artifacts(&self, _ctx: &BuildContext) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Artifact path for `source`: its asset-root relative path, minus any
/// overlay prefix, under `target_root` with `extension`. Sources outside
/// every asset root keep only their file name.
pub fn target_path(ctx: &BuildContext, source: &Path, target_root: &Path, extension: &str) -> PathBuf {
    let layout = &ctx.layout;
    let relative = canonical_relative(source, &layout.asset_roots, &layout.overlay_dirs)
        .or_else(|| source.file_name().map(PathBuf::from))
        .unwrap_or_default();
    target_root.join(relative).with_extension(extension)
}

/// `(source, target)` pairs with later sources winning a shared target.
pub fn planned_artifacts(stage: &dyn Stage, ctx: &BuildContext) -> Vec<(PathBuf, PathBuf)> {
    let pairs: Vec<(PathBuf, PathBuf)> = stage
        .sources(ctx)
        .into_iter()
        .filter_map(|source| {
            let target = stage.target(ctx, &source)?;
            Some((source, target))
        })
        .collect();

    let mut last_index: HashMap<&Path, usize> = HashMap::new();
    for (idx, (_, target)) in pairs.iter().enumerate() {
        last_index.insert(target.as_path(), idx);
    }
    let keep: Vec<bool> = pairs
        .iter()
        .enumerate()
        .map(|(idx, (source, target))| {
            let winner = last_index[target.as_path()] == idx;
            if !winner {
                debug!("{} shadowed by a later source for {}", source.display(), target.display());
            }
            winner
        })
        .collect();
    pairs
        .into_iter()
        .zip(keep)
        .filter_map(|(pair, keep)| keep.then_some(pair))
        .collect()
}

/// Outcome of one stage run.
#[derive(Debug)]
pub struct StageReport {
    pub kind: StageKind,
    pub converted: Vec<PathBuf>,
    pub up_to_date: usize,
    /// Per-source failures; the stage carried on past them.
    pub failures: Vec<(PathBuf, BuildError)>,
    /// Set when the stage stopped before converting anything.
    pub aborted: Option<BuildError>,
}

impl StageReport {
    fn new(kind: StageKind) -> Self {
        Self {
            kind,
            converted: Vec::new(),
            up_to_date: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }

    /// Every error the stage hit, abort first.
    pub fn errors(&self) -> impl Iterator<Item = &BuildError> {
        self.aborted
            .iter()
            .chain(self.failures.iter().map(|(_, err)| err))
    }
}

pub fn run_stage(stage: &dyn Stage, ctx: &BuildContext) -> StageReport {
    let kind = stage.kind();
    let mut report = StageReport::new(kind);

    let mut tools = ToolPaths::default();
    for tool in stage.tools() {
        match ctx.require_tool(*tool) {
            Ok(path) => {
                tools.0.insert(*tool, path);
            }
            Err(err) => {
                error!(stage = kind.as_str(), "{err}");
                report.aborted = Some(err);
                return report;
            }
        }
    }

    if let Err(err) = stage.prepare(ctx) {
        error!(stage = kind.as_str(), "{err}");
        report.aborted = Some(err);
        return report;
    }

    for (source, target) in planned_artifacts(stage, ctx) {
        match convert_one(stage, ctx, &tools, &source, &target) {
            Ok(true) => {
                info!(stage = kind.as_str(), "{} -> {}", source.display(), target.display());
                report.converted.push(target);
            }
            Ok(false) => {
                debug!(stage = kind.as_str(), "{} up to date", target.display());
                report.up_to_date += 1;
            }
            Err(err) => {
                warn!(stage = kind.as_str(), "{}: {err}", source.display());
                report.failures.push((source, err));
            }
        }
    }
    report
}

fn convert_one(
    stage: &dyn Stage,
    ctx: &BuildContext,
    tools: &ToolPaths,
    source: &Path,
    target: &Path,
) -> BuildResult<bool> {
    let mut dependencies = vec![source.to_path_buf()];
    dependencies.extend(tools.paths().map(Path::to_path_buf));
    dependencies.extend(stage.dependencies(ctx, source)?);
    if !needs_rebuild(&dependencies, target) {
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| BuildError::filesystem("create directory", parent, err))?;
    }
    for command in stage.commands(ctx, tools, source, target)? {
        command.run()?;
    }
    Ok(true)
}

/// Every registered stage in build order.
pub fn standard_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(TexturePrepassStage),
        Box::new(MeshStage),
        Box::new(AnimStage),
        Box::new(FlatbuffersStage),
        Box::new(TextureEncodeStage),
    ]
}

/// Sorted, extension-matched files directly inside each of `dirs`.
pub(crate) fn files_in(dirs: &[PathBuf], pattern: &str) -> Vec<PathBuf> {
    dirs.iter()
        .flat_map(|dir| crate::overlay::glob_in(dir, pattern))
        .filter(|path| path.is_file())
        .collect()
}
