//! FBX animations to `.motiveanim` via the animation exporter.

use super::{Stage, StageKind, ToolPaths, files_in, target_path};
use crate::context::BuildContext;
use crate::error::BuildResult;
use crate::meta::ANIM_META;
use crate::overlay::expand;
use crate::tools::{CommandSpec, ToolKind};
use std::path::{Path, PathBuf};

pub const ANIM_EXTENSION: &str = "motiveanim";

#[derive(Debug, Clone, Copy, Default)]
pub struct AnimStage;

impl Stage for AnimStage {
    fn kind(&self) -> StageKind {
        StageKind::Anim
    }

    fn tools(&self) -> &'static [ToolKind] {
        &[ToolKind::AnimPipeline]
    }

    fn sources(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        let layout = &ctx.layout;
        let canonical = files_in(&layout.anim_dirs, "*.fbx");
        expand(&canonical, &layout.asset_roots, &layout.overlay_dirs, None)
    }

    fn target(&self, ctx: &BuildContext, source: &Path) -> Option<PathBuf> {
        Some(target_path(ctx, source, &ctx.layout.output_dir, ANIM_EXTENSION))
    }

    fn commands(
        &self,
        ctx: &BuildContext,
        tools: &ToolPaths,
        source: &Path,
        target: &Path,
    ) -> BuildResult<Vec<CommandSpec>> {
        let mut command = CommandSpec::new(tools.get(ToolKind::AnimPipeline)?)
            .arg("--details")
            .arg("--out")
            .arg(target);
        match ctx.meta.lookup_bool(ANIM_META, source, "repeat") {
            Some(true) => command = command.arg("--repeat"),
            Some(false) => command = command.arg("--norepeat"),
            None => {}
        }
        Ok(vec![command.arg(source)])
    }
}
