//! Texture stages: the pre-pass converts `.tga` sources into power-of-two
//! `.png` files in the intermediate tree; the final encode turns every `.png`
//! (raw, intermediate, overlay) into `.webp` in the output tree. The encode
//! enumerates its sources when it runs, so it sees files written by the
//! pre-pass and by the mesh exporter.

use super::{Stage, StageKind, ToolPaths, files_in, target_path};
use crate::context::BuildContext;
use crate::error::BuildResult;
use crate::imaging::{power_of_two_size, query_size};
use crate::meta::TEXTURE_META;
use crate::overlay::{expand, glob_in};
use crate::tools::{CommandSpec, ToolKind};
use std::path::{Path, PathBuf};

/// Every texture with `extension` in the raw texture dirs and anywhere under
/// the intermediate tree, expanded with overlay overrides and additions.
fn texture_sources(ctx: &BuildContext, extension: &str) -> Vec<PathBuf> {
    let pattern = format!("*.{extension}");
    let mut canonical = files_in(&ctx.layout.texture_dirs, &pattern);
    canonical.extend(glob_in(&ctx.layout.intermediate_dir, &format!("**/{pattern}")));
    let layout = &ctx.layout;
    let overlay_globs = [pattern];
    expand(
        &canonical,
        &layout.asset_roots,
        &layout.overlay_dirs,
        Some(&overlay_globs[..]),
    )
}

fn size_bound(ctx: &BuildContext, source: &Path) -> u32 {
    ctx.meta
        .lookup_u32(TEXTURE_META, source, "max_size")
        .unwrap_or(ctx.max_texture_size)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TexturePrepassStage;

impl Stage for TexturePrepassStage {
    fn kind(&self) -> StageKind {
        StageKind::Png
    }

    fn tools(&self) -> &'static [ToolKind] {
        &[ToolKind::Identify, ToolKind::Convert]
    }

    fn sources(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        texture_sources(ctx, "tga")
    }

    fn target(&self, ctx: &BuildContext, source: &Path) -> Option<PathBuf> {
        Some(target_path(ctx, source, &ctx.layout.intermediate_dir, "png"))
    }

    fn commands(
        &self,
        ctx: &BuildContext,
        tools: &ToolPaths,
        source: &Path,
        target: &Path,
    ) -> BuildResult<Vec<CommandSpec>> {
        let size = query_size(tools.get(ToolKind::Identify)?, source)?;
        let (width, height) = power_of_two_size(size, size_bound(ctx, source));
        let mut command = CommandSpec::new(tools.get(ToolKind::Convert)?).arg(source);
        if (width, height) != size {
            command = command
                .arg("-resize")
                .arg(format!("{width}x{height}!"));
        }
        Ok(vec![command.arg(target)])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureEncodeStage;

impl Stage for TextureEncodeStage {
    fn kind(&self) -> StageKind {
        StageKind::Webp
    }

    fn tools(&self) -> &'static [ToolKind] {
        &[ToolKind::Identify, ToolKind::Cwebp]
    }

    fn sources(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        texture_sources(ctx, "png")
    }

    fn target(&self, ctx: &BuildContext, source: &Path) -> Option<PathBuf> {
        Some(target_path(ctx, source, &ctx.layout.output_dir, "webp"))
    }

    fn commands(
        &self,
        ctx: &BuildContext,
        tools: &ToolPaths,
        source: &Path,
        target: &Path,
    ) -> BuildResult<Vec<CommandSpec>> {
        let size = query_size(tools.get(ToolKind::Identify)?, source)?;
        let (width, height) = power_of_two_size(size, size_bound(ctx, source));
        let quality = ctx
            .meta
            .lookup_u32(TEXTURE_META, source, "quality")
            .unwrap_or(ctx.texture_quality);
        let command = CommandSpec::new(tools.get(ToolKind::Cwebp)?)
            .arg("-resize")
            .arg(width.to_string())
            .arg(height.to_string())
            .arg("-q")
            .arg(quality.to_string())
            .arg(source)
            .arg("-o")
            .arg(target);
        Ok(vec![command])
    }
}
