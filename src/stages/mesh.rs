//! FBX meshes to `.fplmesh` via the mesh exporter.

use super::{Stage, StageKind, ToolPaths, files_in, target_path};
use crate::context::BuildContext;
use crate::error::BuildResult;
use crate::meta::MESH_META;
use crate::overlay::{canonical_relative, expand};
use crate::tools::{CommandSpec, ToolKind};
use std::path::{Path, PathBuf};

pub const MESH_EXTENSION: &str = "fplmesh";
const DEFAULT_UNIT: &str = "cm";

#[derive(Debug, Clone, Copy, Default)]
pub struct MeshStage;

impl Stage for MeshStage {
    fn kind(&self) -> StageKind {
        StageKind::Mesh
    }

    fn tools(&self) -> &'static [ToolKind] {
        &[ToolKind::MeshPipeline]
    }

    fn sources(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        let layout = &ctx.layout;
        let canonical = files_in(&layout.mesh_dirs, "*.fbx");
        expand(&canonical, &layout.asset_roots, &layout.overlay_dirs, None)
    }

    fn target(&self, ctx: &BuildContext, source: &Path) -> Option<PathBuf> {
        Some(target_path(ctx, source, &ctx.layout.output_dir, MESH_EXTENSION))
    }

    fn commands(
        &self,
        ctx: &BuildContext,
        tools: &ToolPaths,
        source: &Path,
        _target: &Path,
    ) -> BuildResult<Vec<CommandSpec>> {
        let layout = &ctx.layout;
        let meta = &ctx.meta;
        let unit = meta
            .lookup_str(MESH_META, source, "unit")
            .unwrap_or(DEFAULT_UNIT);
        // The exporter names its output itself; it only needs the directory.
        let relative_dir = canonical_relative(source, &layout.asset_roots, &layout.overlay_dirs)
            .and_then(|rel| rel.parent().map(Path::to_path_buf))
            .unwrap_or_default();

        let mut command = CommandSpec::new(tools.get(ToolKind::MeshPipeline)?)
            .arg("--details")
            .args(["--texture-extension", "webp"])
            .args(["--axes", "z+y+x"])
            .arg("--unit")
            .arg(unit)
            .arg("--base-dir")
            .arg(&layout.output_dir)
            .arg("--relative-dir")
            .arg(&relative_dir);
        if let Some(formats) = meta.lookup_str(MESH_META, source, "texture_formats") {
            command = command.arg("-f").arg(formats);
        }
        if meta.lookup_bool(MESH_META, source, "recenter").unwrap_or(false) {
            command = command.arg("-c");
        }
        if meta.lookup_bool(MESH_META, source, "hierarchy").unwrap_or(false) {
            command = command.arg("-h");
        }
        Ok(vec![command.arg(source)])
    }
}
