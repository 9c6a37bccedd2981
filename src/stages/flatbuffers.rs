//! JSON to FlatBuffers binaries via `flatc`.
//!
//! Every registered schema, including reference-only ones, is resolved and
//! copied into the schema output directory before anything is compiled, and
//! every schema's directory is passed to `flatc` as an include path.

use super::{Stage, StageKind, ToolPaths, target_path};
use crate::context::{BuildContext, ConversionUnit};
use crate::error::{BuildError, BuildResult};
use crate::overlay::{canonical_relative, expand};
use crate::staleness::needs_rebuild;
use crate::tools::{CommandSpec, ToolKind};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatbuffersStage;

impl FlatbuffersStage {
    /// The unit compiling `source`, matched on overlay-stripped identity so
    /// an overlay JSON file compiles against its canonical file's schema.
    fn unit_for<'a>(ctx: &'a BuildContext, source: &Path) -> Option<&'a ConversionUnit> {
        let layout = &ctx.layout;
        let identity = |path: &Path| {
            canonical_relative(path, &layout.asset_roots, &layout.overlay_dirs)
                .unwrap_or_else(|| path.to_path_buf())
        };
        let wanted = identity(source);
        ctx.units.iter().filter(|unit| unit.has_outputs()).find(|unit| {
            unit.input_files
                .iter()
                .any(|input| input == source || identity(input) == wanted)
        })
    }

    /// Directories of every registered schema, in unit order, deduplicated.
    fn include_dirs(ctx: &BuildContext) -> BuildResult<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for unit in &ctx.units {
            let schema = ctx.resolve_resource(&unit.schema)?;
            if let Some(dir) = schema.parent() {
                if !dirs.iter().any(|seen| seen == dir) {
                    dirs.push(dir.to_path_buf());
                }
            }
        }
        Ok(dirs)
    }
}

impl Stage for FlatbuffersStage {
    fn kind(&self) -> StageKind {
        StageKind::Flatbuffers
    }

    fn tools(&self) -> &'static [ToolKind] {
        &[ToolKind::Flatc]
    }

    fn sources(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        let layout = &ctx.layout;
        ctx.units
            .iter()
            .filter(|unit| unit.has_outputs())
            .flat_map(|unit| {
                expand(
                    &unit.input_files,
                    &layout.asset_roots,
                    &layout.overlay_dirs,
                    None,
                )
            })
            .collect()
    }

    fn target(&self, ctx: &BuildContext, source: &Path) -> Option<PathBuf> {
        let unit = Self::unit_for(ctx, source)?;
        Some(target_path(
            ctx,
            source,
            &ctx.layout.output_dir,
            &unit.output_extension,
        ))
    }

    /// Resolve every schema and refresh its copy in the schema output dir.
    fn prepare(&self, ctx: &BuildContext) -> BuildResult<()> {
        let out_dir = &ctx.layout.schema_output_dir;
        for unit in &ctx.units {
            let schema = ctx.resolve_resource(&unit.schema)?;
            let copy = out_dir.join(unit.schema.file_name());
            if !needs_rebuild(&[&schema], &copy) {
                debug!("{} up to date", copy.display());
                continue;
            }
            fs::create_dir_all(out_dir)
                .map_err(|err| BuildError::filesystem("create directory", out_dir, err))?;
            fs::copy(&schema, &copy).map_err(|err| BuildError::filesystem("copy schema to", &copy, err))?;
            info!("{} -> {}", schema.display(), copy.display());
        }
        Ok(())
    }

    fn dependencies(&self, ctx: &BuildContext, source: &Path) -> BuildResult<Vec<PathBuf>> {
        match Self::unit_for(ctx, source) {
            Some(unit) => Ok(vec![ctx.resolve_resource(&unit.schema)?]),
            None => Ok(Vec::new()),
        }
    }

    fn commands(
        &self,
        ctx: &BuildContext,
        tools: &ToolPaths,
        source: &Path,
        target: &Path,
    ) -> BuildResult<Vec<CommandSpec>> {
        let Some(unit) = Self::unit_for(ctx, source) else {
            return Ok(Vec::new());
        };
        let schema = ctx.resolve_resource(&unit.schema)?;
        let out_dir = target.parent().unwrap_or_else(|| Path::new("."));

        let mut command = CommandSpec::new(tools.get(ToolKind::Flatc)?)
            .arg("-o")
            .arg(out_dir);
        for dir in Self::include_dirs(ctx)? {
            command = command.arg("-I").arg(dir);
        }
        Ok(vec![command.arg("-b").arg(schema).arg(source)])
    }

    fn auxiliary_artifacts(&self, ctx: &BuildContext) -> Vec<PathBuf> {
        ctx.units
            .iter()
            .map(|unit| ctx.layout.schema_output_dir.join(unit.schema.file_name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProjectLayout;
    use crate::manifest::BuildManifest;
    use crate::resolve::locate::ResourcePath;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    struct Fixture {
        temp: TempDir,
        ctx: BuildContext,
    }

    impl Fixture {
        fn raw(&self) -> PathBuf {
            self.temp.path().join("src/rawassets")
        }
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("src/rawassets");
        touch(&temp.path().join("src/flatbufferschemas/rail_def.fbs"));
        touch(&temp.path().join("shared/schemas/common.fbs"));
        touch(&raw.join("rails/coaster.json"));
        touch(&raw.join("overlays/winter/rails/coaster.json"));

        let units = vec![
            ConversionUnit::new(
                ResourcePath::under(temp.path().join("src/flatbufferschemas"), "rail_def.fbs"),
                "rail",
                vec![raw.join("rails/coaster.json")],
            ),
            ConversionUnit::reference_only(ResourcePath::under(
                temp.path().join("shared/schemas"),
                "common.fbs",
            )),
        ];
        let ctx = BuildContext::new(ProjectLayout::from_manifest(
            temp.path(),
            &BuildManifest::default(),
        ))
        .with_units(units);
        Fixture { temp, ctx }
    }

    #[test]
    fn overlay_json_compiles_to_canonical_artifact() {
        let fx = fixture();
        let sources = FlatbuffersStage.sources(&fx.ctx);
        assert_eq!(
            sources,
            vec![
                fx.raw().join("rails/coaster.json"),
                fx.raw().join("overlays/winter/rails/coaster.json"),
            ]
        );
        let expected = fx.temp.path().join("assets/rails/coaster.rail");
        for source in &sources {
            assert_eq!(FlatbuffersStage.target(&fx.ctx, source).unwrap(), expected);
        }
        assert!(FlatbuffersStage
            .target(&fx.ctx, &fx.raw().join("rails/unknown.json"))
            .is_none());
    }

    #[test]
    fn command_includes_reference_only_schema_dirs() {
        let fx = fixture();
        let mut tools = ToolPaths::default();
        tools.0.insert(ToolKind::Flatc, PathBuf::from("flatc"));
        let source = fx.raw().join("rails/coaster.json");
        let target = FlatbuffersStage.target(&fx.ctx, &source).unwrap();
        let commands = FlatbuffersStage
            .commands(&fx.ctx, &tools, &source, &target)
            .unwrap();
        let root = fx.temp.path();
        let expected: Vec<String> = vec![
            "-o".into(),
            root.join("assets/rails").display().to_string(),
            "-I".into(),
            root.join("src/flatbufferschemas").display().to_string(),
            "-I".into(),
            root.join("shared/schemas").display().to_string(),
            "-b".into(),
            root.join("src/flatbufferschemas/rail_def.fbs").display().to_string(),
            source.display().to_string(),
        ];
        assert_eq!(commands[0].arg_strings(), expected);
    }

    #[test]
    fn prepare_copies_every_schema() {
        let fx = fixture();
        FlatbuffersStage.prepare(&fx.ctx).unwrap();
        let artifacts = FlatbuffersStage.auxiliary_artifacts(&fx.ctx);
        assert_eq!(artifacts.len(), 2);
        for artifact in &artifacts {
            assert!(artifact.is_file(), "{} missing", artifact.display());
        }
    }

    #[test]
    fn unresolvable_schema_fails_preparation() {
        let fx = fixture();
        let ctx = BuildContext::new(fx.ctx.layout.clone()).with_units(vec![
            ConversionUnit::reference_only(ResourcePath::under(
                fx.temp.path().join("nowhere"),
                "missing.fbs",
            )),
        ]);
        let err = FlatbuffersStage.prepare(&ctx).unwrap_err();
        assert!(matches!(err, BuildError::DependencyNotFound { .. }));
    }
}
