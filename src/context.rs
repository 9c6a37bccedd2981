//! Everything one build invocation needs, constructed once and passed by
//! reference to every stage: directory layout, resolver chain, converter
//! lookups, metadata, and the schema conversion units.

use crate::error::BuildResult;
use crate::imaging::DEFAULT_MAX_TEXTURE_SIZE;
use crate::manifest::BuildManifest;
use crate::meta::AssetMeta;
use crate::overlay::glob_in;
use crate::resolve::locate::ResourcePath;
use crate::resolve::{PathTag, PrefixResolver, ResolverChain, VersionedDirResolver, default_chain};
use crate::tools::{ToolKind, ToolSet};
use anyhow::{Context, Result, bail};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Absolute directories for one project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectLayout {
    pub project_root: PathBuf,
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    pub intermediate_dir: PathBuf,
    /// Where schema copies land, inside `output_dir`.
    pub schema_output_dir: PathBuf,
    /// Canonical source trees, first match wins.
    pub asset_roots: Vec<PathBuf>,
    /// Overlay directories relative to an asset root.
    pub overlay_dirs: Vec<PathBuf>,
    pub texture_dirs: Vec<PathBuf>,
    pub mesh_dirs: Vec<PathBuf>,
    pub anim_dirs: Vec<PathBuf>,
}

impl ProjectLayout {
    /// Layout rooted at `project_root`, discovering overlay directories on disk.
    pub fn from_manifest(project_root: &Path, manifest: &BuildManifest) -> Self {
        let raw_dir = project_root.join(&manifest.raw_assets);
        let output_dir = project_root.join(&manifest.output);
        let intermediate_dir = project_root.join(&manifest.intermediate_textures);
        let overlay_dirs = glob_in(&raw_dir, &manifest.overlays)
            .into_iter()
            .filter(|dir| dir.is_dir())
            .filter_map(|dir| dir.strip_prefix(&raw_dir).ok().map(Path::to_path_buf))
            .collect();
        Self {
            project_root: project_root.to_path_buf(),
            schema_output_dir: output_dir.join(&manifest.schema_output),
            asset_roots: vec![raw_dir.clone(), intermediate_dir.clone()],
            overlay_dirs,
            texture_dirs: manifest.texture_dirs.iter().map(|d| raw_dir.join(d)).collect(),
            mesh_dirs: manifest.mesh_dirs.iter().map(|d| raw_dir.join(d)).collect(),
            anim_dirs: manifest.anim_dirs.iter().map(|d| raw_dir.join(d)).collect(),
            raw_dir,
            output_dir,
            intermediate_dir,
        }
    }
}

/// A schema plus the JSON files compiled against it. An empty extension marks
/// a schema that only needs to be includable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionUnit {
    pub schema: ResourcePath,
    pub output_extension: String,
    pub input_files: Vec<PathBuf>,
}

impl ConversionUnit {
    pub fn new(schema: ResourcePath, output_extension: impl Into<String>, input_files: Vec<PathBuf>) -> Self {
        Self {
            schema,
            output_extension: output_extension.into(),
            input_files,
        }
    }

    pub fn reference_only(schema: ResourcePath) -> Self {
        Self::new(schema, "", Vec::new())
    }

    pub fn has_outputs(&self) -> bool {
        !self.output_extension.is_empty()
    }
}

#[derive(Debug)]
pub struct BuildContext {
    pub layout: ProjectLayout,
    pub resolvers: ResolverChain,
    pub tools: ToolSet,
    pub meta: AssetMeta,
    pub units: Vec<ConversionUnit>,
    pub max_texture_size: u32,
    pub texture_quality: u32,
    resources: RefCell<BTreeMap<ResourcePath, PathBuf>>,
}

impl BuildContext {
    /// Context with the default resolver chain and no schemas or metadata.
    pub fn new(layout: ProjectLayout) -> Self {
        let resolvers = default_chain(&layout.project_root);
        Self {
            layout,
            resolvers,
            tools: ToolSet::new(),
            meta: AssetMeta::empty(),
            units: Vec::new(),
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            texture_quality: 90,
            resources: RefCell::new(BTreeMap::new()),
        }
    }

    /// Context described by `manifest`: layout, extra resolver roots,
    /// metadata from `meta_path` (or the manifest's), and schema units with
    /// their input globs expanded.
    pub fn from_manifest(
        project_root: &Path,
        manifest: &BuildManifest,
        meta_path: Option<&Path>,
    ) -> Result<Self> {
        let layout = ProjectLayout::from_manifest(project_root, manifest);
        let meta_path = meta_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| layout.raw_dir.join(&manifest.metadata));
        let meta = AssetMeta::load(&meta_path)?;

        let mut units = Vec::new();
        for entry in &manifest.schemas {
            let schema = entry.schema.resource_path().with_context(|| {
                format!("schema entry for {}", entry.schema.file.display())
            })?;
            let mut inputs = Vec::new();
            for pattern in &entry.inputs {
                inputs.extend(glob_in(&layout.raw_dir, pattern));
            }
            units.push(ConversionUnit::new(schema, entry.extension.clone(), inputs));
        }

        let mut ctx = Self::new(layout)
            .with_meta(meta)
            .with_units(units)
            .with_max_texture_size(manifest.max_texture_size);
        ctx.texture_quality = manifest.texture_quality;

        for root in &manifest.resolver_roots {
            let tag = PathTag::try_from(root.tag.as_str())?;
            let base = project_root.join(&root.base);
            if root.versioned {
                ctx.resolvers.add_resolver(VersionedDirResolver::new(tag, base));
            } else {
                ctx.resolvers.add_resolver(PrefixResolver::new(tag, base));
            }
        }
        Ok(ctx)
    }

    pub fn with_meta(mut self, meta: AssetMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_units(mut self, units: Vec<ConversionUnit>) -> Self {
        self.units = units;
        self
    }

    pub fn with_max_texture_size(mut self, max_texture_size: u32) -> Self {
        self.max_texture_size = max_texture_size;
        self
    }

    pub fn with_tool(mut self, kind: ToolKind, path: impl Into<PathBuf>) -> Self {
        self.tools.set_override(kind, path);
        self
    }

    /// Resolve a resource once per build.
    pub fn resolve_resource(&self, resource: &ResourcePath) -> BuildResult<PathBuf> {
        if let Some(hit) = self.resources.borrow().get(resource) {
            return Ok(hit.clone());
        }
        let found = resource.resolve(&self.resolvers)?;
        self.resources
            .borrow_mut()
            .insert(resource.clone(), found.clone());
        Ok(found)
    }

    /// Locate a converter, failing with the "binary not found" error.
    pub fn require_tool(&self, kind: ToolKind) -> BuildResult<PathBuf> {
        self.tools.require(kind, &self.resolvers)
    }
}

/// Parse a command-line search root such as `library=../shared` into a
/// resolver for that tag. Relative directories are taken from the project
/// root.
pub fn resolver_from_arg(project_root: &Path, raw: &str) -> Result<PrefixResolver> {
    let (tag, base) = raw
        .split_once('=')
        .with_context(|| format!("expected TAG=DIR, got {raw}"))?;
    let tag = PathTag::try_from(tag)?;
    if base.trim().is_empty() {
        bail!("search root for {} has an empty directory", tag.as_str());
    }
    Ok(PrefixResolver::new(tag, project_root.join(base)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::DependencyPath;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn layout_discovers_overlay_dirs() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("src/rawassets");
        fs::create_dir_all(raw.join("overlays/winter")).unwrap();
        fs::create_dir_all(raw.join("overlays/halloween")).unwrap();
        fs::write(raw.join("overlays/README"), "").unwrap();

        let layout = ProjectLayout::from_manifest(temp.path(), &BuildManifest::default());
        assert_eq!(
            layout.overlay_dirs,
            vec![
                PathBuf::from("overlays/halloween"),
                PathBuf::from("overlays/winter")
            ]
        );
        assert_eq!(layout.asset_roots, vec![raw, temp.path().join("obj/assets/textures")]);
        assert_eq!(
            layout.schema_output_dir,
            temp.path().join("assets/flatbufferschemas")
        );
    }

    #[test]
    fn manifest_units_expand_input_globs() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("src/rawassets");
        fs::create_dir_all(raw.join("rails")).unwrap();
        fs::write(raw.join("rails/a.json"), "{}").unwrap();
        fs::write(raw.join("rails/b.json"), "{}").unwrap();
        let manifest = BuildManifest::from_value(json!({
            "schema_version": "asset_manifest_v1",
            "schemas": [
                {"schema": {"file": "rail_def.fbs", "roots": ["src/flatbufferschemas"]},
                 "extension": "rail", "inputs": ["rails/*.json"]},
                {"schema": {"file": "common.fbs", "roots": ["library:breadboard/schemas"]}}
            ]
        }))
        .unwrap();
        let ctx = BuildContext::from_manifest(temp.path(), &manifest, None).unwrap();
        assert_eq!(ctx.units.len(), 2);
        assert_eq!(
            ctx.units[0].input_files,
            vec![raw.join("rails/a.json"), raw.join("rails/b.json")]
        );
        assert!(!ctx.units[1].has_outputs());
    }

    #[test]
    fn manifest_resolver_roots_take_precedence() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dependencies/motive")).unwrap();
        fs::create_dir_all(temp.path().join("shared/motive")).unwrap();
        let manifest = BuildManifest::from_value(json!({
            "schema_version": "asset_manifest_v1",
            "resolver_roots": [{"tag": "library", "base": "shared"}]
        }))
        .unwrap();
        let ctx = BuildContext::from_manifest(temp.path(), &manifest, None).unwrap();
        let resolved = ctx
            .resolvers
            .resolve(&DependencyPath::library("motive"))
            .unwrap();
        assert_eq!(resolved, temp.path().join("shared/motive"));
    }

    #[test]
    fn search_root_args_parse() {
        let root = Path::new("/proj");
        let resolver = resolver_from_arg(root, "library=../shared").unwrap();
        use crate::resolve::Resolver;
        assert_eq!(
            resolver.candidate(&DependencyPath::library("motive")),
            Some(PathBuf::from("/proj/../shared/motive"))
        );
        assert!(resolver_from_arg(root, "library").is_err());
        assert!(resolver_from_arg(root, "vendor=x").is_err());
        assert!(resolver_from_arg(root, "library=").is_err());
    }

    #[test]
    fn resource_lookups_are_memoized() {
        let temp = TempDir::new().unwrap();
        let schemas = temp.path().join("schemas");
        fs::create_dir_all(&schemas).unwrap();
        fs::write(schemas.join("a.fbs"), "").unwrap();
        let ctx = BuildContext::new(ProjectLayout::from_manifest(
            temp.path(),
            &BuildManifest::default(),
        ));
        let resource = ResourcePath::under(DependencyPath::project("schemas"), "a.fbs");
        let first = ctx.resolve_resource(&resource).unwrap();
        fs::remove_file(schemas.join("a.fbs")).unwrap();
        assert_eq!(ctx.resolve_resource(&resource).unwrap(), first);
    }
}
