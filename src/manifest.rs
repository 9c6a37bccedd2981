//! Project manifest: the static description of where raw assets live, where
//! artifacts go, and which JSON files compile against which schemas.
//!
//! The manifest is optional. Every field except `schema_version` defaults to
//! the conventional layout (`src/rawassets` in, `assets` out,
//! `obj/assets/textures` for intermediate textures), so a project following
//! that layout only needs a manifest to declare its schemas.

use crate::resolve::locate::{PathRef, ResourcePath};
use crate::resolve::{DependencyPath, PathTag};
use crate::schema_loader::{MANIFEST_SCHEMA, validate_document};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "asset_manifest.json";
pub const MANIFEST_SCHEMA_VERSION: &str = "asset_manifest_v1";

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BuildManifest {
    pub schema_version: String,
    #[serde(default = "default_raw_assets")]
    pub raw_assets: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_intermediate")]
    pub intermediate_textures: PathBuf,
    /// Directory name under the output dir that receives schema copies.
    #[serde(default = "default_schema_output")]
    pub schema_output: PathBuf,
    /// Metadata file, relative to the raw asset dir.
    #[serde(default = "default_metadata")]
    pub metadata: PathBuf,
    /// Glob, relative to the raw asset dir, selecting overlay directories.
    #[serde(default = "default_overlays")]
    pub overlays: String,
    #[serde(default = "default_texture_dirs")]
    pub texture_dirs: Vec<PathBuf>,
    #[serde(default = "default_mesh_dirs")]
    pub mesh_dirs: Vec<PathBuf>,
    #[serde(default = "default_anim_dirs")]
    pub anim_dirs: Vec<PathBuf>,
    #[serde(default = "default_max_texture_size")]
    pub max_texture_size: u32,
    #[serde(default = "default_texture_quality")]
    pub texture_quality: u32,
    #[serde(default)]
    pub resolver_roots: Vec<ResolverRoot>,
    #[serde(default)]
    pub schemas: Vec<SchemaEntry>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ResolverRoot {
    pub tag: String,
    /// Base directory, relative to the project root unless absolute.
    pub base: PathBuf,
    #[serde(default)]
    pub versioned: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SchemaEntry {
    pub schema: SchemaRef,
    /// Artifact extension; empty for schemas that only serve as includes.
    #[serde(default)]
    pub extension: String,
    /// Globs relative to the raw asset dir.
    #[serde(default)]
    pub inputs: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SchemaRef {
    pub file: PathBuf,
    /// Search roots, each `tag:relative/path` or a plain project-relative path.
    pub roots: Vec<String>,
}

impl SchemaRef {
    pub fn resource_path(&self) -> Result<ResourcePath> {
        if self.roots.is_empty() {
            bail!("schema {} lists no search roots", self.file.display());
        }
        let roots = self
            .roots
            .iter()
            .map(|raw| parse_path_ref(raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResourcePath::new(roots, &self.file))
    }
}

/// Parse `tag:relative` into a dependency path. Untagged relative paths are
/// project paths; untagged absolute paths are taken literally.
pub fn parse_path_ref(raw: &str) -> Result<PathRef> {
    if let Some((tag, rest)) = raw.split_once(':') {
        if let Ok(tag) = PathTag::try_from(tag) {
            return Ok(DependencyPath::new(tag, rest).into());
        }
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return Ok(PathRef::Literal(path.to_path_buf()));
    }
    if raw.trim().is_empty() {
        bail!("empty search root");
    }
    Ok(DependencyPath::project(raw).into())
}

impl Default for BuildManifest {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            raw_assets: default_raw_assets(),
            output: default_output(),
            intermediate_textures: default_intermediate(),
            schema_output: default_schema_output(),
            metadata: default_metadata(),
            overlays: default_overlays(),
            texture_dirs: default_texture_dirs(),
            mesh_dirs: default_mesh_dirs(),
            anim_dirs: default_anim_dirs(),
            max_texture_size: default_max_texture_size(),
            texture_quality: default_texture_quality(),
            resolver_roots: Vec::new(),
            schemas: Vec::new(),
        }
    }
}

impl BuildManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading asset manifest {}", path.display()))?;
        let value: Value = serde_json::from_str(&data)
            .with_context(|| format!("parsing asset manifest {}", path.display()))?;
        Self::from_value(value).with_context(|| format!("loading asset manifest {}", path.display()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        validate_document(&value, MANIFEST_SCHEMA, "asset manifest")?;
        let manifest: BuildManifest =
            serde_json::from_value(value).context("decoding asset manifest")?;
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            bail!(
                "unsupported asset manifest version '{}', expected {}",
                manifest.schema_version,
                MANIFEST_SCHEMA_VERSION
            );
        }
        Ok(manifest)
    }

    /// The manifest in `project_root`, or the conventional defaults.
    pub fn load_or_default(project_root: &Path) -> Result<Self> {
        let path = project_root.join(MANIFEST_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

fn default_raw_assets() -> PathBuf {
    PathBuf::from("src/rawassets")
}

fn default_output() -> PathBuf {
    PathBuf::from("assets")
}

fn default_intermediate() -> PathBuf {
    PathBuf::from("obj/assets/textures")
}

fn default_schema_output() -> PathBuf {
    PathBuf::from("flatbufferschemas")
}

fn default_metadata() -> PathBuf {
    PathBuf::from("asset_meta.json")
}

fn default_overlays() -> String {
    "overlays/*".to_string()
}

fn default_texture_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("textures"), PathBuf::from("meshes")]
}

fn default_mesh_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("meshes")]
}

fn default_anim_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("anims")]
}

fn default_max_texture_size() -> u32 {
    crate::imaging::DEFAULT_MAX_TEXTURE_SIZE
}

fn default_texture_quality() -> u32 {
    90
}
