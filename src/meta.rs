//! Per-file metadata overrides.
//!
//! The metadata document maps a stage name (`mesh_meta`, `anim_meta`,
//! `texture_meta`) to an ordered list of records. A record applies to every
//! file whose path contains the record's `name`; lookups take the first
//! applicable record that defines the requested key, not the most specific.

use crate::schema_loader::{META_SCHEMA, validate_document};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub const MESH_META: &str = "mesh_meta";
pub const ANIM_META: &str = "anim_meta";
pub const TEXTURE_META: &str = "texture_meta";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetMeta {
    stages: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl AssetMeta {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the metadata document; a missing file is an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no asset metadata at {}", path.display());
                return Ok(Self::empty());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading asset metadata {}", path.display()));
            }
        };
        let value: Value = serde_json::from_str(&data)
            .with_context(|| format!("parsing asset metadata {}", path.display()))?;
        Self::from_value(value).with_context(|| format!("loading asset metadata {}", path.display()))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        validate_document(&value, META_SCHEMA, "asset metadata")?;
        let stages: BTreeMap<String, Vec<Map<String, Value>>> =
            serde_json::from_value(value).context("decoding asset metadata records")?;
        Ok(Self { stages })
    }

    /// Value of `key` from the first `stage` record whose name occurs in
    /// `file` and which defines `key`.
    pub fn lookup(&self, stage: &str, file: &Path, key: &str) -> Option<&Value> {
        let haystack = file.to_string_lossy();
        self.stages.get(stage)?.iter().find_map(|record| {
            let name = record.get("name")?.as_str()?;
            if !haystack.contains(name) {
                return None;
            }
            record.get(key)
        })
    }

    pub fn lookup_str(&self, stage: &str, file: &Path, key: &str) -> Option<&str> {
        self.lookup(stage, file, key).and_then(Value::as_str)
    }

    pub fn lookup_bool(&self, stage: &str, file: &Path, key: &str) -> Option<bool> {
        self.lookup(stage, file, key).and_then(Value::as_bool)
    }

    pub fn lookup_u32(&self, stage: &str, file: &Path, key: &str) -> Option<u32> {
        self.lookup(stage, file, key)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> AssetMeta {
        AssetMeta::from_value(json!({
            "mesh_meta": [
                {"name": "tree", "unit": "m"},
                {"name": "tree_big", "unit": "cm", "recenter": true},
                {"name": "rock", "texture_formats": "ASTC"}
            ],
            "texture_meta": [
                {"name": "ui/", "max_size": 256}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn first_match_wins_over_more_specific() {
        let meta = sample();
        let file = Path::new("/raw/meshes/tree_big.fbx");
        assert_eq!(meta.lookup_str(MESH_META, file, "unit"), Some("m"));
    }

    #[test]
    fn match_must_define_the_key() {
        let meta = sample();
        let file = Path::new("/raw/meshes/tree_big.fbx");
        assert_eq!(meta.lookup_bool(MESH_META, file, "recenter"), Some(true));
        assert_eq!(meta.lookup_str(MESH_META, file, "texture_formats"), None);
    }

    #[test]
    fn unknown_stage_or_file_yields_none() {
        let meta = sample();
        assert!(meta.lookup(ANIM_META, Path::new("tree.fbx"), "repeat").is_none());
        assert!(meta.lookup(MESH_META, Path::new("house.fbx"), "unit").is_none());
        assert_eq!(
            meta.lookup_u32(TEXTURE_META, Path::new("/raw/textures/ui/button.png"), "max_size"),
            Some(256)
        );
    }

    #[test]
    fn missing_file_is_empty_table() {
        let temp = TempDir::new().unwrap();
        let meta = AssetMeta::load(&temp.path().join("asset_meta.json")).unwrap();
        assert_eq!(meta, AssetMeta::empty());
    }

    #[test]
    fn malformed_records_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("asset_meta.json");
        fs::write(&path, r#"{"mesh_meta": [{"unit": "m"}]}"#).unwrap();
        let err = AssetMeta::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation"));
    }
}
