//! JSON Schema checks for the documents the builder reads at startup.
//!
//! Both the project manifest and the asset metadata file are validated
//! against schemas bundled into the binary before they are deserialized, so
//! a malformed document fails with every violation listed instead of the
//! first serde error.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde_json::Value;

pub(crate) const MANIFEST_SCHEMA: &str = include_str!("../schema/asset_manifest.schema.json");
pub(crate) const META_SCHEMA: &str = include_str!("../schema/asset_meta.schema.json");

/// Validate `document` against the bundled `schema_source`. `what` names the
/// document in error messages.
pub(crate) fn validate_document(document: &Value, schema_source: &str, what: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_source)
        .with_context(|| format!("parsing bundled {what} schema"))?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| anyhow!("compiling bundled {what} schema: {err}"))?;
    if let Err(errors) = compiled.validate(document) {
        let details = errors
            .map(|err| format!("{}: {}", err.instance_path, err))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("{what} failed schema validation:\n{details}");
    }
    Ok(())
}
