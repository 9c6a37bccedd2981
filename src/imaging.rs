//! Texture sizing.
//!
//! Textures are shipped with power-of-two dimensions. Images under the size
//! bound grow to the next power of two on each axis; images at or over it are
//! scaled so the longer side meets the bound and each side then snaps to the
//! nearest power of two, which may round a side down.

use crate::error::{BuildError, BuildResult};
use crate::tools::CommandSpec;
use std::path::Path;

pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 1024;

/// Largest accepted size bound: the largest power of two a `u32` holds.
pub const MAX_TEXTURE_SIZE_LIMIT: u32 = 1 << 31;

/// Power-of-two dimensions for an image of `size` under `bound`. The bound
/// is clamped to `1..=MAX_TEXTURE_SIZE_LIMIT`.
pub fn power_of_two_size(size: (u32, u32), bound: u32) -> (u32, u32) {
    let bound = bound.clamp(1, MAX_TEXTURE_SIZE_LIMIT);
    let (width, height) = (size.0.max(1), size.1.max(1));
    let longest = width.max(height);
    if longest < bound {
        // Both sides are under 2^31 here, so rounding up cannot overflow.
        return (width.next_power_of_two(), height.next_power_of_two());
    }
    let scale = f64::from(bound) / f64::from(longest);
    (
        nearest_power_of_two(f64::from(width) * scale),
        nearest_power_of_two(f64::from(height) * scale),
    )
}

fn nearest_power_of_two(value: f64) -> u32 {
    if value <= 1.0 {
        return 1;
    }
    let exponent = value.log2().round().min(31.0);
    1u32 << (exponent as u32)
}

/// Ask the identify tool for `file`'s dimensions.
pub fn query_size(identify: &Path, file: &Path) -> BuildResult<(u32, u32)> {
    let spec = CommandSpec::new(identify)
        .args(["-format", "%w %h"])
        .arg(file);
    let stdout = spec.output()?;
    parse_size(&stdout).ok_or_else(|| BuildError::ToolInvocation {
        argv: spec.argv(),
        exit_code: Some(0),
        message: Some(format!("unexpected size output {:?}", stdout.trim())),
    })
}

fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let mut parts = raw.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}
