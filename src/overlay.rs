//! Overlay expansion and asset-root relative paths.
//!
//! An overlay is a directory, relative to an asset root, whose files shadow
//! or extend the canonical tree. Expansion never removes anything: canonical
//! inputs stay in the list and overlay hits are appended after them, so a
//! consumer that processes the list in order lets the overlay win.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// First asset root that `path` lives under, with the root-relative rest.
pub fn root_relative<'a>(path: &Path, asset_roots: &'a [PathBuf]) -> Option<(&'a Path, PathBuf)> {
    asset_roots.iter().find_map(|root| {
        path.strip_prefix(root)
            .ok()
            .map(|rel| (root.as_path(), rel.to_path_buf()))
    })
}

/// Root-relative path with any leading overlay directory removed, so an
/// overlay file and its canonical counterpart share one identity.
pub fn canonical_relative(path: &Path, asset_roots: &[PathBuf], overlay_dirs: &[PathBuf]) -> Option<PathBuf> {
    let (_, rel) = root_relative(path, asset_roots)?;
    let stripped = overlay_dirs
        .iter()
        .find_map(|overlay| rel.strip_prefix(overlay).ok().map(Path::to_path_buf));
    Some(stripped.unwrap_or(rel))
}

/// Expand `inputs` with overlay overrides and, when `overlay_globs` is given,
/// with overlay-only files matched next to each input's relative directory.
///
/// Ordering: all canonical inputs, then per-input overrides (inputs in source
/// order, overlays in `overlay_dirs` order), then per-input glob matches.
/// Inputs outside every asset root pass through untouched.
pub fn expand(
    inputs: &[PathBuf],
    asset_roots: &[PathBuf],
    overlay_dirs: &[PathBuf],
    overlay_globs: Option<&[String]>,
) -> Vec<PathBuf> {
    let mut expanded: Vec<PathBuf> = inputs.to_vec();
    let mut seen: BTreeSet<PathBuf> = inputs.iter().cloned().collect();

    let located: Vec<(&Path, PathBuf)> = inputs
        .iter()
        .filter_map(|input| root_relative(input, asset_roots))
        .collect();

    for (root, rel) in &located {
        for overlay in overlay_dirs {
            let candidate = root.join(overlay).join(rel);
            if candidate.exists() && seen.insert(candidate.clone()) {
                expanded.push(candidate);
            }
        }
    }

    if let Some(patterns) = overlay_globs {
        for (root, rel) in &located {
            let rel_dir = rel.parent().unwrap_or_else(|| Path::new(""));
            for overlay in overlay_dirs {
                let dir = root.join(overlay).join(rel_dir);
                for pattern in patterns {
                    for hit in glob_in(&dir, pattern) {
                        if seen.insert(hit.clone()) {
                            expanded.push(hit);
                        }
                    }
                }
            }
        }
    }

    expanded
}

/// Files in `dir` matching a glob `pattern`; the directory part is escaped so
/// only `pattern` is interpreted.
pub fn glob_in(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let Some(dir_str) = dir.to_str() else {
        warn!("skipping non UTF-8 directory {}", dir.display());
        return Vec::new();
    };
    let full = format!("{}/{}", glob::Pattern::escape(dir_str.trim_end_matches('/')), pattern);
    match glob::glob(&full) {
        Ok(paths) => paths.filter_map(Result::ok).collect(),
        Err(err) => {
            warn!("invalid glob pattern {full}: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn override_follows_canonical_input() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("a");
        let canonical = root.join("b/tex.tga");
        let overlay = root.join("skin1/b/tex.tga");
        touch(&canonical);
        touch(&overlay);

        let expanded = expand(
            &[canonical.clone()],
            &[root.clone()],
            &[PathBuf::from("skin1")],
            None,
        );
        assert_eq!(expanded, vec![canonical, overlay]);
    }

    #[test]
    fn globs_admit_overlay_only_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("a");
        let canonical = root.join("b/tex.tga");
        let overlay = root.join("skin1/b/tex.tga");
        let added = root.join("skin1/b/new.tga");
        touch(&canonical);
        touch(&overlay);
        touch(&added);
        touch(&root.join("skin1/b/ignored.png"));

        let globs = vec!["*.tga".to_string()];
        let expanded = expand(
            &[canonical.clone()],
            &[root.clone()],
            &[PathBuf::from("skin1")],
            Some(&globs),
        );
        assert_eq!(expanded, vec![canonical, overlay, added]);
    }

    #[test]
    fn inputs_outside_roots_pass_through() {
        let temp = TempDir::new().unwrap();
        let stray = temp.path().join("elsewhere/x.png");
        touch(&stray);
        touch(&temp.path().join("a/skin1/elsewhere/x.png"));
        let expanded = expand(
            &[stray.clone()],
            &[temp.path().join("a")],
            &[PathBuf::from("skin1")],
            Some(&["*.png".to_string()]),
        );
        assert_eq!(expanded, vec![stray]);
    }

    #[test]
    fn canonical_inputs_precede_all_overlay_hits() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("raw");
        let one = root.join("one.json");
        let two = root.join("two.json");
        for path in [&one, &two, &root.join("o1/one.json"), &root.join("o2/one.json"), &root.join("o1/two.json")] {
            touch(path);
        }
        let expanded = expand(
            &[one.clone(), two.clone()],
            &[root.clone()],
            &[PathBuf::from("o1"), PathBuf::from("o2")],
            None,
        );
        assert_eq!(
            expanded,
            vec![
                one,
                two,
                root.join("o1/one.json"),
                root.join("o2/one.json"),
                root.join("o1/two.json"),
            ]
        );
    }

    #[test]
    fn first_matching_root_wins() {
        let roots = vec![PathBuf::from("/p/raw"), PathBuf::from("/p/raw/textures")];
        let (root, rel) = root_relative(Path::new("/p/raw/textures/a.png"), &roots).unwrap();
        assert_eq!(root, Path::new("/p/raw"));
        assert_eq!(rel, PathBuf::from("textures/a.png"));
    }

    #[test]
    fn canonical_relative_strips_overlay_prefix() {
        let roots = vec![PathBuf::from("/p/raw")];
        let overlays = vec![PathBuf::from("overlays/winter")];
        assert_eq!(
            canonical_relative(Path::new("/p/raw/overlays/winter/textures/a.png"), &roots, &overlays),
            Some(PathBuf::from("textures/a.png"))
        );
        assert_eq!(
            canonical_relative(Path::new("/p/raw/textures/a.png"), &roots, &overlays),
            Some(PathBuf::from("textures/a.png"))
        );
        assert_eq!(canonical_relative(Path::new("/q/a.png"), &roots, &overlays), None);
    }
}
