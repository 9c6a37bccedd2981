#![allow(dead_code)]

use assetbake::{BuildContext, BuildManifest, ToolKind};
use serde_json::Value;
use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub fn touch(path: &Path) {
    write_file(path, "");
}

pub fn write_file(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("file has a parent")).expect("create parent dirs");
    fs::write(path, contents).expect("write fixture file");
}

pub fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod script");
}

pub fn set_mtime(path: &Path, when: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
        .unwrap_or_else(|err| panic!("set mtime on {}: {err}", path.display()));
}

pub fn hours_ago(hours: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(hours * 3600)
}

/// Every file under `dir`, sorted.
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(next) = pending.pop() {
        let Ok(entries) = fs::read_dir(&next) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

/// A throwaway project with fake converters in `<root>/fakebin`. Every fake
/// appends `<name> <args...>` to `<root>/tools.log`.
pub struct FakeProject {
    pub temp: TempDir,
}

impl FakeProject {
    pub fn new() -> Self {
        let project = Self {
            temp: TempDir::new().expect("create temp project"),
        };
        project.install_tool(ToolKind::Identify, "echo \"100 50\"");
        project.install_tool(ToolKind::Convert, WRITE_LAST_ARG);
        project.install_tool(ToolKind::Cwebp, WRITE_LAST_ARG);
        project.install_tool(ToolKind::AnimPipeline, WRITE_AFTER_OUT);
        project.install_tool(ToolKind::MeshPipeline, WRITE_MESH);
        project.install_tool(ToolKind::Flatc, WRITE_FLATC);
        project
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn raw(&self) -> PathBuf {
        self.root().join("src/rawassets")
    }

    pub fn output(&self) -> PathBuf {
        self.root().join("assets")
    }

    pub fn intermediate(&self) -> PathBuf {
        self.root().join("obj/assets/textures")
    }

    pub fn tool_path(&self, kind: ToolKind) -> PathBuf {
        self.root().join("fakebin").join(kind.executable())
    }

    pub fn log_path(&self) -> PathBuf {
        self.root().join("tools.log")
    }

    /// Replace the fake for `kind` with a script running `body`.
    pub fn install_tool(&self, kind: ToolKind, body: &str) {
        let path = self.tool_path(kind);
        let script = format!(
            "#!/bin/sh\necho \"{} $*\" >> \"{}\"\n{body}\n",
            kind.executable(),
            self.log_path().display()
        );
        write_file(&path, &script);
        make_executable(&path);
        set_mtime(&path, hours_ago(3));
    }

    /// Add a raw source with an old mtime so fresh artifacts are never stale.
    pub fn add_source(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.raw().join(relative);
        write_file(&path, contents);
        set_mtime(&path, hours_ago(2));
        path
    }

    /// The rail schema and the reference-only common schema it includes.
    pub fn add_schemas(&self) {
        for path in [
            self.root().join("src/flatbufferschemas/rail_def.fbs"),
            self.root()
                .join("dependencies/breadboard/schemas/common.fbs"),
        ] {
            write_file(&path, "table T {}");
            set_mtime(&path, hours_ago(2));
        }
    }

    pub fn manifest(&self) -> BuildManifest {
        BuildManifest::from_value(self.manifest_json()).expect("fixture manifest is valid")
    }

    pub fn manifest_json(&self) -> Value {
        serde_json::json!({
            "schema_version": "asset_manifest_v1",
            "schemas": [
                {"schema": {"file": "rail_def.fbs", "roots": ["src/flatbufferschemas"]},
                 "extension": "rail", "inputs": ["rails/*.json"]},
                {"schema": {"file": "common.fbs", "roots": ["library:breadboard/schemas"]}}
            ]
        })
    }

    /// Context for this project with every converter pointed at its fake.
    pub fn context(&self) -> BuildContext {
        let mut ctx =
            BuildContext::from_manifest(self.root(), &self.manifest(), None).expect("context");
        for kind in ToolKind::ALL {
            ctx.tools.set_override(kind, self.tool_path(kind));
        }
        ctx
    }

    pub fn log(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .map(|raw| raw.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn clear_log(&self) {
        let _ = fs::remove_file(self.log_path());
    }

    pub fn write_manifest(&self) {
        write_file(
            &self.root().join("asset_manifest.json"),
            &serde_json::to_string_pretty(&self.manifest_json()).expect("serialize manifest"),
        );
    }

    /// `--<tool> <fake>` for every converter.
    pub fn tool_args(&self) -> Vec<String> {
        ToolKind::ALL
            .iter()
            .flat_map(|kind| {
                [
                    format!("--{}", kind.as_str()),
                    self.tool_path(*kind).display().to_string(),
                ]
            })
            .collect()
    }
}

const WRITE_LAST_ARG: &str = r#"for last; do :; done
mkdir -p "$(dirname "$last")"
: > "$last""#;

const WRITE_AFTER_OUT: &str = r#"while [ $# -gt 0 ]; do
  if [ "$1" = "--out" ]; then out="$2"; fi
  shift
done
: > "$out""#;

const WRITE_MESH: &str = r#"for last; do :; done
while [ $# -gt 0 ]; do
  case "$1" in
    --base-dir) base="$2"; shift ;;
    --relative-dir) rel="$2"; shift ;;
  esac
  shift
done
mkdir -p "$base/$rel"
: > "$base/$rel/$(basename "$last" .fbx).fplmesh""#;

const WRITE_FLATC: &str = r#"for last; do :; done
case "$last" in
  *bad.json) echo "bad json" >&2; exit 2 ;;
esac
out="$2"
: > "$out/$(basename "$last" .json).rail""#;
