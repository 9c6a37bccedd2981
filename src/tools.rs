//! Converter catalogue and subprocess execution.
//!
//! Every external converter the pipeline drives is a [`ToolKind`] with a
//! default executable name and default search roots. A [`ToolSet`] applies
//! command-line overrides, memoizes lookups for the life of a build, and
//! turns a failed lookup into the "binary not found" invocation error before
//! anything is spawned. [`CommandSpec`] is the argv handed to a converter.

use crate::error::{BuildError, BuildResult};
use crate::resolve::locate::{BinaryPath, PathRef, find_on_path};
use crate::resolve::{DependencyPath, ResolverChain};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolKind {
    Flatc,
    Cwebp,
    MeshPipeline,
    AnimPipeline,
    Convert,
    Identify,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::Flatc,
        ToolKind::Cwebp,
        ToolKind::MeshPipeline,
        ToolKind::AnimPipeline,
        ToolKind::Convert,
        ToolKind::Identify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Flatc => "flatc",
            ToolKind::Cwebp => "cwebp",
            ToolKind::MeshPipeline => "mesh-pipeline",
            ToolKind::AnimPipeline => "anim-pipeline",
            ToolKind::Convert => "convert",
            ToolKind::Identify => "identify",
        }
    }

    pub fn executable(&self) -> &'static str {
        match self {
            ToolKind::Flatc => "flatc",
            ToolKind::Cwebp => "cwebp",
            ToolKind::MeshPipeline => "mesh_pipeline",
            ToolKind::AnimPipeline => "anim_pipeline",
            ToolKind::Convert => "convert",
            ToolKind::Identify => "identify",
        }
    }

    fn default_roots(&self) -> Vec<PathRef> {
        let roots = match self {
            ToolKind::Flatc => vec![
                DependencyPath::library("flatbuffers"),
                DependencyPath::library("flatbuffers/Release"),
                DependencyPath::library("flatbuffers/Debug"),
                DependencyPath::library("flatbuffers/build"),
                DependencyPath::project("bin"),
            ],
            ToolKind::Cwebp => vec![
                DependencyPath::prebuilt("libwebp/bin"),
                DependencyPath::project("bin"),
            ],
            ToolKind::MeshPipeline => vec![
                DependencyPath::library("fplbase/bin"),
                DependencyPath::project("bin"),
            ],
            ToolKind::AnimPipeline => vec![
                DependencyPath::library("motive/bin"),
                DependencyPath::project("bin"),
            ],
            ToolKind::Convert | ToolKind::Identify => vec![
                DependencyPath::prebuilt("imagemagick/bin"),
            ],
        };
        roots.into_iter().map(PathRef::from).collect()
    }

    pub fn binary_path(&self) -> BinaryPath {
        BinaryPath::new(self.executable(), self.default_roots())
    }
}

impl TryFrom<&str> for ToolKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value || kind.executable() == value)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {value}"))
    }
}

/// Tool lookups for one build, with overrides and a memo.
#[derive(Debug, Default)]
pub struct ToolSet {
    overrides: BTreeMap<ToolKind, PathBuf>,
    cache: RefCell<BTreeMap<ToolKind, PathBuf>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` for `kind` instead of searching. A bare name is looked up
    /// on `PATH` at resolution time.
    pub fn set_override(&mut self, kind: ToolKind, path: impl Into<PathBuf>) {
        self.overrides.insert(kind, path.into());
        self.cache.borrow_mut().remove(&kind);
    }

    /// Locate `kind`, reporting every searched location on failure.
    pub fn locate(&self, kind: ToolKind, chain: &ResolverChain) -> BuildResult<PathBuf> {
        if let Some(hit) = self.cache.borrow().get(&kind) {
            return Ok(hit.clone());
        }
        let found = match self.overrides.get(&kind) {
            Some(path) => locate_override(path)?,
            None => kind.binary_path().resolve(chain)?,
        };
        debug!(tool = kind.as_str(), "using {}", found.display());
        self.cache.borrow_mut().insert(kind, found.clone());
        Ok(found)
    }

    /// Locate `kind` for invocation; absence becomes the pre-spawn
    /// "binary not found" error.
    pub fn require(&self, kind: ToolKind, chain: &ResolverChain) -> BuildResult<PathBuf> {
        self.locate(kind, chain).map_err(|err| match err {
            BuildError::DependencyNotFound { .. } => {
                debug!("{err}");
                BuildError::missing_binary(vec![OsString::from(kind.executable())])
            }
            other => other,
        })
    }

    /// Located path or bare executable name, for display.
    pub fn describe(&self, kind: ToolKind, chain: &ResolverChain) -> (PathBuf, bool) {
        match self.locate(kind, chain) {
            Ok(path) => (path, true),
            Err(_) => match self.overrides.get(&kind) {
                Some(path) => (path.clone(), false),
                None => (kind.binary_path().resolve_or_bare(chain), false),
            },
        }
    }
}

fn locate_override(path: &Path) -> BuildResult<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    let is_bare = path.parent().is_none_or(|parent| parent.as_os_str().is_empty());
    if is_bare {
        if let Some(found) = find_on_path(path) {
            return Ok(found);
        }
    }
    Err(BuildError::not_found(path.to_path_buf(), vec![path.to_path_buf()]))
}

/// A converter invocation: program plus arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Program followed by arguments.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Arguments as lossy strings; convenient for assertions and logs.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    /// Run to completion, waiting on the child on every path.
    pub fn run(&self) -> BuildResult<()> {
        trace!(argv = ?self.argv(), "spawning");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|err| self.spawn_error(err))?;
        if status.success() {
            return Ok(());
        }
        Err(BuildError::ToolInvocation {
            argv: self.argv(),
            exit_code: status.code(),
            message: None,
        })
    }

    /// Run to completion and return stdout.
    pub fn output(&self) -> BuildResult<String> {
        trace!(argv = ?self.argv(), "spawning");
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BuildError::ToolInvocation {
                argv: self.argv(),
                exit_code: output.status.code(),
                message: (!stderr.is_empty()).then_some(stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_error(&self, err: std::io::Error) -> BuildError {
        BuildError::ToolInvocation {
            argv: self.argv(),
            exit_code: None,
            message: Some(err.to_string()),
        }
    }
}
