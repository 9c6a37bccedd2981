//! File and executable lookup on top of the resolver chain.
//!
//! [`ResourcePath`] searches several root directories for one file name and
//! must find a file on disk. [`BinaryPath`] does the same for executables but
//! also consults `PATH` and applies the platform executable suffix.

use super::{DependencyPath, ResolverChain};
use crate::error::{BuildError, BuildResult};
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A path given either literally or as a tagged dependency path.
///
/// Configuration and CLI values arrive in both shapes; everything past the
/// boundary works with this one type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PathRef {
    Literal(PathBuf),
    Dependency(DependencyPath),
}

impl PathRef {
    pub fn resolve(&self, chain: &ResolverChain) -> BuildResult<PathBuf> {
        match self {
            PathRef::Literal(path) if path.exists() => Ok(path.clone()),
            PathRef::Literal(path) => Err(BuildError::not_found(path.clone(), vec![path.clone()])),
            PathRef::Dependency(dep) => chain.resolve(dep),
        }
    }
}

impl From<DependencyPath> for PathRef {
    fn from(value: DependencyPath) -> Self {
        PathRef::Dependency(value)
    }
}

impl From<PathBuf> for PathRef {
    fn from(value: PathBuf) -> Self {
        PathRef::Literal(value)
    }
}

impl From<&Path> for PathRef {
    fn from(value: &Path) -> Self {
        PathRef::Literal(value.to_path_buf())
    }
}

impl From<&str> for PathRef {
    fn from(value: &str) -> Self {
        PathRef::Literal(PathBuf::from(value))
    }
}

/// One file name searched for across an ordered list of root directories.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResourcePath {
    roots: Vec<PathRef>,
    file_name: PathBuf,
}

impl ResourcePath {
    /// `roots` must not be empty.
    pub fn new(roots: Vec<PathRef>, file_name: impl Into<PathBuf>) -> Self {
        debug_assert!(!roots.is_empty(), "resource path needs at least one root");
        Self {
            roots,
            file_name: file_name.into(),
        }
    }

    /// Shorthand for a single dependency root.
    pub fn under(root: impl Into<PathRef>, file_name: impl Into<PathBuf>) -> Self {
        Self::new(vec![root.into()], file_name)
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    pub fn roots(&self) -> &[PathRef] {
        &self.roots
    }

    /// First existing `root/file_name`, in root order. Roots that do not
    /// resolve themselves are skipped.
    pub fn resolve(&self, chain: &ResolverChain) -> BuildResult<PathBuf> {
        let mut candidates = Vec::new();
        for root in &self.roots {
            let root_dir = match root.resolve(chain) {
                Ok(dir) => dir,
                Err(BuildError::DependencyNotFound {
                    candidates: tried, ..
                }) => {
                    candidates.extend(tried.into_iter().map(|dir| dir.join(&self.file_name)));
                    continue;
                }
                Err(other) => return Err(other),
            };
            let candidate = root_dir.join(&self.file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            debug!("resource candidate {} does not exist", candidate.display());
            candidates.push(candidate);
        }
        Err(BuildError::not_found(self.file_name.clone(), candidates))
    }

    /// Like [`resolve`](Self::resolve) but yields `None` instead of an error,
    /// for defaults that may legitimately be absent until set explicitly.
    pub fn resolve_optional(&self, chain: &ResolverChain) -> Option<PathBuf> {
        self.resolve(chain).ok()
    }
}

/// An executable searched for in dependency roots and then on `PATH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryPath {
    name: String,
    roots: Vec<PathRef>,
}

impl BinaryPath {
    pub fn new(name: impl Into<String>, roots: Vec<PathRef>) -> Self {
        Self {
            name: name.into(),
            roots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bare name with the platform executable suffix applied.
    pub fn executable_name(&self) -> OsString {
        executable_name(&self.name)
    }

    /// Locate the executable. When it is on `PATH`, the containing directory
    /// is appended as the final root so dependency roots still win.
    pub fn resolve(&self, chain: &ResolverChain) -> BuildResult<PathBuf> {
        match self.search() {
            Some(resource) => resource.resolve(chain),
            None => Err(BuildError::not_found(
                PathBuf::from(self.executable_name()),
                Vec::new(),
            )),
        }
    }

    /// Resolved path, or the bare executable name when the lookup fails.
    /// Suitable for display and for handing to a shell; never for deciding
    /// whether a tool is present.
    pub fn resolve_or_bare(&self, chain: &ResolverChain) -> PathBuf {
        self.search()
            .and_then(|resource| resource.resolve_optional(chain))
            .unwrap_or_else(|| PathBuf::from(self.executable_name()))
    }

    /// The file search: every root, then the `PATH` directory holding the
    /// executable. `None` when there is nowhere to look.
    fn search(&self) -> Option<ResourcePath> {
        let exe = self.executable_name();
        let mut roots = self.roots.clone();
        if let Some(found) = find_on_path(&exe) {
            if let Some(dir) = found.parent() {
                roots.push(PathRef::Literal(dir.to_path_buf()));
            }
        }
        (!roots.is_empty()).then(|| ResourcePath::new(roots, exe))
    }
}

pub fn executable_name(name: &str) -> OsString {
    let suffix = env::consts::EXE_SUFFIX;
    if suffix.is_empty() || name.ends_with(suffix) {
        OsString::from(name)
    } else {
        OsString::from(format!("{name}{suffix}"))
    }
}

/// First executable named `name` in the directories listed by `PATH`.
pub fn find_on_path(name: impl AsRef<Path>) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name.as_ref()))
        .find(|candidate| is_executable(candidate))
}

pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = fs::metadata(path) {
            return meta.permissions().mode() & 0o111 != 0;
        }
        false
    }
    #[cfg(not(unix))]
    {
        true
    }
}
