//! Dependency path resolution.
//!
//! A [`DependencyPath`] names a file or directory relative to some project
//! layout (the project itself, a vendored library, a prebuilt tool drop, a
//! third-party checkout). The [`ResolverChain`] turns it into a concrete path
//! by asking every registered [`Resolver`] for a candidate and keeping the
//! first candidate, in chain order, that exists on disk. Resolved paths are
//! memoized by value so repeated references to the same dependency never
//! walk the filesystem twice.

pub mod locate;

use crate::error::{BuildError, BuildResult};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Which family of project layouts a dependency path is relative to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathTag {
    Project,
    Library,
    Prebuilt,
    ThirdParty,
}

impl PathTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathTag::Project => "project",
            PathTag::Library => "library",
            PathTag::Prebuilt => "prebuilt",
            PathTag::ThirdParty => "third_party",
        }
    }
}

impl TryFrom<&str> for PathTag {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "project" => Ok(PathTag::Project),
            "library" => Ok(PathTag::Library),
            "prebuilt" => Ok(PathTag::Prebuilt),
            "third_party" => Ok(PathTag::ThirdParty),
            other => anyhow::bail!("Unknown path tag: {other}"),
        }
    }
}

/// A tagged, project-relative path. Equality is by value, which is what the
/// resolution cache keys on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyPath {
    tag: PathTag,
    relative: PathBuf,
}

impl DependencyPath {
    pub fn new(tag: PathTag, relative: impl Into<PathBuf>) -> Self {
        Self {
            tag,
            relative: relative.into(),
        }
    }

    pub fn project(relative: impl Into<PathBuf>) -> Self {
        Self::new(PathTag::Project, relative)
    }

    pub fn library(relative: impl Into<PathBuf>) -> Self {
        Self::new(PathTag::Library, relative)
    }

    pub fn prebuilt(relative: impl Into<PathBuf>) -> Self {
        Self::new(PathTag::Prebuilt, relative)
    }

    pub fn third_party(relative: impl Into<PathBuf>) -> Self {
        Self::new(PathTag::ThirdParty, relative)
    }

    pub fn tag(&self) -> PathTag {
        self.tag
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// A child path with the same tag.
    pub fn join(&self, child: impl AsRef<Path>) -> Self {
        Self {
            tag: self.tag,
            relative: self.relative.join(child),
        }
    }
}

impl fmt::Display for DependencyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tag.as_str(), self.relative.display())
    }
}

/// Maps a dependency path to a candidate location. Returning `None` means the
/// resolver does not handle this kind of path at all; returning a path that
/// does not exist is fine and only shows up in diagnostics.
pub trait Resolver {
    fn name(&self) -> &str;
    fn candidate(&self, path: &DependencyPath) -> Option<PathBuf>;
}

/// Joins paths carrying `tag` onto a fixed base directory.
#[derive(Clone, Debug)]
pub struct PrefixResolver {
    name: String,
    tag: PathTag,
    base: PathBuf,
}

impl PrefixResolver {
    pub fn new(tag: PathTag, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            name: format!("{}@{}", tag.as_str(), base.display()),
            tag,
            base,
        }
    }
}

impl Resolver for PrefixResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidate(&self, path: &DependencyPath) -> Option<PathBuf> {
        (path.tag == self.tag).then(|| self.base.join(&path.relative))
    }
}

/// Finds a path inside a versioned drop such as
/// `prebuilts/libwebp/libwebp-0.4.1-linux-x86-64/bin`, given only
/// `libwebp/bin`. The first component selects the package directory under
/// `base`; the subtree is walked to a bounded depth for a directory holding
/// the remaining components. The greatest match wins, comparing digit runs
/// numerically, so `libwebp-0.10.0` shadows `libwebp-0.9.0`.
#[derive(Clone, Debug)]
pub struct VersionedDirResolver {
    name: String,
    tag: PathTag,
    base: PathBuf,
    max_depth: usize,
}

impl VersionedDirResolver {
    pub const DEFAULT_DEPTH: usize = 3;

    pub fn new(tag: PathTag, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            name: format!("versioned {}@{}", tag.as_str(), base.display()),
            tag,
            base,
            max_depth: Self::DEFAULT_DEPTH,
        }
    }

    #[cfg(test)]
    fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Resolver for VersionedDirResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidate(&self, path: &DependencyPath) -> Option<PathBuf> {
        if path.tag != self.tag {
            return None;
        }
        let mut components = path.relative.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        });
        let package = components.next()?;
        let rest: PathBuf = components.collect();
        let package_dir = self.base.join(package);
        let mut matches = Vec::new();
        collect_versioned(&package_dir, &rest, self.max_depth, &mut matches);
        matches.into_iter().max_by(|a, b| {
            version_key(a)
                .cmp(&version_key(b))
                .then_with(|| a.cmp(b))
        })
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum VersionPart {
    Text(String),
    Number(u64),
}

/// Split `path` into alternating text and digit runs for version ordering.
fn version_key(path: &Path) -> Vec<VersionPart> {
    let raw = path.to_string_lossy();
    let mut parts = Vec::new();
    let mut run = String::new();
    let mut digits = false;
    for ch in raw.chars() {
        if ch.is_ascii_digit() != digits && !run.is_empty() {
            parts.push(version_part(std::mem::take(&mut run), digits));
        }
        digits = ch.is_ascii_digit();
        run.push(ch);
    }
    if !run.is_empty() {
        parts.push(version_part(run, digits));
    }
    parts
}

fn version_part(run: String, digits: bool) -> VersionPart {
    match run.parse() {
        Ok(number) if digits => VersionPart::Number(number),
        _ => VersionPart::Text(run),
    }
}

fn collect_versioned(dir: &Path, rest: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let candidate_dir = entry.path();
        if !candidate_dir.is_dir() {
            continue;
        }
        let candidate = candidate_dir.join(rest);
        if candidate.exists() {
            out.push(candidate);
        } else if depth > 1 {
            collect_versioned(&candidate_dir, rest, depth - 1, out);
        }
    }
}

/// Ordered resolver list with a per-chain resolution cache.
///
/// The most recently added resolver is consulted first.
#[derive(Default)]
pub struct ResolverChain {
    resolvers: Vec<Box<dyn Resolver>>,
    cache: RefCell<BTreeMap<DependencyPath, PathBuf>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver ahead of every previously registered one.
    pub fn add_resolver(&mut self, resolver: impl Resolver + 'static) {
        self.resolvers.insert(0, Box::new(resolver));
        // Precedence changed; earlier answers may no longer be first.
        self.cache.borrow_mut().clear();
    }

    /// Every `(candidate, resolver name)` pair the chain produces, in chain
    /// order, whether or not the candidate exists.
    pub fn candidates(&self, path: &DependencyPath) -> Vec<(PathBuf, &str)> {
        self.resolvers
            .iter()
            .filter_map(|resolver| {
                resolver
                    .candidate(path)
                    .map(|candidate| (candidate, resolver.name()))
            })
            .collect()
    }

    /// Resolve `path` to the first existing candidate.
    ///
    /// # Panics
    ///
    /// Panics when no resolver has been registered; a chain is always
    /// populated before anything asks it for a path.
    pub fn resolve(&self, path: &DependencyPath) -> BuildResult<PathBuf> {
        assert!(
            !self.resolvers.is_empty(),
            "resolving {path} with an empty resolver chain"
        );
        if let Some(hit) = self.cache.borrow().get(path) {
            return Ok(hit.clone());
        }

        let candidates = self.candidates(path);
        let found = candidates
            .iter()
            .find(|(candidate, _)| candidate.exists())
            .map(|(candidate, _)| candidate.clone());

        match found {
            Some(hit) => {
                self.cache.borrow_mut().insert(path.clone(), hit.clone());
                Ok(hit)
            }
            None => {
                for (candidate, resolver) in &candidates {
                    debug!(
                        dependency = %path,
                        resolver = %resolver,
                        "candidate {} does not exist",
                        candidate.display()
                    );
                }
                Err(BuildError::not_found(
                    path.relative.clone(),
                    candidates.into_iter().map(|(candidate, _)| candidate).collect(),
                ))
            }
        }
    }
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field(
                "resolvers",
                &self.resolvers.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// The chain every project starts with. Resolvers listed later take
/// precedence, so a vendored `dependencies/` checkout beats a sibling
/// `libs/` checkout.
pub fn default_chain(project_root: &Path) -> ResolverChain {
    let mut chain = ResolverChain::new();
    chain.add_resolver(PrefixResolver::new(PathTag::Project, project_root));
    chain.add_resolver(PrefixResolver::new(
        PathTag::Library,
        project_root.join("..").join("..").join("libs"),
    ));
    chain.add_resolver(PrefixResolver::new(
        PathTag::Library,
        project_root.join("dependencies"),
    ));
    chain.add_resolver(PrefixResolver::new(
        PathTag::ThirdParty,
        project_root.join("..").join("..").join("..").join("external"),
    ));
    chain.add_resolver(PrefixResolver::new(
        PathTag::ThirdParty,
        project_root.join("dependencies"),
    ));
    chain.add_resolver(VersionedDirResolver::new(
        PathTag::Prebuilt,
        project_root.join("prebuilts"),
    ));
    chain.add_resolver(PrefixResolver::new(
        PathTag::Prebuilt,
        project_root.join("prebuilts"),
    ));
    chain
}
