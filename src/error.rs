//! Error taxonomy for the build engine.
//!
//! Engine operations return [`BuildError`] so callers can see which of the
//! three failure kinds they are handling: a file or tool that could not be
//! located, a converter that failed, or a filesystem mutation that failed.
//! Configuration loading stays on `anyhow`; only the engine is typed.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Message carried by [`BuildError::ToolInvocation`] when the converter could
/// not be located, so no process was ever spawned.
pub const BINARY_NOT_FOUND: &str = "binary not found";

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A required file or tool was not found under any candidate location.
    #[error("unable to locate '{}'{}", path.display(), Candidates(candidates))]
    DependencyNotFound {
        path: PathBuf,
        /// Every location that was tried, in search order.
        candidates: Vec<PathBuf>,
    },

    /// A converter could not be started or exited unsuccessfully.
    #[error("{}", describe_invocation(argv, *exit_code, message.as_deref()))]
    ToolInvocation {
        argv: Vec<OsString>,
        exit_code: Option<i32>,
        message: Option<String>,
    },

    #[error("failed to {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;

impl BuildError {
    pub fn not_found(path: impl Into<PathBuf>, candidates: Vec<PathBuf>) -> Self {
        BuildError::DependencyNotFound {
            path: path.into(),
            candidates,
        }
    }

    /// The sentinel form raised before spawning when a converter is missing.
    pub fn missing_binary(argv: Vec<OsString>) -> Self {
        BuildError::ToolInvocation {
            argv,
            exit_code: None,
            message: Some(BINARY_NOT_FOUND.to_string()),
        }
    }

    pub fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// True for the pre-spawn "binary not found" sentinel.
    pub fn is_missing_binary(&self) -> bool {
        matches!(
            self,
            BuildError::ToolInvocation {
                exit_code: None,
                message: Some(message),
                ..
            } if message == BINARY_NOT_FOUND
        )
    }
}

struct Candidates<'a>(&'a [PathBuf]);

impl fmt::Display for Candidates<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        let joined = self
            .0
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, " (searched: {joined})")
    }
}

fn describe_invocation(argv: &[OsString], exit_code: Option<i32>, message: Option<&str>) -> String {
    let command = argv
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    match (exit_code, message) {
        (Some(code), _) => format!("`{command}` exited with status {code}"),
        (None, Some(message)) => format!("`{command}` failed: {message}"),
        (None, None) => format!("`{command}` terminated by signal"),
    }
}
