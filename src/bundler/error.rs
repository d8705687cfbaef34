//! Error taxonomy for dependency resolution, bundling and archive assembly.
//!
//! Every failure carries enough structure (path, reference, underlying cause)
//! to render a precise diagnostic. Failures local to one function are isolated
//! by the concurrency controller; only [`Error::EmptyDirectory`] and settings
//! failures abort a whole run.

use std::{
    fmt::Display,
    io,
    path::{Path, PathBuf},
};

/// Result type alias for bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A structured message reported by a bundling engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineMessage {
    /// Human-readable message text.
    pub text: String,
}

impl EngineMessage {
    /// Creates a message from any displayable value.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Display for EngineMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Errors produced while packaging functions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `package.json` exists but is not valid.
    #[error("failed to parse manifest {}: {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A script could not be parsed to extract its references.
    #[error("failed to parse {} at line {line}: {message}", path.display())]
    SourceParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A non-optional reference could not be found on disk.
    #[error("cannot find module '{reference}' required from {}", requirer.display())]
    MissingDependency { reference: String, requirer: PathBuf },

    /// The delegated bundling engine failed.
    #[error("{engine} failed to bundle: {message}")]
    BundlingEngine {
        engine: String,
        message: String,
        errors: Vec<EngineMessage>,
    },

    /// The archive (or directory output) could not be written.
    #[error("failed to write archive {}: {source}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A function source uses a runtime this packager cannot handle.
    #[error("unsupported runtime for {}: {reason}", path.display())]
    UnsupportedRuntime { path: PathBuf, reason: String },

    /// A requested source directory does not exist.
    #[error("functions directory {} does not exist", path.display())]
    EmptyDirectory { path: PathBuf },

    /// Filesystem failure with context.
    #[error("error {context} at {}: {source}", path.display())]
    Fs {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Plain IO error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Generic error.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Structured sub-errors of this failure.
    ///
    /// Engine failures expose their own messages; any other failure is
    /// rendered as a single message.
    pub fn sub_errors(&self) -> Vec<EngineMessage> {
        match self {
            Error::BundlingEngine { errors, .. } if !errors.is_empty() => errors.clone(),
            other => vec![EngineMessage::new(other.to_string())],
        }
    }
}

/// Attaches a context string and path to IO failures.
pub trait ErrorExt<T> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for io::Result<T> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Returns early with a [`Error::GenericError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}
