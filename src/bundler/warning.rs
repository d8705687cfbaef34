//! Non-fatal issues attached to a bundling outcome.

use crate::bundler::{error::EngineMessage, resolver::OptionalReason};
use std::{fmt, path::PathBuf};

/// A recoverable problem found while bundling one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A reference computed at runtime; not followed.
    DynamicReference { file: PathBuf, expression: String },
    /// A missing dependency tolerated because it is optional.
    OptionalDependencyMissing {
        reference: String,
        requirer: PathBuf,
        reason: OptionalReason,
    },
    /// A dependency declared by an included package that is not installed.
    UndeclaredMissing { package: String, declared_by: PathBuf },
    /// Static `import`/`export` syntax the graph builder does not follow.
    StaticModuleSyntax { file: PathBuf },
    /// An installed package file the parser rejected; its references were
    /// not followed, but it is still shipped with its package.
    UnparsedSource { file: PathBuf, reason: String },
    /// A warning reported by the delegated engine.
    Engine(EngineMessage),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DynamicReference { file, expression } => write!(
                f,
                "dynamic reference `{}` in {} was not followed",
                expression,
                file.display()
            ),
            Warning::OptionalDependencyMissing {
                reference,
                requirer,
                reason,
            } => write!(
                f,
                "'{}' required from {} is not installed ({})",
                reference,
                requirer.display(),
                reason
            ),
            Warning::UndeclaredMissing {
                package,
                declared_by,
            } => write!(
                f,
                "'{}' declared by {} is not installed",
                package,
                declared_by.display()
            ),
            Warning::StaticModuleSyntax { file } => write!(
                f,
                "{} uses import/export syntax; its static imports were not followed",
                file.display()
            ),
            Warning::UnparsedSource { file, reason } => write!(
                f,
                "references in {} were not scanned: {}",
                file.display(),
                reason
            ),
            Warning::Engine(message) => write!(f, "engine: {message}"),
        }
    }
}
