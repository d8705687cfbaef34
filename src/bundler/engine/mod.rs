//! Delegated bundling engines.
//!
//! An engine is an opaque transform: it takes an entry file and produces one
//! bundled file plus the names of modules it left external. The orchestrator
//! only talks to the [`BundlingEngine`] trait, so tests and embedders can
//! supply their own implementation through
//! [`SettingsBuilder::engine`](crate::bundler::SettingsBuilder::engine).

mod esbuild;

pub use esbuild::EsbuildEngine;

use crate::bundler::error::{EngineMessage, Result};
use std::path::{Path, PathBuf};

/// Inputs handed to an engine for one function.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Modules to leave as runtime references.
    pub external_modules: Vec<String>,
    /// Modules that must not be bundled.
    pub ignored_modules: Vec<String>,
    /// Scratch directory the engine writes its output into.
    pub out_dir: PathBuf,
}

/// What an engine produced.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// The single bundled file, inside [`EngineOptions::out_dir`].
    pub bundled_file: PathBuf,
    /// Bare module names the bundle still requires at runtime.
    pub external_modules: Vec<String>,
    pub warnings: Vec<EngineMessage>,
}

/// A full bundling engine invoked as an opaque transform.
///
/// Failures are reported as
/// [`Error::BundlingEngine`](crate::bundler::Error::BundlingEngine) with the
/// engine's own messages attached.
#[async_trait::async_trait]
pub trait BundlingEngine: Send + Sync {
    /// Short engine name used in diagnostics.
    fn name(&self) -> &str;

    /// Bundles `entry` according to `options`.
    async fn bundle(&self, entry: &Path, options: &EngineOptions) -> Result<EngineOutput>;
}
