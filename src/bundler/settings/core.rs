//! Core Settings struct and implementations.

use super::FunctionConfig;
use crate::bundler::engine::BundlingEngine;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Output container for packaged functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// One deterministic `.zip` per function.
    #[default]
    Zip,
    /// One plain directory per function, for local inspection.
    Directory,
}

/// Main settings for packaging runs.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder). Holds the
/// run-wide defaults, per-function overrides and the delegated engine.
#[derive(Clone)]
pub struct Settings {
    /// Defaults applied to every function.
    function_defaults: FunctionConfig,

    /// Name-glob overrides, first match wins.
    function_overrides: Vec<(glob::Pattern, FunctionConfig)>,

    /// Maximum number of functions packaged concurrently. `None` is unbounded.
    concurrency_limit: Option<usize>,

    archive_format: ArchiveFormat,

    /// Extensions tried when a reference names a file without one.
    extensions: Vec<String>,

    /// Keep `*.map` files when copying dependency packages.
    include_source_maps: bool,

    /// Upward manifest search stops after checking this directory.
    manifest_boundary: Option<PathBuf>,

    /// Delegated bundling engine.
    engine: Arc<dyn BundlingEngine>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("function_defaults", &self.function_defaults)
            .field(
                "function_overrides",
                &self
                    .function_overrides
                    .iter()
                    .map(|(pattern, _)| pattern.as_str())
                    .collect::<Vec<_>>(),
            )
            .field("concurrency_limit", &self.concurrency_limit)
            .field("archive_format", &self.archive_format)
            .field("extensions", &self.extensions)
            .field("include_source_maps", &self.include_source_maps)
            .field("manifest_boundary", &self.manifest_boundary)
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl Settings {
    /// Returns the configuration for the function called `name`.
    ///
    /// The first override whose glob matches the name is merged on top of the
    /// run-wide defaults.
    pub fn function_config(&self, name: &str) -> FunctionConfig {
        match self
            .function_overrides
            .iter()
            .find(|(pattern, _)| pattern.matches(name))
        {
            Some((pattern, config)) => {
                log::debug!("Function '{}' matches override '{}'", name, pattern.as_str());
                self.function_defaults.merged_with(config)
            }
            None => self.function_defaults.clone(),
        }
    }

    /// Returns the run-wide defaults.
    pub fn function_defaults(&self) -> &FunctionConfig {
        &self.function_defaults
    }

    /// Returns the concurrency limit, `None` meaning unbounded.
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.concurrency_limit
    }

    pub fn archive_format(&self) -> ArchiveFormat {
        self.archive_format
    }

    /// Returns the resolution extension list, each with a leading dot.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn include_source_maps(&self) -> bool {
        self.include_source_maps
    }

    pub fn manifest_boundary(&self) -> Option<&Path> {
        self.manifest_boundary.as_deref()
    }

    /// Returns the delegated bundling engine.
    pub fn engine(&self) -> &Arc<dyn BundlingEngine> {
        &self.engine
    }

    /// Creates a new Settings instance (used by SettingsBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        function_defaults: FunctionConfig,
        function_overrides: Vec<(glob::Pattern, FunctionConfig)>,
        concurrency_limit: Option<usize>,
        archive_format: ArchiveFormat,
        extensions: Vec<String>,
        include_source_maps: bool,
        manifest_boundary: Option<PathBuf>,
        engine: Arc<dyn BundlingEngine>,
    ) -> Self {
        Self {
            function_defaults,
            function_overrides,
            concurrency_limit,
            archive_format,
            extensions,
            include_source_maps,
            manifest_boundary,
            engine,
        }
    }
}
