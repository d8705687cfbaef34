//! Builder for constructing Settings.

use super::{ArchiveFormat, FunctionConfig, Settings, StrategyChoice};
use crate::bundler::engine::{BundlingEngine, EsbuildEngine};
use crate::bundler::error::{Error, Result};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Extensions tried, in order, when a reference omits one.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".js", ".cjs", ".mjs", ".json", ".node"];

/// Builder for constructing [`Settings`].
///
/// Provides a fluent API for building packaging settings with validation.
///
/// # Examples
///
/// ```no_run
/// use function_bundler::bundler::{SettingsBuilder, StrategyChoice};
///
/// # fn example() -> function_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .strategy(StrategyChoice::EngineWithFallback)
///     .external_modules(vec!["aws-sdk".into()])
///     .concurrency_limit(4)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
    function_defaults: FunctionConfig,
    function_overrides: Vec<(String, FunctionConfig)>,
    concurrency_limit: Option<usize>,
    archive_format: ArchiveFormat,
    extensions: Option<Vec<String>>,
    include_source_maps: bool,
    manifest_boundary: Option<PathBuf>,
    engine: Option<Arc<dyn BundlingEngine>>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Pins a bundling strategy for every function.
    ///
    /// Default: None (strategy chosen per function by sniffing)
    pub fn strategy(mut self, strategy: StrategyChoice) -> Self {
        self.function_defaults.strategy = Some(strategy);
        self
    }

    /// Sets modules kept out of the closure but left as runtime references.
    pub fn external_modules(mut self, modules: Vec<String>) -> Self {
        self.function_defaults.external_modules = modules;
        self
    }

    /// Sets modules (names or globs) excluded entirely.
    pub fn ignored_modules(mut self, modules: Vec<String>) -> Self {
        self.function_defaults.ignored_modules = modules;
        self
    }

    /// Sets file globs never copied out of dependency packages.
    pub fn exclude_files(mut self, patterns: Vec<String>) -> Self {
        self.function_defaults.exclude_files = patterns;
        self
    }

    /// Adds a per-function override, applied to functions whose name matches
    /// `name_glob`. Earlier overrides take precedence.
    pub fn function_override(mut self, name_glob: impl Into<String>, config: FunctionConfig) -> Self {
        self.function_overrides.push((name_glob.into(), config));
        self
    }

    /// Limits how many functions are packaged at once.
    ///
    /// Default: unbounded
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Sets the output container.
    ///
    /// Default: [`ArchiveFormat::Zip`]
    pub fn archive_format(mut self, format: ArchiveFormat) -> Self {
        self.archive_format = format;
        self
    }

    /// Sets the extensions tried for extension-less references.
    ///
    /// Default: [`DEFAULT_EXTENSIONS`]
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Keeps `*.map` files in copied dependency packages.
    pub fn include_source_maps(mut self, include: bool) -> Self {
        self.include_source_maps = include;
        self
    }

    /// Stops the upward manifest search at `dir` (inclusive).
    pub fn manifest_boundary<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.manifest_boundary = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets the delegated bundling engine.
    ///
    /// Default: [`EsbuildEngine`] looked up on `PATH`
    pub fn engine(mut self, engine: Arc<dyn BundlingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero concurrency limit, an
    /// unparsable override glob or an empty extension.
    pub fn build(self) -> Result<Settings> {
        if self.concurrency_limit == Some(0) {
            return Err(Error::InvalidConfig(
                "concurrency limit must be at least 1".to_string(),
            ));
        }

        let function_overrides = self
            .function_overrides
            .into_iter()
            .map(|(glob, config)| {
                glob::Pattern::new(&glob)
                    .map(|pattern| (pattern, config))
                    .map_err(|e| {
                        Error::InvalidConfig(format!("invalid function name pattern '{glob}': {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let extensions = match self.extensions {
            Some(list) => list
                .into_iter()
                .map(|ext| {
                    let ext = ext.trim().to_string();
                    if ext.is_empty() || ext == "." {
                        Err(Error::InvalidConfig("empty resolution extension".to_string()))
                    } else if ext.starts_with('.') {
                        Ok(ext)
                    } else {
                        Ok(format!(".{ext}"))
                    }
                })
                .collect::<Result<Vec<_>>>()?,
            None => DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        };

        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(EsbuildEngine::default()));

        Ok(Settings::new(
            self.function_defaults,
            function_overrides,
            self.concurrency_limit,
            self.archive_format,
            extensions,
            self.include_source_maps,
            self.manifest_boundary,
            engine,
        ))
    }
}
