//! Optional TOML configuration file.
//!
//! ```toml
//! strategy = "engine-with-fallback"
//! external_modules = ["aws-sdk"]
//! concurrency = 4
//!
//! [functions."api-*"]
//! strategy = "graph"
//! ignored_modules = ["pg-native"]
//! ```

use crate::bundler::{ArchiveFormat, FunctionConfig, StrategyChoice};
use anyhow::Context;
use serde::Deserialize;
use std::{collections::BTreeMap, path::{Path, PathBuf}};

/// Contents of a configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub strategy: Option<StrategyChoice>,
    pub external_modules: Vec<String>,
    pub ignored_modules: Vec<String>,
    pub exclude_files: Vec<String>,
    pub concurrency: Option<usize>,
    pub archive_format: Option<ArchiveFormat>,
    pub extensions: Option<Vec<String>>,
    pub include_source_maps: Option<bool>,
    pub manifest_boundary: Option<PathBuf>,
    /// Path of the esbuild executable; looked up on `PATH` when unset.
    pub esbuild: Option<PathBuf>,
    /// Per-function overrides keyed by function name glob, applied in key order.
    pub functions: BTreeMap<String, FunctionConfig>,
}

impl FileConfig {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}
