//! Bundling strategy selection.

use crate::bundler::{
    context::RunContext,
    discovery::{FunctionSource, Runtime},
    error::{ErrorExt, Result},
    graph::scanner,
    settings::StrategyChoice,
};
use std::fmt;

/// Extensions that always need a full bundling engine.
const ENGINE_EXTENSIONS: &[&str] = &["mjs", "mts", "ts", "cts"];

/// The strategy that produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyUsed {
    /// A pre-built archive copied as-is.
    Passthrough,
    /// A compiled executable shipped as a single file.
    Binary,
    /// The static dependency graph builder.
    Graph,
    /// The delegated bundling engine.
    Engine,
}

impl fmt::Display for StrategyUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyUsed::Passthrough => "passthrough",
            StrategyUsed::Binary => "binary",
            StrategyUsed::Graph => "graph",
            StrategyUsed::Engine => "engine",
        })
    }
}

/// A primary strategy and the one retried if it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub primary: StrategyUsed,
    pub fallback: Option<StrategyUsed>,
}

impl Selection {
    fn single(primary: StrategyUsed) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }
}

/// Selection that follows from runtime and configuration alone.
fn fixed(function: &FunctionSource) -> Option<Selection> {
    match function.runtime {
        Runtime::PreArchived => return Some(Selection::single(StrategyUsed::Passthrough)),
        Runtime::Go | Runtime::Rust | Runtime::Provided => {
            return Some(Selection::single(StrategyUsed::Binary));
        }
        Runtime::Js => {}
    }

    match function.config.strategy? {
        StrategyChoice::Graph => Some(Selection::single(StrategyUsed::Graph)),
        StrategyChoice::Engine => Some(Selection::single(StrategyUsed::Engine)),
        StrategyChoice::EngineWithFallback => Some(Selection {
            primary: StrategyUsed::Engine,
            fallback: Some(StrategyUsed::Graph),
        }),
    }
}

/// Chooses how to bundle `function`.
///
/// Unpinned script functions are sniffed: module-format sources go to the
/// engine, everything else to the graph builder.
pub async fn select(ctx: &RunContext, function: &FunctionSource) -> Result<Selection> {
    if let Some(selection) = fixed(function) {
        return Ok(selection);
    }

    if ENGINE_EXTENSIONS.contains(&function.extension.as_str()) {
        return Ok(Selection::single(StrategyUsed::Engine));
    }

    let manifest = match function.entry_file.parent() {
        Some(dir) => ctx.manifests().find(dir).await?,
        None => None,
    };
    if let Some(manifest) = manifest.filter(|m| m.is_module()) {
        log::debug!(
            "{} is a module package; bundling '{}' with the engine",
            manifest.path().display(),
            function.name
        );
        return Ok(Selection::single(StrategyUsed::Engine));
    }

    let source = tokio::fs::read(&function.entry_file)
        .await
        .fs_context("reading entry file", &function.entry_file)?;
    if scanner::has_module_syntax(&String::from_utf8_lossy(&source), &function.entry_file) {
        return Ok(Selection::single(StrategyUsed::Engine));
    }

    Ok(Selection::single(StrategyUsed::Graph))
}
