//! Main bundler orchestration.
//!
//! This module provides the [`Bundler`] that selects a strategy for a
//! function, executes it and applies the configured fallback.

use super::{
    BundlingOutcome, FileSource, OutputFile, archive_name, common_base, link_target,
    strategy::{self, Selection, StrategyUsed},
};
use crate::bundler::{
    context::RunContext,
    discovery::FunctionSource,
    engine::EngineOptions,
    error::{Error, ErrorExt, Result},
    graph::{DependencyGraph, GraphBuilder, exclusions::ModuleMatcher},
    resolver,
    warning::Warning,
};
use std::path::{Path, PathBuf};

/// Progress of one function through strategy selection and fallback.
#[derive(Debug)]
pub enum BundleState {
    NotStarted,
    StrategySelected(Selection),
    /// The primary strategy failed and a fallback is configured.
    PrimaryFailed { fallback: StrategyUsed, primary: Error },
    /// The fallback ran; the primary error is kept for reporting.
    FallbackAttempted {
        primary: Error,
        retry: Result<BundlingOutcome>,
    },
    Succeeded(BundlingOutcome),
    Failed(Error),
}

impl BundleState {
    /// Performs one transition. Terminal states are returned unchanged.
    async fn advance(self, bundler: &Bundler, function: &FunctionSource) -> Self {
        match self {
            BundleState::NotStarted => match strategy::select(&bundler.ctx, function).await {
                Ok(selection) => {
                    log::debug!(
                        "Bundling '{}' with the {} strategy{}",
                        function.name,
                        selection.primary,
                        selection
                            .fallback
                            .map(|f| format!(" ({f} on failure)"))
                            .unwrap_or_default()
                    );
                    BundleState::StrategySelected(selection)
                }
                Err(e) => BundleState::Failed(e),
            },
            BundleState::StrategySelected(selection) => {
                match bundler.run(selection.primary, function).await {
                    Ok(outcome) => BundleState::Succeeded(outcome),
                    Err(primary) => match selection.fallback {
                        Some(fallback) => BundleState::PrimaryFailed { fallback, primary },
                        None => BundleState::Failed(primary),
                    },
                }
            }
            BundleState::PrimaryFailed { fallback, primary } => {
                log::warn!(
                    "'{}' failed to bundle ({}); retrying with the {} strategy",
                    function.name,
                    primary,
                    fallback
                );
                let retry = bundler.run(fallback, function).await;
                BundleState::FallbackAttempted { primary, retry }
            }
            BundleState::FallbackAttempted {
                primary,
                retry: Ok(mut outcome),
            } => {
                outcome.bundler_errors = Some(primary.sub_errors());
                BundleState::Succeeded(outcome)
            }
            BundleState::FallbackAttempted {
                primary,
                retry: Err(retry),
            } => {
                log::debug!("Fallback for '{}' also failed: {}", function.name, retry);
                BundleState::Failed(primary)
            }
            terminal @ (BundleState::Succeeded(_) | BundleState::Failed(_)) => terminal,
        }
    }
}

/// Bundles functions for one run.
///
/// Cloning is cheap; every clone shares the run's manifest cache.
#[derive(Debug, Clone)]
pub struct Bundler {
    ctx: RunContext,
}

impl Bundler {
    /// Creates a bundler bound to `ctx`.
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    /// Bundles one function.
    ///
    /// With a fallback configured, a failing primary strategy is retried once.
    /// If the retry fails too, the primary error is returned; if it succeeds,
    /// the primary's errors are attached to the outcome.
    pub async fn bundle(&self, function: &FunctionSource) -> Result<BundlingOutcome> {
        let mut state = BundleState::NotStarted;
        loop {
            state = match state.advance(self, function).await {
                BundleState::Succeeded(outcome) => {
                    for warning in &outcome.warnings {
                        log::warn!("{}: {}", function.name, warning);
                    }
                    return Ok(outcome);
                }
                BundleState::Failed(e) => return Err(e),
                next => next,
            };
        }
    }

    async fn run(&self, strategy: StrategyUsed, function: &FunctionSource) -> Result<BundlingOutcome> {
        match strategy {
            StrategyUsed::Passthrough | StrategyUsed::Binary => {
                Ok(self.single_file(strategy, function))
            }
            StrategyUsed::Graph => self.bundle_graph(function).await,
            StrategyUsed::Engine => self.bundle_engine(function).await,
        }
    }

    /// Pre-built artifacts ship as their own single file.
    fn single_file(&self, strategy: StrategyUsed, function: &FunctionSource) -> BundlingOutcome {
        let entry = &function.entry_file;
        let base_dir = entry.parent().map(Path::to_path_buf).unwrap_or_default();
        BundlingOutcome {
            strategy_used: strategy,
            runtime: function.runtime,
            files: vec![OutputFile {
                name: archive_name(entry, &base_dir),
                source: FileSource::Path(entry.clone()),
                mode: None,
            }],
            base_dir,
            warnings: Vec::new(),
            bundler_errors: None,
        }
    }

    async fn bundle_graph(&self, function: &FunctionSource) -> Result<BundlingOutcome> {
        let graph = GraphBuilder::new(&self.ctx, &function.config)?
            .build(&function.entry_file)
            .await?;

        if !graph.external_references.is_empty() {
            log::debug!(
                "'{}' leaves external: {}",
                function.name,
                graph
                    .external_references
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let base_dir = common_base(graph.files().chain(link_paths(&graph))).unwrap_or_default();
        let files = graph_outputs(&graph, &base_dir);

        Ok(BundlingOutcome {
            strategy_used: StrategyUsed::Graph,
            runtime: function.runtime,
            base_dir,
            files,
            warnings: graph.warnings,
            bundler_errors: None,
        })
    }

    async fn bundle_engine(&self, function: &FunctionSource) -> Result<BundlingOutcome> {
        let engine = self.ctx.settings().engine();
        let entry = &function.entry_file;

        let staging = tempfile::tempdir().fs_context(
            "creating engine staging directory",
            &std::env::temp_dir(),
        )?;
        let options = EngineOptions {
            external_modules: function.config.external_modules.clone(),
            ignored_modules: function.config.ignored_modules.clone(),
            out_dir: staging.path().to_path_buf(),
        };

        let output = engine.bundle(entry, &options).await?;
        let bundled = tokio::fs::read(&output.bundled_file)
            .await
            .fs_context("reading bundled output", &output.bundled_file)?;
        drop(staging);

        let mut warnings: Vec<Warning> = output.warnings.into_iter().map(Warning::Engine).collect();

        // Externals the engine could not inline still have to ship.
        let external = ModuleMatcher::new(&function.config.external_modules)?;
        let ignored = ModuleMatcher::new(&function.config.ignored_modules)?;
        let shipped: Vec<String> = output
            .external_modules
            .into_iter()
            .filter(|name| {
                !resolver::is_builtin(name) && !external.matches(name) && !ignored.matches(name)
            })
            .collect();

        let packages = if shipped.is_empty() {
            None
        } else {
            log::debug!(
                "Shipping engine externals of '{}': {}",
                function.name,
                shipped.join(", ")
            );
            let graph = GraphBuilder::new(&self.ctx, &function.config)?
                .build_packages(&shipped, entry)
                .await?;
            warnings.extend(graph.warnings.iter().cloned());
            Some(graph)
        };

        let logical_entry: PathBuf = resolver::real_path(entry).await?.with_extension("js");
        let package_paths = packages
            .iter()
            .flat_map(|graph| graph.files().chain(link_paths(graph)));
        let base_dir = common_base(std::iter::once(logical_entry.as_path()).chain(package_paths))
            .unwrap_or_default();

        let mut files = vec![OutputFile {
            name: archive_name(&logical_entry, &base_dir),
            source: FileSource::Bytes(bundled),
            mode: None,
        }];
        if let Some(graph) = &packages {
            files.extend(graph_outputs(graph, &base_dir));
        }

        Ok(BundlingOutcome {
            strategy_used: StrategyUsed::Engine,
            runtime: function.runtime,
            base_dir,
            files,
            warnings,
            bundler_errors: None,
        })
    }
}

fn link_paths(graph: &DependencyGraph) -> impl Iterator<Item = &Path> {
    graph.links.iter().map(|link| link.path.as_path())
}

/// Output files for a graph's closure and the symlinks leading into it.
fn graph_outputs(graph: &DependencyGraph, base_dir: &Path) -> Vec<OutputFile> {
    let files = graph.files().map(|path| OutputFile {
        name: archive_name(path, base_dir),
        source: FileSource::Path(path.to_path_buf()),
        mode: None,
    });
    let links = graph.links.iter().map(|link| OutputFile {
        name: archive_name(&link.path, base_dir),
        source: FileSource::Link(link_target(&link.target, &link.path)),
        mode: None,
    });
    files.chain(links).collect()
}
