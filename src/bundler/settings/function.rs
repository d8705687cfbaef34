//! Per-function bundling configuration.

/// Bundling strategy pinned by configuration.
///
/// Unpinned functions have their strategy chosen by sniffing the entry file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Static dependency graph builder only.
    Graph,
    /// Delegated bundling engine only.
    Engine,
    /// Delegated engine, retried with the graph builder on failure.
    EngineWithFallback,
}

/// Options that apply to one function.
///
/// Run-wide defaults live in [`Settings`](super::Settings); named overrides
/// are merged on top of them during discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FunctionConfig {
    /// Pinned bundling strategy.
    pub strategy: Option<StrategyChoice>,

    /// Modules excluded from the closure whose references are kept for the
    /// runtime environment to supply.
    pub external_modules: Vec<String>,

    /// Modules (names or globs) excluded entirely.
    pub ignored_modules: Vec<String>,

    /// File globs never copied out of dependency packages.
    pub exclude_files: Vec<String>,
}

impl FunctionConfig {
    /// Layers `other` on top of `self`.
    ///
    /// A pinned strategy in `other` wins; module and file lists accumulate.
    pub fn merged_with(&self, other: &FunctionConfig) -> FunctionConfig {
        let extend = |base: &[String], extra: &[String]| {
            let mut out = base.to_vec();
            for item in extra {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            out
        };

        FunctionConfig {
            strategy: other.strategy.or(self.strategy),
            external_modules: extend(&self.external_modules, &other.external_modules),
            ignored_modules: extend(&self.ignored_modules, &other.ignored_modules),
            exclude_files: extend(&self.exclude_files, &other.exclude_files),
        }
    }
}
