//! Library entry points.

use crate::bundler::{
    archive::{self, Archive},
    builder::Bundler,
    concurrency,
    context::RunContext,
    discovery::{self, FunctionSource, Runtime},
    error::{Error, Result},
    graph::GraphBuilder,
    settings::Settings,
};
use std::path::{Path, PathBuf};

/// A source file that belongs to a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionFile {
    pub function: FunctionSource,
    pub path: PathBuf,
}

/// The result of packaging one function of a batch.
#[derive(Debug)]
pub struct PackagedFunction {
    pub function: FunctionSource,
    pub result: Result<Archive>,
}

/// Lists the functions found in `dirs`.
pub async fn list_functions(dirs: &[PathBuf], settings: &Settings) -> Result<Vec<FunctionSource>> {
    discovery::discover(dirs, settings).await
}

/// Lists every source file each function in `dirs` depends on.
///
/// Script functions are expanded with the static graph builder; pre-built
/// functions list only their own file.
pub async fn list_function_files(dirs: &[PathBuf], settings: &Settings) -> Result<Vec<FunctionFile>> {
    let ctx = RunContext::new(settings.clone());
    let mut files = Vec::new();

    for function in discovery::discover(dirs, settings).await? {
        let paths: Vec<PathBuf> = match function.runtime {
            Runtime::Js => GraphBuilder::new(&ctx, &function.config)?
                .build(&function.entry_file)
                .await?
                .files()
                .map(Path::to_path_buf)
                .collect(),
            _ => vec![function.entry_file.clone()],
        };
        files.extend(paths.into_iter().map(|path| FunctionFile {
            function: function.clone(),
            path,
        }));
    }

    Ok(files)
}

/// Bundles and archives one discovered function within an existing run.
pub async fn package_function(
    ctx: &RunContext,
    function: &FunctionSource,
    dest_dir: &Path,
) -> Result<Archive> {
    let outcome = Bundler::new(ctx.clone()).bundle(function).await?;
    archive::assemble(outcome, function, dest_dir, ctx.settings().archive_format()).await
}

/// Packages the single function at `entry_path` into `dest_dir`.
///
/// `entry_path` may be a function file or a function directory.
pub async fn package_one(entry_path: &Path, dest_dir: &Path, settings: &Settings) -> Result<Archive> {
    let function = FunctionSource::from_path(entry_path, settings)
        .await?
        .ok_or_else(|| Error::UnsupportedRuntime {
            path: entry_path.to_path_buf(),
            reason: "not a recognised function entry point".to_string(),
        })?;
    let ctx = RunContext::new(settings.clone());
    package_function(&ctx, &function, dest_dir).await
}

/// Packages every function found in `dirs` into `dest_dir`.
///
/// At most [`Settings::concurrency_limit`] functions are packaged at once.
/// Each function's failure is reported in its own slot; only discovery
/// failures (such as a missing directory) fail the whole call.
pub async fn package_many(
    dirs: &[PathBuf],
    dest_dir: &Path,
    settings: &Settings,
) -> Result<Vec<PackagedFunction>> {
    let functions = discovery::discover(dirs, settings).await?;
    log::info!(
        "Packaging {} functions into {}",
        functions.len(),
        dest_dir.display()
    );

    let ctx = RunContext::new(settings.clone());
    let dest_dir = dest_dir.to_path_buf();
    let results = concurrency::run_bounded(functions, settings.concurrency_limit(), |function| {
        let ctx = ctx.clone();
        let dest_dir = dest_dir.clone();
        async move { package_function(&ctx, &function, &dest_dir).await }
    })
    .await;

    Ok(results
        .into_iter()
        .map(|(function, result)| {
            if let Err(e) = &result {
                log::error!("Failed to package '{}': {}", function.name, e);
            }
            PackagedFunction { function, result }
        })
        .collect())
}
