//! Command line interface for function_bundler.
//!
//! Parses arguments, layers them over an optional config file, and drives
//! the library's listing and packaging entry points.

mod args;
mod config;

pub use args::Args;
pub use config::FileConfig;

use crate::{
    bundler::{self, EsbuildEngine, Settings, SettingsBuilder},
    error::{CliError, Result},
};
use std::sync::Arc;

/// Main CLI entry point. Returns the process exit code.
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute(args).await
}

/// Runs already-parsed arguments.
pub async fn execute(args: Args) -> Result<i32> {
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = build_settings(&args, file)?;
    log::debug!("{:?}", settings);

    if args.list {
        for function in bundler::list_functions(&args.sources, &settings).await? {
            println!(
                "{}\t{}\t{}",
                function.name,
                function.runtime,
                function.entry_file.display()
            );
        }
        return Ok(0);
    }

    let output = args.output.as_ref().ok_or_else(|| CliError::MissingArgument {
        argument: "--output".to_string(),
    })?;

    let results = bundler::package_many(&args.sources, output, &settings).await?;
    let mut failed = 0;
    for packaged in &results {
        match &packaged.result {
            Ok(archive) => {
                println!(
                    "{}\t{}\t{}\t{}",
                    packaged.function.name,
                    archive.strategy_used,
                    archive.checksum,
                    archive.path.display()
                );
                for message in archive.bundler_errors.iter().flatten() {
                    eprintln!("  recovered from: {message}");
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", packaged.function.name, e);
            }
        }
    }

    if failed > 0 {
        eprintln!("{failed} of {} functions failed to package", results.len());
        return Ok(1);
    }
    Ok(0)
}

/// Layers command line flags over the config file.
pub fn build_settings(args: &Args, file: FileConfig) -> Result<Settings> {
    let concat = |base: Vec<String>, extra: &[String]| {
        let mut out = base;
        out.extend(extra.iter().cloned());
        out
    };

    let mut builder = SettingsBuilder::new()
        .external_modules(concat(file.external_modules, &args.external))
        .ignored_modules(concat(file.ignored_modules, &args.ignore))
        .exclude_files(file.exclude_files);

    if let Some(strategy) = args.strategy.or(file.strategy) {
        builder = builder.strategy(strategy);
    }
    if let Some(limit) = args.concurrency.or(file.concurrency) {
        builder = builder.concurrency_limit(limit);
    }
    if let Some(format) = args.archive_format.or(file.archive_format) {
        builder = builder.archive_format(format);
    }
    if let Some(extensions) = file.extensions {
        builder = builder.extensions(extensions);
    }
    if let Some(include) = file.include_source_maps {
        builder = builder.include_source_maps(include);
    }
    if let Some(boundary) = file.manifest_boundary {
        builder = builder.manifest_boundary(boundary);
    }
    if let Some(binary) = file.esbuild {
        builder = builder.engine(Arc::new(EsbuildEngine::with_binary(binary)));
    }
    for (pattern, config) in file.functions {
        builder = builder.function_override(pattern, config);
    }

    Ok(builder.build()?)
}
