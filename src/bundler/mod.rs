//! Serverless function packaging.
//!
//! Discovers functions, resolves each one's dependency closure, bundles it
//! with the selected strategy and writes a reproducible archive.
//!
//! # Example
//!
//! ```no_run
//! use function_bundler::bundler::{SettingsBuilder, package_many};
//! use std::path::{Path, PathBuf};
//!
//! # async fn example() -> function_bundler::bundler::Result<()> {
//! let settings = SettingsBuilder::new()
//!     .external_modules(vec!["aws-sdk".into()])
//!     .concurrency_limit(4)
//!     .build()?;
//!
//! let results = package_many(&[PathBuf::from("functions")], Path::new("dist"), &settings).await?;
//! for packaged in results {
//!     match packaged.result {
//!         Ok(archive) => println!("{} -> {}", packaged.function.name, archive.path.display()),
//!         Err(e) => eprintln!("{}: {e}", packaged.function.name),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod archive;
pub mod builder;
pub mod concurrency;
pub mod context;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod resolver;
pub mod settings;
pub mod utils;
pub mod warning;

pub use api::{
    FunctionFile, PackagedFunction, list_function_files, list_functions, package_function,
    package_many, package_one,
};
pub use archive::{Archive, ArchiveEntry};
pub use builder::{BundlingOutcome, Bundler, StrategyUsed};
pub use context::RunContext;
pub use discovery::{FunctionSource, Runtime};
pub use engine::{BundlingEngine, EngineOptions, EngineOutput, EsbuildEngine};
pub use error::{EngineMessage, Error, Result};
pub use settings::{ArchiveFormat, FunctionConfig, Settings, SettingsBuilder, StrategyChoice};
pub use warning::Warning;
