//! Command line argument parsing and validation.

use crate::bundler::{ArchiveFormat, StrategyChoice};
use clap::Parser;
use std::path::PathBuf;

/// Serverless function packager
#[derive(Parser, Debug)]
#[command(
    name = "function_bundler",
    version,
    about = "Packages serverless functions into deterministic archives",
    long_about = "Packages every function found in the source directories into a reproducible
zip archive: JavaScript functions with their resolved node_modules closure,
compiled executables with their mode and a toolchain.json, pre-built zips as-is.

Usage:
  function_bundler --source functions --output dist
  function_bundler --source functions --output dist --strategy engine-with-fallback --external aws-sdk
  function_bundler --source functions --list

Exit code 0 = every function was packaged."
)]
pub struct Args {
    /// Directory containing functions (repeatable)
    #[arg(short = 's', long = "source", value_name = "DIR", required = true)]
    pub sources: Vec<PathBuf>,

    /// Directory archives are written to
    #[arg(short = 'o', long, value_name = "DIR", required_unless_present = "list")]
    pub output: Option<PathBuf>,

    /// Pin the bundling strategy for every function
    #[arg(long, value_enum, value_name = "STRATEGY")]
    pub strategy: Option<StrategyChoice>,

    /// Maximum number of functions packaged at once
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Module left for the runtime to provide (repeatable)
    #[arg(long = "external", value_name = "MODULE")]
    pub external: Vec<String>,

    /// Module or glob never packaged (repeatable)
    #[arg(long = "ignore", value_name = "MODULE")]
    pub ignore: Vec<String>,

    /// Output format
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub archive_format: Option<ArchiveFormat>,

    /// TOML configuration file; command line flags take precedence
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List discovered functions instead of packaging them
    #[arg(long)]
    pub list: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("--concurrency must be at least 1".to_string());
        }
        if let Some(empty) = self
            .external
            .iter()
            .chain(&self.ignore)
            .find(|m| m.trim().is_empty())
        {
            return Err(format!("Module names cannot be empty: {empty:?}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeatable_flags() {
        let args = Args::try_parse_from([
            "function_bundler",
            "--source",
            "a",
            "-s",
            "b",
            "--output",
            "dist",
            "--strategy",
            "engine-with-fallback",
            "--external",
            "aws-sdk",
            "--ignore",
            "@types/*",
            "--archive-format",
            "directory",
        ])
        .unwrap();

        assert_eq!(args.sources, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(args.strategy, Some(StrategyChoice::EngineWithFallback));
        assert_eq!(args.archive_format, Some(ArchiveFormat::Directory));
        assert_eq!(args.external, vec!["aws-sdk"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn output_is_optional_only_when_listing() {
        assert!(Args::try_parse_from(["function_bundler", "-s", "a"]).is_err());
        assert!(Args::try_parse_from(["function_bundler", "-s", "a", "--list"]).is_ok());
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let args =
            Args::try_parse_from(["function_bundler", "-s", "a", "-o", "d", "-j", "0"]).unwrap();
        assert!(args.validate().is_err());
    }
}
