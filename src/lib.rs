//! Serverless function packager.
//!
//! Turns a directory of function entry points into self-contained,
//! reproducible archives:
//! - JavaScript functions, with their `node_modules` closure resolved
//!   statically or bundled by a delegated engine
//! - pre-built executables (Go, Rust or any native binary)
//! - pre-built `.zip` archives, copied as-is
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
