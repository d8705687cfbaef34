//! Configuration structures for packaging runs.
//!
//! Run-wide options are collected by [`SettingsBuilder`] into an immutable
//! [`Settings`]; per-function options are resolved into a [`FunctionConfig`]
//! when a function is discovered.

mod builder;
mod core;
mod function;

pub use builder::{DEFAULT_EXTENSIONS, SettingsBuilder};
pub use core::{ArchiveFormat, Settings};
pub use function::{FunctionConfig, StrategyChoice};
