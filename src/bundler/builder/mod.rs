//! Bundle orchestration.
//!
//! The [`Bundler`] turns one [`FunctionSource`](crate::bundler::FunctionSource)
//! into a [`BundlingOutcome`]: the ordered set of files that belong in its
//! archive, plus the warnings gathered on the way.
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA-256 checksums of finished archives
//! - [`orchestrator`] - the [`Bundler`] and its fallback state machine
//! - [`strategy`] - strategy selection

pub mod checksum;
mod orchestrator;
mod strategy;

pub use orchestrator::{BundleState, Bundler};
pub use strategy::{Selection, StrategyUsed, select};

use crate::bundler::{discovery::Runtime, error::EngineMessage, warning::Warning};
use std::path::{Component, Path, PathBuf};

/// Where the bytes of an output file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Copied from disk.
    Path(PathBuf),
    /// Produced in memory, e.g. by a bundling engine.
    Bytes(Vec<u8>),
    /// A symlink with this `/`-separated relative target.
    Link(String),
}

/// One file destined for an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// `/`-separated path inside the archive.
    pub name: String,
    pub source: FileSource,
    /// Unix mode override; taken from the source file when `None`.
    pub mode: Option<u32>,
}

/// Result of bundling one function, consumed by the archive assembler.
#[derive(Debug, Clone)]
pub struct BundlingOutcome {
    pub strategy_used: StrategyUsed,
    pub runtime: Runtime,
    /// Directory archive names are relative to.
    pub base_dir: PathBuf,
    pub files: Vec<OutputFile>,
    pub warnings: Vec<Warning>,
    /// Errors of a failed primary strategy that a fallback recovered from.
    pub bundler_errors: Option<Vec<EngineMessage>>,
}

/// Deepest directory containing every path.
pub(crate) fn common_base<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut paths = paths.into_iter();
    let mut base = paths.next()?.parent()?.to_path_buf();
    for path in paths {
        while !path.starts_with(&base) {
            base = base.parent()?.to_path_buf();
        }
    }
    Some(base)
}

/// Archive name of `path` relative to `base`, `/`-separated.
pub(crate) fn archive_name(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Target of a symlink at `link` pointing to `target`, relative to the link's
/// directory and `/`-separated.
pub(crate) fn link_target(target: &Path, link: &Path) -> String {
    let from = link.parent().unwrap_or(link);
    let shared = from
        .components()
        .zip(target.components())
        .take_while(|(a, b)| a == b)
        .count();
    let ups = from.components().count() - shared;

    std::iter::repeat_n("..".to_string(), ups)
        .chain(
            target
                .components()
                .skip(shared)
                .map(|c| c.as_os_str().to_string_lossy().into_owned()),
        )
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_is_the_deepest_shared_directory() {
        let paths = [
            Path::new("/repo/packages/api/src/handler.js"),
            Path::new("/repo/node_modules/left-pad/index.js"),
        ];
        assert_eq!(common_base(paths), Some(PathBuf::from("/repo")));
        assert_eq!(
            common_base([Path::new("/repo/fn.js")]),
            Some(PathBuf::from("/repo"))
        );
        assert_eq!(common_base(std::iter::empty()), None);
    }

    #[test]
    fn archive_names_use_forward_slashes() {
        assert_eq!(
            archive_name(
                Path::new("/repo/node_modules/left-pad/index.js"),
                Path::new("/repo")
            ),
            "node_modules/left-pad/index.js"
        );
    }

    #[test]
    fn link_targets_are_relative_to_the_link() {
        assert_eq!(
            link_target(
                Path::new("/repo/node_modules/.pnpm/foo@1.0.0/node_modules/foo"),
                Path::new("/repo/node_modules/foo"),
            ),
            ".pnpm/foo@1.0.0/node_modules/foo"
        );
        assert_eq!(
            link_target(Path::new("/repo/libs/shared"), Path::new("/repo/app/node_modules/shared")),
            "../../libs/shared"
        );
    }
}
