//! Inclusion and exclusion rules applied while building a closure.

use crate::bundler::{
    error::{Error, Result},
    resolver::package_name,
};
use std::path::Path;

/// Files never worth shipping.
const JUNK_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", "npm-debug.log"];

/// Suffixes of declaration-only files.
const DECLARATION_SUFFIXES: &[&str] = &[".d.ts", ".d.mts", ".d.cts"];

/// Whether a file with this name is always excluded.
pub fn is_junk(file_name: &str, include_source_maps: bool) -> bool {
    JUNK_FILES.contains(&file_name)
        || DECLARATION_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
        || (!include_source_maps && file_name.ends_with(".map"))
}

fn compile(patterns: &[String], what: &str) -> Result<Vec<glob::Pattern>> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| Error::InvalidConfig(format!("invalid {what} pattern '{p}': {e}")))
        })
        .collect()
}

/// File exclusion rules for copied dependency packages.
#[derive(Debug, Clone)]
pub struct FileExclusions {
    patterns: Vec<glob::Pattern>,
    include_source_maps: bool,
}

impl FileExclusions {
    pub fn new(patterns: &[String], include_source_maps: bool) -> Result<Self> {
        Ok(Self {
            patterns: compile(patterns, "exclude")?,
            include_source_maps,
        })
    }

    /// Returns a copy with additional patterns (e.g. from the quirk table).
    pub fn with_patterns(&self, extra: &[&str]) -> Result<Self> {
        let extra: Vec<String> = extra.iter().map(|p| p.to_string()).collect();
        let mut patterns = self.patterns.clone();
        patterns.extend(compile(&extra, "exclude")?);
        Ok(Self {
            patterns,
            include_source_maps: self.include_source_maps,
        })
    }

    /// Whether `relative` (a path inside a package) is excluded.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if is_junk(&file_name, self.include_source_maps) {
            return true;
        }
        self.patterns
            .iter()
            .any(|p| p.matches(&file_name) || p.matches_path(relative))
    }
}

/// Matches references against a configured module list.
///
/// Entries are exact package names or globs over the package name. A
/// reference to a subpath (`name/sub`) matches when its package does.
#[derive(Debug, Clone, Default)]
pub struct ModuleMatcher {
    names: Vec<String>,
    globs: Vec<glob::Pattern>,
}

impl ModuleMatcher {
    pub fn new(entries: &[String]) -> Result<Self> {
        let mut names = Vec::new();
        let mut globs = Vec::new();
        for entry in entries {
            if entry.contains(['*', '?', '[']) {
                globs.extend(compile(std::slice::from_ref(entry), "module")?);
            } else {
                names.push(entry.clone());
            }
        }
        Ok(Self { names, globs })
    }

    pub fn matches(&self, reference: &str) -> bool {
        let package = package_name(reference);
        self.names.iter().any(|n| n == package || n == reference)
            || self.globs.iter().any(|g| g.matches(package))
    }
}
