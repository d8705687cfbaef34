//! Function discovery.
//!
//! Each immediate child of a source directory is a candidate function: a
//! script file, a pre-built `.zip`, a compiled executable, or a directory
//! holding one of those. Compiled executables are recognised by their object
//! format (ELF, Mach-O or PE) rather than by name.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    resolver,
    settings::{FunctionConfig, Settings},
};
use goblin::Object;
use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

/// Script extensions treated as JavaScript functions.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "cjs", "mjs", "ts", "cts", "mts"];

/// Extensions of runtimes this packager does not handle.
const UNSUPPORTED_EXTENSIONS: &[&str] = &["py", "rb", "php", "java", "jar", "cs", "sh"];

/// Names probed for the executable inside a compiled function directory.
const BOOTSTRAP: &str = "bootstrap";

const GO_MARKER: &[u8] = b"\xff Go buildinf:";
const RUST_MARKERS: &[&[u8]] = &[b"/rustc/", b"rust_begin_unwind"];

/// Runtime a function is packaged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Runtime {
    /// JavaScript or TypeScript source.
    Js,
    /// A compiled Go executable.
    Go,
    /// A compiled Rust executable.
    Rust,
    /// Any other native executable.
    Provided,
    /// An archive that is shipped as-is.
    PreArchived,
}

impl Runtime {
    /// Identifier written to `toolchain.json` and shown in listings.
    pub fn id(self) -> &'static str {
        match self {
            Runtime::Js => "js",
            Runtime::Go => "go",
            Runtime::Rust => "rust",
            Runtime::Provided => "provided",
            Runtime::PreArchived => "zip",
        }
    }

    /// Whether the function is an already-built native executable.
    pub fn is_compiled(self) -> bool {
        matches!(self, Runtime::Go | Runtime::Rust | Runtime::Provided)
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One discovered function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSource {
    /// Function name, also the archive's file stem.
    pub name: String,
    /// Absolute path of the file the function starts from.
    pub entry_file: PathBuf,
    pub runtime: Runtime,
    /// Extension of the entry file without the dot; empty for executables.
    pub extension: String,
    /// Options resolved for this function.
    pub config: FunctionConfig,
}

impl FunctionSource {
    /// Classifies one file or directory.
    ///
    /// Returns `Ok(None)` for paths that are not functions (documentation,
    /// stray data files, directories without an entry point).
    pub async fn from_path(path: &Path, settings: &Settings) -> Result<Option<Self>> {
        let metadata = tokio::fs::metadata(path)
            .await
            .fs_context("reading function metadata", path)?;

        let (name, entry) = if metadata.is_dir() {
            let Some(name) = file_name(path) else {
                return Ok(None);
            };
            match find_directory_entry(path, &name).await {
                Some(entry) => (name, entry),
                None => {
                    log::debug!("{} has no function entry point", path.display());
                    return Ok(None);
                }
            }
        } else {
            let Some(stem) = path.file_stem() else {
                return Ok(None);
            };
            (stem.to_string_lossy().into_owned(), path.to_path_buf())
        };

        let extension = entry
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let Some(runtime) = classify(&entry, &extension).await? else {
            return Ok(None);
        };

        Ok(Some(Self {
            config: settings.function_config(&name),
            name,
            entry_file: resolver::normalize(&entry)?,
            runtime,
            extension,
        }))
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file())
}

/// Finds the entry file of a directory function: `<name>.<ext>`, then
/// `index.<ext>`, then an executable named `<name>` or `bootstrap`.
async fn find_directory_entry(dir: &Path, name: &str) -> Option<PathBuf> {
    for stem in [name, "index"] {
        for ext in SCRIPT_EXTENSIONS {
            let candidate = dir.join(format!("{stem}.{ext}"));
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
    }
    for candidate in [dir.join(name), dir.join(BOOTSTRAP)] {
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn classify(entry: &Path, extension: &str) -> Result<Option<Runtime>> {
    if SCRIPT_EXTENSIONS.contains(&extension) {
        return Ok(Some(Runtime::Js));
    }
    if extension == "zip" {
        return Ok(Some(Runtime::PreArchived));
    }
    if UNSUPPORTED_EXTENSIONS.contains(&extension) {
        return Err(Error::UnsupportedRuntime {
            path: entry.to_path_buf(),
            reason: format!("'.{extension}' functions cannot be packaged"),
        });
    }
    if !extension.is_empty() {
        return Ok(None);
    }

    let bytes = tokio::fs::read(entry)
        .await
        .fs_context("reading executable", entry)?;
    Ok(sniff_binary(&bytes))
}

/// Identifies a native executable and the toolchain that built it.
pub fn sniff_binary(bytes: &[u8]) -> Option<Runtime> {
    match Object::parse(bytes) {
        Ok(Object::Elf(_)) | Ok(Object::Mach(_)) | Ok(Object::PE(_)) => {}
        _ => return None,
    }

    let contains = |marker: &[u8]| bytes.windows(marker.len()).any(|w| w == marker);
    if contains(GO_MARKER) {
        Some(Runtime::Go)
    } else if RUST_MARKERS.iter().any(|marker| contains(marker)) {
        Some(Runtime::Rust)
    } else {
        Some(Runtime::Provided)
    }
}

/// Lists the functions found in `dirs`, in directory order then name order.
///
/// # Errors
///
/// A directory that does not exist fails the whole listing with
/// [`Error::EmptyDirectory`]. Files of an unsupported runtime are skipped
/// with a warning; [`FunctionSource::from_path`] still rejects them.
pub async fn discover(dirs: &[PathBuf], settings: &Settings) -> Result<Vec<FunctionSource>> {
    let mut functions = Vec::new();
    let mut seen = HashSet::new();

    for dir in dirs {
        if !tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(Error::EmptyDirectory { path: dir.clone() });
        }

        let mut children = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .fs_context("reading source directory", dir)?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .fs_context("reading source directory", dir)?
        {
            children.push(entry.path());
        }
        children.sort();

        for child in children {
            let Some(name) = file_name(&child) else {
                continue;
            };
            if name.starts_with('.') || name == "node_modules" {
                continue;
            }

            let function = match FunctionSource::from_path(&child, settings).await {
                Ok(Some(function)) => function,
                Ok(None) => continue,
                Err(Error::UnsupportedRuntime { path, reason }) => {
                    log::warn!("Skipping {}: {}", path.display(), reason);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !seen.insert(function.name.clone()) {
                log::warn!(
                    "Skipping {}: a function named '{}' was already found",
                    child.display(),
                    function.name
                );
                continue;
            }
            log::debug!(
                "Discovered {} function '{}' at {}",
                function.runtime,
                function.name,
                function.entry_file.display()
            );
            functions.push(function);
        }
    }

    Ok(functions)
}
