//! Deterministic archive assembly.
//!
//! Entries are written in name order with the fixed zip epoch timestamp and
//! the permission bits of their source, so the same inputs always produce
//! byte-identical archives.
//!
//! Output is staged next to its final location and moved into place only once
//! complete, so a failed write never leaves a partial archive behind.

use crate::bundler::{
    builder::{BundlingOutcome, FileSource, StrategyUsed, checksum::calculate_sha256},
    discovery::{FunctionSource, Runtime},
    error::{EngineMessage, Error, Result},
    settings::ArchiveFormat,
    utils::fs::{self as fs_utils, DEFAULT_MODE},
    warning::Warning,
};
use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter, write::SimpleFileOptions};

/// Metadata entry added to archives of compiled runtimes.
pub const TOOLCHAIN_FILE: &str = "toolchain.json";

/// Permission bits recorded for symlink entries.
const LINK_MODE: u32 = 0o777;

/// One entry of a finished archive.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub mode: u32,
    pub size: u64,
}

/// A packaged function.
#[derive(Debug, Clone)]
pub struct Archive {
    /// The `.zip` file, or the output directory.
    pub path: PathBuf,
    /// Entries in archive order.
    pub entries: Vec<ArchiveEntry>,
    pub runtime: Runtime,
    pub strategy_used: StrategyUsed,
    /// Hex SHA-256 of the archive.
    pub checksum: String,
    pub warnings: Vec<Warning>,
    pub bundler_errors: Option<Vec<EngineMessage>>,
}

struct PendingEntry {
    source: FileSource,
    mode: Option<u32>,
}

enum Contents {
    File { data: Vec<u8>, mode: u32 },
    Link(String),
}

impl PendingEntry {
    fn load(self) -> io::Result<Contents> {
        match self.source {
            FileSource::Bytes(data) => Ok(Contents::File {
                data,
                mode: self.mode.unwrap_or(DEFAULT_MODE),
            }),
            FileSource::Link(target) => Ok(Contents::Link(target)),
            FileSource::Path(path) => {
                let annotate = |e: io::Error| io::Error::new(e.kind(), format!("{}: {e}", path.display()));
                let mode = match self.mode {
                    Some(mode) => mode,
                    None => fs_utils::file_mode(&fs::metadata(&path).map_err(annotate)?),
                };
                let data = fs::read(&path).map_err(annotate)?;
                Ok(Contents::File { data, mode })
            }
        }
    }
}

fn write_error(path: &Path, error: Error) -> Error {
    let source = match error {
        Error::IoError(source) | Error::Fs { source, .. } => source,
        Error::ArchiveWrite { source, .. } => source,
        other => io::Error::other(other.to_string()),
    };
    Error::ArchiveWrite {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes `outcome` for `function` into `dest_dir`.
///
/// Pre-built archives are copied to `<dest_dir>/<name>.zip` unchanged. All
/// other outcomes are written as `<dest_dir>/<name>.zip`, or as the
/// directory `<dest_dir>/<name>` with [`ArchiveFormat::Directory`].
///
/// # Errors
///
/// Any I/O failure is reported as [`Error::ArchiveWrite`].
pub async fn assemble(
    outcome: BundlingOutcome,
    function: &FunctionSource,
    dest_dir: &Path,
    format: ArchiveFormat,
) -> Result<Archive> {
    let BundlingOutcome {
        strategy_used,
        runtime,
        files,
        warnings,
        bundler_errors,
        ..
    } = outcome;

    let (path, entries) = if strategy_used == StrategyUsed::Passthrough {
        let path = dest_dir.join(format!("{}.zip", function.name));
        fs_utils::copy_file(&function.entry_file, &path)
            .await
            .map_err(|e| write_error(&path, e))?;
        let entries = blocking(&path, list_zip).await?;
        (path, entries)
    } else {
        let mut pending = BTreeMap::new();
        for file in files {
            if pending.contains_key(&file.name) {
                log::debug!("Skipping duplicate archive entry {}", file.name);
                continue;
            }
            pending.insert(
                file.name,
                PendingEntry {
                    source: file.source,
                    mode: file.mode,
                },
            );
        }
        if runtime.is_compiled() {
            let toolchain = serde_json::json!({ "runtime": runtime.id() });
            pending.insert(
                TOOLCHAIN_FILE.to_string(),
                PendingEntry {
                    source: FileSource::Bytes(toolchain.to_string().into_bytes()),
                    mode: Some(DEFAULT_MODE),
                },
            );
        }

        match format {
            ArchiveFormat::Zip => {
                let path = dest_dir.join(format!("{}.zip", function.name));
                let entries = blocking(&path, move |p| write_zip(p, pending)).await?;
                (path, entries)
            }
            ArchiveFormat::Directory => {
                let path = dest_dir.join(&function.name);
                let entries = blocking(&path, move |p| write_directory(p, pending)).await?;
                (path, entries)
            }
        }
    };

    let checksum = calculate_sha256(&path)
        .await
        .map_err(|e| write_error(&path, e))?;

    log::info!(
        "Packaged '{}' into {} ({} entries, {} strategy)",
        function.name,
        path.display(),
        entries.len(),
        strategy_used
    );

    Ok(Archive {
        path,
        entries,
        runtime,
        strategy_used,
        checksum,
        warnings,
        bundler_errors,
    })
}

/// Runs blocking archive I/O for `path` on the blocking pool.
async fn blocking<F>(path: &Path, work: F) -> Result<Vec<ArchiveEntry>>
where
    F: FnOnce(&Path) -> io::Result<Vec<ArchiveEntry>> + Send + 'static,
{
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || work(&target))
        .await
        .map_err(|e| Error::GenericError(format!("Archive task panicked: {e}")))?
        .map_err(|source| Error::ArchiveWrite {
            path: path.to_path_buf(),
            source,
        })
}

fn write_zip(path: &Path, entries: BTreeMap<String, PendingEntry>) -> io::Result<Vec<ArchiveEntry>> {
    let dest_dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dest_dir)?;
    let staged = tempfile::NamedTempFile::new_in(dest_dir)?;
    let mut zip = ZipWriter::new(io::BufWriter::new(staged));
    let mut written = Vec::with_capacity(entries.len());

    for (name, entry) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        match entry.load()? {
            Contents::File { data, mode } => {
                zip.start_file(name.as_str(), options.unix_permissions(mode))
                    .map_err(io::Error::other)?;
                zip.write_all(&data)?;
                written.push(ArchiveEntry {
                    name,
                    mode,
                    size: data.len() as u64,
                });
            }
            Contents::Link(target) => {
                zip.add_symlink(name.as_str(), target.as_str(), options.unix_permissions(LINK_MODE))
                    .map_err(io::Error::other)?;
                written.push(ArchiveEntry {
                    name,
                    mode: LINK_MODE,
                    size: target.len() as u64,
                });
            }
        }
    }

    let staged = zip
        .finish()
        .map_err(io::Error::other)?
        .into_inner()
        .map_err(|e| e.into_error())?;
    staged.persist(path).map_err(|e| e.error)?;
    fs_utils::set_mode(path, DEFAULT_MODE)?;
    Ok(written)
}

fn write_directory(
    root: &Path,
    entries: BTreeMap<String, PendingEntry>,
) -> io::Result<Vec<ArchiveEntry>> {
    let dest_dir = root.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dest_dir)?;
    let staged = tempfile::Builder::new()
        .prefix(".staged-")
        .tempdir_in(dest_dir)?;
    let mut written = Vec::with_capacity(entries.len());

    for (name, entry) in entries {
        let target = name
            .split('/')
            .fold(staged.path().to_path_buf(), |acc, part| acc.join(part));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        match entry.load()? {
            Contents::File { data, mode } => {
                fs::write(&target, &data)?;
                fs_utils::set_mode(&target, mode)?;
                fs_utils::pin_mtime(&target)?;
                written.push(ArchiveEntry {
                    name,
                    mode,
                    size: data.len() as u64,
                });
            }
            Contents::Link(link_target) => {
                fs_utils::symlink(&link_target, &target)?;
                written.push(ArchiveEntry {
                    name,
                    mode: LINK_MODE,
                    size: link_target.len() as u64,
                });
            }
        }
    }

    fs_utils::replace_dir(staged.path(), root)?;
    fs_utils::set_mode(root, 0o755)?;
    Ok(written)
}

fn list_zip(path: &Path) -> io::Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(fs::File::open(path)?).map_err(io::Error::other)?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index(index).map_err(io::Error::other)?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            mode: file.unix_mode().map_or(DEFAULT_MODE, |mode| mode & 0o777),
            size: file.size(),
        });
    }
    Ok(entries)
}
