//! Archive checksum calculation.
//!
//! Zip archives are hashed as plain files. Directory output is hashed as a
//! stream of `/`-separated relative paths and contents in sorted order, so
//! the digest is the same on every platform. Symlinks contribute their
//! target instead of the content they point to.

use crate::{
    bail,
    bundler::{
        Result,
        error::{Error, ErrorExt},
    },
};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Calculates the SHA-256 checksum of a file or directory.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash (64 characters)
/// * `Err` - If the path cannot be read or is neither file nor directory
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading archive metadata", path)?;

    if metadata.is_file() {
        let mut hasher = Sha256::new();
        hash_file(path, &mut hasher).await?;
        Ok(format!("{:x}", hasher.finalize()))
    } else if metadata.is_dir() {
        calculate_directory_sha256(path).await
    } else {
        bail!("Path is neither file nor directory: {}", path.display())
    }
}

/// Feeds a file into `hasher` in 8KB chunks.
async fn hash_file(path: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(())
}

/// What a directory entry contributes to the digest.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Hashed {
    File(PathBuf),
    Link(String),
}

async fn calculate_directory_sha256(dir_path: &Path) -> Result<String> {
    let root = dir_path.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&root).follow_links(false) {
            let entry = entry.map_err(|e| Error::Fs {
                context: "walking directory for hashing",
                path: e.path().unwrap_or(&root).to_path_buf(),
                source: e.into(),
            })?;
            let hashed = if entry.file_type().is_symlink() {
                let target = std::fs::read_link(entry.path())
                    .fs_context("reading symlink for hashing", entry.path())?;
                Hashed::Link(target.to_string_lossy().into_owned())
            } else if entry.file_type().is_file() {
                Hashed::File(entry.path().to_path_buf())
            } else {
                continue;
            };
            entries.push((super::archive_name(entry.path(), &root), hashed));
        }
        entries.sort();
        Ok::<_, Error>(entries)
    })
    .await
    .map_err(|e| Error::GenericError(format!("Hashing task panicked: {e}")))??;

    let mut hasher = Sha256::new();
    for (relative, hashed) in entries {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        match hashed {
            Hashed::File(path) => hash_file(&path, &mut hasher).await?,
            Hashed::Link(target) => hasher.update(target.as_bytes()),
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}
