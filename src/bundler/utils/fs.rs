//! File system utilities for archive output.
//!
//! Blocking helpers meant to run inside `spawn_blocking`, plus the async
//! copy used for pre-built archives.

use crate::bundler::error::{Error, Result};
use std::{
    fs,
    io,
    path::Path,
    time::{Duration, SystemTime},
};

/// Mode given to entries whose source carries none.
pub const DEFAULT_MODE: u32 = 0o644;

/// 1980-01-01 00:00:00 UTC, the earliest timestamp a zip entry can hold.
pub const ZIP_EPOCH_SECS: u64 = 315_532_800;

/// Permission bits of a file, or [`DEFAULT_MODE`] where the platform has none.
#[cfg(unix)]
pub fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

/// Permission bits of a file, or [`DEFAULT_MODE`] where the platform has none.
#[cfg(not(unix))]
pub fn file_mode(_metadata: &fs::Metadata) -> u32 {
    DEFAULT_MODE
}

/// Applies permission bits. A no-op where the platform has none.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Applies permission bits. A no-op where the platform has none.
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Sets a file's modification time to the zip epoch.
pub fn pin_mtime(path: &Path) -> io::Result<()> {
    let epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(ZIP_EPOCH_SECS);
    fs::File::options().write(true).open(path)?.set_modified(epoch)
}

/// Moves the directory `from` to `to`, erasing whatever `to` held before.
pub fn replace_dir(from: &Path, to: &Path) -> io::Result<()> {
    match fs::remove_dir_all(to) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(from, to)
}

/// Creates a symlink at `link` with the relative `target`.
#[cfg(unix)]
pub fn symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Creates a symlink at `link` with the relative `target`.
#[cfg(not(unix))]
pub fn symlink(_target: &str, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot write symlink {} on this platform", link.display()),
    ))
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(from).await.map_err(|e| {
        Error::GenericError(format!("{} does not exist: {e}", from.display()))
    })?;
    if !metadata.is_file() {
        return Err(Error::GenericError(format!(
            "{} is not a file",
            from.display()
        )));
    }
    if let Some(dest_dir) = to.parent() {
        tokio::fs::create_dir_all(dest_dir).await?;
    }
    tokio::fs::copy(from, to).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacing_a_directory_drops_previous_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let staged = tmp.path().join("staged");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.js"), "").unwrap();
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("fresh.js"), "").unwrap();

        replace_dir(&staged, &dir).unwrap();
        assert!(dir.join("fresh.js").is_file());
        assert!(!dir.join("stale.js").exists());
        assert!(!staged.exists());
    }

    #[test]
    fn mtime_is_pinned_to_zip_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.js");
        fs::write(&path, "").unwrap();

        pin_mtime(&path).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(
            modified.duration_since(SystemTime::UNIX_EPOCH).unwrap(),
            Duration::from_secs(ZIP_EPOCH_SECS)
        );
    }

    #[tokio::test]
    async fn copying_a_directory_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = copy_file(tmp.path(), &tmp.path().join("copy"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a file"));
    }
}
