//! Shared fixtures for integration tests.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

/// A temporary directory tree of function sources.
#[allow(dead_code)]
pub struct Workspace {
    pub temp: TempDir,
    pub path: PathBuf,
}

#[allow(dead_code)]
impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = temp
            .path()
            .canonicalize()
            .expect("Failed to resolve temp directory");
        Self { temp, path }
    }

    /// Writes `content` at `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path.join(relative);
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create parent directory");
        fs::write(&path, content).expect("Failed to write fixture file");
        path
    }

    /// Writes an installed package with a manifest and an index file.
    pub fn package(&self, dir: &str, name: &str, version: &str) -> PathBuf {
        self.write(
            &format!("{dir}/package.json"),
            format!(r#"{{"name":"{name}","version":"{version}","main":"index.js"}}"#),
        );
        self.write(&format!("{dir}/index.js"), "module.exports = () => {};\n");
        self.path.join(dir)
    }

    pub fn join(&self, relative: &str) -> PathBuf {
        self.path.join(relative)
    }
}

/// Entry names of a zip archive, in archive order.
#[allow(dead_code)]
pub fn zip_names(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Content of one zip entry.
#[allow(dead_code)]
pub fn zip_entry(path: &Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

/// A minimal 64-bit ELF executable followed by `extra` bytes.
#[allow(dead_code)]
pub fn elf_executable(extra: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[..4].copy_from_slice(b"\x7fELF");
    bytes[4] = 2;
    bytes[5] = 1;
    bytes[6] = 1;
    bytes[16] = 2;
    bytes[18] = 0x3e;
    bytes[20] = 1;
    bytes[52] = 64;
    bytes[54] = 56;
    bytes[58] = 64;
    bytes.extend_from_slice(extra);
    bytes
}
