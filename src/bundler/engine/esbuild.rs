//! esbuild, driven as a subprocess.

use super::{BundlingEngine, EngineOptions, EngineOutput};
use crate::bundler::{
    error::{EngineMessage, Error, ErrorExt, Result},
    resolver::{is_builtin, is_relative, package_name},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

const ENGINE_NAME: &str = "esbuild";
const DEFAULT_TARGET: &str = "node18";
const METAFILE: &str = "metafile.json";
const IGNORED_STUB: &str = "__ignored_module.js";

/// Bundles functions with an `esbuild` executable.
///
/// The binary is looked up on `PATH` at bundle time unless an explicit path
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct EsbuildEngine {
    binary: Option<PathBuf>,
    target: Option<String>,
}

impl EsbuildEngine {
    /// Uses the esbuild executable at `path`.
    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(path.into()),
            target: None,
        }
    }

    /// Sets the esbuild `--target` (default `node18`).
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    fn failure(message: impl Into<String>, errors: Vec<EngineMessage>) -> Error {
        Error::BundlingEngine {
            engine: ENGINE_NAME.to_string(),
            message: message.into(),
            errors,
        }
    }

    fn locate(&self) -> Result<PathBuf> {
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }
        which::which(ENGINE_NAME)
            .map_err(|e| Self::failure(format!("esbuild not found in PATH: {e}"), Vec::new()))
    }
}

#[async_trait::async_trait]
impl BundlingEngine for EsbuildEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn bundle(&self, entry: &Path, options: &EngineOptions) -> Result<EngineOutput> {
        let binary = self.locate()?;
        let stem = entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let outfile = options.out_dir.join(format!("{stem}.js"));
        let metafile = options.out_dir.join(METAFILE);

        let mut command = tokio::process::Command::new(&binary);
        command
            .arg(entry)
            .args(["--bundle", "--platform=node", "--format=cjs", "--log-level=warning"])
            .arg(format!(
                "--target={}",
                self.target.as_deref().unwrap_or(DEFAULT_TARGET)
            ))
            .arg(format!("--outfile={}", outfile.display()))
            .arg(format!("--metafile={}", metafile.display()))
            .current_dir(&options.out_dir);

        for module in &options.external_modules {
            command.arg(format!("--external:{module}"));
        }

        // Exact names are replaced by an empty module; globs can only be kept external.
        let (globs, names): (Vec<&String>, Vec<&String>) = options
            .ignored_modules
            .iter()
            .partition(|m| m.contains(['*', '?', '[']));
        if !names.is_empty() {
            let stub = options.out_dir.join(IGNORED_STUB);
            tokio::fs::write(&stub, "module.exports = {};\n")
                .await
                .fs_context("writing ignored module stub", &stub)?;
            for name in names {
                command.arg(format!("--alias:{name}=./{IGNORED_STUB}"));
            }
        }
        for glob in globs {
            command.arg(format!("--external:{glob}"));
        }

        log::debug!("Running {} for {}", binary.display(), entry.display());
        let output = command.output().await.map_err(|e| {
            Self::failure(format!("failed to run {}: {e}", binary.display()), Vec::new())
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let (mut errors, warnings) = parse_diagnostics(&stderr);

        if !output.status.success() {
            if errors.is_empty() && !stderr.trim().is_empty() {
                errors.push(EngineMessage::new(stderr.trim()));
            }
            return Err(Self::failure(
                format!("exited with {}", output.status),
                errors,
            ));
        }

        let meta = tokio::fs::read(&metafile)
            .await
            .fs_context("reading esbuild metafile", &metafile)?;
        let external_modules = external_imports(&meta)
            .map_err(|e| Self::failure(format!("invalid metafile: {e}"), Vec::new()))?;

        Ok(EngineOutput {
            bundled_file: outfile,
            external_modules,
            warnings,
        })
    }
}

/// Splits esbuild's stderr into error and warning messages.
fn parse_diagnostics(stderr: &str) -> (Vec<EngineMessage>, Vec<EngineMessage>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for line in stderr.lines() {
        if let Some((_, text)) = line.split_once("[ERROR]") {
            errors.push(EngineMessage::new(text.trim()));
        } else if let Some((_, text)) = line.split_once("[WARNING]") {
            warnings.push(EngineMessage::new(text.trim()));
        }
    }

    (errors, warnings)
}

#[derive(serde::Deserialize)]
struct Metafile {
    #[serde(default)]
    outputs: BTreeMap<String, MetaOutput>,
}

#[derive(serde::Deserialize)]
struct MetaOutput {
    #[serde(default)]
    imports: Vec<MetaImport>,
}

#[derive(serde::Deserialize)]
struct MetaImport {
    path: String,
    #[serde(default)]
    external: bool,
}

/// Package names the bundle left external, from an esbuild metafile.
fn external_imports(meta: &[u8]) -> std::result::Result<Vec<String>, serde_json::Error> {
    let metafile: Metafile = serde_json::from_slice(meta)?;
    let names: BTreeSet<String> = metafile
        .outputs
        .values()
        .flat_map(|output| &output.imports)
        .filter(|import| import.external)
        .filter(|import| !is_relative(&import.path) && !is_builtin(&import.path))
        .map(|import| package_name(&import.path).to_string())
        .collect();
    Ok(names.into_iter().collect())
}
