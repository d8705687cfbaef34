//! `package.json` loading with a run-scoped cache.
//!
//! The same manifest is reached from many module nodes and from many
//! concurrently packaged functions, so parsed manifests are cached by path for
//! the lifetime of one [`RunContext`](crate::bundler::RunContext). The cache is
//! never invalidated mid-run.
//!
//! Third-party manifests are not always well typed, so a field holding the
//! wrong kind of value is treated as absent rather than failing the parse.

use crate::bundler::error::{Error, ErrorExt, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Manifest file name looked up in each directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Conditions tried when matching `exports` for a `require` call.
const REQUIRE_CONDITIONS: &[&str] = &["require", "node", "default"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PeerDependencyMeta {
    #[serde(default, deserialize_with = "lenient")]
    pub optional: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawManifest {
    #[serde(deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    version: Option<String>,
    #[serde(deserialize_with = "lenient")]
    main: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient")]
    module_type: Option<String>,
    exports: Option<Value>,
    #[serde(deserialize_with = "lenient_map")]
    dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_map")]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_map")]
    peer_dependencies: BTreeMap<String, String>,
    #[serde(deserialize_with = "lenient_map")]
    peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
}

/// Deserializes a field, falling back to its default when the value has the
/// wrong type.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Deserializes an object field, dropping entries whose value has the wrong
/// type. Anything but an object becomes an empty map.
fn lenient_map<'de, D, T>(deserializer: D) -> std::result::Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| T::deserialize(value).ok().map(|value| (key, value)))
        .collect())
}

/// A parsed package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Directory containing the manifest file.
    pub directory: PathBuf,
    pub name: Option<String>,
    pub version: Option<String>,
    /// Entry field used when the package directory itself is required.
    pub main: Option<String>,
    /// The `type` field (`module` or `commonjs`).
    pub module_type: Option<String>,
    /// The raw `exports` field.
    pub exports: Option<Value>,
    pub dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeSet<String>,
    pub peer_dependencies: BTreeMap<String, String>,
    pub peer_dependencies_meta: BTreeMap<String, PeerDependencyMeta>,
}

impl Manifest {
    /// Parses manifest bytes read from `path`.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        let raw: RawManifest =
            serde_json::from_slice(bytes).map_err(|source| Error::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Manifest {
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            name: raw.name,
            version: raw.version,
            main: raw.main.filter(|main| !main.trim().is_empty()),
            module_type: raw.module_type,
            exports: raw.exports,
            dependencies: raw.dependencies,
            optional_dependencies: raw.optional_dependencies.into_keys().collect(),
            peer_dependencies: raw.peer_dependencies,
            peer_dependencies_meta: raw.peer_dependencies_meta,
        })
    }

    /// Path of the manifest file itself.
    pub fn path(&self) -> PathBuf {
        self.directory.join(MANIFEST_FILE)
    }

    /// Whether `package` is declared under `optionalDependencies`.
    pub fn is_optional(&self, package: &str) -> bool {
        self.optional_dependencies.contains(package)
    }

    /// Whether `package` is a peer dependency marked optional.
    pub fn is_peer_optional(&self, package: &str) -> bool {
        self.peer_dependencies_meta
            .get(package)
            .is_some_and(|meta| meta.optional)
    }

    /// Target of `subpath` (`.` or `./sub/path`) in the `exports` field under
    /// the `require` conditions.
    ///
    /// Returns `None` when the package has no `exports`, the subpath is not
    /// exported, or it is only exported for other conditions.
    pub fn export_target(&self, subpath: &str) -> Option<String> {
        let exports = self.exports.as_ref()?;
        let is_subpath_map = matches!(
            exports,
            Value::Object(map) if map.keys().any(|key| key.starts_with('.'))
        );
        if !is_subpath_map {
            return (subpath == ".").then(|| conditional_target(exports)).flatten();
        }

        let Value::Object(map) = exports else {
            return None;
        };
        if let Some(target) = map.get(subpath) {
            return conditional_target(target);
        }

        // Longest matching `./prefix*suffix` pattern wins.
        let (pattern, target, matched) = map
            .iter()
            .filter_map(|(key, target)| {
                let (prefix, suffix) = key.split_once('*')?;
                let matched = subpath.strip_prefix(prefix)?.strip_suffix(suffix)?;
                Some((key, target, matched))
            })
            .max_by_key(|(key, _, _)| key.len())?;
        log::trace!("Export pattern '{}' matched '{}'", pattern, subpath);
        conditional_target(target).map(|target| target.replace('*', matched))
    }

    /// Whether the package declares itself as static-module source.
    pub fn is_module(&self) -> bool {
        self.module_type.as_deref() == Some("module")
    }
}

/// Picks the target string of one `exports` value under the `require`
/// conditions, in the order the package lists them.
fn conditional_target(value: &Value) -> Option<String> {
    match value {
        Value::String(target) => Some(target.clone()),
        Value::Array(alternatives) => alternatives.iter().find_map(conditional_target),
        Value::Object(conditions) => conditions
            .iter()
            .filter(|(condition, _)| REQUIRE_CONDITIONS.contains(&condition.as_str()))
            .find_map(|(_, target)| conditional_target(target)),
        _ => None,
    }
}

/// Path-keyed manifest cache shared by all functions of one run.
///
/// Safe for concurrent population: locks are never held across an `.await`,
/// and when two tasks parse the same manifest concurrently the first insert
/// wins and the duplicate parse is dropped.
#[derive(Debug, Default)]
pub struct ManifestCache {
    boundary: Option<PathBuf>,
    manifests: RwLock<HashMap<PathBuf, Arc<Manifest>>>,
    absent: RwLock<HashSet<PathBuf>>,
}

impl ManifestCache {
    /// Creates a cache whose upward search stops at `boundary`.
    pub fn new(boundary: Option<PathBuf>) -> Self {
        Self {
            boundary,
            ..Default::default()
        }
    }

    /// Loads the manifest located directly in `dir`, if any.
    pub async fn load(&self, dir: &Path) -> Result<Option<Arc<Manifest>>> {
        let path = dir.join(MANIFEST_FILE);

        if let Some(manifest) = self.manifests.read().get(&path) {
            return Ok(Some(Arc::clone(manifest)));
        }
        if self.absent.read().contains(&path) {
            return Ok(None);
        }

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound
                        | io::ErrorKind::NotADirectory
                        | io::ErrorKind::IsADirectory
                ) =>
            {
                self.absent.write().insert(path);
                return Ok(None);
            }
            Err(e) => return Err(e).fs_context("reading manifest", &path),
        };

        let parsed = Arc::new(Manifest::parse(&path, &bytes)?);
        log::debug!("Loaded manifest {}", path.display());

        let mut manifests = self.manifests.write();
        let stored = manifests.entry(path).or_insert(parsed);
        Ok(Some(Arc::clone(stored)))
    }

    /// Finds the nearest manifest at or above `start_dir`.
    ///
    /// Returns `Ok(None)` when no manifest exists before the filesystem root or
    /// the configured boundary. Absence is not an error: a function may have no
    /// dependencies at all.
    pub async fn find(&self, start_dir: &Path) -> Result<Option<Arc<Manifest>>> {
        for dir in start_dir.ancestors() {
            if let Some(manifest) = self.load(dir).await? {
                return Ok(Some(manifest));
            }
            if self.boundary.as_deref() == Some(dir) {
                break;
            }
        }
        Ok(None)
    }
}
