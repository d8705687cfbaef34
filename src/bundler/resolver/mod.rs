//! Module reference resolution.
//!
//! Maps a raw reference string found in a source file to the file on disk it
//! denotes, using Node-style rules: relative references are resolved against
//! the requiring file with extension and index fallbacks; bare references are
//! searched for in `node_modules` directories of every ancestor, so packages
//! hoisted to a monorepo root resolve from code several levels below.
//!
//! Lookups start from the real location of the requiring file, the way Node
//! resolves symlinked packages, and every resolved path is a real path. The
//! symlinks crossed on the way are reported so they can be recreated in the
//! archive.
//!
//! A reference that cannot be found is an error unless the requiring
//! package declares it optional (or peer-optional), or the [`quirks`] table
//! knows the requiring package loads it conditionally.

pub mod quirks;

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    manifest::ManifestCache,
};
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

/// Core modules provided by the runtime itself.
const BUILTIN_MODULES: &[&str] = &[
    "assert", "async_hooks", "buffer", "child_process", "cluster", "console", "constants",
    "crypto", "dgram", "diagnostics_channel", "dns", "domain", "events", "fs", "http", "http2",
    "https", "inspector", "module", "net", "os", "path", "perf_hooks", "process", "punycode",
    "querystring", "readline", "repl", "stream", "string_decoder", "sys", "timers", "tls",
    "trace_events", "tty", "url", "util", "v8", "vm", "wasi", "worker_threads", "zlib",
];

/// Why a missing reference was tolerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalReason {
    /// Declared under `optionalDependencies` of this manifest.
    OptionalDependency { declared_in: PathBuf },
    /// Declared as an optional peer in `peerDependenciesMeta` of this manifest.
    PeerOptional { declared_in: PathBuf },
    /// The requiring package is listed in the quirk table.
    KnownQuirk { package: String },
}

impl std::fmt::Display for OptionalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionalReason::OptionalDependency { declared_in } => {
                write!(f, "optional dependency of {}", declared_in.display())
            }
            OptionalReason::PeerOptional { declared_in } => {
                write!(f, "optional peer dependency of {}", declared_in.display())
            }
            OptionalReason::KnownQuirk { package } => {
                write!(f, "conditionally required by {package}")
            }
        }
    }
}

/// A symlink crossed while resolving a reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Link {
    /// Location of the link; its parent directory is a real path.
    pub path: PathBuf,
    /// Real path the link points to.
    pub target: PathBuf,
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A runtime core module; nothing to ship.
    Builtin,
    /// Found on disk at the real path `path`. `package_root` is set when the
    /// reference entered an installed package directory.
    Resolved {
        path: PathBuf,
        package_root: Option<PathBuf>,
        links: Vec<Link>,
    },
    /// Not found, but allowed to be absent.
    Optional { reason: OptionalReason },
}

/// Whether `reference` names a runtime core module.
pub fn is_builtin(reference: &str) -> bool {
    if reference.starts_with("node:") {
        return true;
    }
    let head = reference.split('/').next().unwrap_or(reference);
    BUILTIN_MODULES.contains(&head)
}

/// Whether `reference` is a path rather than a package name.
pub fn is_relative(reference: &str) -> bool {
    reference == "."
        || reference == ".."
        || reference.starts_with("./")
        || reference.starts_with("../")
        || reference.starts_with('/')
}

/// Package name of a bare reference: `@scope/name` or `name`.
pub fn package_name(reference: &str) -> &str {
    let mut boundary = reference.match_indices('/');
    let end = if reference.starts_with('@') {
        boundary.nth(1)
    } else {
        boundary.next()
    };
    match end {
        Some((index, _)) => &reference[..index],
        None => reference,
    }
}

/// Lexically normalizes `path` (resolving `.` and `..`) without touching the disk.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .fs_context("normalizing path", path)?
        .into_owned())
}

/// Resolves every symlink in `path`.
pub async fn real_path(path: &Path) -> Result<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .fs_context("resolving real path", path)
}

/// Symlinks crossed on the way from the real directory `from_dir` down to
/// `path`, starting below their deepest shared ancestor.
async fn links_to(from_dir: &Path, path: &Path) -> Result<Vec<Link>> {
    let Some(base) = from_dir.ancestors().find(|dir| path.starts_with(dir)) else {
        return Ok(Vec::new());
    };
    let Ok(rest) = path.strip_prefix(base) else {
        return Ok(Vec::new());
    };

    let mut links = Vec::new();
    let mut current = base.to_path_buf();
    for component in rest.components() {
        let next = current.join(component);
        let is_link = tokio::fs::symlink_metadata(&next)
            .await
            .is_ok_and(|m| m.file_type().is_symlink());
        current = if is_link {
            let target = real_path(&next).await?;
            links.push(Link {
                path: next,
                target: target.clone(),
            });
            target
        } else {
            next
        };
    }
    Ok(links)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// A bare reference found in a `node_modules` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMatch {
    pub path: PathBuf,
    pub package_root: Option<PathBuf>,
}

/// Node-style module resolver bound to one run's manifest cache.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    manifests: &'a ManifestCache,
    extensions: &'a [String],
}

impl<'a> Resolver<'a> {
    pub fn new(manifests: &'a ManifestCache, extensions: &'a [String]) -> Self {
        Self {
            manifests,
            extensions,
        }
    }

    /// Resolves `reference` as written in `requirer`, a real path.
    ///
    /// # Errors
    ///
    /// [`Error::MissingDependency`] when nothing matches and the reference is
    /// not tolerated as optional; [`Error::ManifestParse`] when a manifest
    /// consulted on the way is malformed.
    pub async fn resolve(&self, reference: &str, requirer: &Path) -> Result<Resolution> {
        if is_builtin(reference) {
            return Ok(Resolution::Builtin);
        }

        let from_dir = requirer.parent().unwrap_or_else(|| Path::new("/"));

        if is_relative(reference) {
            let target = normalize(&from_dir.join(reference))?;
            return match self.resolve_path(&target).await? {
                Some(found) => Ok(Resolution::Resolved {
                    path: real_path(&found).await?,
                    package_root: None,
                    links: links_to(from_dir, &found).await?,
                }),
                None => Err(Error::MissingDependency {
                    reference: reference.to_string(),
                    requirer: requirer.to_path_buf(),
                }),
            };
        }

        let package = package_name(reference);
        if let Some(found) = self.resolve_package(reference, from_dir).await? {
            log::debug!("Resolved '{}' to {}", reference, found.path.display());
            return Ok(Resolution::Resolved {
                path: real_path(&found.path).await?,
                links: links_to(from_dir, &found.path).await?,
                package_root: found.package_root,
            });
        }

        match self.tolerated_absence(package, from_dir).await? {
            Some(reason) => {
                log::debug!("'{}' is absent but {}", reference, reason);
                Ok(Resolution::Optional { reason })
            }
            None => Err(Error::MissingDependency {
                reference: reference.to_string(),
                requirer: requirer.to_path_buf(),
            }),
        }
    }

    /// Searches `node_modules` of `from_dir` and each ancestor for `reference`.
    ///
    /// The returned file path is as found, before symlinks are resolved. The
    /// package root is the real path of the package directory, and is absent
    /// when the reference named a single file such as `node_modules/solo.js`.
    pub async fn resolve_package(
        &self,
        reference: &str,
        from_dir: &Path,
    ) -> Result<Option<PackageMatch>> {
        let package = package_name(reference);

        for dir in from_dir.ancestors() {
            if dir.file_name().is_some_and(|name| name == "node_modules") {
                continue;
            }
            let modules = dir.join("node_modules");
            if !is_dir(&modules).await {
                continue;
            }
            let Some(path) = self.resolve_package_path(&modules, reference).await? else {
                continue;
            };
            let root = modules.join(package);
            let package_root = if is_dir(&root).await {
                Some(real_path(&root).await?)
            } else {
                None
            };
            return Ok(Some(PackageMatch { path, package_root }));
        }

        Ok(None)
    }

    /// Resolves a bare reference inside one `node_modules` directory, trying
    /// the package's `exports` map before plain file lookup.
    async fn resolve_package_path(&self, modules: &Path, reference: &str) -> Result<Option<PathBuf>> {
        let package = package_name(reference);
        let root = modules.join(package);
        if is_dir(&root).await {
            if let Some(manifest) = self.manifests.load(&root).await? {
                let subpath = match &reference[package.len()..] {
                    "" => ".".to_string(),
                    rest => format!(".{rest}"),
                };
                if let Some(target) = manifest.export_target(&subpath) {
                    let file = normalize(&root.join(target))?;
                    if is_file(&file).await {
                        return Ok(Some(file));
                    }
                    log::debug!(
                        "Export '{}' of {} points at missing {}",
                        subpath,
                        manifest.path().display(),
                        file.display()
                    );
                }
            }
        }
        self.resolve_path(&modules.join(reference)).await
    }

    async fn tolerated_absence(
        &self,
        package: &str,
        from_dir: &Path,
    ) -> Result<Option<OptionalReason>> {
        let Some(manifest) = self.manifests.find(from_dir).await? else {
            return Ok(None);
        };

        if manifest.is_optional(package) {
            return Ok(Some(OptionalReason::OptionalDependency {
                declared_in: manifest.path(),
            }));
        }
        if manifest.is_peer_optional(package) {
            return Ok(Some(OptionalReason::PeerOptional {
                declared_in: manifest.path(),
            }));
        }
        if let Some(name) = &manifest.name {
            if quirks::relaxes_optional(name, manifest.version.as_deref(), package) {
                return Ok(Some(OptionalReason::KnownQuirk {
                    package: name.clone(),
                }));
            }
        }

        Ok(None)
    }

    async fn resolve_path(&self, target: &Path) -> Result<Option<PathBuf>> {
        if let Some(file) = self.resolve_file(target).await {
            return Ok(Some(file));
        }
        self.resolve_directory(target).await
    }

    async fn resolve_file(&self, target: &Path) -> Option<PathBuf> {
        if is_file(target).await {
            return Some(target.to_path_buf());
        }
        for ext in self.extensions {
            let candidate = with_suffix(target, ext);
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        for ext in self.extensions {
            let candidate = dir.join(format!("index{ext}"));
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn resolve_directory(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if !is_dir(dir).await {
            return Ok(None);
        }

        if let Some(manifest) = self.manifests.load(dir).await? {
            if let Some(main) = &manifest.main {
                let main = normalize(&dir.join(main))?;
                if let Some(file) = self.resolve_file(&main).await {
                    return Ok(Some(file));
                }
                if let Some(file) = self.resolve_index(&main).await {
                    return Ok(Some(file));
                }
                log::debug!(
                    "'main' of {} does not exist, falling back to index",
                    manifest.path().display()
                );
            }
        }

        Ok(self.resolve_index(dir).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::settings::DEFAULT_EXTENSIONS;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn extensions() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn package_names() {
        assert_eq!(package_name("left-pad"), "left-pad");
        assert_eq!(package_name("lodash/fp/map"), "lodash");
        assert_eq!(package_name("@scope/pkg"), "@scope/pkg");
        assert_eq!(package_name("@scope/pkg/sub/file.js"), "@scope/pkg");
    }

    #[test]
    fn builtins_are_recognized() {
        assert!(is_builtin("fs"));
        assert!(is_builtin("fs/promises"));
        assert!(is_builtin("node:test"));
        assert!(!is_builtin("left-pad"));
    }

    #[tokio::test]
    async fn relative_reference_uses_extension_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.js");
        write(&a, "require('./b')");
        write(&tmp.path().join("b.js"), "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolution = Resolver::new(&cache, &exts).resolve("./b", &a).await.unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved {
                path: tmp.path().join("b.js"),
                package_root: None,
                links: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn directory_reference_prefers_main_then_index() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.js");
        write(&a, "");
        write(&tmp.path().join("lib/package.json"), r#"{"main":"./dist/entry"}"#);
        write(&tmp.path().join("lib/dist/entry.js"), "");
        write(&tmp.path().join("lib/index.js"), "");
        write(&tmp.path().join("util/index.js"), "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolver = Resolver::new(&cache, &exts);

        match resolver.resolve("./lib", &a).await.unwrap() {
            Resolution::Resolved { path, .. } => assert_eq!(path, tmp.path().join("lib/dist/entry.js")),
            other => panic!("unexpected {other:?}"),
        }
        match resolver.resolve("../util", &tmp.path().join("lib/x.js")).await.unwrap() {
            Resolution::Resolved { path, .. } => assert_eq!(path, tmp.path().join("util/index.js")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn hoisted_package_resolves_from_deep_requirer() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("node_modules/left-pad/index.js"), "");
        let requirer = tmp.path().join("packages/api/src/functions/hello.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolution = Resolver::new(&cache, &exts)
            .resolve("left-pad", &requirer)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved {
                path: tmp.path().join("node_modules/left-pad/index.js"),
                package_root: Some(tmp.path().join("node_modules/left-pad")),
                links: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn scoped_subpath_resolves_inside_package() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("node_modules/@acme/utils/lib/math.js"), "");
        let requirer = tmp.path().join("fn.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolution = Resolver::new(&cache, &exts)
            .resolve("@acme/utils/lib/math", &requirer)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved {
                path: tmp.path().join("node_modules/@acme/utils/lib/math.js"),
                package_root: Some(tmp.path().join("node_modules/@acme/utils")),
                links: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn missing_optional_and_peer_optional_are_tolerated() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join("package.json"),
            r#"{
                "optionalDependencies": {"fsevents": "^2"},
                "peerDependencies": {"pg-native": "*"},
                "peerDependenciesMeta": {"pg-native": {"optional": true}}
            }"#,
        );
        let requirer = tmp.path().join("fn.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolver = Resolver::new(&cache, &exts);

        assert!(matches!(
            resolver.resolve("fsevents", &requirer).await.unwrap(),
            Resolution::Optional {
                reason: OptionalReason::OptionalDependency { .. }
            }
        ));
        assert!(matches!(
            resolver.resolve("pg-native", &requirer).await.unwrap(),
            Resolution::Optional {
                reason: OptionalReason::PeerOptional { .. }
            }
        ));
    }

    #[tokio::test]
    async fn missing_required_dependency_names_requirer() {
        let tmp = tempfile::tempdir().unwrap();
        let requirer = tmp.path().join("b.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let err = Resolver::new(&cache, &exts)
            .resolve("left-pad", &requirer)
            .await
            .unwrap_err();
        match err {
            Error::MissingDependency {
                reference,
                requirer: reported,
            } => {
                assert_eq!(reference, "left-pad");
                assert_eq!(reported, requirer);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn quirk_table_relaxes_undeclared_conditional_require() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("node_modules/node-fetch");
        write(&pkg.join("package.json"), r#"{"name":"node-fetch","version":"2.6.7"}"#);
        let requirer = pkg.join("lib/index.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolution = Resolver::new(&cache, &exts)
            .resolve("encoding", &requirer)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Optional {
                reason: OptionalReason::KnownQuirk {
                    package: "node-fetch".into()
                }
            }
        );
    }

    #[tokio::test]
    async fn single_file_module_has_no_package_root() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("node_modules/solo.js"), "");
        let requirer = tmp.path().join("fn.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolution = Resolver::new(&cache, &exts)
            .resolve("solo", &requirer)
            .await
            .unwrap();
        assert_eq!(
            resolution,
            Resolution::Resolved {
                path: tmp.path().join("node_modules/solo.js"),
                package_root: None,
                links: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn exports_map_is_used_before_file_lookup() {
        let tmp = tempfile::tempdir().unwrap();
        let pkg = tmp.path().join("node_modules/modern");
        write(
            &pkg.join("package.json"),
            r#"{"name":"modern","main":"./legacy.js","exports":{
                ".": {"import": "./esm/index.mjs", "require": "./lib/index.cjs"},
                "./app": {"require": "./lib/app/index.cjs"}
            }}"#,
        );
        write(&pkg.join("legacy.js"), "");
        write(&pkg.join("lib/index.cjs"), "");
        write(&pkg.join("lib/app/index.cjs"), "");
        let requirer = tmp.path().join("fn.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolver = Resolver::new(&cache, &exts);

        for (reference, expected) in [("modern", "lib/index.cjs"), ("modern/app", "lib/app/index.cjs")] {
            match resolver.resolve(reference, &requirer).await.unwrap() {
                Resolution::Resolved { path, package_root, .. } => {
                    assert_eq!(path, pkg.join(expected));
                    assert_eq!(package_root, Some(pkg.clone()));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_packages_resolve_siblings_from_their_real_location() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("node_modules/.pnpm/foo@1.0.0/node_modules");
        write(&store.join("foo/index.js"), "require('bar')");
        write(&store.join("bar/index.js"), "");
        std::os::unix::fs::symlink(".pnpm/foo@1.0.0/node_modules/foo", tmp.path().join("node_modules/foo"))
            .unwrap();
        let requirer = tmp.path().join("fn.js");
        write(&requirer, "");

        let cache = ManifestCache::default();
        let exts = extensions();
        let resolver = Resolver::new(&cache, &exts);

        let foo = resolver.resolve("foo", &requirer).await.unwrap();
        assert_eq!(
            foo,
            Resolution::Resolved {
                path: store.join("foo/index.js"),
                package_root: Some(store.join("foo")),
                links: vec![Link {
                    path: tmp.path().join("node_modules/foo"),
                    target: store.join("foo"),
                }],
            }
        );

        let bar = resolver.resolve("bar", &store.join("foo/index.js")).await.unwrap();
        assert_eq!(
            bar,
            Resolution::Resolved {
                path: store.join("bar/index.js"),
                package_root: Some(store.join("bar")),
                links: Vec::new(),
            }
        );
    }
}
