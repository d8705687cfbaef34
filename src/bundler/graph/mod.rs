//! Static dependency graph construction.
//!
//! Starting from an entry file, the builder scans each visited script for
//! module references, resolves them and enqueues newly reached files until
//! the closure is complete. Nodes live in a path-keyed map, so insertion is
//! idempotent and cyclic `require` structures terminate without any separate
//! cycle detection.
//!
//! Once traversal enters an installed package, the whole package directory is
//! shipped (minus junk and excluded files), because packages routinely load
//! files that no static reference names.
//!
//! Every node is keyed by its real path. Symlinks crossed while resolving are
//! kept in [`DependencyGraph::links`] so the archive can recreate them.

pub mod exclusions;
pub mod scanner;

use crate::bundler::{
    context::RunContext,
    error::{Error, ErrorExt, Result},
    manifest::MANIFEST_FILE,
    resolver::{self, Link, Resolution, Resolver, quirks},
    settings::FunctionConfig,
    warning::Warning,
};
use exclusions::{FileExclusions, ModuleMatcher};
use scanner::Reference;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    path::{Path, PathBuf},
};

/// Extensions of files scanned for references.
const SCRIPT_EXTENSIONS: &[&str] = &["js", "cjs", "mjs", "jsx", "ts", "cts", "mts", "tsx"];

/// Whether `path` is a script whose references are followed.
pub fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

fn inside_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}

/// One resolved file in a function's closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    pub resolved_path: PathBuf,
    pub is_entry: bool,
    /// Raw reference strings found in this file.
    pub references: BTreeSet<String>,
    /// The file contains references that could not be statically proven.
    pub dynamic: bool,
}

impl ModuleNode {
    pub fn new(resolved_path: PathBuf) -> Self {
        Self {
            resolved_path,
            is_entry: false,
            references: BTreeSet::new(),
            dynamic: false,
        }
    }

    fn entry(resolved_path: PathBuf) -> Self {
        Self {
            is_entry: true,
            ..Self::new(resolved_path)
        }
    }
}

/// Transitive closure of one entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    pub entry: PathBuf,
    pub nodes: BTreeMap<PathBuf, ModuleNode>,
    /// Installed package directories whose full file set is included.
    pub external_package_roots: BTreeSet<PathBuf>,
    /// Configured external modules referenced but deliberately not included.
    pub external_references: BTreeSet<String>,
    /// Symlinks crossed on the way to included files.
    pub links: BTreeSet<Link>,
    pub warnings: Vec<Warning>,
}

impl DependencyGraph {
    fn new(entry: PathBuf) -> Self {
        Self {
            entry,
            nodes: BTreeMap::new(),
            external_package_roots: BTreeSet::new(),
            external_references: BTreeSet::new(),
            links: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Inserts `node` unless its path is already present. Returns whether it
    /// was inserted.
    fn insert(&mut self, node: ModuleNode) -> bool {
        if self.nodes.contains_key(&node.resolved_path) {
            return false;
        }
        self.nodes.insert(node.resolved_path.clone(), node);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    /// All files of the closure, in path order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.nodes.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Work remaining in one traversal.
#[derive(Default)]
struct Pending {
    files: VecDeque<PathBuf>,
    /// Dependencies declared by entered packages: `(name, manifest path)`.
    declared: VecDeque<(String, PathBuf)>,
}

/// Builds dependency graphs for one function.
pub struct GraphBuilder<'a> {
    ctx: &'a RunContext,
    resolver: Resolver<'a>,
    external: ModuleMatcher,
    ignored: ModuleMatcher,
    exclusions: FileExclusions,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder applying `config`'s module lists and exclusions.
    pub fn new(ctx: &'a RunContext, config: &FunctionConfig) -> Result<Self> {
        Ok(Self {
            ctx,
            resolver: ctx.resolver(),
            external: ModuleMatcher::new(&config.external_modules)?,
            ignored: ModuleMatcher::new(&config.ignored_modules)?,
            exclusions: FileExclusions::new(
                &config.exclude_files,
                ctx.settings().include_source_maps(),
            )?,
        })
    }

    /// Builds the closure of `entry`.
    ///
    /// # Errors
    ///
    /// Fails only when a statically proven reference is missing and not
    /// optional, or when a file or manifest on the path cannot be read.
    pub async fn build(&self, entry: &Path) -> Result<DependencyGraph> {
        let entry = resolver::real_path(entry).await?;
        log::debug!("Building dependency graph for {}", entry.display());

        let mut graph = DependencyGraph::new(entry.clone());
        graph.insert(ModuleNode::entry(entry.clone()));

        let mut pending = Pending::default();
        pending.files.push_back(entry);
        self.drain(&mut graph, &mut pending).await?;
        self.expand_packages(&mut graph).await?;

        log::debug!(
            "Closure of {} has {} files from {} packages",
            graph.entry.display(),
            graph.len(),
            graph.external_package_roots.len()
        );
        Ok(graph)
    }

    /// Builds the closure of a set of bare package references, as if they
    /// were required from `requirer`. The requirer itself is not included.
    pub async fn build_packages(&self, names: &[String], requirer: &Path) -> Result<DependencyGraph> {
        let requirer = resolver::real_path(requirer).await?;
        let mut graph = DependencyGraph::new(requirer.clone());
        let mut pending = Pending::default();

        for name in names {
            self.follow(name, &requirer, true, &mut graph, &mut pending)
                .await?;
        }
        self.drain(&mut graph, &mut pending).await?;
        self.expand_packages(&mut graph).await?;
        Ok(graph)
    }

    async fn drain(&self, graph: &mut DependencyGraph, pending: &mut Pending) -> Result<()> {
        loop {
            if let Some(file) = pending.files.pop_front() {
                self.visit(&file, graph, pending).await?;
            } else if let Some((name, manifest)) = pending.declared.pop_front() {
                self.follow(&name, &manifest, false, graph, pending).await?;
            } else {
                return Ok(());
            }
        }
    }

    async fn visit(
        &self,
        file: &Path,
        graph: &mut DependencyGraph,
        pending: &mut Pending,
    ) -> Result<()> {
        if !is_script(file) {
            return Ok(());
        }

        let bytes = tokio::fs::read(file)
            .await
            .fs_context("reading source file", file)?;
        let scan = match scanner::scan(&String::from_utf8_lossy(&bytes), file) {
            Ok(scan) => scan,
            Err(e) if inside_node_modules(file) => {
                log::debug!("Not scanning {}: {}", file.display(), e);
                graph.warnings.push(Warning::UnparsedSource {
                    file: file.to_path_buf(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if scan.has_module_syntax && !inside_node_modules(file) {
            graph.warnings.push(Warning::StaticModuleSyntax {
                file: file.to_path_buf(),
            });
        }

        let mut references = BTreeSet::new();
        let mut dynamic = false;
        for reference in scan.references {
            match reference {
                Reference::Static(raw) => {
                    self.follow(&raw, file, true, graph, pending).await?;
                    references.insert(raw);
                }
                Reference::Dynamic(expression) => {
                    log::debug!("Dynamic reference `{}` in {}", expression, file.display());
                    dynamic = true;
                    graph.warnings.push(Warning::DynamicReference {
                        file: file.to_path_buf(),
                        expression,
                    });
                }
            }
        }

        if let Some(node) = graph.nodes.get_mut(file) {
            node.references.extend(references);
            node.dynamic |= dynamic;
        }
        Ok(())
    }

    /// Resolves one reference and records the result.
    ///
    /// Non-strict references (dependencies declared by an included package but
    /// never statically required) downgrade a missing module to a warning.
    async fn follow(
        &self,
        reference: &str,
        requirer: &Path,
        strict: bool,
        graph: &mut DependencyGraph,
        pending: &mut Pending,
    ) -> Result<()> {
        if resolver::is_builtin(reference) {
            return Ok(());
        }
        if self.external.matches(reference) {
            graph
                .external_references
                .insert(resolver::package_name(reference).to_string());
            return Ok(());
        }
        if self.ignored.matches(reference) {
            log::debug!("Ignoring '{}' required from {}", reference, requirer.display());
            return Ok(());
        }

        match self.resolver.resolve(reference, requirer).await {
            Ok(Resolution::Resolved {
                path,
                package_root,
                links,
            }) => {
                graph.links.extend(links);
                if let Some(root) = package_root {
                    self.enter_package(root, graph, pending).await?;
                }
                if graph.insert(ModuleNode::new(path.clone())) {
                    pending.files.push_back(path);
                }
            }
            Ok(Resolution::Optional { reason }) => {
                graph.warnings.push(Warning::OptionalDependencyMissing {
                    reference: reference.to_string(),
                    requirer: requirer.to_path_buf(),
                    reason,
                });
            }
            Ok(Resolution::Builtin) => {}
            Err(Error::MissingDependency { reference, .. }) if !strict => {
                graph.warnings.push(Warning::UndeclaredMissing {
                    package: reference,
                    declared_by: requirer.to_path_buf(),
                });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn enter_package(
        &self,
        root: PathBuf,
        graph: &mut DependencyGraph,
        pending: &mut Pending,
    ) -> Result<()> {
        if !graph.external_package_roots.insert(root.clone()) {
            return Ok(());
        }
        if let Some(manifest) = self.ctx.manifests().load(&root).await? {
            for name in manifest.dependencies.keys() {
                pending
                    .declared
                    .push_back((name.clone(), root.join(MANIFEST_FILE)));
            }
        }
        Ok(())
    }

    async fn expand_packages(&self, graph: &mut DependencyGraph) -> Result<()> {
        let roots: Vec<PathBuf> = graph.external_package_roots.iter().cloned().collect();

        for root in roots {
            let manifest = self.ctx.manifests().load(&root).await?;
            let (name, version) = manifest
                .as_ref()
                .map(|m| (m.name.clone(), m.version.clone()))
                .unwrap_or_default();
            let name = name.unwrap_or_default();

            let rules = self
                .exclusions
                .with_patterns(&quirks::excluded_sub_paths(&name, version.as_deref()))?;
            for file in collect_package_files(&root, rules).await? {
                graph.insert(ModuleNode::new(file));
            }

            for side_path in quirks::side_paths(&name, version.as_deref()) {
                let dir = resolver::normalize(&root.join(side_path))?;
                if tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
                    log::debug!("Including side directory {} for {}", dir.display(), name);
                    for file in collect_package_files(&dir, self.exclusions.clone()).await? {
                        graph.insert(ModuleNode::new(file));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Lists every file of a package directory, skipping nested `node_modules`.
async fn collect_package_files(root: &Path, rules: FileExclusions) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        let walker = walkdir::WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != "node_modules");

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&root).to_path_buf();
                Error::Fs {
                    context: "walking package directory",
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            if !rules.is_excluded(relative) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| Error::GenericError(format!("Package walk task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::settings::SettingsBuilder;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn context() -> RunContext {
        RunContext::new(SettingsBuilder::new().build().unwrap())
    }

    #[tokio::test]
    async fn cycles_terminate_with_each_file_once() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("a.js"), "require('./b')");
        write(&tmp.path().join("b.js"), "require('./c')");
        write(&tmp.path().join("c.js"), "require('./a'); require('./b')");

        let ctx = context();
        let builder = GraphBuilder::new(&ctx, &FunctionConfig::default()).unwrap();
        let graph = builder.build(&tmp.path().join("a.js")).await.unwrap();

        assert_eq!(graph.len(), 3);
        assert!(graph.nodes[&tmp.path().join("a.js")].is_entry);
        assert_eq!(
            graph.nodes[&tmp.path().join("c.js")].references,
            BTreeSet::from(["./a".to_string(), "./b".to_string()])
        );
    }

    #[tokio::test]
    async fn package_is_expanded_without_junk_or_nested_modules() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("fn.js"), "require('left-pad')");
        let pkg = tmp.path().join("node_modules/left-pad");
        write(&pkg.join("package.json"), r#"{"name":"left-pad","version":"1.3.0"}"#);
        write(&pkg.join("index.js"), "module.exports = () => {}");
        write(&pkg.join("lib/data.txt"), "asset");
        write(&pkg.join("index.d.ts"), "");
        write(&pkg.join(".DS_Store"), "");
        write(&pkg.join("node_modules/nested/index.js"), "");

        let ctx = context();
        let builder = GraphBuilder::new(&ctx, &FunctionConfig::default()).unwrap();
        let graph = builder.build(&tmp.path().join("fn.js")).await.unwrap();

        assert!(graph.contains(&pkg.join("index.js")));
        assert!(graph.contains(&pkg.join("lib/data.txt")));
        assert!(graph.contains(&pkg.join("package.json")));
        assert!(!graph.contains(&pkg.join("index.d.ts")));
        assert!(!graph.contains(&pkg.join(".DS_Store")));
        assert!(!graph.contains(&pkg.join("node_modules/nested/index.js")));
        assert_eq!(graph.external_package_roots, BTreeSet::from([pkg]));
    }

    #[tokio::test]
    async fn external_and_ignored_modules_are_not_resolved() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join("fn.js"),
            "require('aws-sdk/clients/s3'); require('@types/node'); require('left-pad')",
        );
        write(&tmp.path().join("node_modules/left-pad/index.js"), "");

        let config = FunctionConfig {
            external_modules: vec!["aws-sdk".into()],
            ignored_modules: vec!["@types/*".into()],
            ..Default::default()
        };
        let ctx = context();
        let graph = GraphBuilder::new(&ctx, &config)
            .unwrap()
            .build(&tmp.path().join("fn.js"))
            .await
            .unwrap();

        assert_eq!(graph.external_references, BTreeSet::from(["aws-sdk".to_string()]));
        assert!(graph.files().all(|f| !f.to_string_lossy().contains("@types")));
        assert!(graph.contains(&tmp.path().join("node_modules/left-pad/index.js")));
    }

    #[tokio::test]
    async fn dynamic_reference_is_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("fn.js"), "const m = require(process.env.MOD)");

        let ctx = context();
        let graph = GraphBuilder::new(&ctx, &FunctionConfig::default())
            .unwrap()
            .build(&tmp.path().join("fn.js"))
            .await
            .unwrap();

        assert!(graph.nodes[&tmp.path().join("fn.js")].dynamic);
        assert!(matches!(
            graph.warnings.as_slice(),
            [Warning::DynamicReference { .. }]
        ));
    }

    #[tokio::test]
    async fn declared_dependencies_of_packages_are_followed_leniently() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("fn.js"), "require('outer')");
        write(
            &tmp.path().join("node_modules/outer/package.json"),
            r#"{"name":"outer","dependencies":{"inner":"1","gone":"1"}}"#,
        );
        write(&tmp.path().join("node_modules/outer/index.js"), "");
        write(&tmp.path().join("node_modules/inner/index.js"), "");

        let ctx = context();
        let graph = GraphBuilder::new(&ctx, &FunctionConfig::default())
            .unwrap()
            .build(&tmp.path().join("fn.js"))
            .await
            .unwrap();

        assert!(graph.contains(&tmp.path().join("node_modules/inner/index.js")));
        assert!(graph.warnings.iter().any(|w| matches!(
            w,
            Warning::UndeclaredMissing { package, .. } if package == "gone"
        )));
    }

    #[tokio::test]
    async fn quirk_side_path_is_included() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("fn.js"), "require('@prisma/client')");
        let pkg = tmp.path().join("node_modules/@prisma/client");
        write(
            &pkg.join("package.json"),
            r#"{"name":"@prisma/client","version":"5.1.0"}"#,
        );
        write(&pkg.join("index.js"), "");
        write(&pkg.join("generator-build/index.js"), "");
        write(&tmp.path().join("node_modules/.prisma/client/schema.prisma"), "");

        let ctx = context();
        let graph = GraphBuilder::new(&ctx, &FunctionConfig::default())
            .unwrap()
            .build(&tmp.path().join("fn.js"))
            .await
            .unwrap();

        assert!(graph.contains(&tmp.path().join("node_modules/.prisma/client/schema.prisma")));
        assert!(!graph.contains(&pkg.join("generator-build/index.js")));
    }

    #[tokio::test]
    async fn single_file_module_is_included_alone() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("fn.js"), "require('solo')");
        write(&tmp.path().join("node_modules/solo.js"), "module.exports = 1");
        write(&tmp.path().join("node_modules/other/index.js"), "");

        let ctx = context();
        let graph = GraphBuilder::new(&ctx, &FunctionConfig::default())
            .unwrap()
            .build(&tmp.path().join("fn.js"))
            .await
            .unwrap();

        assert!(graph.contains(&tmp.path().join("node_modules/solo.js")));
        assert!(!graph.contains(&tmp.path().join("node_modules/other/index.js")));
        assert!(graph.external_package_roots.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_package_ships_real_files_and_its_link() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("node_modules/.pnpm/foo@1.0.0/node_modules");
        write(&tmp.path().join("fn.js"), "require('foo')");
        write(&store.join("foo/package.json"), r#"{"name":"foo","version":"1.0.0"}"#);
        write(&store.join("foo/index.js"), "module.exports = require('bar')");
        write(&store.join("bar/index.js"), "");
        std::os::unix::fs::symlink(".pnpm/foo@1.0.0/node_modules/foo", tmp.path().join("node_modules/foo"))
            .unwrap();

        let ctx = context();
        let graph = GraphBuilder::new(&ctx, &FunctionConfig::default())
            .unwrap()
            .build(&tmp.path().join("fn.js"))
            .await
            .unwrap();

        assert!(graph.contains(&store.join("foo/index.js")));
        assert!(graph.contains(&store.join("bar/index.js")));
        assert_eq!(
            graph.links,
            BTreeSet::from([Link {
                path: tmp.path().join("node_modules/foo"),
                target: store.join("foo"),
            }])
        );
    }

    #[tokio::test]
    async fn unparseable_package_file_is_shipped_with_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("fn.js"), "require('flow-typed')");
        let pkg = tmp.path().join("node_modules/flow-typed");
        write(&pkg.join("index.js"), "function f(x: number): string { return x }");

        let ctx = context();
        let builder = GraphBuilder::new(&ctx, &FunctionConfig::default()).unwrap();
        let graph = builder.build(&tmp.path().join("fn.js")).await.unwrap();
        assert!(graph.contains(&pkg.join("index.js")));
        assert!(graph.warnings.iter().any(|w| matches!(
            w,
            Warning::UnparsedSource { file, .. } if file == &pkg.join("index.js")
        )));

        write(&tmp.path().join("broken.js"), "const = require('x')");
        let err = builder.build(&tmp.path().join("broken.js")).await.unwrap_err();
        assert!(matches!(err, Error::SourceParse { line: 1, .. }), "{err}");
    }
}
