//! Restore operation: walk a project's dependencies, install the packages
//! they need and write the lock file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use url::Url;

use crate::compat::{self, select_assets, RuntimeFile};
use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryRange, LibraryTypes};
use crate::core::project::{FileSystemProjectResolver, Project, PROJECT_FILE_NAME};
use crate::core::version::cmp_precedence;
use crate::lockfile::{
    LockFile, LockFilePackageLibrary, LockFileTarget, LockFileTargetLibrary,
    ProjectFileDependencyGroup,
};
use crate::ops::install::{install_package, InstalledPackage};
use crate::ops::lockfile::{lock_path, reusable_lockfile, save_lockfile};
use crate::providers::{
    DependencyProvider, FrameworkReferenceProvider, HostOs, ProjectDependencyProvider,
    ReferenceConfig, UnresolvedDependencyProvider,
};
use crate::resolver::{FrameworkWalk, GraphWalker, ResolveError};
use crate::util::config::Config;
use crate::util::fs::glob_files;
use crate::walk::{HttpFeed, LocalFeed, WalkProvider};

/// Options for restore.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Where packages are installed
    pub packages_dir: PathBuf,

    /// Package feeds: directories (relative to the project) or http(s) URLs
    pub feeds: Vec<String>,

    /// Runtime identifiers restored for every framework
    pub runtimes: Vec<String>,

    /// Write the lock file when only some frameworks resolved
    pub allow_partial: bool,

    /// Mark the written lock file as locked
    pub lock: bool,

    /// Walk again even when a locked lock file is still valid
    pub ignore_locked: bool,

    /// Skip HTTP feeds
    pub offline: bool,

    /// HTTP feed timeout
    pub timeout: Option<Duration>,

    /// Extra directories searched for sibling projects
    pub project_search_paths: Vec<PathBuf>,

    /// Platform assembly locations
    pub references: ReferenceConfig,
}

impl RestoreOptions {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        RestoreOptions {
            packages_dir: packages_dir.into(),
            feeds: Vec::new(),
            runtimes: Vec::new(),
            allow_partial: false,
            lock: false,
            ignore_locked: false,
            offline: false,
            timeout: None,
            project_search_paths: Vec::new(),
            references: ReferenceConfig::new(HostOs::current()),
        }
    }

    /// Options from merged configuration.
    pub fn from_config(config: &Config, packages_dir: impl Into<PathBuf>) -> Self {
        let mut references = ReferenceConfig::new(HostOs::current());
        if let Some(dir) = &config.references.windows_dir {
            references = references.with_windows_dir(dir);
        }
        for root in &config.references.roots {
            references = references.with_reference_root(root);
        }

        RestoreOptions {
            feeds: config.restore.feeds.clone(),
            runtimes: config.restore.runtimes.clone(),
            allow_partial: config.restore.allow_partial,
            offline: config.restore.offline,
            timeout: config.restore.timeout.map(Duration::from_secs),
            references,
            ..RestoreOptions::new(packages_dir)
        }
    }

    pub fn with_feed(mut self, feed: impl Into<String>) -> Self {
        self.feeds.push(feed.into());
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtimes.push(runtime.into());
        self
    }

    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }

    pub fn with_references(mut self, references: ReferenceConfig) -> Self {
        self.references = references;
        self
    }
}

/// A target that did not restore cleanly.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    /// Target key, e.g. `DNXCore,Version=v5.0/win7-x64`.
    pub target: String,
    pub errors: Vec<ResolveError>,
}

/// Outcome of restoring one project.
#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub lock_path: PathBuf,
    pub lock_file: LockFile,
    /// Whether the lock file on disk was (re)written.
    pub written: bool,
    /// Whether a locked lock file was reused without walking.
    pub reused: bool,
    pub failures: Vec<TargetFailure>,
    /// Packages newly or previously installed for this restore.
    pub packages: usize,
}

impl RestoreResult {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Every project directory below `root`, sorted.
pub fn find_projects(root: &Path) -> Result<Vec<PathBuf>> {
    if root.join(PROJECT_FILE_NAME).is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let pattern = format!("**/{}", PROJECT_FILE_NAME);
    Ok(glob_files(root, &[pattern])?
        .into_iter()
        .filter_map(|file| file.parent().map(Path::to_path_buf))
        .collect())
}

/// Restore the project in `project_dir`.
pub async fn restore(project_dir: &Path, opts: &RestoreOptions) -> Result<RestoreResult> {
    let project = Project::load(project_dir)?;
    let lock_path = lock_path(project_dir);

    if !opts.ignore_locked {
        if let Some(lock_file) = reusable_lockfile(&project)? {
            return Ok(RestoreResult {
                lock_path,
                lock_file,
                written: false,
                reused: true,
                failures: Vec::new(),
                packages: 0,
            });
        }
    }

    let frameworks: Vec<FrameworkName> = project
        .get_target_frameworks()
        .iter()
        .filter_map(|info| info.framework_name.clone())
        .collect();
    if frameworks.is_empty() {
        bail!("{} declares no frameworks", project.project_file_path().display());
    }

    tracing::info!("Restoring {} for {} framework(s)", project.name(), frameworks.len());

    let walker = build_walker(project_dir, opts)?;
    let root = LibraryRange::new(project.name())?.with_allowed_types(LibraryTypes::PROJECT);

    let mut walks = walker.walk(&root, &frameworks).await.walks;

    let mut runtime_files: HashMap<FrameworkName, RuntimeFile> = HashMap::new();
    if !opts.runtimes.is_empty() {
        for walk in &walks {
            let runtimes = walker.collect_runtimes(walk).await;
            runtime_files.insert(walk.framework.clone(), runtimes);
        }

        let (walker, root, runtime_files) = (&walker, &root, &runtime_files);
        let pending = walks.iter().flat_map(|walk| {
            let runtimes = &runtime_files[&walk.framework];
            opts.runtimes
                .iter()
                .map(move |rid| walker.walk_runtime(root, &walk.framework, rid, runtimes))
        });
        let runtime_walks = join_all(pending).await;
        walks.extend(runtime_walks);
    }
    tracing::debug!("{} distinct lookups", walker.cached_lookups());

    let (installed, install_errors) = install_all(&walks, &opts.packages_dir).await;

    let empty = RuntimeFile::default();
    let mut targets = Vec::new();
    let mut failures = Vec::new();
    for walk in &walks {
        let runtimes = runtime_files.get(&walk.framework).unwrap_or(&empty);
        let (target, errors) = build_target(walk, runtimes, &installed, &install_errors);
        if !errors.is_empty() {
            failures.push(TargetFailure {
                target: target.key(),
                errors,
            });
        }
        targets.push(target);
    }

    for failure in &failures {
        for error in &failure.errors {
            tracing::warn!("{}: {}", failure.target, error);
        }
    }

    let lock_file = build_lock_file(&project, targets, &failures, &installed, opts.lock);
    let succeeded = walks.len() - failures.len();
    let written = failures.is_empty() || (opts.allow_partial && succeeded > 0);

    if written {
        save_lockfile(&lock_path, &lock_file)?;
        tracing::info!("Wrote {}", lock_path.display());
    } else {
        tracing::warn!("Restore failed, {} left unchanged", lock_path.display());
    }

    Ok(RestoreResult {
        lock_path,
        lock_file,
        written,
        reused: false,
        failures,
        packages: installed.len(),
    })
}

/// Provider order: sibling projects, platform assemblies, feeds (local
/// before HTTP), then the unresolved fallback.
fn build_walker(project_dir: &Path, opts: &RestoreOptions) -> Result<GraphWalker> {
    let resolver = FileSystemProjectResolver::for_project(project_dir, &opts.project_search_paths);
    let projects: Arc<dyn DependencyProvider> =
        Arc::new(ProjectDependencyProvider::new(Arc::new(resolver)));
    let references: Arc<dyn DependencyProvider> =
        Arc::new(FrameworkReferenceProvider::new(opts.references.clone()));

    let mut walker = GraphWalker::new()
        .with_provider(Arc::clone(&projects))
        .with_provider(Arc::clone(&references));

    for feed in &opts.feeds {
        if let Some(provider) = feed_provider(feed, project_dir, opts)? {
            walker = walker.with_walk_provider(provider);
        }
    }

    let attempted = walker
        .walk_providers()
        .iter()
        .map(|provider| provider.attempted_path())
        .collect();
    let unresolved = UnresolvedDependencyProvider::new(vec![projects, references]).with_extra_paths(attempted);

    Ok(walker.with_fallback_provider(Arc::new(unresolved)))
}

fn feed_provider(feed: &str, base: &Path, opts: &RestoreOptions) -> Result<Option<Arc<dyn WalkProvider>>> {
    if feed.starts_with("http://") || feed.starts_with("https://") {
        if opts.offline {
            tracing::info!("Offline, skipping feed {}", feed);
            return Ok(None);
        }

        let url = Url::parse(feed).with_context(|| format!("invalid feed URL: {}", feed))?;
        let mut client = reqwest::Client::builder();
        if let Some(timeout) = opts.timeout {
            client = client.timeout(timeout);
        }
        let client = client.build().context("failed to create HTTP client")?;
        return Ok(Some(Arc::new(HttpFeed::with_client(url, client))));
    }

    let path = feed.strip_prefix("file://").unwrap_or(feed);
    Ok(Some(Arc::new(LocalFeed::new(base.join(path)))))
}

type InstalledMap = HashMap<(String, semver::Version), InstalledPackage>;

fn package_key(name: &str, version: &semver::Version) -> (String, semver::Version) {
    (name.to_ascii_lowercase(), version.clone())
}

/// Install every feed package any walk selected, each once. Failed
/// installs are returned per package so each target can report them.
async fn install_all(
    walks: &[FrameworkWalk],
    packages_dir: &Path,
) -> (InstalledMap, HashMap<(String, semver::Version), ResolveError>) {
    let mut remotes = BTreeMap::new();
    for walk in walks {
        for node in walk.graph.libraries() {
            if let Some(remote) = &node.remote {
                let identity = &remote.matched.library;
                remotes
                    .entry(package_key(&identity.name, &identity.version))
                    .or_insert_with(|| remote.clone());
            }
        }
    }

    let results = join_all(
        remotes
            .values()
            .map(|remote| install_package(remote, packages_dir)),
    )
    .await;

    let mut installed = InstalledMap::new();
    let mut errors = HashMap::new();
    for ((key, remote), result) in remotes.into_iter().zip(results) {
        match result {
            Ok(package) => {
                installed.insert(key, package);
            }
            Err(e) => {
                tracing::warn!("Failed to install {}: {:#}", remote.matched.library, e);
                errors.insert(
                    key,
                    ResolveError::Source {
                        source_name: remote.provider.name().to_string(),
                        message: format!("{:#}", e),
                    },
                );
            }
        }
    }

    (installed, errors)
}

/// Flatten a walk into a lock target. Packages the target cannot use are
/// reported as errors next to the walk's own.
fn build_target(
    walk: &FrameworkWalk,
    runtimes: &RuntimeFile,
    installed: &InstalledMap,
    install_errors: &HashMap<(String, semver::Version), ResolveError>,
) -> (LockFileTarget, Vec<ResolveError>) {
    let mut target = LockFileTarget::new(walk.framework.clone(), walk.runtime_identifier.clone());
    let mut errors = walk.errors.clone();
    let expanded = walk
        .runtime_identifier
        .as_deref()
        .map(|rid| runtimes.expand(rid))
        .unwrap_or_default();

    for node in walk.graph.libraries() {
        if !node.is_package() {
            continue;
        }
        let description = &node.description;
        let key = package_key(description.name(), description.version());
        let Some(package) = installed.get(&key) else {
            match install_errors.get(&key) {
                Some(error) => errors.push(error.clone()),
                None => tracing::warn!("{} was resolved but not installed", description.identity),
            }
            continue;
        };

        let mut library = LockFileTargetLibrary::new(package.name.clone(), package.version.clone());
        for dependency in &description.dependencies {
            let range = &dependency.range;
            if range.is_framework_reference() {
                library.framework_assemblies.push(range.name().to_string());
            } else {
                let versions = range.version_range().map(|r| r.to_string()).unwrap_or_default();
                library.dependencies.insert(range.name().to_string(), versions);
            }
        }
        if let Some(rid) = &walk.runtime_identifier {
            for (name, versions) in runtimes.runtime_dependencies(rid, &package.name) {
                library.dependencies.entry(name).or_insert(versions);
            }
        }

        let assets = select_assets(&package.files, &walk.framework, &expanded);
        library.compile_time_assemblies = assets.compile;
        library.runtime_assemblies = assets.runtime;
        library.native_libraries = assets.native;

        if !compat::is_compatible(&package_library(package), &library) {
            let requester = walk
                .graph
                .dependents(description.name())
                .first()
                .map(|node| node.description.identity.to_string())
                .unwrap_or_default();
            errors.push(ResolveError::Incompatible {
                name: package.name.clone(),
                version: package.version.clone(),
                requester,
                framework: walk.framework.to_string(),
            });
        }

        target.libraries.push(library);
    }

    (target, errors)
}

fn package_library(package: &InstalledPackage) -> LockFilePackageLibrary {
    let mut library = LockFilePackageLibrary::new(package.name.clone(), package.version.clone());
    library.sha = Some(package.sha.clone());
    library.files = package.files.clone();
    library
}

fn build_lock_file(
    project: &Project,
    mut targets: Vec<LockFileTarget>,
    failures: &[TargetFailure],
    installed: &InstalledMap,
    locked: bool,
) -> LockFile {
    for failure in failures {
        if let Some(target) = targets.iter_mut().find(|t| t.key() == failure.target) {
            target.diagnostics = failure
                .errors
                .iter()
                .map(|e| e.to_diagnostic().annotation())
                .collect();
        }
    }

    let mut package_libraries: Vec<LockFilePackageLibrary> = installed.values().map(package_library).collect();
    package_libraries.sort_by(|a, b| {
        a.name
            .to_ascii_lowercase()
            .cmp(&b.name.to_ascii_lowercase())
            .then_with(|| cmp_precedence(&a.version, &b.version))
    });

    LockFile {
        locked,
        targets,
        package_libraries,
        project_file_dependency_groups: ProjectFileDependencyGroup::from_project(project),
        ..LockFile::new()
    }
}
