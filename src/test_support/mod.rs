//! Test utilities and in-memory sources for packwalk unit tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use packwalk::test_support::{InMemoryProjectResolver, MemoryFeed};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let feed = MemoryFeed::new("local").package("Foo", "1.0.0", &[("Bar", "1.0")]);
//!     let projects = InMemoryProjectResolver::new(vec![app]).with_search_path("/src");
//!     // Hand both to a GraphWalker...
//! }
//! ```

pub mod fixtures;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use semver::Version;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDependency, LibraryIdentity, LibraryRange, LibraryType};
use crate::core::package_manifest::PackageManifest;
use crate::core::project::{Project, ProjectResolver};
use crate::core::version::{cmp_precedence, parse_version_lenient};
use crate::walk::{RuntimeFile, WalkProvider, WalkProviderMatch};

pub use fixtures::*;

/// Project resolver over a fixed set of projects.
#[derive(Debug, Default)]
pub struct InMemoryProjectResolver {
    projects: HashMap<String, Arc<Project>>,
    search_paths: Vec<PathBuf>,
}

impl InMemoryProjectResolver {
    pub fn new(projects: Vec<Project>) -> Self {
        InMemoryProjectResolver {
            projects: projects
                .into_iter()
                .map(|p| (p.name().to_ascii_lowercase(), Arc::new(p)))
                .collect(),
            search_paths: Vec::new(),
        }
    }

    /// Report `path` as searched.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

impl ProjectResolver for InMemoryProjectResolver {
    fn try_resolve_project(&self, name: &str) -> Option<Arc<Project>> {
        self.projects.get(&name.to_ascii_lowercase()).cloned()
    }

    fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

#[derive(Debug, Clone)]
struct MemoryPackage {
    id: String,
    version: Version,
    dependencies: Vec<(String, String)>,
    files: Vec<(String, Vec<u8>)>,
    listed: bool,
    runtimes: Option<String>,
}

/// A walk provider backed by memory that records every lookup.
#[derive(Debug, Default)]
pub struct MemoryFeed {
    name: String,
    http: bool,
    failing: bool,
    packages: Vec<MemoryPackage>,
    calls: Mutex<Vec<String>>,
}

impl MemoryFeed {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryFeed {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Report this feed as remote.
    pub fn http(mut self) -> Self {
        self.http = true;
        self
    }

    /// Fail every lookup.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Publish a package with the default payload.
    pub fn package(self, id: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let files = default_package_files(id);
        self.push(id, version, dependencies, files)
    }

    /// Publish a package whose payload holds exactly `files`.
    pub fn package_with_files(
        self,
        id: &str,
        version: &str,
        dependencies: &[(&str, &str)],
        files: &[(&str, &[u8])],
    ) -> Self {
        let files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_vec()))
            .collect();
        self.push(id, version, dependencies, files)
    }

    fn push(
        mut self,
        id: &str,
        version: &str,
        dependencies: &[(&str, &str)],
        files: Vec<(String, Vec<u8>)>,
    ) -> Self {
        self.packages.push(MemoryPackage {
            id: id.to_string(),
            version: parse_version_lenient(version).expect("fixture version"),
            dependencies: dependencies
                .iter()
                .map(|(n, r)| (n.to_string(), r.to_string()))
                .collect(),
            files,
            listed: true,
            runtimes: None,
        });
        self
    }

    /// Mark a published version unlisted.
    pub fn unlisted(mut self, id: &str, version: &str) -> Self {
        if let Some(package) = self.find_mut(id, version) {
            package.listed = false;
        }
        self
    }

    /// Ship a runtime graph with a published version.
    pub fn runtime_json(mut self, id: &str, version: &str, json: &str) -> Self {
        if let Some(package) = self.find_mut(id, version) {
            package.runtimes = Some(json.to_string());
        }
        self
    }

    fn find_mut(&mut self, id: &str, version: &str) -> Option<&mut MemoryPackage> {
        let version = parse_version_lenient(version)?;
        self.packages
            .iter_mut()
            .find(|p| p.id.eq_ignore_ascii_case(id) && p.version == version)
    }

    fn get(&self, matched: &WalkProviderMatch) -> Result<&MemoryPackage> {
        self.packages
            .iter()
            .find(|p| {
                p.id.eq_ignore_ascii_case(&matched.library.name) && p.version == matched.library.version
            })
            .with_context(|| format!("{} is not in {}", matched.library, self.name))
    }

    /// How many times `find_library` was asked for `id`.
    pub fn find_calls(&self, id: &str) -> usize {
        let calls = self.calls.lock().expect("calls lock");
        calls.iter().filter(|c| c.eq_ignore_ascii_case(id)).count()
    }
}

#[async_trait]
impl WalkProvider for MemoryFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_http(&self) -> bool {
        self.http
    }

    fn attempted_path(&self) -> String {
        format!("memory://{}/{{name}}", self.name)
    }

    async fn find_library(
        &self,
        range: &LibraryRange,
        _framework: &FrameworkName,
        include_unlisted: bool,
    ) -> Result<Option<WalkProviderMatch>> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(range.name().to_string());

        if self.failing {
            bail!("{} is unavailable", self.name);
        }

        let best = self
            .packages
            .iter()
            .filter(|p| p.id.eq_ignore_ascii_case(range.name()))
            .filter(|p| include_unlisted || p.listed)
            .filter(|p| range.satisfies(&p.version))
            .max_by(|a, b| cmp_precedence(&a.version, &b.version));

        Ok(best.map(|p| WalkProviderMatch {
            library: LibraryIdentity::new(p.id.clone(), p.version.clone(), LibraryType::Package),
            published_version: p.version.to_string(),
            location: format!("memory://{}/{}/{}", self.name, p.id, p.version),
            provider: self.name.clone(),
        }))
    }

    async fn get_dependencies(
        &self,
        matched: &WalkProviderMatch,
        framework: &FrameworkName,
    ) -> Result<Vec<LibraryDependency>> {
        let package = self.get(matched)?;
        let mut manifest = PackageManifest::new(&package.id, &package.version);
        manifest.dependencies = package.dependencies.iter().cloned().collect();
        manifest.dependencies_for(framework)
    }

    async fn get_runtimes(
        &self,
        matched: &WalkProviderMatch,
        _framework: &FrameworkName,
    ) -> Result<Option<RuntimeFile>> {
        match &self.get(matched)?.runtimes {
            Some(json) => Ok(Some(RuntimeFile::parse(json)?)),
            None => Ok(None),
        }
    }

    async fn copy_to(
        &self,
        matched: &WalkProviderMatch,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let package = self.get(matched)?;
        let files: Vec<(&str, &[u8])> = package
            .files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_slice()))
            .collect();
        let payload = tgz(&files);
        destination.write_all(&payload).await?;
        Ok(payload.len() as u64)
    }
}
