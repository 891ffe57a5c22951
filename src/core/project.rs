//! In-workspace projects and their `project.json` manifest.
//!
//! A project lives in a directory named after it and declares
//! project-wide dependencies plus per-framework sections:
//!
//! ```json
//! {
//!   "version": "1.0.0-*",
//!   "dependencies": { "Foo": "1.0.0", "Tool": { "version": "2.0", "type": "build" } },
//!   "frameworks": {
//!     "dnx451": { "frameworkAssemblies": { "System.Xml": "4.0.0.0" } },
//!     "dnxcore50": { "dependencies": { "System.Runtime": "4.0.20-*" } }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use semver::Version;
use serde::Deserialize;

use crate::compat::framework::nearest_framework;
use crate::core::framework::FrameworkName;
use crate::core::library::{
    DependencyKind, LibraryDependency, LibraryRange, LibraryTypes,
};
use crate::core::version::{parse_version_lenient, VersionRange};

/// Project manifest file name.
pub const PROJECT_FILE_NAME: &str = "project.json";

/// The dependency information a project declares for one framework.
#[derive(Debug, Clone, Default)]
pub struct TargetFrameworkInformation {
    /// The declared framework that matched, `None` when nothing did.
    pub framework_name: Option<FrameworkName>,
    pub dependencies: Vec<LibraryDependency>,
}

/// A project in the workspace.
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    version: Version,
    project_dir: PathBuf,
    dependencies: Vec<LibraryDependency>,
    frameworks: Vec<TargetFrameworkInformation>,
    loadable: bool,
}

impl Project {
    /// Create an empty project.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Project {
            name: name.into(),
            version,
            project_dir: PathBuf::new(),
            dependencies: Vec::new(),
            frameworks: Vec::new(),
            loadable: true,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = dir.into();
        self
    }

    pub fn with_dependency(mut self, dependency: LibraryDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Declare a framework and its specific dependencies.
    pub fn with_framework(
        mut self,
        framework: FrameworkName,
        dependencies: Vec<LibraryDependency>,
    ) -> Self {
        self.frameworks.push(TargetFrameworkInformation {
            framework_name: Some(framework),
            dependencies,
        });
        self
    }

    /// Whether the project compiles to an assembly others can load.
    pub fn with_loadable(mut self, loadable: bool) -> Self {
        self.loadable = loadable;
        self
    }

    /// Load `project.json` from a project directory. The directory name is
    /// the project name.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(PROJECT_FILE_NAME);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let name = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("cannot derive a project name from {}", project_dir.display()))?;

        Project::parse(name, &content)
            .map(|p| p.with_dir(project_dir))
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parse `project.json` content.
    pub fn parse(name: &str, content: &str) -> Result<Self> {
        let raw: RawProject = serde_json::from_str(content)?;

        let version = match raw.version.as_deref() {
            None => Version::new(1, 0, 0),
            Some(v) => {
                let base = v.strip_suffix("-*").unwrap_or(v);
                parse_version_lenient(base)
                    .with_context(|| format!("invalid project version `{}`", v))?
            }
        };

        let mut project = Project::new(name, version).with_loadable(raw.loadable.unwrap_or(true));
        project.dependencies = parse_dependencies(&raw.dependencies)?;

        for (key, section) in &raw.frameworks {
            let framework = FrameworkName::parse(key)?;
            let mut dependencies = parse_dependencies(&section.dependencies)?;
            for (assembly, version) in &section.framework_assemblies {
                let range = LibraryRange::framework_reference(assembly.as_str())?
                    .with_version_range(parse_optional_range(version)?);
                dependencies.push(LibraryDependency::new(range));
            }
            project.frameworks.push(TargetFrameworkInformation {
                framework_name: Some(framework),
                dependencies,
            });
        }

        Ok(project)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Path of the manifest backing this project.
    pub fn project_file_path(&self) -> PathBuf {
        self.project_dir.join(PROJECT_FILE_NAME)
    }

    pub fn is_loadable(&self) -> bool {
        self.loadable
    }

    /// Project-wide dependencies.
    pub fn dependencies(&self) -> &[LibraryDependency] {
        &self.dependencies
    }

    /// Every declared framework section.
    pub fn get_target_frameworks(&self) -> &[TargetFrameworkInformation] {
        &self.frameworks
    }

    /// The declared framework section nearest to `framework`. Never fails:
    /// an unmatched framework gets an empty section with no name.
    pub fn get_target_framework(&self, framework: &FrameworkName) -> TargetFrameworkInformation {
        let declared = self.frameworks.iter().filter_map(|f| f.framework_name.as_ref());
        let Some(nearest) = nearest_framework(framework, declared) else {
            return TargetFrameworkInformation::default();
        };

        self.frameworks
            .iter()
            .find(|f| f.framework_name.as_ref() == Some(nearest))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProject {
    version: Option<String>,
    loadable: Option<bool>,
    #[serde(default)]
    dependencies: IndexMap<String, RawDependency>,
    #[serde(default)]
    frameworks: IndexMap<String, RawFramework>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFramework {
    #[serde(default)]
    dependencies: IndexMap<String, RawDependency>,
    #[serde(default)]
    framework_assemblies: IndexMap<String, RawDependency>,
}

/// `"1.0"` or `{ "version": "1.0", "type": "build", "target": "project" }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Simple(String),
    Detailed {
        version: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        target: Option<String>,
    },
}

impl RawDependency {
    fn version(&self) -> Option<&str> {
        match self {
            RawDependency::Simple(v) => Some(v),
            RawDependency::Detailed { version, .. } => version.as_deref(),
        }
    }
}

fn parse_optional_range(raw: &RawDependency) -> Result<Option<VersionRange>> {
    match raw.version() {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => Ok(Some(VersionRange::parse(v)?)),
    }
}

fn parse_dependencies(raw: &IndexMap<String, RawDependency>) -> Result<Vec<LibraryDependency>> {
    let mut dependencies = Vec::with_capacity(raw.len());

    for (name, spec) in raw {
        let mut range = LibraryRange::new(name.as_str())?.with_version_range(parse_optional_range(spec)?);
        let mut kind = DependencyKind::Default;

        if let RawDependency::Detailed { kind: ty, target, .. } = spec {
            match ty.as_deref() {
                None | Some("default") => {}
                Some("build") => kind = DependencyKind::Build,
                Some(other) => bail!("unknown dependency type `{}` for `{}`", other, name),
            }
            match target.as_deref() {
                None => {}
                Some("project") => range = range.with_allowed_types(LibraryTypes::PROJECT),
                Some("package") => range = range.with_allowed_types(LibraryTypes::PACKAGE),
                Some(other) => bail!("unknown dependency target `{}` for `{}`", other, name),
            }
        }

        dependencies.push(LibraryDependency::new(range).with_kind(kind));
    }

    Ok(dependencies)
}

/// Finds in-workspace projects by name.
pub trait ProjectResolver: Send + Sync {
    /// Look up a project by name.
    fn try_resolve_project(&self, name: &str) -> Option<Arc<Project>>;

    /// Directories searched, in order.
    fn search_paths(&self) -> &[PathBuf];
}

/// Resolves `{search_path}/{name}/project.json` on disk, caching loads.
#[derive(Debug)]
pub struct FileSystemProjectResolver {
    search_paths: Vec<PathBuf>,
    cache: RwLock<HashMap<String, Option<Arc<Project>>>>,
}

impl FileSystemProjectResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        FileSystemProjectResolver {
            search_paths,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Search the project's own parent directory, then any extra roots.
    pub fn for_project(project_dir: &Path, extra: &[PathBuf]) -> Self {
        let mut search_paths = Vec::new();
        if let Some(parent) = project_dir.parent() {
            search_paths.push(parent.to_path_buf());
        }
        for path in extra {
            if !search_paths.contains(path) {
                search_paths.push(path.clone());
            }
        }
        FileSystemProjectResolver::new(search_paths)
    }

    fn load_uncached(&self, name: &str) -> Option<Arc<Project>> {
        for root in &self.search_paths {
            let dir = root.join(name);
            if !dir.join(PROJECT_FILE_NAME).is_file() {
                continue;
            }
            match Project::load(&dir) {
                Ok(project) => return Some(Arc::new(project)),
                Err(e) => {
                    tracing::warn!("skipping project at {}: {:#}", dir.display(), e);
                }
            }
        }
        None
    }
}

impl ProjectResolver for FileSystemProjectResolver {
    fn try_resolve_project(&self, name: &str) -> Option<Arc<Project>> {
        let key = name.to_ascii_lowercase();
        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let loaded = self.load_uncached(name);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(key, loaded.clone());
        }
        loaded
    }

    fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}
