//! `project.lock.json` encoding and decoding.
//!
//! The lock file is the persisted record of a restore: one target per
//! (framework, runtime) pair listing the chosen libraries and their assets,
//! plus one framework-independent entry per package with its file list.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::framework::FrameworkName;
use crate::core::project::Project;

/// Canonical lock file name, next to `project.json`.
pub const LOCKFILE_NAME: &str = "project.lock.json";

/// Current lock file format version.
pub const LOCKFILE_FORMAT_VERSION: u32 = 1;

/// Sentinel asset meaning "intentionally no assembly for this framework".
pub const PLACEHOLDER_FILE_NAME: &str = "_._";

/// Structural problems in a lock file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockFileError {
    #[error("lock file version {0} is not supported (expected {LOCKFILE_FORMAT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("duplicate target `{0}`")]
    DuplicateTarget(String),

    #[error("duplicate library `{name}` in target `{target}`")]
    DuplicateLibrary { target: String, name: String },

    #[error("duplicate package library `{name} {version}`")]
    DuplicatePackage { name: String, version: Version },
}

/// The root lock file document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFile {
    /// A locked file is reused as-is while it stays valid for the project.
    #[serde(default)]
    pub locked: bool,

    pub version: u32,

    #[serde(default)]
    pub targets: Vec<LockFileTarget>,

    #[serde(default)]
    pub package_libraries: Vec<LockFilePackageLibrary>,

    /// The project's declared dependencies at the time of the restore.
    #[serde(default)]
    pub project_file_dependency_groups: Vec<ProjectFileDependencyGroup>,
}

/// Libraries resolved for one (framework, runtime) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFileTarget {
    pub target_framework: FrameworkName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_identifier: Option<String>,

    #[serde(default)]
    pub libraries: Vec<LockFileTargetLibrary>,

    /// Failures tolerated by a partial restore.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

/// One library within a target.
///
/// `None` asset lists mean "no information"; `Some(vec![])` means the
/// package was inspected and has nothing for this framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFileTargetLibrary {
    pub name: String,

    pub version: Version,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub framework_assemblies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile_time_assemblies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_assemblies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_libraries: Option<Vec<String>>,
}

/// A package identity with every file it ships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFilePackageLibrary {
    pub name: String,

    pub version: Version,

    /// SHA-512 of the package payload, hex encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,

    #[serde(default)]
    pub files: Vec<String>,
}

/// Declared dependencies for one framework section (`""` for project-wide).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFileDependencyGroup {
    pub framework_name: String,
    pub dependencies: Vec<String>,
}

impl ProjectFileDependencyGroup {
    /// Snapshot a project's declared dependencies.
    pub fn from_project(project: &Project) -> Vec<Self> {
        let mut groups = vec![ProjectFileDependencyGroup {
            framework_name: String::new(),
            dependencies: project.dependencies().iter().map(|d| d.range.to_string()).collect(),
        }];

        for info in project.get_target_frameworks() {
            if let Some(framework) = &info.framework_name {
                groups.push(ProjectFileDependencyGroup {
                    framework_name: framework.to_string(),
                    dependencies: info.dependencies.iter().map(|d| d.range.to_string()).collect(),
                });
            }
        }

        groups
    }
}

impl LockFileTarget {
    pub fn new(target_framework: FrameworkName, runtime_identifier: Option<String>) -> Self {
        LockFileTarget {
            target_framework,
            runtime_identifier,
            libraries: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Display key, e.g. `DNX,Version=v4.5.1/win7-x86`.
    pub fn key(&self) -> String {
        match &self.runtime_identifier {
            Some(rid) => format!("{}/{}", self.target_framework, rid),
            None => self.target_framework.to_string(),
        }
    }

    /// Find a library by name (case-insensitive).
    pub fn library(&self, name: &str) -> Option<&LockFileTargetLibrary> {
        self.libraries.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

impl LockFileTargetLibrary {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        LockFileTargetLibrary {
            name: name.into(),
            version,
            dependencies: BTreeMap::new(),
            framework_assemblies: Vec::new(),
            compile_time_assemblies: None,
            runtime_assemblies: None,
            native_libraries: None,
        }
    }
}

impl LockFilePackageLibrary {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        LockFilePackageLibrary {
            name: name.into(),
            version,
            sha: None,
            files: Vec::new(),
        }
    }
}

impl Default for LockFile {
    fn default() -> Self {
        LockFile {
            locked: false,
            version: LOCKFILE_FORMAT_VERSION,
            targets: Vec::new(),
            package_libraries: Vec::new(),
            project_file_dependency_groups: Vec::new(),
        }
    }
}

impl LockFile {
    /// Create an empty lock file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a lock file from a path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read lock file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("failed to parse lock file: {}", path.display()))
    }

    /// Parse lock file JSON.
    pub fn parse(content: &str) -> Result<Self> {
        let lock: LockFile = serde_json::from_str(content)?;
        Ok(lock)
    }

    /// Render as pretty JSON with a trailing newline.
    pub fn to_json_string(&self) -> Result<String> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        Ok(content)
    }

    /// Save the lock file to a path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_json_string()?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write lock file: {}", path.display()))?;
        Ok(())
    }

    /// Find the target for a (framework, runtime) pair.
    pub fn get_target(
        &self,
        framework: &FrameworkName,
        runtime_identifier: Option<&str>,
    ) -> Option<&LockFileTarget> {
        self.targets.iter().find(|t| {
            &t.target_framework == framework && t.runtime_identifier.as_deref() == runtime_identifier
        })
    }

    /// Find a package library by name and exact version.
    pub fn get_package(&self, name: &str, version: &Version) -> Option<&LockFilePackageLibrary> {
        self.package_libraries
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name) && &p.version == version)
    }

    /// Check the structural invariants: supported version, unique target
    /// keys, unique library names per target, unique package identities.
    pub fn validate(&self) -> Result<(), LockFileError> {
        if self.version != LOCKFILE_FORMAT_VERSION {
            return Err(LockFileError::UnsupportedVersion(self.version));
        }

        let mut target_keys = HashSet::new();
        for target in &self.targets {
            let key = target.key();
            if !target_keys.insert(key.clone()) {
                return Err(LockFileError::DuplicateTarget(key));
            }

            let mut names = HashSet::new();
            for library in &target.libraries {
                if !names.insert(library.name.to_ascii_lowercase()) {
                    return Err(LockFileError::DuplicateLibrary {
                        target: key,
                        name: library.name.clone(),
                    });
                }
            }
        }

        let mut packages = HashSet::new();
        for package in &self.package_libraries {
            if !packages.insert((package.name.to_ascii_lowercase(), package.version.clone())) {
                return Err(LockFileError::DuplicatePackage {
                    name: package.name.clone(),
                    version: package.version.clone(),
                });
            }
        }

        Ok(())
    }

    /// Whether this lock file was produced from the project's current
    /// dependency declarations.
    pub fn is_valid_for(&self, project: &Project) -> bool {
        self.version == LOCKFILE_FORMAT_VERSION
            && self.project_file_dependency_groups == ProjectFileDependencyGroup::from_project(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> LockFile {
        let mut lib = LockFileTargetLibrary::new("Foo", Version::new(1, 0, 0));
        lib.compile_time_assemblies = Some(vec!["lib/dnx451/Foo.dll".to_string()]);
        lib.runtime_assemblies = Some(vec!["lib/dnx451/Foo.dll".to_string()]);
        lib.dependencies.insert("Bar".to_string(), ">= 1.0.0".to_string());

        let mut target = LockFileTarget::new(FrameworkName::parse("dnx451").unwrap(), None);
        target.libraries.push(lib);
        target.libraries.push(LockFileTargetLibrary::new("Meta", Version::new(2, 0, 0)));

        let mut package = LockFilePackageLibrary::new("Foo", Version::new(1, 0, 0));
        package.sha = Some("abcd".to_string());
        package.files = vec!["lib/dnx451/Foo.dll".to_string()];

        LockFile {
            targets: vec![target],
            package_libraries: vec![package],
            ..LockFile::new()
        }
    }

    #[test]
    fn test_json_roundtrip_preserves_absent_assets() {
        let lock = sample();
        let json = lock.to_json_string().unwrap();
        assert!(json.contains("\"targetFramework\": \"DNX,Version=v4.5.1\""));
        assert!(json.contains("\"packageLibraries\""));

        let parsed = LockFile::parse(&json).unwrap();
        assert_eq!(parsed, lock);

        let meta = parsed.targets[0].library("meta").unwrap();
        assert!(meta.compile_time_assemblies.is_none());
        assert!(meta.runtime_assemblies.is_none());
    }

    #[test]
    fn test_empty_asset_list_survives_roundtrip() {
        let mut lock = sample();
        lock.targets[0].libraries[1].compile_time_assemblies = Some(Vec::new());
        let parsed = LockFile::parse(&lock.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed.targets[0].libraries[1].compile_time_assemblies, Some(Vec::new()));
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCKFILE_NAME);
        let lock = sample();
        lock.save(&path).unwrap();
        assert_eq!(LockFile::load(&path).unwrap(), lock);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut lock = sample();
        assert!(lock.validate().is_ok());

        lock.targets[0]
            .libraries
            .push(LockFileTargetLibrary::new("FOO", Version::new(1, 0, 0)));
        assert!(matches!(lock.validate(), Err(LockFileError::DuplicateLibrary { .. })));

        let mut lock = sample();
        let target = lock.targets[0].clone();
        lock.targets.push(target);
        assert!(matches!(lock.validate(), Err(LockFileError::DuplicateTarget(_))));

        let mut lock = sample();
        lock.version = 99;
        assert_eq!(lock.validate(), Err(LockFileError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_get_target_by_runtime() {
        let mut lock = sample();
        let dnx451 = FrameworkName::parse("dnx451").unwrap();
        lock.targets
            .push(LockFileTarget::new(dnx451.clone(), Some("win7-x64".to_string())));

        assert!(lock.get_target(&dnx451, None).is_some());
        assert_eq!(
            lock.get_target(&dnx451, Some("win7-x64")).unwrap().key(),
            "DNX,Version=v4.5.1/win7-x64"
        );
        assert!(lock.get_target(&dnx451, Some("osx.10.10-x64")).is_none());
    }

    #[test]
    fn test_is_valid_for_project() {
        let project = Project::parse("App", r#"{ "dependencies": { "Foo": "1.0" }, "frameworks": { "dnx451": {} } }"#)
            .unwrap();
        let mut lock = sample();
        assert!(!lock.is_valid_for(&project));

        lock.project_file_dependency_groups = ProjectFileDependencyGroup::from_project(&project);
        assert!(lock.is_valid_for(&project));
        assert_eq!(lock.project_file_dependency_groups[0].dependencies, vec!["Foo >= 1.0.0"]);
    }
}
