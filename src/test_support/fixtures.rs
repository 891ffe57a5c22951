//! Test fixtures for common test scenarios.
//!
//! This module writes projects and package feeds to disk in the layouts
//! the restore engine reads.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use semver::Version;

use crate::core::package_manifest::PackageManifest;
use crate::core::project::PROJECT_FILE_NAME;
use crate::core::version::parse_version_lenient;
use crate::walk::{
    metadata_file_name, payload_file_name, FeedIndex, FeedIndexEntry, INDEX_FILE_NAME,
    RUNTIME_FILE_NAME,
};

/// Fixture for a `project.json` project.
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    /// Project name, also the directory name.
    pub name: String,
    pub version: String,
    /// Dependencies (name -> range).
    pub dependencies: Vec<(String, String)>,
    /// Target framework folder names, with their framework assemblies.
    pub frameworks: Vec<(String, Vec<String>)>,
}

impl ProjectFixture {
    /// Create a project targeting dnx451 and dnxcore50.
    pub fn new(name: impl Into<String>) -> Self {
        ProjectFixture {
            name: name.into(),
            version: "1.0.0-*".to_string(),
            dependencies: Vec::new(),
            frameworks: vec![
                ("dnx451".to_string(), Vec::new()),
                ("dnxcore50".to_string(), Vec::new()),
            ],
        }
    }

    /// Add a dependency.
    pub fn with_dependency(mut self, name: impl Into<String>, range: impl Into<String>) -> Self {
        self.dependencies.push((name.into(), range.into()));
        self
    }

    /// Replace the target frameworks.
    pub fn with_frameworks(mut self, frameworks: &[&str]) -> Self {
        self.frameworks = frameworks
            .iter()
            .map(|f| (f.to_string(), Vec::new()))
            .collect();
        self
    }

    /// Add a framework assembly to one target framework.
    pub fn with_framework_assembly(mut self, framework: &str, assembly: &str) -> Self {
        if let Some((_, assemblies)) = self.frameworks.iter_mut().find(|(f, _)| f == framework) {
            assemblies.push(assembly.to_string());
        }
        self
    }

    /// Render `project.json`.
    pub fn to_json(&self) -> String {
        let dependencies: IndexMap<_, _> = self.dependencies.iter().cloned().collect();
        let frameworks: serde_json::Map<String, serde_json::Value> = self
            .frameworks
            .iter()
            .map(|(name, assemblies)| {
                let assemblies: IndexMap<_, _> =
                    assemblies.iter().map(|a| (a.clone(), String::new())).collect();
                (
                    name.clone(),
                    serde_json::json!({ "frameworkAssemblies": assemblies }),
                )
            })
            .collect();

        let value = serde_json::json!({
            "version": self.version,
            "dependencies": dependencies,
            "frameworks": frameworks,
        });
        serde_json::to_string_pretty(&value).expect("project fixture serializes")
    }

    /// Write `{base}/{name}/project.json`, returning the project directory.
    pub fn write_to(&self, base_path: &Path) -> std::io::Result<PathBuf> {
        let project_dir = base_path.join(&self.name);
        std::fs::create_dir_all(&project_dir)?;
        std::fs::write(project_dir.join(PROJECT_FILE_NAME), self.to_json())?;
        Ok(project_dir)
    }
}

/// Gzipped tarball containing `files`.
pub fn tgz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path, *content)
            .expect("tar entry");
    }
    let mut encoder = builder.into_inner().expect("tar stream");
    encoder.flush().expect("flush gzip");
    encoder.finish().expect("gzip payload")
}

/// Files a fixture package ships when none are given.
pub fn default_package_files(id: &str) -> Vec<(String, Vec<u8>)> {
    vec![
        (format!("lib/dnx451/{}.dll", id), b"MZ".to_vec()),
        (format!("lib/dnxcore50/{}.dll", id), b"MZ".to_vec()),
    ]
}

/// Builds a feed directory in the shared feed layout.
#[derive(Debug, Clone)]
pub struct FeedBuilder {
    root: PathBuf,
}

impl FeedBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        std::fs::create_dir_all(&root).expect("create feed root");
        FeedBuilder { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publish a package with the default payload.
    pub fn package(self, id: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let files = default_package_files(id);
        let files: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_slice()))
            .collect();
        self.package_with_files(id, version, dependencies, &files)
    }

    /// Publish a package whose payload holds exactly `files`.
    pub fn package_with_files(
        self,
        id: &str,
        version: &str,
        dependencies: &[(&str, &str)],
        files: &[(&str, &[u8])],
    ) -> Self {
        let parsed = parse_version_lenient(version).expect("fixture version");
        let dir = self.version_dir(id, &parsed);
        std::fs::create_dir_all(&dir).expect("create version dir");

        let mut manifest = PackageManifest::new(id, &parsed);
        for (name, range) in dependencies {
            manifest.dependencies.insert(name.to_string(), range.to_string());
        }
        let metadata = serde_json::to_string_pretty(&manifest).expect("metadata serializes");
        std::fs::write(dir.join(metadata_file_name(id)), metadata).expect("write metadata");
        std::fs::write(dir.join(payload_file_name(id, &parsed)), tgz(files)).expect("write payload");

        // An existing index must list the new version too.
        let index_path = self.root.join(id).join(INDEX_FILE_NAME);
        if index_path.is_file() {
            let mut index = self.read_index(id);
            if !index.versions.iter().any(|e| e.version == parsed) {
                index.versions.push(FeedIndexEntry::new(parsed, true));
            }
            self.write_index(id, &index);
        }
        self
    }

    /// Mark a published version unlisted.
    pub fn unlisted(self, id: &str, version: &str) -> Self {
        let parsed = parse_version_lenient(version).expect("fixture version");
        let mut index = self.read_index(id);
        for entry in &mut index.versions {
            if entry.version == parsed {
                entry.listed = false;
            }
        }
        self.write_index(id, &index);
        self
    }

    /// Ship a runtime graph with a published version.
    pub fn runtime_json(self, id: &str, version: &str, json: &str) -> Self {
        let parsed = parse_version_lenient(version).expect("fixture version");
        std::fs::write(self.version_dir(id, &parsed).join(RUNTIME_FILE_NAME), json)
            .expect("write runtime.json");
        self
    }

    fn version_dir(&self, id: &str, version: &Version) -> PathBuf {
        self.root.join(id).join(version.to_string())
    }

    fn read_index(&self, id: &str) -> FeedIndex {
        let package_dir = self.root.join(id);
        if let Ok(content) = std::fs::read_to_string(package_dir.join(INDEX_FILE_NAME)) {
            return serde_json::from_str(&content).expect("fixture index parses");
        }

        let mut index = FeedIndex {
            id: Some(id.to_string()),
            ..FeedIndex::default()
        };
        for entry in std::fs::read_dir(&package_dir).expect("package dir exists").flatten() {
            if let Some(version) = entry.file_name().to_str().and_then(FeedIndexEntry::from_folder) {
                index.versions.push(version);
            }
        }
        index
    }

    fn write_index(&self, id: &str, index: &FeedIndex) {
        let content = serde_json::to_string_pretty(index).expect("index serializes");
        std::fs::write(self.root.join(id).join(INDEX_FILE_NAME), content).expect("write index");
    }
}

/// Canned `runtime.json` documents.
pub mod runtimes {
    /// win7-x64 importing win7 importing win, with a native package for
    /// `package` on win.
    pub fn windows_with_native(package: &str, native: &str, range: &str) -> String {
        format!(
            r##"{{"runtimes":{{
                "win":{{"{package}":{{"{native}":"{range}"}}}},
                "win7":{{"#import":["win"]}},
                "win7-x64":{{"#import":["win7"]}}
            }}}}"##
        )
    }
}
