//! Package metadata (`{id}.json`) published next to each package payload.
//!
//! ```json
//! {
//!   "id": "Foo",
//!   "version": "1.0.0",
//!   "dependencies": { "Bar": "1.0" },
//!   "dependencyGroups": { "dnxcore50": { "System.Runtime": "4.0.20" } },
//!   "frameworkAssemblies": { "net45": { "System.Xml": "4.0.0.0" } }
//! }
//! ```

use anyhow::{Context, Result};
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::compat::framework::nearest_framework;
use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDependency, LibraryRange};
use crate::core::version::{parse_version_lenient, VersionRange};

/// Metadata for one package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependencies: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dependency_groups: IndexMap<String, IndexMap<String, String>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub framework_assemblies: IndexMap<String, IndexMap<String, String>>,
}

impl PackageManifest {
    pub fn new(id: impl Into<String>, version: &Version) -> Self {
        PackageManifest {
            id: id.into(),
            version: version.to_string(),
            dependencies: IndexMap::new(),
            dependency_groups: IndexMap::new(),
            framework_assemblies: IndexMap::new(),
        }
    }

    /// Parse metadata JSON.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid package metadata")
    }

    /// The package version.
    pub fn parsed_version(&self) -> Result<Version> {
        parse_version_lenient(&self.version)
            .with_context(|| format!("invalid version `{}` in metadata for {}", self.version, self.id))
    }

    /// Dependencies that apply to `framework`: the common set, then the
    /// nearest framework group, then the nearest framework assemblies.
    pub fn dependencies_for(&self, framework: &FrameworkName) -> Result<Vec<LibraryDependency>> {
        let mut result = to_dependencies(&self.dependencies, false)?;

        if let Some(group) = nearest_group(&self.dependency_groups, framework)? {
            result.extend(to_dependencies(group, false)?);
        }
        if let Some(group) = nearest_group(&self.framework_assemblies, framework)? {
            result.extend(to_dependencies(group, true)?);
        }

        Ok(result)
    }
}

fn nearest_group<'a>(
    groups: &'a IndexMap<String, IndexMap<String, String>>,
    framework: &FrameworkName,
) -> Result<Option<&'a IndexMap<String, String>>> {
    let parsed = groups
        .iter()
        .map(|(key, group)| -> Result<_> { Ok((FrameworkName::parse(key)?, group)) })
        .collect::<Result<Vec<_>>>()?;

    let nearest = nearest_framework(framework, parsed.iter().map(|(fx, _)| fx));
    Ok(nearest.and_then(|n| parsed.iter().find(|(fx, _)| fx == n).map(|(_, g)| *g)))
}

fn to_dependencies(
    entries: &IndexMap<String, String>,
    framework_reference: bool,
) -> Result<Vec<LibraryDependency>> {
    entries
        .iter()
        .map(|(name, range)| -> Result<LibraryDependency> {
            let range_value = if range.trim().is_empty() {
                None
            } else {
                Some(VersionRange::parse(range)?)
            };
            let library = if framework_reference {
                LibraryRange::framework_reference(name.as_str())?
            } else {
                LibraryRange::new(name.as_str())?
            };
            Ok(LibraryDependency::new(library.with_version_range(range_value)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "Foo",
        "version": "1.0.0",
        "dependencies": { "Bar": "1.0" },
        "dependencyGroups": {
            "dnxcore50": { "System.Runtime": "4.0.20" },
            "net45": { "Legacy": "2.0" }
        },
        "frameworkAssemblies": { "net45": { "System.Xml": "4.0.0.0" } }
    }"#;

    #[test]
    fn test_dependencies_for_core() {
        let manifest = PackageManifest::parse(SAMPLE).unwrap();
        let deps = manifest
            .dependencies_for(&FrameworkName::parse("dnxcore50").unwrap())
            .unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Bar", "System.Runtime"]);
    }

    #[test]
    fn test_dependencies_for_desktop_uses_nearest_group() {
        let manifest = PackageManifest::parse(SAMPLE).unwrap();
        let deps = manifest
            .dependencies_for(&FrameworkName::parse("dnx451").unwrap())
            .unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Bar", "Legacy", "System.Xml"]);
        assert!(deps[2].range.is_framework_reference());
    }
}
