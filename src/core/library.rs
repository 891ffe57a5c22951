//! Library identity, ranges and resolved descriptions.
//!
//! A `LibraryRange` is what a project or package asks for; a
//! `LibraryDescription` is what a provider answers with.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::version::VersionRange;

/// The kind of source a library resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    Project,
    Package,
    Reference,
    Unresolved,
}

impl LibraryType {
    fn bit(self) -> u8 {
        match self {
            LibraryType::Project => 1,
            LibraryType::Package => 1 << 1,
            LibraryType::Reference => 1 << 2,
            LibraryType::Unresolved => 1 << 3,
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryType::Project => write!(f, "project"),
            LibraryType::Package => write!(f, "package"),
            LibraryType::Reference => write!(f, "reference"),
            LibraryType::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// A set of library types a range may resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryTypes(u8);

impl LibraryTypes {
    pub const PROJECT: LibraryTypes = LibraryTypes(1);
    pub const PACKAGE: LibraryTypes = LibraryTypes(1 << 1);
    pub const REFERENCE: LibraryTypes = LibraryTypes(1 << 2);
    pub const UNRESOLVED: LibraryTypes = LibraryTypes(1 << 3);
    pub const ALL: LibraryTypes = LibraryTypes(0b1111);

    /// Framework references and GAC assemblies share one source kind.
    pub const GAC_OR_FRAMEWORK_REFERENCE: LibraryTypes = LibraryTypes::REFERENCE;

    /// Check membership.
    pub fn contains(self, ty: LibraryType) -> bool {
        self.0 & ty.bit() != 0
    }
}

impl Default for LibraryTypes {
    fn default() -> Self {
        LibraryTypes::ALL
    }
}

impl BitOr for LibraryTypes {
    type Output = LibraryTypes;

    fn bitor(self, rhs: Self) -> Self::Output {
        LibraryTypes(self.0 | rhs.0)
    }
}

impl BitOrAssign for LibraryTypes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<LibraryType> for LibraryTypes {
    fn from(ty: LibraryType) -> Self {
        LibraryTypes(ty.bit())
    }
}

/// Invalid library range construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LibraryRangeError {
    #[error("library name cannot be empty")]
    EmptyName,
}

/// A request for a library: a name, an optional version constraint and the
/// source kinds allowed to satisfy it.
///
/// Names compare case-insensitively.
#[derive(Debug, Clone)]
pub struct LibraryRange {
    name: String,
    version_range: Option<VersionRange>,
    allowed_types: LibraryTypes,
    is_framework_reference: bool,
}

impl LibraryRange {
    /// Create a range accepting any version from any source.
    pub fn new(name: impl Into<String>) -> Result<Self, LibraryRangeError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LibraryRangeError::EmptyName);
        }
        Ok(LibraryRange {
            name,
            version_range: None,
            allowed_types: LibraryTypes::ALL,
            is_framework_reference: false,
        })
    }

    /// Create a framework reference range; only reference sources may match.
    pub fn framework_reference(name: impl Into<String>) -> Result<Self, LibraryRangeError> {
        Ok(LibraryRange::new(name)?
            .with_allowed_types(LibraryTypes::GAC_OR_FRAMEWORK_REFERENCE)
            .with_framework_reference(true))
    }

    /// Constrain the acceptable versions.
    pub fn with_version_range(mut self, range: Option<VersionRange>) -> Self {
        self.version_range = range.filter(|r| !r.is_any());
        self
    }

    /// Constrain the acceptable source kinds.
    pub fn with_allowed_types(mut self, types: LibraryTypes) -> Self {
        self.allowed_types = types;
        self
    }

    /// Mark this as a framework reference.
    pub fn with_framework_reference(mut self, is_framework_reference: bool) -> Self {
        self.is_framework_reference = is_framework_reference;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_range(&self) -> Option<&VersionRange> {
        self.version_range.as_ref()
    }

    pub fn allowed_types(&self) -> LibraryTypes {
        self.allowed_types
    }

    pub fn is_framework_reference(&self) -> bool {
        self.is_framework_reference
    }

    /// Check whether a source kind may satisfy this range.
    pub fn allows_type(&self, ty: LibraryType) -> bool {
        self.allowed_types.contains(ty)
    }

    /// Check whether an exact version satisfies this range.
    pub fn satisfies(&self, version: &Version) -> bool {
        self.version_range
            .as_ref()
            .map_or(true, |range| range.satisfies(version))
    }
}

impl PartialEq for LibraryRange {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version_range == other.version_range
            && self.allowed_types == other.allowed_types
            && self.is_framework_reference == other.is_framework_reference
    }
}

impl Eq for LibraryRange {}

impl Hash for LibraryRange {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.version_range.hash(state);
        self.allowed_types.hash(state);
        self.is_framework_reference.hash(state);
    }
}

impl fmt::Display for LibraryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_range {
            Some(range) => write!(f, "{} {}", self.name, range),
            None => write!(f, "{}", self.name),
        }
    }
}

/// The resolved identity of a library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIdentity {
    pub name: String,
    pub version: Version,
    #[serde(rename = "type")]
    pub ty: LibraryType,
}

impl LibraryIdentity {
    pub fn new(name: impl Into<String>, version: Version, ty: LibraryType) -> Self {
        LibraryIdentity {
            name: name.into(),
            version,
            ty,
        }
    }
}

impl PartialEq for LibraryIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version == other.version
            && self.ty == other.ty
    }
}

impl Eq for LibraryIdentity {}

impl Hash for LibraryIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.version.hash(state);
        self.ty.hash(state);
    }
}

impl fmt::Display for LibraryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// How a dependency is consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Must produce a loadable assembly at runtime.
    #[default]
    Default,
    /// Needed only while building.
    Build,
}

/// A dependency declared by a library.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryDependency {
    pub range: LibraryRange,
    pub kind: DependencyKind,
}

impl LibraryDependency {
    pub fn new(range: LibraryRange) -> Self {
        LibraryDependency {
            range,
            kind: DependencyKind::Default,
        }
    }

    pub fn with_kind(mut self, kind: DependencyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn name(&self) -> &str {
        self.range.name()
    }
}

impl From<LibraryRange> for LibraryDependency {
    fn from(range: LibraryRange) -> Self {
        LibraryDependency::new(range)
    }
}

/// A library a provider matched, with everything the walker needs to keep
/// going. Never mutated once built.
#[derive(Debug, Clone)]
pub struct LibraryDescription {
    pub range: LibraryRange,
    pub identity: LibraryIdentity,
    pub path: Option<PathBuf>,
    pub dependencies: Vec<LibraryDependency>,
    /// False when the library was found but a framework-specific part of it
    /// could not be resolved.
    pub resolved: bool,
    /// Whether the chosen artifact exposes assets for the framework.
    pub compatible: bool,
    pub loadable_assemblies: Vec<String>,
    /// Where providers looked, for unresolved leaves.
    pub attempted_paths: Vec<String>,
}

impl LibraryDescription {
    /// A resolved, compatible description with no dependencies.
    pub fn new(range: LibraryRange, identity: LibraryIdentity) -> Self {
        LibraryDescription {
            range,
            identity,
            path: None,
            dependencies: Vec::new(),
            resolved: true,
            compatible: true,
            loadable_assemblies: Vec::new(),
            attempted_paths: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<LibraryDependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_resolved(mut self, resolved: bool) -> Self {
        self.resolved = resolved;
        self
    }

    pub fn with_compatible(mut self, compatible: bool) -> Self {
        self.compatible = compatible;
        self
    }

    pub fn with_loadable_assemblies(mut self, assemblies: Vec<String>) -> Self {
        self.loadable_assemblies = assemblies;
        self
    }

    pub fn with_attempted_paths(mut self, paths: Vec<String>) -> Self {
        self.attempted_paths = paths;
        self
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn version(&self) -> &Version {
        &self.identity.version
    }

    pub fn library_type(&self) -> LibraryType {
        self.identity.ty
    }

    pub fn is_unresolved(&self) -> bool {
        self.identity.ty == LibraryType::Unresolved || !self.resolved
    }
}
