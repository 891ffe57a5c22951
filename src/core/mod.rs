//! Core data structures for packwalk.
//!
//! This module contains the value types shared by every stage of a restore:
//! - Versions, version ranges and framework names
//! - Library ranges, identities and resolved descriptions
//! - Projects and package metadata

pub mod framework;
pub mod library;
pub mod package_manifest;
pub mod project;
pub mod version;

pub use framework::FrameworkName;
pub use library::{
    DependencyKind, LibraryDependency, LibraryDescription, LibraryIdentity, LibraryRange,
    LibraryType, LibraryTypes,
};
pub use package_manifest::PackageManifest;
pub use project::{FileSystemProjectResolver, Project, ProjectResolver, TargetFrameworkInformation};
pub use version::VersionRange;
