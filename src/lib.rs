//! packwalk - a package restore engine
//!
//! This crate resolves a project's dependencies across in-workspace
//! projects, package feeds and platform assemblies, decides which assets
//! serve each target framework and runtime, and records the outcome in a
//! `project.lock.json` lock file.

pub mod compat;
pub mod core;
pub mod lockfile;
pub mod ops;
pub mod providers;
pub mod resolver;
pub mod util;
pub mod walk;

/// Test utilities for packwalk unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides in-memory projects and feeds, and writes
/// projects and feeds to disk.
#[cfg(test)]
pub mod test_support;

pub use core::{
    framework::FrameworkName,
    library::{LibraryDependency, LibraryDescription, LibraryIdentity, LibraryRange, LibraryType},
    project::Project,
    version::VersionRange,
};

pub use lockfile::LockFile;
pub use resolver::GraphWalker;
pub use util::context::GlobalContext;
