//! Deciding whether a resolved package actually serves a target.
//!
//! The rule, in order:
//! 1. A package that ships no files at all is a meta-package and is
//!    compatible with every framework.
//! 2. Otherwise the target entry must list at least one compile-time or
//!    runtime asset. The `_._` placeholder counts as an asset.
//!
//! Each (framework, runtime) target is judged on its own entry, and the
//! entry's asset lists are authoritative over any other package metadata.

pub mod assets;
pub mod framework;
pub mod runtime;

pub use assets::{select_assets, AssetSelection};
pub use framework::{is_compatible as is_framework_compatible, nearest_framework};
pub use runtime::RuntimeFile;

use crate::lockfile::{LockFilePackageLibrary, LockFileTargetLibrary};

/// Check whether `library`, the target-specific entry for `package`,
/// exposes anything for its target.
pub fn is_compatible(package: &LockFilePackageLibrary, library: &LockFileTargetLibrary) -> bool {
    if package.files.is_empty() {
        return true;
    }

    has_assets(library.compile_time_assemblies.as_deref())
        || has_assets(library.runtime_assemblies.as_deref())
}

fn has_assets(items: Option<&[String]>) -> bool {
    items.is_some_and(|items| !items.is_empty())
}
