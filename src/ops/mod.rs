//! High-level operations.
//!
//! This module contains the implementation of packwalk commands.

pub mod install;
pub mod lockfile;
pub mod restore;

pub use install::{install_package, installed_package, InstalledPackage};
pub use lockfile::{load_lockfile, lock_path, reusable_lockfile, save_lockfile};
pub use restore::{find_projects, restore, RestoreOptions, RestoreResult, TargetFailure};
