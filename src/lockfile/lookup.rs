//! Fast package lookups over a loaded lock file.

use std::collections::HashMap;

use semver::Version;

use crate::lockfile::model::{LockFile, LockFilePackageLibrary};

/// Index of a lock file's package libraries by (name, version).
#[derive(Debug, Default)]
pub struct LockFileLookup {
    packages: HashMap<(String, Version), LockFilePackageLibrary>,
}

impl LockFileLookup {
    pub fn new(lock_file: &LockFile) -> Self {
        let packages = lock_file
            .package_libraries
            .iter()
            .map(|p| ((p.name.to_ascii_lowercase(), p.version.clone()), p.clone()))
            .collect();
        LockFileLookup { packages }
    }

    /// Get a package by name (case-insensitive) and exact version.
    pub fn get_package(&self, name: &str, version: &Version) -> Option<&LockFilePackageLibrary> {
        self.packages.get(&(name.to_ascii_lowercase(), version.clone()))
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
