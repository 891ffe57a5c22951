//! The last provider in every chain.

use std::sync::Arc;

use semver::Version;

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDescription, LibraryIdentity, LibraryRange, LibraryType};
use crate::providers::provider::DependencyProvider;

/// Always answers, with an unresolved leaf listing everywhere the other
/// providers looked.
pub struct UnresolvedDependencyProvider {
    sources: Vec<Arc<dyn DependencyProvider>>,
    extra_paths: Vec<String>,
}

impl UnresolvedDependencyProvider {
    /// Aggregate the attempted paths of `sources`.
    pub fn new(sources: Vec<Arc<dyn DependencyProvider>>) -> Self {
        UnresolvedDependencyProvider {
            sources,
            extra_paths: Vec::new(),
        }
    }

    /// Add locations searched outside the provider chain (package feeds).
    pub fn with_extra_paths(mut self, paths: Vec<String>) -> Self {
        self.extra_paths = paths;
        self
    }
}

impl DependencyProvider for UnresolvedDependencyProvider {
    fn name(&self) -> &str {
        "unresolved"
    }

    fn get_description(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<LibraryDescription> {
        let version = range
            .version_range()
            .and_then(|r| r.min().cloned())
            .unwrap_or_else(|| Version::new(0, 0, 0));
        let identity = LibraryIdentity::new(range.name(), version, LibraryType::Unresolved);

        let attempted = self
            .get_attempted_paths(framework)
            .into_iter()
            .map(|p| p.replace("{name}", range.name()))
            .collect();

        Some(
            LibraryDescription::new(range.clone(), identity)
                .with_resolved(false)
                .with_compatible(false)
                .with_attempted_paths(attempted),
        )
    }

    fn get_attempted_paths(&self, framework: &FrameworkName) -> Vec<String> {
        self.sources
            .iter()
            .flat_map(|s| s.get_attempted_paths(framework))
            .chain(self.extra_paths.iter().cloned())
            .collect()
    }
}
