//! In-workspace project references.

use std::sync::Arc;

use crate::core::framework::FrameworkName;
use crate::core::library::{
    LibraryDependency, LibraryDescription, LibraryIdentity, LibraryRange, LibraryType,
};
use crate::core::project::{ProjectResolver, PROJECT_FILE_NAME};
use crate::providers::provider::DependencyProvider;

/// Assemblies every desktop framework implicitly references.
pub const IMPLICIT_DESKTOP_REFERENCES: &[&str] =
    &["mscorlib", "System", "System.Core", "Microsoft.CSharp"];

/// Resolves ranges to projects found by a [`ProjectResolver`].
pub struct ProjectDependencyProvider {
    resolver: Arc<dyn ProjectResolver>,
}

impl ProjectDependencyProvider {
    pub fn new(resolver: Arc<dyn ProjectResolver>) -> Self {
        ProjectDependencyProvider { resolver }
    }
}

impl DependencyProvider for ProjectDependencyProvider {
    fn name(&self) -> &str {
        "project"
    }

    fn get_description(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<LibraryDescription> {
        if !range.allows_type(LibraryType::Project) {
            return None;
        }

        let project = self.resolver.try_resolve_project(range.name())?;
        let info = project.get_target_framework(framework);

        let mut dependencies: Vec<LibraryDependency> = project.dependencies().to_vec();
        dependencies.extend(info.dependencies.iter().cloned());

        if framework.is_desktop() {
            for name in IMPLICIT_DESKTOP_REFERENCES {
                if let Ok(reference) = LibraryRange::framework_reference(*name) {
                    dependencies.push(LibraryDependency::new(reference));
                }
            }
        }

        let loadable = if project.is_loadable() {
            vec![project.name().to_string()]
        } else {
            Vec::new()
        };

        // Declared frameworks, none of which serve this one.
        let unresolved =
            info.framework_name.is_none() && !project.get_target_frameworks().is_empty();

        if unresolved {
            tracing::debug!("project {} does not support {}", project.name(), framework);
        }

        let identity = LibraryIdentity::new(
            project.name(),
            project.version().clone(),
            LibraryType::Project,
        );

        Some(
            LibraryDescription::new(range.clone(), identity)
                .with_path(project.project_file_path())
                .with_dependencies(dependencies)
                .with_loadable_assemblies(loadable)
                .with_resolved(!unresolved),
        )
    }

    fn get_attempted_paths(&self, _framework: &FrameworkName) -> Vec<String> {
        self.resolver
            .search_paths()
            .iter()
            .map(|p| p.join("{name}").join(PROJECT_FILE_NAME).display().to_string())
            .collect()
    }
}
