//! Packages already restored and recorded in a lock file.

use std::path::{Path, PathBuf};

use crate::compat;
use crate::core::framework::FrameworkName;
use crate::core::library::{
    LibraryDependency, LibraryDescription, LibraryIdentity, LibraryRange, LibraryType,
};
use crate::core::version::VersionRange;
use crate::lockfile::{
    LockFile, LockFileLookup, LockFilePackageLibrary, LockFileTarget, LockFileTargetLibrary,
    PLACEHOLDER_FILE_NAME,
};
use crate::providers::provider::DependencyProvider;

/// Resolves package ranges from the targets of a previous restore.
pub struct PackageDependencyProvider {
    packages_dir: PathBuf,
    targets: Vec<LockFileTarget>,
    lookup: LockFileLookup,
    runtime_identifier: Option<String>,
}

impl PackageDependencyProvider {
    pub fn new(packages_dir: impl Into<PathBuf>, lock_file: &LockFile) -> Self {
        PackageDependencyProvider {
            packages_dir: packages_dir.into(),
            targets: lock_file.targets.clone(),
            lookup: LockFileLookup::new(lock_file),
            runtime_identifier: None,
        }
    }

    /// Read the runtime-specific target instead of the framework-only one.
    pub fn with_runtime(mut self, runtime_identifier: impl Into<String>) -> Self {
        self.runtime_identifier = Some(runtime_identifier.into());
        self
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Install location of a package.
    pub fn package_path(&self, name: &str, version: &semver::Version) -> PathBuf {
        self.packages_dir.join(name).join(version.to_string())
    }

    /// Describe a target entry of `package`.
    pub fn describe(
        &self,
        range: LibraryRange,
        package: &LockFilePackageLibrary,
        library: &LockFileTargetLibrary,
    ) -> LibraryDescription {
        let mut dependencies = Vec::new();
        for (name, spec) in &library.dependencies {
            let version_range = match VersionRange::parse(spec) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!("ignoring dependency {} of {}: {}", name, package.name, e);
                    continue;
                }
            };
            if let Ok(dep) = LibraryRange::new(name.as_str()) {
                dependencies.push(LibraryDependency::new(dep.with_version_range(version_range)));
            }
        }
        for name in &library.framework_assemblies {
            if let Ok(reference) = LibraryRange::framework_reference(name.as_str()) {
                dependencies.push(LibraryDependency::new(reference));
            }
        }

        let loadable = library
            .runtime_assemblies
            .iter()
            .flatten()
            .filter_map(|item| {
                let file = item.rsplit('/').next()?;
                if file == PLACEHOLDER_FILE_NAME {
                    return None;
                }
                file.rsplit_once('.').map(|(stem, _)| stem.to_string())
            })
            .collect();

        let identity =
            LibraryIdentity::new(package.name.clone(), package.version.clone(), LibraryType::Package);

        LibraryDescription::new(range, identity)
            .with_path(self.package_path(&package.name, &package.version))
            .with_dependencies(dependencies)
            .with_compatible(compat::is_compatible(package, library))
            .with_loadable_assemblies(loadable)
    }

    fn target(&self, framework: &FrameworkName) -> Option<&LockFileTarget> {
        self.targets.iter().find(|t| {
            &t.target_framework == framework
                && t.runtime_identifier.as_deref() == self.runtime_identifier.as_deref()
        })
    }
}

impl DependencyProvider for PackageDependencyProvider {
    fn name(&self) -> &str {
        "package"
    }

    fn get_description(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<LibraryDescription> {
        if !range.allows_type(LibraryType::Package) {
            return None;
        }

        let library = self.target(framework)?.library(range.name())?;
        if !range.satisfies(&library.version) {
            return None;
        }

        let package = self.lookup.get_package(&library.name, &library.version)?;
        Some(self.describe(range.clone(), package, library))
    }

    fn get_attempted_paths(&self, _framework: &FrameworkName) -> Vec<String> {
        vec![self
            .packages_dir
            .join("{name}")
            .join("{version}")
            .join("{name}.json")
            .display()
            .to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::library::LibraryTypes;
    use semver::Version;

    fn lock_file() -> LockFile {
        let mut lib = LockFileTargetLibrary::new("Foo", Version::new(1, 2, 0));
        lib.compile_time_assemblies = Some(vec!["lib/dnx451/Foo.dll".to_string()]);
        lib.runtime_assemblies = Some(vec!["lib/dnx451/Foo.dll".to_string()]);
        lib.dependencies.insert("Bar".to_string(), ">= 1.0.0".to_string());
        lib.framework_assemblies.push("System.Xml".to_string());

        let mut target = LockFileTarget::new(FrameworkName::parse("dnx451").unwrap(), None);
        target.libraries.push(lib);

        let mut package = LockFilePackageLibrary::new("Foo", Version::new(1, 2, 0));
        package.files = vec!["lib/dnx451/Foo.dll".to_string()];

        LockFile {
            targets: vec![target],
            package_libraries: vec![package],
            ..LockFile::new()
        }
    }

    #[test]
    fn test_resolves_locked_package() {
        let provider = PackageDependencyProvider::new("/packages", &lock_file());
        let range = LibraryRange::new("foo")
            .unwrap()
            .with_version_range(Some(VersionRange::parse("1.0").unwrap()));

        let description = provider
            .get_description(&range, &FrameworkName::parse("dnx451").unwrap())
            .unwrap();

        assert_eq!(description.identity.name, "Foo");
        assert!(range.satisfies(&description.identity.version));
        assert!(description.compatible);
        assert_eq!(description.path, Some(PathBuf::from("/packages/Foo/1.2.0")));
        assert_eq!(description.loadable_assemblies, vec!["Foo"]);

        let names: Vec<_> = description.dependencies.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Bar", "System.Xml"]);
        assert!(description.dependencies[1].range.is_framework_reference());
    }

    #[test]
    fn test_misses() {
        let provider = PackageDependencyProvider::new("/packages", &lock_file());
        let dnx451 = FrameworkName::parse("dnx451").unwrap();

        let too_new = LibraryRange::new("Foo")
            .unwrap()
            .with_version_range(Some(VersionRange::parse("2.0").unwrap()));
        assert!(provider.get_description(&too_new, &dnx451).is_none());

        let project_only = LibraryRange::new("Foo")
            .unwrap()
            .with_allowed_types(LibraryTypes::PROJECT);
        assert!(provider.get_description(&project_only, &dnx451).is_none());

        let other_framework = FrameworkName::parse("dnxcore50").unwrap();
        let any = LibraryRange::new("Foo").unwrap();
        assert!(provider.get_description(&any, &other_framework).is_none());

        let runtime = PackageDependencyProvider::new("/packages", &lock_file()).with_runtime("win7-x64");
        assert!(runtime.get_description(&any, &dnx451).is_none());
    }

    #[test]
    fn test_incompatible_entry() {
        let mut lock = lock_file();
        lock.targets[0].libraries[0].compile_time_assemblies = Some(Vec::new());
        lock.targets[0].libraries[0].runtime_assemblies = Some(Vec::new());

        let provider = PackageDependencyProvider::new("/packages", &lock);
        let description = provider
            .get_description(&LibraryRange::new("Foo").unwrap(), &FrameworkName::parse("dnx451").unwrap())
            .unwrap();
        assert!(!description.compatible);
        assert!(description.loadable_assemblies.is_empty());
    }
}
