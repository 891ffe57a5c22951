//! Lock file I/O operations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::core::project::Project;
use crate::lockfile::{LockFile, LOCKFILE_NAME};

/// Path of the lock file next to a project.
pub fn lock_path(project_dir: &Path) -> PathBuf {
    project_dir.join(LOCKFILE_NAME)
}

/// Load a lock file from the given path.
pub fn load_lockfile(path: &Path) -> Result<Option<LockFile>> {
    if !path.exists() {
        return Ok(None);
    }

    let lock_file = LockFile::load(path)?;

    if let Err(e) = lock_file.validate() {
        bail!("invalid lock file {}: {}", path.display(), e);
    }

    Ok(Some(lock_file))
}

/// Save a lock file after checking its invariants.
pub fn save_lockfile(path: &Path, lock_file: &LockFile) -> Result<()> {
    if let Err(e) = lock_file.validate() {
        bail!("refusing to write invalid lock file: {}", e);
    }
    lock_file.save(path)
}

/// The existing lock file, when it may be reused for `project` without a
/// new walk.
///
/// A lock file is reused only when it is marked locked and was produced
/// from the project's current dependency declarations.
pub fn reusable_lockfile(project: &Project) -> Result<Option<LockFile>> {
    let path = lock_path(project.project_dir());
    let Some(lock_file) = load_lockfile(&path)? else {
        tracing::info!("No lock file found, restoring dependencies");
        return Ok(None);
    };

    if !lock_file.locked {
        tracing::debug!("lock file is not locked, restoring dependencies");
        return Ok(None);
    }

    if !lock_file.is_valid_for(project) {
        tracing::info!("Dependencies changed, ignoring locked lock file");
        return Ok(None);
    }

    tracing::info!("Using existing lock file (dependencies unchanged)");
    Ok(Some(lock_file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::{LockFileTarget, LockFileTargetLibrary, ProjectFileDependencyGroup};
    use crate::core::framework::FrameworkName;
    use semver::Version;
    use tempfile::TempDir;

    fn project(dir: &Path, deps: &str) -> Project {
        let json = format!(
            r#"{{ "dependencies": {{ {} }}, "frameworks": {{ "dnxcore50": {{}} }} }}"#,
            deps
        );
        std::fs::write(dir.join("project.json"), json).unwrap();
        Project::load(dir).unwrap()
    }

    #[test]
    fn test_missing_lock_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_lockfile(&lock_path(tmp.path())).unwrap().is_none());
    }

    #[test]
    fn test_save_rejects_duplicate_targets() {
        let tmp = TempDir::new().unwrap();
        let framework = FrameworkName::parse("dnxcore50").unwrap();

        let mut lock_file = LockFile::new();
        lock_file.targets.push(LockFileTarget::new(framework.clone(), None));
        lock_file.targets.push(LockFileTarget::new(framework, None));

        assert!(save_lockfile(&lock_path(tmp.path()), &lock_file).is_err());
        assert!(!lock_path(tmp.path()).exists());
    }

    #[test]
    fn test_reuse_requires_locked_and_unchanged() {
        let tmp = TempDir::new().unwrap();
        let app = project(tmp.path(), r#""Foo": "1.0.0""#);

        let mut target = LockFileTarget::new(FrameworkName::parse("dnxcore50").unwrap(), None);
        target
            .libraries
            .push(LockFileTargetLibrary::new("Foo", Version::new(1, 0, 0)));

        let mut lock_file = LockFile::new();
        lock_file.targets.push(target);
        lock_file.project_file_dependency_groups = ProjectFileDependencyGroup::from_project(&app);
        save_lockfile(&lock_path(tmp.path()), &lock_file).unwrap();

        assert!(reusable_lockfile(&app).unwrap().is_none());

        lock_file.locked = true;
        save_lockfile(&lock_path(tmp.path()), &lock_file).unwrap();
        assert_eq!(reusable_lockfile(&app).unwrap(), Some(lock_file));

        let changed = project(tmp.path(), r#""Foo": "2.0.0""#);
        assert!(reusable_lockfile(&changed).unwrap().is_none());
    }
}
