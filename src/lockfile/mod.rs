//! The lock file model.

pub mod lookup;
pub mod model;

pub use lookup::LockFileLookup;
pub use model::{
    LockFile, LockFileError, LockFilePackageLibrary, LockFileTarget, LockFileTargetLibrary,
    ProjectFileDependencyGroup, LOCKFILE_FORMAT_VERSION, LOCKFILE_NAME, PLACEHOLDER_FILE_NAME,
};
