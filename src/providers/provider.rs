//! DependencyProvider trait - common interface for synchronous sources.

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDescription, LibraryRange};

/// Resolves library ranges against one kind of locally available source.
///
/// Returning `None` is not an error: it means this source cannot satisfy
/// the range, and the walker moves on to the next provider.
pub trait DependencyProvider: Send + Sync {
    /// Get the provider name for display.
    fn name(&self) -> &str;

    /// Resolve `range` for `framework`.
    fn get_description(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<LibraryDescription>;

    /// Path templates searched, with `{name}` standing for the library.
    fn get_attempted_paths(&self, framework: &FrameworkName) -> Vec<String>;
}
