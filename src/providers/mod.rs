//! Dependency providers.
//!
//! Each provider resolves library ranges against one kind of source. The
//! walker consults them in order; the first description wins.

pub mod package;
pub mod project;
pub mod provider;
pub mod reference;
pub mod unresolved;

pub use package::PackageDependencyProvider;
pub use project::ProjectDependencyProvider;
pub use provider::DependencyProvider;
pub use reference::{FrameworkReferenceProvider, HostOs, ReferenceConfig};
pub use unresolved::UnresolvedDependencyProvider;
