//! Dependency graph walking.
//!
//! The walker asks providers for each requested library, follows their
//! dependencies, and produces one [`ResolvedGraph`] per target framework.
//! Frameworks are independent: a failure in one never affects another.

pub mod errors;
pub mod graph;
pub mod walker;

pub use errors::ResolveError;
pub use graph::{GraphNode, RemoteMatch, ResolvedGraph, WalkState};
pub use walker::{FrameworkWalk, GraphWalker, Lookup, WalkResult};
