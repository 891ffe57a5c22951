//! Resolution error types and diagnostics.

use miette::Diagnostic as MietteDiagnostic;
use semver::Version;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// A failure that fails one framework's walk.
#[derive(Debug, Clone, Error, MietteDiagnostic, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unable to resolve `{range}` for {framework}")]
    #[diagnostic(code(packwalk::resolve::not_found))]
    NotFound {
        name: String,
        range: String,
        requester: String,
        framework: String,
        closest: Option<Version>,
        attempted_paths: Vec<String>,
    },

    #[error("`{name} {version}` does not support {framework}")]
    #[diagnostic(code(packwalk::resolve::incompatible))]
    Incompatible {
        name: String,
        version: Version,
        requester: String,
        framework: String,
    },

    #[error("version conflict for `{name}`")]
    #[diagnostic(code(packwalk::resolve::version_conflict))]
    VersionConflict {
        name: String,
        requirements: Vec<(String, String)>, // (requester, range)
    },

    #[error("cycle detected: {}", chain.join(" -> "))]
    #[diagnostic(code(packwalk::resolve::cycle))]
    Cycle { chain: Vec<String> },

    #[error("source error for `{source_name}`: {message}")]
    #[diagnostic(code(packwalk::resolve::source))]
    Source { source_name: String, message: String },
}

impl ResolveError {
    /// The library this error is about, if any.
    pub fn library_name(&self) -> Option<&str> {
        match self {
            ResolveError::NotFound { name, .. }
            | ResolveError::Incompatible { name, .. }
            | ResolveError::VersionConflict { name, .. } => Some(name),
            ResolveError::Cycle { chain } => chain.first().map(String::as_str),
            ResolveError::Source { .. } => None,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ResolveError::NotFound {
                range,
                requester,
                framework,
                closest,
                attempted_paths,
                ..
            } => {
                let mut diag = Diagnostic::error(format!(
                    "unable to resolve `{}` for {}",
                    range, framework
                ))
                .with_context(format!("required by {}", requester));

                if let Some(closest) = closest {
                    diag = diag.with_context(format!("closest version: {}", closest));
                }

                for path in attempted_paths {
                    diag = diag.with_context(format!("searched {}", path));
                }

                diag.with_suggestion(suggestions::PACKAGE_NOT_FOUND)
            }

            ResolveError::Incompatible {
                name,
                version,
                requester,
                framework,
            } => Diagnostic::error(format!(
                "found `{} {}` but it does not support {}",
                name, version, framework
            ))
            .with_context(format!("required by {}", requester))
            .with_suggestion(format!("Remove {} from the {} dependencies", framework, name))
            .with_suggestion(format!("Use a version of `{}` that ships assets for {}", name, framework)),

            ResolveError::VersionConflict { name, requirements } => {
                let mut diag = Diagnostic::error(format!("version conflict for `{}`", name));

                for (requester, range) in requirements {
                    diag = diag.with_context(format!("{} requires {} {}", requester, name, range));
                }

                diag.with_suggestion(format!(
                    "Align the version ranges for `{}` across its dependents",
                    name
                ))
            }

            ResolveError::Cycle { chain } => {
                Diagnostic::error("cycle detected in dependency graph")
                    .with_context(format!("cycle: {}", chain.join(" -> ")))
                    .with_suggestion(
                        "Break the cycle by removing or restructuring dependencies".to_string(),
                    )
            }

            ResolveError::Source {
                source_name,
                message,
            } => Diagnostic::error(format!("error fetching from `{}`: {}", source_name, message))
                .with_suggestion(suggestions::FETCH_FAILED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_diagnostic() {
        let err = ResolveError::VersionConflict {
            name: "Newtonsoft.Json".to_string(),
            requirements: vec![
                ("App 1.0.0".to_string(), "[6.0.0, 7.0.0)".to_string()),
                ("Legacy 2.0.0".to_string(), ">= 8.0.0".to_string()),
            ],
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("version conflict"));
        assert!(output.contains("App 1.0.0 requires Newtonsoft.Json [6.0.0, 7.0.0)"));
        assert!(output.contains("Legacy 2.0.0"));
    }

    #[test]
    fn test_not_found_lists_closest_and_paths() {
        let err = ResolveError::NotFound {
            name: "Foo".to_string(),
            range: "Foo >= 2.0.0".to_string(),
            requester: "App 1.0.0".to_string(),
            framework: "DNX,Version=v4.5.1".to_string(),
            closest: Some(Version::new(1, 5, 0)),
            attempted_paths: vec!["/src/Foo/project.json".to_string()],
        };

        assert_eq!(err.library_name(), Some("Foo"));
        let output = err.to_diagnostic().format(false);
        assert!(output.contains("unable to resolve `Foo >= 2.0.0` for DNX,Version=v4.5.1"));
        assert!(output.contains("closest version: 1.5.0"));
        assert!(output.contains("searched /src/Foo/project.json"));
    }

    #[test]
    fn test_cycle_display() {
        let err = ResolveError::Cycle {
            chain: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        };
        assert_eq!(err.to_string(), "cycle detected: A -> B -> A");
    }
}
