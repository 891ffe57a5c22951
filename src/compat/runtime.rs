//! Runtime identifier graphs (`runtime.json`).
//!
//! ```json
//! {
//!   "runtimes": {
//!     "win7-x64": { "#import": ["win7", "win-x64"] },
//!     "win7": {
//!       "#import": ["win"],
//!       "Foo": { "Foo.Native.win7": "1.0.0" }
//!     }
//!   }
//! }
//! ```
//!
//! Every key other than `#import` names a package whose dependencies are
//! extended on that runtime.

use std::collections::{BTreeMap, HashSet, VecDeque};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

const IMPORT_KEY: &str = "#import";

/// One runtime identifier's declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeDescription {
    pub imports: Vec<String>,
    /// Package name to the extra dependencies (name to range) it gets here.
    pub dependency_sets: BTreeMap<String, BTreeMap<String, String>>,
}

impl<'de> Deserialize<'de> for RuntimeDescription {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut raw: BTreeMap<String, serde_json::Value> = BTreeMap::deserialize(deserializer)?;
        let imports = match raw.remove(IMPORT_KEY) {
            Some(value) => serde_json::from_value(value).map_err(serde::de::Error::custom)?,
            None => Vec::new(),
        };
        let dependency_sets = raw
            .into_iter()
            .map(|(package, deps)| {
                serde_json::from_value(deps)
                    .map(|deps| (package, deps))
                    .map_err(serde::de::Error::custom)
            })
            .collect::<Result<_, D::Error>>()?;

        Ok(RuntimeDescription {
            imports,
            dependency_sets,
        })
    }
}

/// A parsed `runtime.json`, or several merged together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFile {
    #[serde(default)]
    pub runtimes: BTreeMap<String, RuntimeDescription>,
}

impl RuntimeFile {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("invalid runtime.json")
    }

    /// Fold another file in. Imports are unioned; for a package declared by
    /// both, the existing dependency set wins.
    pub fn merge(&mut self, other: &RuntimeFile) {
        for (rid, description) in &other.runtimes {
            let entry = self.runtimes.entry(rid.clone()).or_default();
            for import in &description.imports {
                if !entry.imports.contains(import) {
                    entry.imports.push(import.clone());
                }
            }
            for (package, deps) in &description.dependency_sets {
                entry
                    .dependency_sets
                    .entry(package.clone())
                    .or_insert_with(|| deps.clone());
            }
        }
    }

    /// `rid` followed by everything it imports, breadth first, each once.
    pub fn expand(&self, rid: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([rid.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(description) = self.runtimes.get(&current) {
                queue.extend(description.imports.iter().cloned());
            }
            order.push(current);
        }

        order
    }

    /// Extra dependencies `package` gets on `rid`, from the most specific
    /// runtime that declares any.
    pub fn runtime_dependencies(&self, rid: &str, package: &str) -> Vec<(String, String)> {
        for candidate in self.expand(rid) {
            let declared = self
                .runtimes
                .get(&candidate)
                .and_then(|d| d.dependency_sets.iter().find(|(p, _)| p.eq_ignore_ascii_case(package)));
            if let Some((_, deps)) = declared {
                return deps.iter().map(|(n, r)| (n.clone(), r.clone())).collect();
            }
        }
        Vec::new()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "runtimes": {
            "win7-x64": { "#import": ["win7", "win-x64"] },
            "win7": { "#import": ["win"], "Foo": { "Foo.Native.win7": "1.0.0" } },
            "win-x64": { "#import": ["win"] },
            "win": { "Foo": { "Foo.Native": "1.0.0" } }
        }
    }"##;

    #[test]
    fn test_expand_breadth_first() {
        let file = RuntimeFile::parse(SAMPLE).unwrap();
        assert_eq!(file.expand("win7-x64"), vec!["win7-x64", "win7", "win-x64", "win"]);
        assert_eq!(file.expand("unknown"), vec!["unknown"]);
    }

    #[test]
    fn test_runtime_dependencies_most_specific_wins() {
        let file = RuntimeFile::parse(SAMPLE).unwrap();
        assert_eq!(
            file.runtime_dependencies("win7-x64", "foo"),
            vec![("Foo.Native.win7".to_string(), "1.0.0".to_string())]
        );
        assert_eq!(
            file.runtime_dependencies("win-x64", "Foo"),
            vec![("Foo.Native".to_string(), "1.0.0".to_string())]
        );
        assert!(file.runtime_dependencies("osx", "Foo").is_empty());
    }

    #[test]
    fn test_merge_unions_imports() {
        let mut base = RuntimeFile::parse(SAMPLE).unwrap();
        let other = RuntimeFile::parse(r##"{ "runtimes": { "win7-x64": { "#import": ["win7-x86"] }, "linux": {} } }"##)
            .unwrap();
        base.merge(&other);
        assert_eq!(base.runtimes["win7-x64"].imports, vec!["win7", "win-x64", "win7-x86"]);
        assert!(base.runtimes.contains_key("linux"));
    }
}
