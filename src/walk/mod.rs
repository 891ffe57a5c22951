//! Walk providers: asynchronous package sources consulted by the restore
//! walk for packages that are not yet available locally.
//!
//! Both feeds share one layout, on disk or over HTTP:
//!
//! ```text
//! {root}/{id}/index.json                    {"id":"Foo","versions":[{"version":"1.0.0","listed":true}]}
//! {root}/{id}/{version}/{id}.json           package metadata
//! {root}/{id}/{version}/runtime.json        optional runtime graph
//! {root}/{id}/{version}/{id}.{version}.tgz  payload
//! ```
//!
//! `{version}` is spelled the way the feed publishes it, so `1.0` stays
//! `1.0` in folder and payload names.

pub mod http;
pub mod local;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDependency, LibraryIdentity, LibraryRange};
use crate::core::version::{cmp_precedence, parse_version_lenient};

pub use crate::compat::runtime::RuntimeFile;
pub use http::HttpFeed;
pub use local::LocalFeed;

/// Package metadata file name inside a version folder.
pub fn metadata_file_name(id: &str) -> String {
    format!("{}.json", id)
}

/// Payload archive name inside a version folder.
pub fn payload_file_name(id: &str, version: impl fmt::Display) -> String {
    format!("{}.{}.tgz", id, version)
}

/// Runtime graph file name inside a version folder.
pub const RUNTIME_FILE_NAME: &str = "runtime.json";

/// Version listing file inside a package folder.
pub const INDEX_FILE_NAME: &str = "index.json";

/// A package a walk provider can supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkProviderMatch {
    pub library: LibraryIdentity,
    /// The version as the feed spells it.
    pub published_version: String,
    /// Where the version lives: a directory or a base URL.
    pub location: String,
    /// Name of the provider that produced the match.
    pub provider: String,
}

impl fmt::Display for WalkProviderMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.library, self.provider)
    }
}

/// An asynchronous package source.
#[async_trait]
pub trait WalkProvider: Send + Sync {
    /// Get the provider name for display.
    fn name(&self) -> &str;

    /// Remote providers are consulted after local ones.
    fn is_http(&self) -> bool;

    /// Location template searched, with `{name}` standing for the package.
    fn attempted_path(&self) -> String;

    /// Find the best version for `range`. Unlisted versions are only
    /// considered when `include_unlisted` is set.
    async fn find_library(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
        include_unlisted: bool,
    ) -> Result<Option<WalkProviderMatch>>;

    /// Dependencies of a matched package for `framework`.
    async fn get_dependencies(
        &self,
        matched: &WalkProviderMatch,
        framework: &FrameworkName,
    ) -> Result<Vec<LibraryDependency>>;

    /// The package's runtime graph, if it ships one.
    async fn get_runtimes(
        &self,
        matched: &WalkProviderMatch,
        framework: &FrameworkName,
    ) -> Result<Option<RuntimeFile>>;

    /// Copy the package payload into `destination`, returning the byte count.
    async fn copy_to(
        &self,
        matched: &WalkProviderMatch,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;
}

/// `index.json` contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedIndex {
    /// The package id as published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub versions: Vec<FeedIndexEntry>,
}

/// One published version. Versions are read leniently, so `1.0` and
/// `4.0.0.0` are accepted and keep their spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexEntry", into = "RawIndexEntry")]
pub struct FeedIndexEntry {
    pub version: Version,
    pub published: String,
    pub listed: bool,
}

impl FeedIndexEntry {
    pub fn new(version: Version, listed: bool) -> Self {
        FeedIndexEntry {
            published: version.to_string(),
            version,
            listed,
        }
    }

    /// An entry for a version folder name, `None` if it is not a version.
    pub fn from_folder(name: &str) -> Option<Self> {
        Some(FeedIndexEntry {
            version: parse_version_lenient(name)?,
            published: name.to_string(),
            listed: true,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct RawIndexEntry {
    version: String,
    #[serde(default = "default_listed")]
    listed: bool,
}

fn default_listed() -> bool {
    true
}

impl TryFrom<RawIndexEntry> for FeedIndexEntry {
    type Error = String;

    fn try_from(raw: RawIndexEntry) -> Result<Self, Self::Error> {
        let version = parse_version_lenient(&raw.version)
            .ok_or_else(|| format!("invalid version `{}`", raw.version))?;
        Ok(FeedIndexEntry {
            version,
            published: raw.version,
            listed: raw.listed,
        })
    }
}

impl From<FeedIndexEntry> for RawIndexEntry {
    fn from(entry: FeedIndexEntry) -> Self {
        RawIndexEntry {
            version: entry.published,
            listed: entry.listed,
        }
    }
}

impl FeedIndex {
    /// Highest version satisfying `range`, skipping unlisted versions unless
    /// asked not to.
    pub fn select(&self, range: &LibraryRange, include_unlisted: bool) -> Option<&FeedIndexEntry> {
        self.versions
            .iter()
            .filter(|e| include_unlisted || e.listed)
            .filter(|e| range.satisfies(&e.version))
            .max_by(|a, b| cmp_precedence(&a.version, &b.version))
    }
}
