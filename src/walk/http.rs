//! A package feed served over HTTP.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDependency, LibraryIdentity, LibraryRange, LibraryType};
use crate::core::package_manifest::PackageManifest;
use crate::walk::{
    metadata_file_name, payload_file_name, FeedIndex, RuntimeFile, WalkProvider,
    WalkProviderMatch, INDEX_FILE_NAME, RUNTIME_FILE_NAME,
};

/// A feed at `{base}/{id}/...`.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    base: Url,
    client: Client,
    /// Version listings by lowercased package id, `None` for a 404. A cached
    /// listing always carries the published id once a version was matched.
    indexes: Arc<DashMap<String, Option<Arc<FeedIndex>>>>,
}

impl HttpFeed {
    pub fn new(base: Url) -> Self {
        HttpFeed::with_client(base, Client::new())
    }

    pub fn with_client(mut base: Url, client: Client) -> Self {
        // Url::join drops the last segment without a trailing slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        HttpFeed {
            base,
            client,
            indexes: Arc::new(DashMap::new()),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let relative = segments.join("/");
        self.base
            .join(&relative)
            .with_context(|| format!("invalid feed path {}", relative))
    }

    /// GET a URL; `None` on 404.
    async fn get_optional(&self, url: &Url) -> Result<Option<reqwest::Response>> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("failed to fetch {}", url))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => bail!("failed to fetch {}: HTTP {}", url, status),
        }
    }

    async fn get_text(&self, url: &Url) -> Result<Option<String>> {
        match self.get_optional(url).await? {
            Some(response) => Ok(Some(
                response
                    .text()
                    .await
                    .with_context(|| format!("failed to read {}", url))?,
            )),
            None => Ok(None),
        }
    }

    async fn index(&self, id: &str) -> Result<Option<Arc<FeedIndex>>> {
        let key = id.to_ascii_lowercase();
        if let Some(cached) = self.indexes.get(&key) {
            return Ok(cached.value().clone());
        }

        let url = self.url(&[id, INDEX_FILE_NAME])?;
        tracing::debug!("GET {}", url);
        let index = match self.get_text(&url).await? {
            Some(body) => Some(Arc::new(
                serde_json::from_str::<FeedIndex>(&body)
                    .with_context(|| format!("invalid feed index at {}", url))?,
            )),
            None => None,
        };

        self.indexes.insert(key, index.clone());
        Ok(index)
    }

    /// The package id as published, read from a version's metadata when the
    /// index does not name it.
    async fn published_id(&self, id: &str, version: &str) -> Result<String> {
        let url = self.url(&[id, version, &metadata_file_name(id)])?;
        let Some(body) = self.get_text(&url).await? else {
            bail!("package metadata not found at {}", url);
        };
        Ok(PackageManifest::parse(&body)
            .with_context(|| format!("failed to load {}", url))?
            .id)
    }

    fn version_url(&self, matched: &WalkProviderMatch, file: &str) -> Result<Url> {
        Url::parse(&matched.location)
            .and_then(|location| location.join(file))
            .with_context(|| format!("invalid package location {}", matched.location))
    }
}

#[async_trait]
impl WalkProvider for HttpFeed {
    fn name(&self) -> &str {
        self.base.as_str()
    }

    fn is_http(&self) -> bool {
        true
    }

    fn attempted_path(&self) -> String {
        format!("{}{{name}}", self.base)
    }

    async fn find_library(
        &self,
        range: &LibraryRange,
        _framework: &FrameworkName,
        include_unlisted: bool,
    ) -> Result<Option<WalkProviderMatch>> {
        let Some(index) = self.index(range.name()).await? else {
            return Ok(None);
        };
        let Some(entry) = index.select(range, include_unlisted) else {
            return Ok(None);
        };

        let id = match &index.id {
            Some(id) => id.clone(),
            None => {
                let id = self.published_id(range.name(), &entry.published).await?;
                let mut named = FeedIndex::clone(&index);
                named.id = Some(id.clone());
                self.indexes
                    .insert(range.name().to_ascii_lowercase(), Some(Arc::new(named)));
                id
            }
        };

        let location = self.url(&[&id, &entry.published, ""])?;
        tracing::debug!("{} {} found at {}", id, entry.published, location);
        Ok(Some(WalkProviderMatch {
            library: LibraryIdentity::new(id, entry.version.clone(), LibraryType::Package),
            published_version: entry.published.clone(),
            location: location.to_string(),
            provider: self.base.to_string(),
        }))
    }

    async fn get_dependencies(
        &self,
        matched: &WalkProviderMatch,
        framework: &FrameworkName,
    ) -> Result<Vec<LibraryDependency>> {
        let url = self.version_url(matched, &metadata_file_name(&matched.library.name))?;
        let Some(body) = self.get_text(&url).await? else {
            bail!("package metadata not found at {}", url);
        };

        PackageManifest::parse(&body)
            .and_then(|m| m.dependencies_for(framework))
            .with_context(|| format!("failed to load {}", url))
    }

    async fn get_runtimes(
        &self,
        matched: &WalkProviderMatch,
        _framework: &FrameworkName,
    ) -> Result<Option<RuntimeFile>> {
        let url = self.version_url(matched, RUNTIME_FILE_NAME)?;
        match self.get_text(&url).await? {
            Some(body) => Ok(Some(RuntimeFile::parse(&body)?)),
            None => Ok(None),
        }
    }

    async fn copy_to(
        &self,
        matched: &WalkProviderMatch,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let url = self.version_url(
            matched,
            &payload_file_name(&matched.library.name, &matched.published_version),
        )?;
        tracing::info!("Downloading {}", url);

        let Some(mut response) = self.get_optional(&url).await? else {
            bail!("package payload not found at {}", url);
        };

        let mut copied = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("failed to read {}", url))?
        {
            destination.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        destination.flush().await?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::VersionRange;
    use crate::test_support::fixtures::tgz;
    use httpmock::MockServer;
    use semver::Version;

    fn fx() -> FrameworkName {
        FrameworkName::parse("dnxcore50").unwrap()
    }

    fn range(name: &str, spec: &str) -> LibraryRange {
        LibraryRange::new(name)
            .unwrap()
            .with_version_range(Some(VersionRange::parse(spec).unwrap()))
    }

    fn feed(server: &MockServer) -> HttpFeed {
        HttpFeed::new(Url::parse(&server.url("/v3")).unwrap())
    }

    #[test]
    fn test_urls_keep_base_path() {
        let feed = HttpFeed::new(Url::parse("https://feed.example/v3/packages").unwrap());
        assert_eq!(feed.base().as_str(), "https://feed.example/v3/packages/");
        assert_eq!(
            feed.url(&["Foo", INDEX_FILE_NAME]).unwrap().as_str(),
            "https://feed.example/v3/packages/Foo/index.json"
        );
        assert_eq!(feed.attempted_path(), "https://feed.example/v3/packages/{name}");
        assert!(feed.is_http());
    }

    #[test]
    fn test_version_url() {
        let feed = HttpFeed::new(Url::parse("https://feed.example/").unwrap());
        let matched = WalkProviderMatch {
            library: LibraryIdentity::new("Foo", Version::new(1, 2, 0), LibraryType::Package),
            published_version: "1.2".to_string(),
            location: feed.url(&["Foo", "1.2", ""]).unwrap().to_string(),
            provider: feed.name().to_string(),
        };
        assert_eq!(
            feed.version_url(&matched, "Foo.1.2.tgz").unwrap().as_str(),
            "https://feed.example/Foo/1.2/Foo.1.2.tgz"
        );
    }

    #[tokio::test]
    async fn test_index_is_fetched_once_per_package() {
        let server = MockServer::start_async().await;
        let index = server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/index.json");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"id":"Foo","versions":[{"version":"1.0"},{"version":"2.0.0"}]}"#);
            })
            .await;

        let feed = feed(&server);
        let found = feed.find_library(&range("Foo", "1.0"), &fx(), false).await.unwrap().unwrap();
        assert_eq!(found.library.name, "Foo");
        assert_eq!(found.library.version, Version::new(2, 0, 0));
        assert_eq!(found.location, server.url("/v3/Foo/2.0.0/"));

        let pinned = feed
            .find_library(&range("Foo", "[1.0]"), &fx(), false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pinned.published_version, "1.0");

        index.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_missing_and_failing_packages() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Missing/index.json");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Broken/index.json");
                then.status(500);
            })
            .await;

        let feed = feed(&server);
        assert!(feed.find_library(&range("Missing", "1.0"), &fx(), false).await.unwrap().is_none());
        assert!(feed.find_library(&range("Missing", "1.0"), &fx(), true).await.unwrap().is_none());

        let err = feed.find_library(&range("Broken", "1.0"), &fx(), false).await.unwrap_err();
        assert!(format!("{:#}", err).contains("500"));
    }

    #[tokio::test]
    async fn test_requester_casing_does_not_leak_into_identity() {
        let server = MockServer::start_async().await;
        let index = server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/foo/index.json");
                then.status(200).body(r#"{"versions":[{"version":"1.0.0"}]}"#);
            })
            .await;
        let metadata = server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/foo/1.0.0/foo.json");
                then.status(200).body(r#"{"id":"Foo","version":"1.0.0"}"#);
            })
            .await;

        let feed = feed(&server);
        let lower = feed.find_library(&range("foo", "1.0"), &fx(), false).await.unwrap().unwrap();
        let upper = feed.find_library(&range("FOO", "1.0"), &fx(), false).await.unwrap().unwrap();

        assert_eq!(lower.library.name, "Foo");
        assert_eq!(upper.library, lower.library);
        assert_eq!(upper.location, server.url("/v3/Foo/1.0.0/"));
        index.assert_hits_async(1).await;
        metadata.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_dependencies_runtimes_and_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/index.json");
                then.status(200).body(r#"{"id":"Foo","versions":[{"version":"1.0"}]}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/1.0/Foo.json");
                then.status(200)
                    .body(r#"{"id":"Foo","version":"1.0","dependencies":{"Zeta":"1.0","Alpha":"2.0"}}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/1.0/runtime.json");
                then.status(404);
            })
            .await;
        let payload = tgz(&[("lib/dnxcore50/Foo.dll", b"MZ")]);
        let download = server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/1.0/Foo.1.0.tgz");
                then.status(200).body(payload.clone());
            })
            .await;

        let feed = feed(&server);
        let found = feed.find_library(&range("Foo", "1.0"), &fx(), false).await.unwrap().unwrap();

        let deps = feed.get_dependencies(&found, &fx()).await.unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha"]);

        assert!(feed.get_runtimes(&found, &fx()).await.unwrap().is_none());

        let mut copied = Vec::new();
        let count = feed.copy_to(&found, &mut copied).await.unwrap();
        assert_eq!(count as usize, payload.len());
        assert_eq!(copied, payload);
        download.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_metadata_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/index.json");
                then.status(200).body(r#"{"id":"Foo","versions":[{"version":"1.0.0"}]}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method("GET").path("/v3/Foo/1.0.0/Foo.json");
                then.status(404);
            })
            .await;

        let feed = feed(&server);
        let found = feed.find_library(&range("Foo", "1.0"), &fx(), false).await.unwrap().unwrap();
        let err = feed.get_dependencies(&found, &fx()).await.unwrap_err();
        assert!(err.to_string().contains("metadata not found"));
    }
}
