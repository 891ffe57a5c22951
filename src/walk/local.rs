//! A package feed on the local file system.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDependency, LibraryIdentity, LibraryRange, LibraryType};
use crate::core::package_manifest::PackageManifest;
use crate::walk::{
    metadata_file_name, payload_file_name, FeedIndex, FeedIndexEntry, RuntimeFile, WalkProvider,
    WalkProviderMatch, INDEX_FILE_NAME, RUNTIME_FILE_NAME,
};

/// A feed directory laid out as `{root}/{id}/{version}/...`.
#[derive(Debug, Clone)]
pub struct LocalFeed {
    root: PathBuf,
    name: String,
}

impl LocalFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        LocalFeed {
            name: root.display().to_string(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The package folder, matched case-insensitively.
    async fn package_dir(&self, id: &str) -> Result<Option<(String, PathBuf)>> {
        let exact = self.root.join(id);
        if tokio::fs::metadata(&exact).await.is_ok_and(|m| m.is_dir()) {
            return Ok(Some((id.to_string(), exact)));
        }

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read feed {}", self.root.display()))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.eq_ignore_ascii_case(id) && entry.file_type().await?.is_dir() {
                return Ok(Some((name.to_string(), entry.path())));
            }
        }

        Ok(None)
    }

    /// `index.json` if present, else every version folder as listed.
    async fn load_index(&self, package_dir: &Path) -> Result<FeedIndex> {
        let index_path = package_dir.join(INDEX_FILE_NAME);
        if let Ok(content) = tokio::fs::read_to_string(&index_path).await {
            return serde_json::from_str(&content)
                .with_context(|| format!("invalid feed index {}", index_path.display()));
        }

        let mut index = FeedIndex::default();
        let mut entries = tokio::fs::read_dir(package_dir)
            .await
            .with_context(|| format!("failed to read {}", package_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(version) = entry.file_name().to_str().and_then(FeedIndexEntry::from_folder) else {
                continue;
            };
            index.versions.push(version);
        }
        Ok(index)
    }
}

#[async_trait]
impl WalkProvider for LocalFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_http(&self) -> bool {
        false
    }

    fn attempted_path(&self) -> String {
        self.root.join("{name}").display().to_string()
    }

    async fn find_library(
        &self,
        range: &LibraryRange,
        _framework: &FrameworkName,
        include_unlisted: bool,
    ) -> Result<Option<WalkProviderMatch>> {
        let Some((id, dir)) = self.package_dir(range.name()).await? else {
            return Ok(None);
        };

        let index = self.load_index(&dir).await?;
        let Some(entry) = index.select(range, include_unlisted) else {
            return Ok(None);
        };

        tracing::debug!("{} {} found in {}", id, entry.published, self.name);
        Ok(Some(WalkProviderMatch {
            library: LibraryIdentity::new(id, entry.version.clone(), LibraryType::Package),
            published_version: entry.published.clone(),
            location: dir.join(&entry.published).display().to_string(),
            provider: self.name.clone(),
        }))
    }

    async fn get_dependencies(
        &self,
        matched: &WalkProviderMatch,
        framework: &FrameworkName,
    ) -> Result<Vec<LibraryDependency>> {
        let path = Path::new(&matched.location).join(metadata_file_name(&matched.library.name));
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read package metadata {}", path.display()))?;

        PackageManifest::parse(&content)
            .and_then(|m| m.dependencies_for(framework))
            .with_context(|| format!("failed to load {}", path.display()))
    }

    async fn get_runtimes(
        &self,
        matched: &WalkProviderMatch,
        _framework: &FrameworkName,
    ) -> Result<Option<RuntimeFile>> {
        let path = Path::new(&matched.location).join(RUNTIME_FILE_NAME);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(RuntimeFile::parse(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    async fn copy_to(
        &self,
        matched: &WalkProviderMatch,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let path = Path::new(&matched.location)
            .join(payload_file_name(&matched.library.name, &matched.published_version));
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let copied = tokio::io::copy(&mut file, destination)
            .await
            .with_context(|| format!("failed to copy {}", path.display()))?;
        Ok(copied)
    }
}
