//! Installing feed packages into the packages directory.
//!
//! A package lands in `{packages}/{name}/{version}/` holding its extracted
//! payload, the payload archive itself and `{archive}.sha512`. The hash
//! file is written last, so its presence marks a complete install.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use semver::Version;
use tokio::io::AsyncWriteExt;

use crate::resolver::RemoteMatch;
use crate::util::fs::{ensure_dir, list_files, remove_dir_all_if_exists};
use crate::util::hash::sha512_file;
use crate::walk::payload_file_name;

/// Suffix of the file recording the payload hash.
pub const HASH_FILE_SUFFIX: &str = ".sha512";

/// A package present in the packages directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: Version,
    pub path: PathBuf,
    /// SHA-512 of the payload archive, hex encoded.
    pub sha: String,
    /// Extracted files, `/`-separated and sorted.
    pub files: Vec<String>,
}

/// Install location of a package.
pub fn install_path(packages_dir: &Path, name: &str, version: &Version) -> PathBuf {
    packages_dir.join(name).join(version.to_string())
}

fn hash_file_name(name: &str, version: &Version) -> String {
    format!("{}{}", payload_file_name(name, version), HASH_FILE_SUFFIX)
}

/// Read a complete install, if there is one.
pub fn installed_package(packages_dir: &Path, name: &str, version: &Version) -> Result<Option<InstalledPackage>> {
    let path = install_path(packages_dir, name, version);
    let hash_path = path.join(hash_file_name(name, version));
    if !hash_path.is_file() {
        return Ok(None);
    }

    let sha = std::fs::read_to_string(&hash_path)
        .with_context(|| format!("failed to read {}", hash_path.display()))?
        .trim()
        .to_string();
    let files = package_files(&path, name, version)?;

    Ok(Some(InstalledPackage {
        name: name.to_string(),
        version: version.clone(),
        path,
        sha,
        files,
    }))
}

/// Copy a feed package into `packages_dir` unless it is already there.
pub async fn install_package(remote: &RemoteMatch, packages_dir: &Path) -> Result<InstalledPackage> {
    let name = remote.matched.library.name.clone();
    let version = remote.matched.library.version.clone();

    if let Some(installed) = installed_package(packages_dir, &name, &version)? {
        tracing::debug!("{} {} already installed", name, version);
        return Ok(installed);
    }

    tracing::info!("Installing {} {} from {}", name, version, remote.provider.name());
    ensure_dir(packages_dir)?;

    let staging = tempfile::Builder::new()
        .prefix(".install-")
        .tempdir_in(packages_dir)
        .with_context(|| format!("failed to create staging directory in {}", packages_dir.display()))?;
    let payload_name = payload_file_name(&name, &version);
    let payload_path = staging.path().join(&payload_name);

    let mut payload = tokio::fs::File::create(&payload_path)
        .await
        .with_context(|| format!("failed to create {}", payload_path.display()))?;
    let copied = remote
        .provider
        .copy_to(&remote.matched, &mut payload)
        .await
        .with_context(|| format!("failed to download {}", remote.matched.library))?;
    payload.flush().await?;
    drop(payload);
    tracing::debug!("copied {} bytes of {}", copied, payload_name);

    let sha = sha512_file(&payload_path)?;

    let extract_dir = staging.path().join("package");
    let archive = payload_path.clone();
    let target = extract_dir.clone();
    tokio::task::spawn_blocking(move || extract(&archive, &target))
        .await
        .context("extraction task failed")??;

    std::fs::rename(&payload_path, extract_dir.join(&payload_name))
        .with_context(|| format!("failed to move {}", payload_name))?;
    std::fs::write(extract_dir.join(hash_file_name(&name, &version)), &sha)
        .with_context(|| format!("failed to write hash for {}", remote.matched.library))?;

    let path = install_path(packages_dir, &name, &version);
    remove_dir_all_if_exists(&path)?;
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::rename(&extract_dir, &path)
        .with_context(|| format!("failed to install {}", path.display()))?;

    let files = package_files(&path, &name, &version)?;
    Ok(InstalledPackage {
        name,
        version,
        path,
        sha,
        files,
    })
}

/// Unpack a gzipped tarball into `dest`.
fn extract(archive: &Path, dest: &Path) -> Result<()> {
    ensure_dir(dest)?;
    let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest)
        .with_context(|| format!("failed to extract {}", archive.display()))?;
    Ok(())
}

/// Payload files of an install, without the bookkeeping files.
fn package_files(path: &Path, name: &str, version: &Version) -> Result<Vec<String>> {
    let payload = payload_file_name(name, version);
    let hash = hash_file_name(name, version);
    Ok(list_files(path)?
        .into_iter()
        .filter(|f| *f != payload && *f != hash)
        .collect())
}
