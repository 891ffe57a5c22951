//! Configuration file support for packwalk.
//!
//! Two configuration file locations are read:
//! - Global: `~/.dnx/config.toml` (or `$DNX_HOME/config.toml`) - user-wide defaults
//! - Project: `.packwalk/config.toml` next to `project.json` - project overrides
//!
//! Project config takes precedence over global config.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// packwalk configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Restore settings
    pub restore: RestoreConfig,

    /// Framework reference settings
    pub references: ReferencesConfig,
}

/// Restore-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    /// Package feeds: directories or http(s) URLs
    pub feeds: Vec<String>,

    /// Where packages are installed (default: `{home}/packages`)
    pub packages_dir: Option<PathBuf>,

    /// Write the lock file when only some frameworks resolved
    pub allow_partial: bool,

    /// Runtime identifiers to restore in addition to each framework
    pub runtimes: Vec<String>,

    /// HTTP feed timeout in seconds
    pub timeout: Option<u64>,

    /// Skip HTTP feeds
    pub offline: bool,
}

/// Framework reference configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencesConfig {
    /// Windows directory holding the global assembly cache
    pub windows_dir: Option<PathBuf>,

    /// Reference assembly roots, laid out as `{root}/{identifier}/v{version}/`
    pub roots: Vec<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("failed to write config file: {}", path.display()))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Restore settings
        if !other.restore.feeds.is_empty() {
            self.restore.feeds = other.restore.feeds;
        }
        if other.restore.packages_dir.is_some() {
            self.restore.packages_dir = other.restore.packages_dir;
        }
        if other.restore.allow_partial {
            self.restore.allow_partial = true;
        }
        if !other.restore.runtimes.is_empty() {
            self.restore.runtimes = other.restore.runtimes;
        }
        if other.restore.timeout.is_some() {
            self.restore.timeout = other.restore.timeout;
        }
        if other.restore.offline {
            self.restore.offline = true;
        }

        // Reference settings
        if other.references.windows_dir.is_some() {
            self.references.windows_dir = other.references.windows_dir;
        }
        if !other.references.roots.is_empty() {
            self.references.roots = other.references.roots;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.packwalk/config.toml)
/// 2. Global config (~/.dnx/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the project config path (.packwalk/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".packwalk").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.restore.feeds.is_empty());
        assert!(config.restore.packages_dir.is_none());
        assert!(!config.restore.allow_partial);
        assert!(config.references.roots.is_empty());
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[restore]
feeds = ["./feed", "https://feed.example/v3"]
packages_dir = "/opt/packages"
allow_partial = true
runtimes = ["win7-x64"]

[references]
windows_dir = 'C:\Windows'
roots = ["/usr/lib/reference-assemblies"]
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.restore.feeds, vec!["./feed", "https://feed.example/v3"]);
        assert_eq!(config.restore.packages_dir, Some(PathBuf::from("/opt/packages")));
        assert!(config.restore.allow_partial);
        assert_eq!(config.restore.runtimes, vec!["win7-x64"]);
        assert_eq!(config.references.windows_dir, Some(PathBuf::from(r"C:\Windows")));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.restore.feeds = vec!["https://global.example".to_string()];
        base.restore.timeout = Some(30);

        let mut project = Config::default();
        project.restore.feeds = vec!["./local-feed".to_string()];

        base.merge(project);

        assert_eq!(base.restore.feeds, vec!["./local-feed"]);
        assert_eq!(base.restore.timeout, Some(30)); // Not overridden
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = project_config_path(tmp.path());

        std::fs::write(
            &global_path,
            r#"
[restore]
feeds = ["https://global.example"]
runtimes = ["win7-x64"]
"#,
        )
        .unwrap();

        let mut project = Config::default();
        project.restore.feeds = vec!["./feed".to_string()];
        project.save(&project_path).unwrap();

        let config = load_config(&global_path, &project_path);
        assert_eq!(config.restore.feeds, vec!["./feed"]);
        assert_eq!(config.restore.runtimes, vec!["win7-x64"]);
    }

    #[test]
    fn test_broken_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[restore\nfeeds = 1").unwrap();

        assert_eq!(Config::load_or_default(&path), Config::default());
    }
}
