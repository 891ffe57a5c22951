//! Global context for packwalk operations.
//!
//! Resolves environment-derived locations once, so everything below the
//! CLI receives plain paths:
//!
//! - home: `$DNX_HOME`, else `~/.dnx`
//! - packages: `$DNX_PACKAGES`, else `$NUGET_PACKAGES`, else `{home}/packages`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::project::PROJECT_FILE_NAME;
use crate::util::config::{load_config, project_config_path, Config};

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "DNX_HOME";

/// Environment variables overriding the packages directory, in order.
pub const PACKAGES_ENV: &[&str] = &["DNX_PACKAGES", "NUGET_PACKAGES"];

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global data (~/.dnx/)
    home: PathBuf,

    /// Packages directory from the environment, if set
    packages_override: Option<PathBuf>,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext from the process environment.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::from_env(cwd, |key| std::env::var(key).ok()))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        Self::from_env(cwd, |key| std::env::var(key).ok())
    }

    /// Create a GlobalContext reading variables through `var`.
    pub fn from_env(cwd: PathBuf, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let home = non_empty(HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| user_home(&non_empty).map(|h| h.join(".dnx")))
            .unwrap_or_else(|| PathBuf::from(".dnx"));

        let packages_override = PACKAGES_ENV
            .iter()
            .find_map(|key| non_empty(*key))
            .map(PathBuf::from);

        GlobalContext {
            cwd,
            home,
            packages_override,
            verbose: false,
            color: true,
        }
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the home directory (~/.dnx/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Get the packages directory, honoring `configured` below the
    /// environment overrides.
    pub fn packages_dir(&self, configured: Option<&Path>) -> PathBuf {
        self.packages_override
            .clone()
            .or_else(|| configured.map(|p| self.cwd.join(p)))
            .unwrap_or_else(|| self.home.join("packages"))
    }

    /// Get the global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Load global config merged with the config of `project_dir`.
    pub fn load_config(&self, project_dir: &Path) -> Config {
        load_config(&self.config_path(), &project_config_path(project_dir))
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Find the directory holding `project.json`, starting from cwd and
    /// searching upward.
    pub fn find_project_dir(&self) -> Option<PathBuf> {
        self.cwd
            .ancestors()
            .find(|dir| dir.join(PROJECT_FILE_NAME).is_file())
            .map(Path::to_path_buf)
    }

    /// Ensure a directory exists, creating it if necessary.
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        crate::util::fs::ensure_dir(path)
    }
}

fn user_home(var: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    var("HOME")
        .or_else(|| var("USERPROFILE"))
        .map(PathBuf::from)
        .or_else(|| directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_home_from_env() {
        let ctx = GlobalContext::from_env(PathBuf::from("/work"), env(&[("DNX_HOME", "/opt/dnx")]));
        assert_eq!(ctx.home(), Path::new("/opt/dnx"));
        assert_eq!(ctx.config_path(), PathBuf::from("/opt/dnx/config.toml"));

        let ctx = GlobalContext::from_env(PathBuf::from("/work"), env(&[("HOME", "/home/me")]));
        assert_eq!(ctx.home(), Path::new("/home/me/.dnx"));

        let ctx = GlobalContext::from_env(PathBuf::from("/work"), env(&[("USERPROFILE", "/users/me")]));
        assert_eq!(ctx.home(), Path::new("/users/me/.dnx"));
    }

    #[test]
    fn test_packages_dir_precedence() {
        let cwd = PathBuf::from("/work");
        let ctx = GlobalContext::from_env(
            cwd.clone(),
            env(&[("HOME", "/home/me"), ("NUGET_PACKAGES", "/nuget"), ("DNX_PACKAGES", "/dnx")]),
        );
        assert_eq!(ctx.packages_dir(Some(Path::new("pkgs"))), PathBuf::from("/dnx"));

        let ctx = GlobalContext::from_env(cwd.clone(), env(&[("HOME", "/home/me")]));
        assert_eq!(ctx.packages_dir(Some(Path::new("pkgs"))), PathBuf::from("/work/pkgs"));
        assert_eq!(ctx.packages_dir(None), PathBuf::from("/home/me/.dnx/packages"));
    }

    #[test]
    fn test_find_project_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(PROJECT_FILE_NAME), "{}").unwrap();
        let nested = tmp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested);
        assert_eq!(ctx.find_project_dir(), Some(tmp.path().to_path_buf()));
    }
}
