//! Target framework names.
//!
//! A framework is an identifier plus a version (and rarely a profile). It
//! can be written in long form (`DNX,Version=v4.5.1`) or as the short folder
//! name used in manifests and package layouts (`dnx451`).

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::core::version::parse_version_lenient;

pub const NET_FRAMEWORK: &str = ".NETFramework";
pub const DNX: &str = "DNX";
pub const DNX_CORE: &str = "DNXCore";
pub const NET_PLATFORM: &str = ".NETPlatform";
pub const NET_CORE: &str = ".NETCore";

/// Short-name prefix to identifier, longest prefixes first so `dnxcore`
/// wins over `dnx`.
const SHORT_NAMES: &[(&str, &str)] = &[
    ("dnxcore", DNX_CORE),
    ("dotnet", NET_PLATFORM),
    ("netcore", NET_CORE),
    ("dnx", DNX),
    ("net", NET_FRAMEWORK),
];

static SHORT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-z]+?)([0-9][0-9.]*)?$").expect("valid regex"));

/// Failure to parse a framework name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid framework name `{0}`")]
pub struct FrameworkParseError(pub String);

/// A target framework identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameworkName {
    identifier: String,
    version: Version,
    profile: Option<String>,
}

impl FrameworkName {
    /// Create a framework name.
    pub fn new(identifier: impl Into<String>, version: Version) -> Self {
        FrameworkName {
            identifier: canonical_identifier(&identifier.into()),
            version,
            profile: None,
        }
    }

    /// Attach a profile (e.g. `Client`).
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Parse either the long or the short form.
    pub fn parse(s: &str) -> Result<Self, FrameworkParseError> {
        let s = s.trim();
        if s.contains(',') || s.starts_with('.') {
            parse_long(s)
        } else {
            parse_short(s)
        }
        .ok_or_else(|| FrameworkParseError(s.to_string()))
    }

    /// The framework identifier, e.g. `.NETFramework`.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The framework version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The profile, if any.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Whether this is a full desktop framework, which implicitly references
    /// the platform's core assemblies.
    pub fn is_desktop(&self) -> bool {
        self.identifier == NET_FRAMEWORK || self.identifier == DNX
    }

    /// Check whether two frameworks share an identifier (ignoring version).
    pub fn same_family(&self, other: &FrameworkName) -> bool {
        self.identifier.eq_ignore_ascii_case(&other.identifier)
    }

    /// The short folder name (`dnx451`, `net45`, `dotnet`).
    pub fn short_folder_name(&self) -> String {
        let prefix = SHORT_NAMES
            .iter()
            .find(|(_, id)| *id == self.identifier)
            .map(|(short, _)| (*short).to_string())
            .unwrap_or_else(|| self.identifier.to_lowercase());

        // dotnet without a version is the 5.0 platform.
        if self.identifier == NET_PLATFORM && self.version == Version::new(5, 0, 0) {
            return prefix;
        }

        let mut digits = format!("{}{}", self.version.major, self.version.minor);
        if self.version.patch != 0 {
            digits.push_str(&self.version.patch.to_string());
        }
        format!("{}{}", prefix, digits)
    }
}

fn canonical_identifier(identifier: &str) -> String {
    [NET_FRAMEWORK, DNX, DNX_CORE, NET_PLATFORM, NET_CORE]
        .iter()
        .find(|known| known.eq_ignore_ascii_case(identifier))
        .map(|known| (*known).to_string())
        .unwrap_or_else(|| identifier.to_string())
}

fn parse_long(s: &str) -> Option<FrameworkName> {
    let mut parts = s.split(',').map(str::trim);
    let identifier = parts.next().filter(|id| !id.is_empty())?;
    let mut version = None;
    let mut profile = None;

    for part in parts {
        let (key, value) = part.split_once('=')?;
        match key.trim().to_ascii_lowercase().as_str() {
            "version" => {
                let value = value.trim();
                let value = value.strip_prefix(['v', 'V']).unwrap_or(value);
                version = Some(parse_version_lenient(value)?);
            }
            "profile" => profile = Some(value.trim().to_string()),
            _ => return None,
        }
    }

    let mut name = FrameworkName::new(identifier, version.unwrap_or(Version::new(0, 0, 0)));
    name.profile = profile;
    Some(name)
}

fn parse_short(s: &str) -> Option<FrameworkName> {
    let lower = s.to_ascii_lowercase();
    let caps = SHORT_NAME_RE.captures(&lower)?;
    let prefix = caps.get(1)?.as_str();
    let digits = caps.get(2).map(|m| m.as_str());

    let identifier = SHORT_NAMES
        .iter()
        .find(|(short, _)| *short == prefix)
        .map(|(_, id)| *id)?;

    let version = match digits {
        None if identifier == NET_PLATFORM => Version::new(5, 0, 0),
        None => Version::new(0, 0, 0),
        Some(d) if d.contains('.') => parse_version_lenient(d)?,
        Some(d) => {
            // Each digit is one component: 451 -> 4.5.1
            let nums: Vec<u64> = d.chars().filter_map(|c| c.to_digit(10)).map(u64::from).collect();
            match nums.as_slice() {
                [major] => Version::new(*major, 0, 0),
                [major, minor] => Version::new(*major, *minor, 0),
                [major, minor, patch, ..] => Version::new(*major, *minor, *patch),
                [] => return None,
            }
        }
    };

    Some(FrameworkName::new(identifier, version))
}

impl fmt::Display for FrameworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},Version=v{}.{}",
            self.identifier, self.version.major, self.version.minor
        )?;
        if self.version.patch != 0 {
            write!(f, ".{}", self.version.patch)?;
        }
        if let Some(profile) = &self.profile {
            write!(f, ",Profile={}", profile)?;
        }
        Ok(())
    }
}

impl FromStr for FrameworkName {
    type Err = FrameworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FrameworkName::parse(s)
    }
}

impl Serialize for FrameworkName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FrameworkName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FrameworkName::parse(&s).map_err(serde::de::Error::custom)
    }
}
