//! Version ranges for dependency requests.
//!
//! Ranges accept three spellings:
//! - a bare version (`1.0`) meaning "this version or higher",
//! - interval notation (`[1.0, 2.0)`, `[1.0]`, `(, 2.0]`),
//! - semver comparators (`>= 1.0`, `^1.2`, `~1.2.3`, `>=1.0, <2.0`).
//!
//! A trailing `-*` (`4.0.20-*`) floats over prerelease versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{Comparator, Op, Prerelease, Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Failure to parse a version or a version range.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("invalid version `{0}`")]
    InvalidVersion(String),

    #[error("invalid version range `{0}`")]
    InvalidRange(String),
}

/// Parse a version string, allowing for incomplete or four-part versions.
///
/// `1` and `1.2` are padded with zeros. A fourth component of zero is
/// dropped (`4.0.0.0` == `4.0.0`); a non-zero fourth component is kept as
/// build metadata so it still displays.
pub fn parse_version_lenient(s: &str) -> Option<Version> {
    let s = s.trim();
    if let Ok(v) = s.parse() {
        return Some(v);
    }

    let (core, pre) = match s.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (s, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    let nums: Vec<u64> = parts
        .iter()
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let mut version = match nums.as_slice() {
        [major] => Version::new(*major, 0, 0),
        [major, minor] => Version::new(*major, *minor, 0),
        [major, minor, patch] => Version::new(*major, *minor, *patch),
        [major, minor, patch, revision] => {
            let mut v = Version::new(*major, *minor, *patch);
            if *revision != 0 {
                v.build = semver::BuildMetadata::new(&revision.to_string()).ok()?;
            }
            v
        }
        _ => return None,
    };

    if let Some(pre) = pre {
        version.pre = Prerelease::new(pre).ok()?;
    }

    Some(version)
}

/// A constraint over acceptable versions.
///
/// Two ranges compare equal when they accept exactly the same set of
/// versions under the same prerelease policy, regardless of spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
    floating: bool,
}

impl VersionRange {
    /// A range accepting every stable version.
    pub fn any() -> Self {
        VersionRange {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
            floating: false,
        }
    }

    /// `version` or higher.
    pub fn at_least(version: Version) -> Self {
        VersionRange {
            min: Some(version),
            min_inclusive: true,
            ..Self::any()
        }
    }

    /// Exactly `version`.
    pub fn exact(version: Version) -> Self {
        VersionRange {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
            floating: false,
        }
    }

    /// Parse a range in any supported spelling.
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let trimmed = s.trim();
        let invalid = || VersionParseError::InvalidRange(s.to_string());

        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        if trimmed.starts_with('[') || trimmed.starts_with('(') {
            return parse_interval(trimmed).ok_or_else(invalid);
        }

        // `>= 1.0.0-*` is how floating ranges display, so it must parse back.
        if let Some(rest) = trimmed.strip_prefix(">=") {
            if let Some(base) = rest.trim().strip_suffix("-*") {
                return floating(base).ok_or_else(invalid);
            }
        }

        if trimmed.starts_with(['>', '<', '=', '^', '~']) {
            let req: VersionReq = trimmed.parse().map_err(|_| invalid())?;
            return Ok(Self::from_version_req(&req));
        }

        if let Some(base) = trimmed.strip_suffix("-*") {
            return floating(base).ok_or_else(invalid);
        }

        parse_version_lenient(trimmed)
            .map(Self::at_least)
            .ok_or_else(invalid)
    }

    /// Convert a semver requirement into bounds.
    pub fn from_version_req(req: &VersionReq) -> Self {
        req.comparators
            .iter()
            .map(comparator_to_range)
            .fold(Some(Self::any()), |acc, r| acc.and_then(|acc| acc.intersect(&r)))
            // An unsatisfiable requirement collapses to an empty interval.
            .unwrap_or_else(|| VersionRange {
                min: Some(Version::new(0, 0, 0)),
                min_inclusive: false,
                max: Some(Version::new(0, 0, 0)),
                max_inclusive: false,
                floating: false,
            })
    }

    /// Lower bound, if any.
    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    /// Upper bound, if any.
    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    /// Whether this range floats over prerelease versions.
    pub fn is_floating(&self) -> bool {
        self.floating
    }

    /// Whether the range has no bounds at all.
    pub fn is_any(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Check whether `version` lies within this range.
    pub fn satisfies(&self, version: &Version) -> bool {
        if !version.pre.is_empty() && !self.allows_prerelease() {
            return false;
        }

        if let Some(min) = &self.min {
            match cmp_precedence(version, min) {
                Ordering::Less => return false,
                Ordering::Equal if !self.min_inclusive => return false,
                _ => {}
            }
        }

        if let Some(max) = &self.max {
            match cmp_precedence(version, max) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.max_inclusive => return false,
                _ => {}
            }
        }

        true
    }

    fn allows_prerelease(&self) -> bool {
        self.floating
            || self.min.as_ref().is_some_and(|v| !v.pre.is_empty())
            || self.max.as_ref().is_some_and(|v| !v.pre.is_empty())
    }

    /// Pick the highest version in `candidates` that satisfies this range.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        candidates
            .into_iter()
            .filter(|v| self.satisfies(v))
            .max_by(|a, b| cmp_precedence(a, b))
    }

    /// The version nearest to this range when nothing satisfies it: the
    /// highest version below the range, else the lowest one above it.
    pub fn closest<'a, I>(&self, candidates: I) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let mut below: Option<&Version> = None;
        let mut above: Option<&Version> = None;

        for v in candidates {
            let is_below = self
                .min
                .as_ref()
                .is_some_and(|min| cmp_precedence(v, min) != Ordering::Greater);
            if is_below {
                if below.map_or(true, |b| cmp_precedence(v, b) == Ordering::Greater) {
                    below = Some(v);
                }
            } else if above.map_or(true, |a| cmp_precedence(v, a) == Ordering::Less) {
                above = Some(v);
            }
        }

        below.or(above)
    }

    /// The set of versions accepted by both ranges, or `None` when disjoint.
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let (min, min_inclusive) = match (&self.min, &other.min) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.min_inclusive),
            (None, Some(b)) => (Some(b.clone()), other.min_inclusive),
            (Some(a), Some(b)) => match cmp_precedence(a, b) {
                Ordering::Greater => (Some(a.clone()), self.min_inclusive),
                Ordering::Less => (Some(b.clone()), other.min_inclusive),
                Ordering::Equal => (
                    Some(a.clone()),
                    self.min_inclusive && other.min_inclusive,
                ),
            },
        };

        let (max, max_inclusive) = match (&self.max, &other.max) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.max_inclusive),
            (None, Some(b)) => (Some(b.clone()), other.max_inclusive),
            (Some(a), Some(b)) => match cmp_precedence(a, b) {
                Ordering::Less => (Some(a.clone()), self.max_inclusive),
                Ordering::Greater => (Some(b.clone()), other.max_inclusive),
                Ordering::Equal => (
                    Some(a.clone()),
                    self.max_inclusive && other.max_inclusive,
                ),
            },
        };

        if let (Some(lo), Some(hi)) = (&min, &max) {
            match cmp_precedence(lo, hi) {
                Ordering::Greater => return None,
                Ordering::Equal if !(min_inclusive && max_inclusive) => return None,
                _ => {}
            }
        }

        Some(VersionRange {
            min,
            min_inclusive,
            max,
            max_inclusive,
            // An unbounded side constrains nothing, floating included.
            floating: match (self.is_any(), other.is_any()) {
                (true, _) => other.floating,
                (_, true) => self.floating,
                _ => self.floating && other.floating,
            },
        })
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

/// Compare versions by precedence, ignoring build metadata except as a
/// final tiebreak so four-part revisions still order.
pub fn cmp_precedence(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| match (a.pre.is_empty(), b.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => a.pre.cmp(&b.pre),
        })
        .then_with(|| revision(a).cmp(&revision(b)))
}

fn revision(v: &Version) -> u64 {
    v.build.as_str().parse().unwrap_or(0)
}

fn floating(base: &str) -> Option<VersionRange> {
    let (core, prefix) = match base.split_once('-') {
        Some((core, prefix)) => (core, prefix),
        None => (base, ""),
    };
    let mut min = parse_version_lenient(core)?;
    // "0" is the lowest numeric identifier, so it sorts below every real tag.
    let pre = if prefix.is_empty() {
        "0".to_string()
    } else {
        format!("{}-", prefix)
    };
    min.pre = Prerelease::new(&pre).ok()?;

    Some(VersionRange {
        min: Some(min),
        min_inclusive: true,
        max: None,
        max_inclusive: false,
        floating: true,
    })
}

fn parse_interval(s: &str) -> Option<VersionRange> {
    let min_inclusive = s.starts_with('[');
    let max_inclusive = s.ends_with(']');
    if !(s.ends_with(']') || s.ends_with(')')) || s.len() < 2 {
        return None;
    }

    let inner = &s[1..s.len() - 1];
    let mut parts = inner.split(',');
    let lo = parts.next()?.trim();
    let hi = parts.next().map(str::trim);
    if parts.next().is_some() {
        return None;
    }

    match hi {
        // `[1.0]` is an exact match; `(1.0)` is meaningless.
        None => {
            if !(min_inclusive && max_inclusive) {
                return None;
            }
            Some(VersionRange::exact(parse_version_lenient(lo)?))
        }
        Some(hi) => {
            let min = if lo.is_empty() {
                None
            } else {
                Some(parse_version_lenient(lo)?)
            };
            let max = if hi.is_empty() {
                None
            } else {
                Some(parse_version_lenient(hi)?)
            };
            if min.is_none() && max.is_none() {
                return None;
            }
            Some(VersionRange {
                min_inclusive: min_inclusive && min.is_some(),
                max_inclusive: max_inclusive && max.is_some(),
                min,
                max,
                floating: false,
            })
        }
    }
}

/// Convert a single semver comparator into bounds.
fn comparator_to_range(comp: &Comparator) -> VersionRange {
    let major = comp.major;
    let minor = comp.minor.unwrap_or(0);
    let patch = comp.patch.unwrap_or(0);

    let mut version = Version::new(major, minor, patch);
    version.pre = comp.pre.clone();

    let between = |lo: Version, hi: Version| VersionRange {
        min: Some(lo),
        min_inclusive: true,
        max: Some(hi),
        max_inclusive: false,
        floating: false,
    };

    match comp.op {
        Op::Exact => {
            if comp.minor.is_none() {
                between(version, Version::new(major + 1, 0, 0))
            } else if comp.patch.is_none() {
                between(version, Version::new(major, minor + 1, 0))
            } else {
                VersionRange::exact(version)
            }
        }

        Op::Greater => VersionRange {
            min: Some(version),
            min_inclusive: false,
            ..VersionRange::any()
        },

        Op::GreaterEq => VersionRange::at_least(version),

        Op::Less => VersionRange {
            max: Some(version),
            max_inclusive: false,
            ..VersionRange::any()
        },

        Op::LessEq => VersionRange {
            max: Some(version),
            max_inclusive: true,
            ..VersionRange::any()
        },

        Op::Tilde => {
            // ~1.2.3 means >=1.2.3 <1.3.0
            let upper = if comp.minor.is_some() {
                Version::new(major, minor + 1, 0)
            } else {
                Version::new(major + 1, 0, 0)
            };
            between(version, upper)
        }

        Op::Caret => {
            // ^1.2.3 means >=1.2.3 <2.0.0, ^0.2.3 means >=0.2.3 <0.3.0
            let upper = if major > 0 {
                Version::new(major + 1, 0, 0)
            } else if minor > 0 {
                Version::new(0, minor + 1, 0)
            } else {
                Version::new(0, 0, patch + 1)
            };
            between(version, upper)
        }

        Op::Wildcard => {
            if comp.minor.is_some() {
                between(version, Version::new(major, minor + 1, 0))
            } else {
                between(version, Version::new(major + 1, 0, 0))
            }
        }

        _ => VersionRange::any(),
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "*"),
            (Some(min), None) if self.min_inclusive => {
                if self.floating {
                    let mut base = min.clone();
                    let prefix = base.pre.as_str().to_string();
                    base.pre = Prerelease::EMPTY;
                    if prefix == "0" {
                        write!(f, ">= {}-*", base)
                    } else {
                        // prefix keeps its trailing `-`
                        write!(f, ">= {}-{}*", base, prefix)
                    }
                } else {
                    write!(f, ">= {}", min)
                }
            }
            (Some(min), Some(max))
                if self.min_inclusive && self.max_inclusive && min == max =>
            {
                write!(f, "[{}]", min)
            }
            (min, max) => {
                let open = if self.min_inclusive { '[' } else { '(' };
                let close = if self.max_inclusive { ']' } else { ')' };
                let lo = min.as_ref().map(ToString::to_string).unwrap_or_default();
                let hi = max.as_ref().map(ToString::to_string).unwrap_or_default();
                write!(f, "{}{}, {}{}", open, lo, hi, close)
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        VersionRange::parse(&s).map_err(serde::de::Error::custom)
    }
}
