//! Framework compatibility projections.
//!
//! A target framework can consume assets built for a compatible framework:
//! - the same identifier at an equal or lower version,
//! - `DNX` can consume `.NETFramework` at an equal or lower version,
//! - `DNX`, `DNXCore` and `.NETFramework` 4.5+ can consume `.NETPlatform`.

use semver::Version;

use crate::core::framework::{FrameworkName, DNX, DNX_CORE, NET_FRAMEWORK, NET_PLATFORM};

/// Check whether assets built for `candidate` are usable from `target`.
pub fn is_compatible(target: &FrameworkName, candidate: &FrameworkName) -> bool {
    rank(target, candidate).is_some()
}

/// Lower is closer. `None` means incompatible.
fn rank(target: &FrameworkName, candidate: &FrameworkName) -> Option<u8> {
    if target.same_family(candidate) {
        if profile_matches(target, candidate) && candidate.version() <= target.version() {
            return Some(0);
        }
        return None;
    }

    match (target.identifier(), candidate.identifier()) {
        (DNX, NET_FRAMEWORK) if candidate.version() <= target.version() => Some(1),
        (DNX | DNX_CORE, NET_PLATFORM) => Some(2),
        (NET_FRAMEWORK, NET_PLATFORM) if *target.version() >= Version::new(4, 5, 0) => Some(2),
        _ => None,
    }
}

fn profile_matches(target: &FrameworkName, candidate: &FrameworkName) -> bool {
    match candidate.profile() {
        None => true,
        Some(profile) => target.profile() == Some(profile),
    }
}

/// Pick the candidate closest to `target`: the nearest projection first,
/// then the highest version within it.
pub fn nearest_framework<'a, I>(target: &FrameworkName, candidates: I) -> Option<&'a FrameworkName>
where
    I: IntoIterator<Item = &'a FrameworkName>,
{
    candidates
        .into_iter()
        .filter_map(|c| rank(target, c).map(|r| (r, c)))
        .min_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| b.version().cmp(a.version())))
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(s: &str) -> FrameworkName {
        FrameworkName::parse(s).unwrap()
    }

    #[test]
    fn test_same_family_lower_version() {
        assert!(is_compatible(&fx("net451"), &fx("net45")));
        assert!(is_compatible(&fx("net45"), &fx("net45")));
        assert!(!is_compatible(&fx("net45"), &fx("net451")));
    }

    #[test]
    fn test_dnx_consumes_desktop() {
        assert!(is_compatible(&fx("dnx451"), &fx("net45")));
        assert!(!is_compatible(&fx("dnx451"), &fx("net46")));
        assert!(!is_compatible(&fx("net45"), &fx("dnx451")));
    }

    #[test]
    fn test_platform_consumers() {
        assert!(is_compatible(&fx("dnxcore50"), &fx("dotnet")));
        assert!(is_compatible(&fx("dnx451"), &fx("dotnet")));
        assert!(is_compatible(&fx("net46"), &fx("dotnet")));
        assert!(!is_compatible(&fx("net40"), &fx("dotnet")));
        assert!(!is_compatible(&fx("dnxcore50"), &fx("net45")));
    }

    #[test]
    fn test_nearest_prefers_same_family_then_highest() {
        let candidates = [fx("net40"), fx("dotnet"), fx("dnx451"), fx("net45")];
        assert_eq!(nearest_framework(&fx("dnx451"), &candidates), Some(&candidates[2]));
        assert_eq!(nearest_framework(&fx("net451"), &candidates), Some(&candidates[3]));
        assert_eq!(nearest_framework(&fx("dnxcore50"), &candidates), Some(&candidates[1]));
        assert_eq!(nearest_framework(&fx("net20"), &candidates), None);
    }
}
