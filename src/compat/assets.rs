//! Choosing a package's assets for one target.
//!
//! Package files are laid out by framework folder:
//! - `ref/{tfm}/*.dll` compile-time reference assemblies,
//! - `lib/{tfm}/*.dll` implementation assemblies (also compile-time when
//!   no reference folder applies),
//! - `runtimes/{rid}/lib/{tfm}/*.dll` runtime-specific implementations,
//! - `runtimes/{rid}/native/*` native libraries.

use crate::compat::framework::nearest_framework;
use crate::core::framework::FrameworkName;
use crate::lockfile::PLACEHOLDER_FILE_NAME;

const ASSEMBLY_EXTENSIONS: &[&str] = &[".dll", ".exe", ".winmd"];

/// Assets chosen for one target. `None` means the package ships nothing of
/// that kind at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSelection {
    pub compile: Option<Vec<String>>,
    pub runtime: Option<Vec<String>>,
    pub native: Option<Vec<String>>,
}

/// Select assets from `files` for `framework`, preferring the runtime
/// identifiers in `runtimes` in order (an expanded runtime graph).
pub fn select_assets(files: &[String], framework: &FrameworkName, runtimes: &[String]) -> AssetSelection {
    let lib = framework_group(files, "lib", framework);

    let compile = match framework_group(files, "ref", framework) {
        Some(items) if !items.is_empty() => Some(items),
        reference => lib.clone().or(reference),
    };

    let runtime_specific = runtimes.iter().find_map(|rid| {
        framework_group(files, &format!("runtimes/{}/lib", rid), framework).filter(|items| !items.is_empty())
    });
    let runtime = runtime_specific.or(lib);

    let native = runtimes.iter().find_map(|rid| {
        let prefix = format!("runtimes/{}/native/", rid);
        let items: Vec<String> = files.iter().filter(|f| f.starts_with(&prefix)).cloned().collect();
        (!items.is_empty()).then_some(items)
    });

    AssetSelection {
        compile,
        runtime,
        native,
    }
}

/// Assemblies under `{prefix}/{tfm}/` for the nearest compatible `tfm`.
/// `None` when nothing lives under `prefix`; an empty list when folders
/// exist but none is compatible.
fn framework_group(files: &[String], prefix: &str, framework: &FrameworkName) -> Option<Vec<String>> {
    let prefix = format!("{}/", prefix);
    let mut folders: Vec<(FrameworkName, &str)> = Vec::new();
    let mut any = false;

    for file in files {
        let Some(rest) = file.strip_prefix(&prefix) else {
            continue;
        };
        any = true;
        let Some((folder, _)) = rest.split_once('/') else {
            continue;
        };
        if folders.iter().any(|(_, f)| *f == folder) {
            continue;
        }
        match FrameworkName::parse(folder) {
            Ok(fx) => folders.push((fx, folder)),
            Err(_) => tracing::debug!("ignoring unrecognized framework folder `{}{}`", prefix, folder),
        }
    }

    if !any {
        return None;
    }

    let Some(nearest) = nearest_framework(framework, folders.iter().map(|(fx, _)| fx)) else {
        return Some(Vec::new());
    };
    let Some((_, folder)) = folders.iter().find(|(fx, _)| fx == nearest) else {
        return Some(Vec::new());
    };

    let folder_prefix = format!("{}{}/", prefix, folder);
    Some(
        files
            .iter()
            .filter(|f| {
                f.strip_prefix(&folder_prefix)
                    .is_some_and(|name| !name.contains('/') && is_assembly(name))
            })
            .cloned()
            .collect(),
    )
}

fn is_assembly(file_name: &str) -> bool {
    if file_name == PLACEHOLDER_FILE_NAME {
        return true;
    }
    let lower = file_name.to_ascii_lowercase();
    ASSEMBLY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn fx(s: &str) -> FrameworkName {
        FrameworkName::parse(s).unwrap()
    }

    #[test]
    fn test_lib_only_package() {
        let files = files(&["lib/net451/Foo.dll", "lib/net451/Foo.xml", "lib/net40/Foo.dll"]);
        let dnx = select_assets(&files, &fx("dnx451"), &[]);
        assert_eq!(dnx.compile, Some(vec!["lib/net451/Foo.dll".to_string()]));
        assert_eq!(dnx.runtime, Some(vec!["lib/net451/Foo.dll".to_string()]));
        assert_eq!(dnx.native, None);

        let core = select_assets(&files, &fx("dnxcore50"), &[]);
        assert_eq!(core.compile, Some(Vec::new()));
        assert_eq!(core.runtime, Some(Vec::new()));
    }

    #[test]
    fn test_ref_preferred_for_compile() {
        let files = files(&["ref/dotnet/Foo.dll", "lib/dnxcore50/Foo.dll"]);
        let core = select_assets(&files, &fx("dnxcore50"), &[]);
        assert_eq!(core.compile, Some(vec!["ref/dotnet/Foo.dll".to_string()]));
        assert_eq!(core.runtime, Some(vec!["lib/dnxcore50/Foo.dll".to_string()]));
    }

    #[test]
    fn test_ref_only_package_has_no_runtime_info() {
        let files = files(&["ref/net451/Foo.dll"]);
        let dnx = select_assets(&files, &fx("dnx451"), &[]);
        assert_eq!(dnx.compile, Some(vec!["ref/net451/Foo.dll".to_string()]));
        assert_eq!(dnx.runtime, None);
    }

    #[test]
    fn test_placeholder_is_an_asset() {
        let files = files(&["lib/net45/_._", "ref/net45/_._"]);
        let net = select_assets(&files, &fx("net45"), &[]);
        assert_eq!(net.compile, Some(vec!["ref/net45/_._".to_string()]));
        assert_eq!(net.runtime, Some(vec!["lib/net45/_._".to_string()]));
    }

    #[test]
    fn test_runtime_specific_assets() {
        let files = files(&[
            "lib/dnxcore50/Foo.dll",
            "runtimes/win7/lib/dnxcore50/Foo.dll",
            "runtimes/win7-x64/native/foo.so",
        ]);
        let rids = vec!["win7-x64".to_string(), "win7".to_string()];
        let core = select_assets(&files, &fx("dnxcore50"), &rids);
        assert_eq!(core.compile, Some(vec!["lib/dnxcore50/Foo.dll".to_string()]));
        assert_eq!(core.runtime, Some(vec!["runtimes/win7/lib/dnxcore50/Foo.dll".to_string()]));
        assert_eq!(core.native, Some(vec!["runtimes/win7-x64/native/foo.so".to_string()]));
    }
}
