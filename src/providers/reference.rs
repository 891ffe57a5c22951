//! Framework references: reference assembly folders and the GAC.

use std::path::{Path, PathBuf};

use semver::Version;

use crate::core::framework::FrameworkName;
use crate::core::library::{LibraryDescription, LibraryIdentity, LibraryRange, LibraryType};
use crate::providers::provider::DependencyProvider;

/// Host operating system, as far as platform assemblies care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    Linux,
    MacOs,
}

impl HostOs {
    /// The operating system this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            HostOs::Windows
        } else if cfg!(target_os = "macos") {
            HostOs::MacOs
        } else {
            HostOs::Linux
        }
    }
}

/// Injected platform configuration.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub os: HostOs,
    /// `%WINDIR%`; the GAC lives beneath it.
    pub windows_dir: Option<PathBuf>,
    /// Roots holding `{identifier}/v{version}/{name}.dll`.
    pub reference_assembly_roots: Vec<PathBuf>,
}

impl ReferenceConfig {
    pub fn new(os: HostOs) -> Self {
        ReferenceConfig {
            os,
            windows_dir: None,
            reference_assembly_roots: Vec::new(),
        }
    }

    pub fn with_windows_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.windows_dir = Some(dir.into());
        self
    }

    pub fn with_reference_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.reference_assembly_roots.push(root.into());
        self
    }
}

struct GacEntry {
    name: &'static str,
    /// Assembly version, four parts.
    version: (u64, u64, u64, u64),
    /// Lowest desktop framework version shipping this assembly.
    framework_floor: (u64, u64),
    processor_dir: &'static str,
    public_key_token: &'static str,
}

const ECMA_TOKEN: &str = "b77a5c561934e089";
const MS_TOKEN: &str = "b03f5f7f11d50a3a";

const GAC_REGISTRY: &[GacEntry] = &[
    GacEntry { name: "mscorlib", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_32", public_key_token: ECMA_TOKEN },
    GacEntry { name: "System", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_MSIL", public_key_token: ECMA_TOKEN },
    GacEntry { name: "System.Core", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_MSIL", public_key_token: ECMA_TOKEN },
    GacEntry { name: "System.Data", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_32", public_key_token: ECMA_TOKEN },
    GacEntry { name: "System.Xml", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_MSIL", public_key_token: ECMA_TOKEN },
    GacEntry { name: "System.Xml.Linq", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_MSIL", public_key_token: ECMA_TOKEN },
    GacEntry { name: "Microsoft.CSharp", version: (4, 0, 0, 0), framework_floor: (4, 0), processor_dir: "GAC_MSIL", public_key_token: MS_TOKEN },
    GacEntry { name: "System.Net.Http", version: (4, 0, 0, 0), framework_floor: (4, 5), processor_dir: "GAC_MSIL", public_key_token: MS_TOKEN },
    GacEntry { name: "System.Runtime", version: (4, 0, 0, 0), framework_floor: (4, 5), processor_dir: "GAC_MSIL", public_key_token: MS_TOKEN },
];

impl GacEntry {
    fn semver(&self) -> Version {
        let (major, minor, patch, _) = self.version;
        Version::new(major, minor, patch)
    }

    fn four_part(&self) -> String {
        let (a, b, c, d) = self.version;
        format!("{}.{}.{}.{}", a, b, c, d)
    }

    /// `{windir}/Microsoft.NET/assembly/GAC_32/mscorlib/v4.0_4.0.0.0__b77a5c561934e089/mscorlib.dll`
    fn path(&self, windows_dir: &Path) -> PathBuf {
        let (major, minor, _, _) = self.version;
        windows_dir
            .join("Microsoft.NET")
            .join("assembly")
            .join(self.processor_dir)
            .join(self.name)
            .join(format!("v{}.{}_{}__{}", major, minor, self.four_part(), self.public_key_token))
            .join(format!("{}.dll", self.name))
    }
}

/// Resolves framework references from reference assembly folders, then
/// from the global assembly cache.
pub struct FrameworkReferenceProvider {
    config: ReferenceConfig,
}

impl FrameworkReferenceProvider {
    pub fn new(config: ReferenceConfig) -> Self {
        FrameworkReferenceProvider { config }
    }

    fn from_reference_roots(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<LibraryDescription> {
        let version = range
            .version_range()
            .and_then(|r| r.min().cloned())
            .unwrap_or_else(|| framework.version().clone());
        if !range.satisfies(&version) {
            return None;
        }

        self.config.reference_assembly_roots.iter().find_map(|root| {
            let path = reference_dir(root, framework).join(format!("{}.dll", range.name()));
            if !path.is_file() {
                return None;
            }
            let identity = LibraryIdentity::new(range.name(), version.clone(), LibraryType::Reference);
            Some(
                LibraryDescription::new(range.clone(), identity)
                    .with_path(path)
                    .with_loadable_assemblies(vec![range.name().to_string()]),
            )
        })
    }

    fn from_gac(&self, range: &LibraryRange, framework: &FrameworkName) -> Option<LibraryDescription> {
        if self.config.os != HostOs::Windows || !framework.is_desktop() {
            return None;
        }
        let windows_dir = self.config.windows_dir.as_ref()?;

        let entry = GAC_REGISTRY.iter().find(|e| e.name.eq_ignore_ascii_case(range.name()))?;

        let (floor_major, floor_minor) = entry.framework_floor;
        if *framework.version() < Version::new(floor_major, floor_minor, 0) {
            return None;
        }

        let version = entry.semver();
        if let Some(min) = range.version_range().and_then(|r| r.min()) {
            if *min != version {
                return None;
            }
        }

        let identity = LibraryIdentity::new(entry.name, version, LibraryType::Reference);
        Some(
            LibraryDescription::new(range.clone(), identity)
                .with_path(entry.path(windows_dir))
                .with_loadable_assemblies(vec![entry.name.to_string()]),
        )
    }
}

fn reference_dir(root: &Path, framework: &FrameworkName) -> PathBuf {
    let v = framework.version();
    let version = if v.patch == 0 {
        format!("v{}.{}", v.major, v.minor)
    } else {
        format!("v{}.{}.{}", v.major, v.minor, v.patch)
    };
    root.join(framework.identifier()).join(version)
}

impl DependencyProvider for FrameworkReferenceProvider {
    fn name(&self) -> &str {
        "reference"
    }

    fn get_description(
        &self,
        range: &LibraryRange,
        framework: &FrameworkName,
    ) -> Option<LibraryDescription> {
        if !range.is_framework_reference() || !range.allows_type(LibraryType::Reference) {
            return None;
        }

        self.from_reference_roots(range, framework)
            .or_else(|| self.from_gac(range, framework))
    }

    fn get_attempted_paths(&self, framework: &FrameworkName) -> Vec<String> {
        let mut paths: Vec<String> = self
            .config
            .reference_assembly_roots
            .iter()
            .map(|root| reference_dir(root, framework).join("{name}.dll").display().to_string())
            .collect();

        if self.config.os == HostOs::Windows && framework.is_desktop() {
            if let Some(windir) = &self.config.windows_dir {
                paths.push(
                    windir
                        .join("Microsoft.NET")
                        .join("assembly")
                        .join("{name}.dll")
                        .display()
                        .to_string(),
                );
            }
        }

        paths
    }
}
