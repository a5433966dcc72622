//! Target platforms.
//!
//! Each [`Platform`] maps to a [`PlatformDescriptor`]: the modules to extract
//! from, where their dependencies live, which namespaces to ignore, which
//! events to look at and which built-in template renders them. Descriptors are
//! plain data computed from a few install roots ([`PlatformRoots`]).

use crate::error::{Error, Result};
use crate::extract::EventScope;
use crate::render::BuiltinTemplate;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Default location of the .NET reference assemblies on Windows
pub const DEFAULT_REFERENCE_ASSEMBLIES: &str =
    r"C:\Program Files (x86)\Reference Assemblies\Microsoft\Framework";

/// Default Windows 10 SDK root
pub const DEFAULT_WINDOWS_KITS: &str = r"C:\Program Files (x86)\Windows Kits\10";

/// Namespaces whose types never get generated wrappers
pub const EXCLUDED_NAMESPACES: &[&str] = &[
    "Windows.UI.Xaml.Data",
    "Windows.UI.Xaml.Interop",
    "Windows.UI.Xaml.Input",
    "MonoTouch.AudioToolbox",
    "MonoMac.AudioToolbox",
    "ReactiveUI.Events",
    "System.Collections.Specialized",
    "System.Configuration",
    "System.ComponentModel.Design",
    "System.ComponentModel.Design.Serialization",
    "System.CodeDom",
    "System.Data.SqlClient",
    "System.Data.OleDb",
    "System.Data.Odbc",
    "System.Data.Common",
    "System.Drawing.Design",
    "System.Media",
    "System.Net",
    "System.Net.Mail",
    "System.Net.NetworkInformation",
    "System.Net.Sockets",
    "System.ServiceProcess.Design",
    "System.Windows.Input",
    "System.Windows.Forms.ComponentModel.Com2Interop",
    "System.Windows.Forms.Design",
    "System.Timers",
];

/// Supported target platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Assemblies given explicitly
    None,
    /// Xamarin.Android
    Android,
    /// Xamarin.iOS
    Ios,
    /// Xamarin.Mac
    Mac,
    /// Xamarin.TVOS
    TvOs,
    /// Windows Presentation Foundation
    Wpf,
    /// Windows Forms
    Winforms,
    /// Universal Windows Platform
    Uwp,
    /// Xamarin.Forms
    XamForms,
    /// Tizen
    Tizen,
    /// Xamarin.Essentials (static events)
    Essentials,
}

impl Platform {
    /// Every platform, in command-line order
    pub const ALL: [Platform; 11] = [
        Platform::None,
        Platform::Android,
        Platform::Ios,
        Platform::Mac,
        Platform::TvOs,
        Platform::Wpf,
        Platform::Winforms,
        Platform::Uwp,
        Platform::XamForms,
        Platform::Tizen,
        Platform::Essentials,
    ];

    /// Command-line name
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::None => "none",
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Mac => "mac",
            Platform::TvOs => "tvos",
            Platform::Wpf => "wpf",
            Platform::Winforms => "winforms",
            Platform::Uwp => "uwp",
            Platform::XamForms => "xamforms",
            Platform::Tizen => "tizen",
            Platform::Essentials => "essentials",
        }
    }

    /// Builds the descriptor for this platform
    ///
    /// `assemblies` is only used by [`Platform::None`], which requires at
    /// least one.
    pub fn descriptor(&self, roots: &PlatformRoots, assemblies: &[PathBuf]) -> Result<PlatformDescriptor> {
        let descriptor = match self {
            Platform::None => {
                if assemblies.is_empty() {
                    return Err(Error::platform_unavailable(
                        self.as_str(),
                        "no assemblies were given",
                    ));
                }
                let mut search_dirs = Vec::new();
                for parent in assemblies.iter().filter_map(|a| a.parent()) {
                    push_unique(&mut search_dirs, parent.to_path_buf());
                }
                PlatformDescriptor::new(*self, assemblies.to_vec(), search_dirs)
            }
            Platform::Android => {
                let base = roots.reference_assemblies.join("MonoAndroid");
                let dir = self.highest(&base)?;
                PlatformDescriptor::new(
                    *self,
                    vec![dir.join("Mono.Android.dll")],
                    vec![dir, base.join("v1.0")],
                )
            }
            Platform::Ios => self.xamarin_apple(roots, "Xamarin.iOS", "v1.0")?,
            Platform::Mac => self.xamarin_apple(roots, "Xamarin.Mac", "v2.0")?,
            Platform::TvOs => self.xamarin_apple(roots, "Xamarin.TVOS", "v1.0")?,
            Platform::Wpf => {
                let dir = self.highest(&roots.reference_assemblies.join(".NETFramework"))?;
                PlatformDescriptor::new(
                    *self,
                    ["WindowsBase.dll", "PresentationCore.dll", "PresentationFramework.dll"]
                        .iter()
                        .map(|f| dir.join(f))
                        .collect(),
                    vec![dir.join("Facades"), dir],
                )
            }
            Platform::Winforms => {
                let dir = self.highest(&roots.reference_assemblies.join(".NETFramework"))?;
                PlatformDescriptor::new(
                    *self,
                    vec![dir.join("System.Windows.Forms.dll")],
                    vec![dir.join("Facades"), dir],
                )
            }
            Platform::Uwp => {
                let dir = self.highest(&roots.windows_kits.join("UnionMetadata"))?;
                let mut search_dirs = vec![dir.clone()];
                if let Some(netfx) = highest_version(&roots.reference_assemblies.join(".NETFramework")) {
                    search_dirs.push(netfx);
                }
                PlatformDescriptor::new(*self, vec![dir.join("Windows.winmd")], search_dirs)
            }
            Platform::XamForms => {
                let lib = self.package_lib(roots, "xamarin.forms")?;
                PlatformDescriptor::new(
                    *self,
                    vec![lib.join("Xamarin.Forms.Core.dll"), lib.join("Xamarin.Forms.Xaml.dll")],
                    netstandard_dirs(roots, lib),
                )
            }
            Platform::Tizen => {
                let lib = self.package_lib(roots, "tizen.net")?;
                let assemblies = dlls_in(&lib)?;
                if assemblies.is_empty() {
                    return Err(Error::platform_unavailable(
                        self.as_str(),
                        format!("no assemblies in {}", lib.display()),
                    ));
                }
                PlatformDescriptor::new(*self, assemblies, netstandard_dirs(roots, lib))
            }
            Platform::Essentials => {
                let lib = self.package_lib(roots, "xamarin.essentials")?;
                let mut descriptor = PlatformDescriptor::new(
                    *self,
                    vec![lib.join("Xamarin.Essentials.dll")],
                    netstandard_dirs(roots, lib),
                );
                descriptor.event_scope = EventScope::Static;
                descriptor.template = BuiltinTemplate::Essentials;
                descriptor
            }
        };
        debug!(
            "Platform {}: {} assembl(ies), {} search dir(s)",
            self,
            descriptor.assemblies.len(),
            descriptor.search_dirs.len()
        );
        Ok(descriptor)
    }

    fn xamarin_apple(&self, roots: &PlatformRoots, product: &str, version: &str) -> Result<PlatformDescriptor> {
        let dir = roots.reference_assemblies.join(product).join(version);
        Ok(PlatformDescriptor::new(
            *self,
            vec![dir.join(format!("{}.dll", product))],
            vec![dir.join("Facades"), dir],
        ))
    }

    fn highest(&self, base: &Path) -> Result<PathBuf> {
        highest_version(base).ok_or_else(|| {
            Error::platform_unavailable(
                self.as_str(),
                format!("no versioned directory under {}", base.display()),
            )
        })
    }

    fn package_lib(&self, roots: &PlatformRoots, package: &str) -> Result<PathBuf> {
        Ok(self
            .highest(&roots.packages.join(package))?
            .join("lib")
            .join("netstandard2.0"))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::platform_unavailable(s, "unknown platform"))
    }
}

/// Install roots platform descriptors are computed from
#[derive(Debug, Clone)]
pub struct PlatformRoots {
    /// .NET reference assemblies
    pub reference_assemblies: PathBuf,
    /// NuGet global packages folder
    pub packages: PathBuf,
    /// Windows 10 SDK
    pub windows_kits: PathBuf,
}

impl Default for PlatformRoots {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_default();
        Self {
            reference_assemblies: PathBuf::from(DEFAULT_REFERENCE_ASSEMBLIES),
            packages: home.join(".nuget").join("packages"),
            windows_kits: PathBuf::from(DEFAULT_WINDOWS_KITS),
        }
    }
}

impl PlatformRoots {
    /// Creates roots with default locations
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reference assemblies root
    pub fn reference_assemblies(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_assemblies = path.into();
        self
    }

    /// Sets the NuGet packages root
    pub fn packages(mut self, path: impl Into<PathBuf>) -> Self {
        self.packages = path.into();
        self
    }

    /// Sets the Windows SDK root
    pub fn windows_kits(mut self, path: impl Into<PathBuf>) -> Self {
        self.windows_kits = path.into();
        self
    }
}

/// What to extract for one platform, and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    /// Platform this describes
    pub platform: Platform,
    /// Root modules, in extraction order
    pub assemblies: Vec<PathBuf>,
    /// Dependency search directories, in order
    pub search_dirs: Vec<PathBuf>,
    /// Namespaces to skip
    pub excluded_namespaces: Vec<String>,
    /// Which events to extract
    pub event_scope: EventScope,
    /// Template used unless one is given explicitly
    pub template: BuiltinTemplate,
}

impl PlatformDescriptor {
    fn new(platform: Platform, assemblies: Vec<PathBuf>, search_dirs: Vec<PathBuf>) -> Self {
        Self {
            platform,
            assemblies,
            search_dirs,
            excluded_namespaces: EXCLUDED_NAMESPACES.iter().map(|s| s.to_string()).collect(),
            event_scope: EventScope::Instance,
            template: BuiltinTemplate::Default,
        }
    }

    /// Appends search directories not already present
    pub fn with_search_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        for dir in dirs {
            push_unique(&mut self.search_dirs, dir);
        }
        self
    }
}

fn push_unique(dirs: &mut Vec<PathBuf>, dir: PathBuf) {
    if !dirs.contains(&dir) {
        dirs.push(dir);
    }
}

/// Package lib directory plus the netstandard reference assemblies, if present
fn netstandard_dirs(roots: &PlatformRoots, lib: PathBuf) -> Vec<PathBuf> {
    let mut dirs = vec![lib];
    if let Some(version) = highest_version(&roots.packages.join("netstandard.library")) {
        dirs.push(version.join("build").join("netstandard2.0").join("ref"));
    }
    dirs
}

fn dlls_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::file_read(dir, e))?;
    let mut dlls: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("dll")))
        .collect();
    dlls.sort();
    Ok(dlls)
}

/// Parses `v4.6.1` / `3.4.0.1008975` / `1.2.0-pre3` into a sortable key
fn version_key(name: &str) -> Option<(Vec<u64>, bool)> {
    let name = name.strip_prefix('v').unwrap_or(name);
    let (release, prerelease) = match name.split_once('-') {
        Some((release, _)) => (release, true),
        None => (name, false),
    };
    let parts = release
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some((parts, !prerelease))
}

/// Subdirectory of `base` with the highest version-like name
pub fn highest_version(base: &Path) -> Option<PathBuf> {
    std::fs::read_dir(base)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let key = version_key(e.file_name().to_str()?)?;
            Some((key, e.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}
