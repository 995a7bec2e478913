//! Host platform detection
//!
//! Reads `/etc/os-release` (falling back to `/usr/lib/os-release`) once at
//! startup and maps the distribution onto a closed set of platform families.
//! The resulting [`Platform`] is immutable and passed explicitly to every
//! step; nothing looks the OS up again later in the run.

pub mod profile;

use crate::error::{ProvisionError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use strum::{Display, EnumString};

pub use profile::{DebianProfile, FamilyProfile, RhelProfile};

/// Distribution grouping that decides package names, service names and paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    DebianLike,
    RhelLike,
    Unknown,
}

/// Package manager driving a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    Apt,
    Dnf,
}

/// Distribution/major-version pairs the panel install is known to work on.
const TESTED_RELEASES: &[(&str, &[u32])] = &[
    ("ubuntu", &[20, 22, 24]),
    ("debian", &[10, 11, 12]),
    ("rocky", &[8, 9]),
    ("almalinux", &[8, 9]),
];

/// Probed description of the host operating system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    family: Family,
    distro: String,
    major_version: u32,
    codename: Option<String>,
}

impl Platform {
    /// Build a platform descriptor directly (used by tests and `--root` probes).
    pub fn new(family: Family, distro: impl Into<String>, major_version: u32) -> Self {
        Self {
            family,
            distro: distro.into(),
            major_version,
            codename: None,
        }
    }

    /// Attach a release codename (e.g. `bookworm`).
    pub fn with_codename(mut self, codename: impl Into<String>) -> Self {
        self.codename = Some(codename.into());
        self
    }

    /// Detect the running host's platform.
    pub fn detect() -> Result<Self> {
        Self::detect_in(Path::new("/"))
    }

    /// Detect the platform of a filesystem tree rooted at `root`.
    ///
    /// # Errors
    ///
    /// `UnsupportedPlatform` when no os-release file is readable or the
    /// distribution does not map onto a known family.
    pub fn detect_in(root: &Path) -> Result<Self> {
        let content = ["etc/os-release", "usr/lib/os-release"]
            .iter()
            .find_map(|candidate| fs::read_to_string(root.join(candidate)).ok())
            .ok_or_else(|| {
                ProvisionError::unsupported(format!(
                    "no os-release file found under {}",
                    root.display()
                ))
            })?;

        let platform = Self::from_os_release(&content)?;
        tracing::info!(
            "Detected platform: {} (family={}, package manager={})",
            platform,
            platform.family,
            platform
                .package_manager()
                .map_or_else(|| "none".to_string(), |pm| pm.to_string())
        );
        Ok(platform)
    }

    /// Parse the contents of an os-release file.
    pub fn from_os_release(content: &str) -> Result<Self> {
        let vars = parse_os_release(content);

        let id = vars.get("ID").map(|s| s.to_lowercase()).unwrap_or_default();
        let id_like = vars.get("ID_LIKE").map(|s| s.to_lowercase()).unwrap_or_default();
        let family = family_for(&id, &id_like);

        if family == Family::Unknown {
            let name = vars.get("PRETTY_NAME").cloned().unwrap_or_else(|| id.clone());
            return Err(ProvisionError::unsupported(format!(
                "'{}' is neither Debian-like nor RHEL-like",
                if name.is_empty() { "unknown OS" } else { name.as_str() }
            )));
        }

        let major_version = vars
            .get("VERSION_ID")
            .and_then(|v| v.split('.').next())
            .and_then(|major| major.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            family,
            distro: id,
            major_version,
            codename: vars.get("VERSION_CODENAME").filter(|c| !c.is_empty()).cloned(),
        })
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn distro(&self) -> &str {
        &self.distro
    }

    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    pub fn codename(&self) -> Option<&str> {
        self.codename.as_deref()
    }

    /// Package manager implied by the family; `None` for unknown platforms.
    pub fn package_manager(&self) -> Option<PackageManagerKind> {
        match self.family {
            Family::DebianLike => Some(PackageManagerKind::Apt),
            Family::RhelLike => Some(PackageManagerKind::Dnf),
            Family::Unknown => None,
        }
    }

    /// Whether this exact distro/major version is on the tested list.
    pub fn is_tested(&self) -> bool {
        TESTED_RELEASES
            .iter()
            .any(|(distro, versions)| *distro == self.distro && versions.contains(&self.major_version))
    }

    /// Family-specific handler. Fails before any mutation for unknown families.
    pub fn profile(&self) -> Result<&'static dyn FamilyProfile> {
        static DEBIAN: DebianProfile = DebianProfile;
        static RHEL: RhelProfile = RhelProfile;

        match self.family {
            Family::DebianLike => Ok(&DEBIAN),
            Family::RhelLike => Ok(&RHEL),
            Family::Unknown => Err(ProvisionError::unsupported(format!(
                "no provisioning handler for {} {}",
                self.distro, self.major_version
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.distro, self.major_version)?;
        if let Some(codename) = &self.codename {
            write!(f, " ({})", codename)?;
        }
        Ok(())
    }
}

fn family_for(id: &str, id_like: &str) -> Family {
    match id {
        "debian" | "ubuntu" => return Family::DebianLike,
        "rocky" | "almalinux" | "rhel" | "centos" | "ol" => return Family::RhelLike,
        _ => {}
    }

    let like: Vec<&str> = id_like.split_whitespace().collect();
    if like.iter().any(|l| matches!(*l, "debian" | "ubuntu")) {
        Family::DebianLike
    } else if like.iter().any(|l| matches!(*l, "rhel" | "centos" | "fedora")) {
        Family::RhelLike
    } else {
        Family::Unknown
    }
}

/// Parse os-release `KEY=value` lines into a map, stripping quotes.
fn parse_os_release(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}
