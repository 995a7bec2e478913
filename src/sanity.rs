//! Pre-flight sanity checks for the runtime environment
//!
//! This module verifies the host before any step runs:
//! - Running with root privileges (EUID 0)
//! - Bootstrap binaries are on `PATH`
//! - The distribution maps to a supported family
//!
//! `install` only enforces the privilege check; `check` reports everything.

use crate::error::{ProvisionError, Result};
use crate::platform::{Family, PackageManagerKind, Platform};
use serde::Serialize;
use std::env;
use std::fmt::Write as _;
use std::path::Path;

/// Environment variable that disables the root check (containers, CI).
pub const SKIP_ROOT_CHECK_ENV: &str = "PANEL_SKIP_ROOT_CHECK";

/// Binaries the first steps rely on before any package is installed
const REQUIRED_BINARIES: &[&str] = &[
    "systemctl", // Service management
    "curl",      // Repository keys, Composer, panel release
    "tar",       // Panel archive
];

/// Check if running as root (EUID 0)
pub fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Fail with `Permission` unless `is_root`.
///
/// Skipped when `skip` is set or `PANEL_SKIP_ROOT_CHECK` is non-empty.
pub fn require_root(skip: bool, is_root: bool) -> Result<()> {
    let env_skip = env::var(SKIP_ROOT_CHECK_ENV).is_ok_and(|v| !v.is_empty());
    if skip || env_skip {
        tracing::warn!("Root privilege check skipped");
        return Ok(());
    }
    if is_root {
        return Ok(());
    }
    Err(ProvisionError::permission(
        "this installer must be run as root (try: sudo panel-provisioner install ...)",
    ))
}

/// Check if an executable named `name` is on `PATH`.
pub fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

fn package_manager_binary(kind: PackageManagerKind) -> &'static str {
    match kind {
        PackageManagerKind::Apt => "apt-get",
        PackageManagerKind::Dnf => "dnf",
    }
}

/// Binaries from `required` that `exists` rejects.
fn missing_binaries<F>(required: &[&str], exists: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    required
        .iter()
        .filter(|b| !exists(b))
        .map(ToString::to_string)
        .collect()
}

/// Result of environment verification
#[derive(Debug, Serialize)]
pub struct PreflightReport {
    /// Detected platform, or why detection failed.
    pub platform: std::result::Result<Platform, String>,
    pub is_root: bool,
    pub tested_release: bool,
    pub missing_binaries: Vec<String>,
}

impl PreflightReport {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
            && self.is_root
            && self
                .platform
                .as_ref()
                .is_ok_and(|p| p.family() != Family::Unknown)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let mark = |ok: bool| if ok { "✓" } else { "✗" };

        let _ = match &self.platform {
            Ok(p) => writeln!(
                out,
                "{} Platform: {} [{}]{}",
                mark(p.family() != Family::Unknown),
                p,
                p.family(),
                if self.tested_release { "" } else { " (untested release)" }
            ),
            Err(e) => writeln!(out, "✗ Platform: {}", e),
        };
        let _ = writeln!(out, "{} Running as root", mark(self.is_root));
        if self.missing_binaries.is_empty() {
            let _ = writeln!(out, "✓ Required binaries present");
        } else {
            let _ = writeln!(out, "✗ Missing binaries: {}", self.missing_binaries.join(", "));
        }
        out
    }
}

/// Perform all checks against the host mounted at `root`.
pub fn verify_environment(root: &Path) -> PreflightReport {
    let platform = Platform::detect_in(root).map_err(|e| e.to_string());

    let mut required: Vec<&str> = REQUIRED_BINARIES.to_vec();
    if let Some(kind) = platform.as_ref().ok().and_then(Platform::package_manager) {
        required.push(package_manager_binary(kind));
    }

    PreflightReport {
        tested_release: platform.as_ref().is_ok_and(Platform::is_tested),
        platform,
        is_root: is_running_as_root(),
        missing_binaries: missing_binaries(&required, binary_exists),
    }
}
