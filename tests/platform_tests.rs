//! Platform detection against scratch os-release trees
//!
//! These tests verify:
//! - Every supported distribution lands in the right family
//! - The package manager always agrees with the family
//! - Missing or unknown os-release data is rejected before provisioning

mod common;

use common::{ARCH, DEBIAN_12, ROCKY_9, UBUNTU_22};
use panel_provisioner::{Family, PackageManagerKind, Platform, ProvisionError};
use std::fs;
use std::path::Path;

fn detect(os_release: &str) -> panel_provisioner::Result<Platform> {
    let dir = tempfile::tempdir().unwrap();
    write_os_release(dir.path(), "etc/os-release", os_release);
    Platform::detect_in(dir.path())
}

fn write_os_release(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn expected_manager(family: Family) -> Option<PackageManagerKind> {
    match family {
        Family::DebianLike => Some(PackageManagerKind::Apt),
        Family::RhelLike => Some(PackageManagerKind::Dnf),
        Family::Unknown => None,
    }
}

#[test]
fn test_debian_like_hosts() {
    for (content, distro, major) in [(UBUNTU_22, "ubuntu", 22), (DEBIAN_12, "debian", 12)] {
        let platform = detect(content).unwrap();
        assert_eq!(platform.family(), Family::DebianLike);
        assert_eq!(platform.distro(), distro);
        assert_eq!(platform.major_version(), major);
        assert_eq!(platform.package_manager(), expected_manager(platform.family()));
        assert!(platform.is_tested());
    }
}

#[test]
fn test_rhel_like_hosts() {
    let almalinux = "ID=\"almalinux\"\nID_LIKE=\"rhel centos fedora\"\nVERSION_ID=\"8.10\"\n";
    for (content, distro, major) in [(ROCKY_9, "rocky", 9), (almalinux, "almalinux", 8)] {
        let platform = detect(content).unwrap();
        assert_eq!(platform.family(), Family::RhelLike);
        assert_eq!(platform.distro(), distro);
        assert_eq!(platform.major_version(), major);
        assert_eq!(platform.package_manager(), Some(PackageManagerKind::Dnf));
    }
}

#[test]
fn test_derivative_maps_through_id_like() {
    let mint = "ID=linuxmint\nID_LIKE=\"ubuntu debian\"\nVERSION_ID=\"21.3\"\n";
    let platform = detect(mint).unwrap();
    assert_eq!(platform.family(), Family::DebianLike);
    assert!(!platform.is_tested());
    assert!(platform.profile().is_ok());
}

#[test]
fn test_codename_is_kept() {
    let platform = detect(DEBIAN_12).unwrap();
    assert_eq!(platform.codename(), Some("bookworm"));
    assert_eq!(platform.to_string(), "debian 12 (bookworm)");
}

#[test]
fn test_falls_back_to_usr_lib_os_release() {
    let dir = tempfile::tempdir().unwrap();
    write_os_release(dir.path(), "usr/lib/os-release", ROCKY_9);
    let platform = Platform::detect_in(dir.path()).unwrap();
    assert_eq!(platform.family(), Family::RhelLike);
}

#[test]
fn test_unknown_distribution_is_unsupported() {
    let err = detect(ARCH).unwrap_err();
    assert!(matches!(err, ProvisionError::UnsupportedPlatform(_)));
    assert!(err.to_string().contains("Arch Linux"));
}

#[test]
fn test_missing_os_release_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let err = Platform::detect_in(dir.path()).unwrap_err();
    assert!(matches!(err, ProvisionError::UnsupportedPlatform(_)));
}
