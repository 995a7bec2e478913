//! Per-family provisioning handlers.
//!
//! Everything that differs between Debian-like and RHEL-like hosts lives
//! behind [`FamilyProfile`]: package names, service names, paths, the web
//! server account and the repository/firewall command sequences. Adding a
//! family means adding a `Family` variant and one implementation here.

use crate::command_runner::CommandSpec;
use crate::error::Result;
use crate::platform::{Family, Platform};
use crate::provision::Provisioner;

pub const PHP_VERSION: &str = "8.3";

/// nginx site file locations for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NginxLayout {
    /// Where the rendered site config is written.
    pub site_path: &'static str,
    /// Symlink that enables the site, if the family uses sites-enabled.
    pub enabled_link: Option<&'static str>,
    /// Distribution default site to disable.
    pub default_site: Option<&'static str>,
}

/// Shared step interface implemented once per platform family.
pub trait FamilyProfile: Sync {
    fn family(&self) -> Family;

    /// Account PHP-FPM and nginx run as; owns the panel files.
    fn web_user(&self) -> &'static str;

    fn redis_service(&self) -> &'static str;

    fn database_service(&self) -> &'static str;

    fn cron_service(&self) -> &'static str;

    fn php_fpm_service(&self) -> &'static str;

    fn php_socket(&self) -> &'static str;

    /// Path of a dedicated PHP-FPM pool config, if the family needs one.
    fn php_fpm_pool_path(&self) -> Option<&'static str>;

    fn nginx(&self) -> NginxLayout;

    /// Runtime dependencies of the panel.
    fn packages(&self) -> Vec<String>;

    fn certbot_packages(&self) -> &'static [&'static str];

    /// Non-interactive install of `packages`.
    fn install_command(&self, packages: &[String]) -> CommandSpec;

    /// Refresh the package index.
    fn refresh_command(&self) -> CommandSpec;

    /// Register the third-party repositories PHP comes from.
    fn register_repositories(&self, platform: &Platform, prov: &Provisioner<'_>) -> Result<()>;

    /// Open SSH/HTTP/HTTPS and enable the host firewall.
    fn configure_firewall(&self, prov: &Provisioner<'_>) -> Result<()>;

    /// SELinux adjustments nginx/PHP need; a no-op where SELinux is absent.
    fn configure_selinux(&self, prov: &Provisioner<'_>) -> Result<()>;
}

/// Debian and Ubuntu (apt).
#[derive(Debug, Clone, Copy, Default)]
pub struct DebianProfile;

/// Rocky Linux, AlmaLinux and other RHEL rebuilds (dnf).
#[derive(Debug, Clone, Copy, Default)]
pub struct RhelProfile;

const SURY_KEYRING: &str = "/usr/share/keyrings/deb.sury.org-php.gpg";
const SURY_LIST: &str = "/etc/apt/sources.list.d/sury-php.list";

impl FamilyProfile for DebianProfile {
    fn family(&self) -> Family {
        Family::DebianLike
    }

    fn web_user(&self) -> &'static str {
        "www-data"
    }

    fn redis_service(&self) -> &'static str {
        "redis-server"
    }

    fn database_service(&self) -> &'static str {
        "mariadb"
    }

    fn cron_service(&self) -> &'static str {
        "cron"
    }

    fn php_fpm_service(&self) -> &'static str {
        "php8.3-fpm"
    }

    fn php_socket(&self) -> &'static str {
        "/run/php/php8.3-fpm.sock"
    }

    fn php_fpm_pool_path(&self) -> Option<&'static str> {
        None
    }

    fn nginx(&self) -> NginxLayout {
        NginxLayout {
            site_path: "/etc/nginx/sites-available/pterodactyl.conf",
            enabled_link: Some("/etc/nginx/sites-enabled/pterodactyl.conf"),
            default_site: Some("/etc/nginx/sites-enabled/default"),
        }
    }

    fn packages(&self) -> Vec<String> {
        let mut packages: Vec<String> = [
            "cli", "common", "gd", "mysql", "mbstring", "bcmath", "xml", "fpm", "curl", "zip",
        ]
        .iter()
        .map(|ext| format!("php{}-{}", PHP_VERSION, ext))
        .collect();
        packages.insert(0, format!("php{}", PHP_VERSION));
        packages.extend(
            ["mariadb-server", "nginx", "redis-server", "tar", "unzip", "git", "cron", "curl"]
                .iter()
                .map(ToString::to_string),
        );
        packages
    }

    fn certbot_packages(&self) -> &'static [&'static str] {
        &["certbot", "python3-certbot-nginx"]
    }

    fn install_command(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("apt-get")
            .args(["install", "-y", "--no-install-recommends"])
            .args(packages.iter().cloned())
            .env("DEBIAN_FRONTEND", "noninteractive")
            .streaming()
    }

    fn refresh_command(&self) -> CommandSpec {
        CommandSpec::new("apt-get")
            .args(["update", "-y"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .streaming()
    }

    fn register_repositories(&self, platform: &Platform, prov: &Provisioner<'_>) -> Result<()> {
        let prerequisites: Vec<String> = [
            "software-properties-common",
            "apt-transport-https",
            "ca-certificates",
            "gnupg",
            "curl",
            "lsb-release",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        prov.run(self.install_command(&prerequisites))?;

        if platform.distro() == "ubuntu" {
            prov.run(
                CommandSpec::new("add-apt-repository")
                    .args(["-y", "ppa:ondrej/php"])
                    .env("LC_ALL", "C.UTF-8"),
            )?;
        } else {
            let codename = platform.codename().unwrap_or(match platform.major_version() {
                10 => "buster",
                11 => "bullseye",
                _ => "bookworm",
            });
            if !prov.exists(SURY_KEYRING) {
                prov.run(
                    CommandSpec::new("curl")
                        .args(["-fsSL", "--create-dirs", "-o"])
                        .arg(prov.host_path(SURY_KEYRING).to_string_lossy())
                        .arg("https://packages.sury.org/php/apt.gpg"),
                )?;
            }
            prov.write_file(
                SURY_LIST,
                &format!(
                    "deb [signed-by={}] https://packages.sury.org/php/ {} main\n",
                    SURY_KEYRING, codename
                ),
                0o644,
            )?;
        }

        prov.run(self.refresh_command())?;
        Ok(())
    }

    fn configure_firewall(&self, prov: &Provisioner<'_>) -> Result<()> {
        prov.run(self.install_command(&["ufw".to_string()]))?;
        for port in ["22", "80", "443"] {
            prov.run(CommandSpec::new("ufw").args(["allow", port]))?;
        }
        prov.run(CommandSpec::new("ufw").args(["--force", "enable"]))?;
        Ok(())
    }

    fn configure_selinux(&self, _prov: &Provisioner<'_>) -> Result<()> {
        tracing::debug!("SELinux is not used on Debian-like hosts");
        Ok(())
    }
}

impl FamilyProfile for RhelProfile {
    fn family(&self) -> Family {
        Family::RhelLike
    }

    fn web_user(&self) -> &'static str {
        "nginx"
    }

    fn redis_service(&self) -> &'static str {
        "redis"
    }

    fn database_service(&self) -> &'static str {
        "mariadb"
    }

    fn cron_service(&self) -> &'static str {
        "crond"
    }

    fn php_fpm_service(&self) -> &'static str {
        "php-fpm"
    }

    fn php_socket(&self) -> &'static str {
        "/var/run/php-fpm/pterodactyl.sock"
    }

    fn php_fpm_pool_path(&self) -> Option<&'static str> {
        Some("/etc/php-fpm.d/www-pterodactyl.conf")
    }

    fn nginx(&self) -> NginxLayout {
        NginxLayout {
            site_path: "/etc/nginx/conf.d/pterodactyl.conf",
            enabled_link: None,
            default_site: None,
        }
    }

    fn packages(&self) -> Vec<String> {
        let mut packages = vec!["php".to_string()];
        packages.extend(
            [
                "common", "fpm", "cli", "json", "mysqlnd", "gd", "mbstring", "pdo", "zip",
                "bcmath", "dom", "opcache", "posix",
            ]
            .iter()
            .map(|ext| format!("php-{}", ext)),
        );
        packages.extend(
            [
                "mariadb", "mariadb-server", "nginx", "redis", "zip", "unzip", "tar", "git",
                "cronie", "curl", "policycoreutils-python-utils",
            ]
            .iter()
            .map(ToString::to_string),
        );
        packages
    }

    fn certbot_packages(&self) -> &'static [&'static str] {
        &["certbot", "python3-certbot-nginx"]
    }

    fn install_command(&self, packages: &[String]) -> CommandSpec {
        CommandSpec::new("dnf")
            .args(["install", "-y"])
            .args(packages.iter().cloned())
            .streaming()
    }

    fn refresh_command(&self) -> CommandSpec {
        CommandSpec::new("dnf").args(["makecache", "-y"]).streaming()
    }

    fn register_repositories(&self, platform: &Platform, prov: &Provisioner<'_>) -> Result<()> {
        prov.run(self.install_command(&["epel-release".to_string()]))?;
        prov.run(self.install_command(&[format!(
            "https://rpms.remirepo.net/enterprise/remi-release-{}.rpm",
            platform.major_version()
        )]))?;
        prov.run(CommandSpec::new("dnf").args(["module", "reset", "-y", "php"]))?;
        prov.run(
            CommandSpec::new("dnf")
                .args(["module", "enable", "-y"])
                .arg(format!("php:remi-{}", PHP_VERSION)),
        )?;
        Ok(())
    }

    fn configure_firewall(&self, prov: &Provisioner<'_>) -> Result<()> {
        prov.run(self.install_command(&["firewalld".to_string()]))?;
        prov.enable_service("firewalld")?;
        for service in ["ssh", "http", "https"] {
            prov.run(
                CommandSpec::new("firewall-cmd")
                    .arg("--permanent")
                    .arg(format!("--add-service={}", service)),
            )?;
        }
        prov.run(CommandSpec::new("firewall-cmd").arg("--reload"))?;
        Ok(())
    }

    fn configure_selinux(&self, prov: &Provisioner<'_>) -> Result<()> {
        for boolean in ["httpd_can_network_connect", "httpd_execmem", "httpd_unified"] {
            prov.run(CommandSpec::new("setsebool").args(["-P", boolean, "1"]))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::RecordingRunner;

    #[test]
    fn test_profiles_match_family() {
        assert_eq!(DebianProfile.family(), Family::DebianLike);
        assert_eq!(RhelProfile.family(), Family::RhelLike);
        assert_eq!(DebianProfile.web_user(), "www-data");
        assert_eq!(RhelProfile.web_user(), "nginx");
        assert_eq!(DebianProfile.redis_service(), "redis-server");
        assert_eq!(RhelProfile.redis_service(), "redis");
    }

    #[test]
    fn test_debian_packages_are_versioned() {
        let packages = DebianProfile.packages();
        assert_eq!(packages[0], "php8.3");
        assert!(packages.contains(&"php8.3-fpm".to_string()));
        assert!(packages.contains(&"mariadb-server".to_string()));
        assert!(packages.contains(&"cron".to_string()));
    }

    #[test]
    fn test_apt_install_is_noninteractive_and_streamed() {
        let spec = DebianProfile.install_command(&["nginx".to_string()]);
        assert_eq!(spec.to_string(), "apt-get install -y --no-install-recommends nginx");
        assert!(spec.stream);
        assert!(spec.env.contains(&("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())));
    }

    #[test]
    fn test_ubuntu_uses_ppa() {
        let runner = RecordingRunner::new();
        let prov = Provisioner::new(&runner, "/nonexistent-root");
        let platform = Platform::new(Family::DebianLike, "ubuntu", 22);
        DebianProfile.register_repositories(&platform, &prov).unwrap();
        let lines = runner.command_lines();
        assert!(lines.iter().any(|l| l == "add-apt-repository -y ppa:ondrej/php"));
        assert_eq!(lines.last().map(String::as_str), Some("apt-get update -y"));
    }

    #[test]
    fn test_debian_writes_sury_list() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let prov = Provisioner::new(&runner, dir.path());
        let platform = Platform::new(Family::DebianLike, "debian", 12).with_codename("bookworm");
        DebianProfile.register_repositories(&platform, &prov).unwrap();

        let list = std::fs::read_to_string(dir.path().join("etc/apt/sources.list.d/sury-php.list")).unwrap();
        assert!(list.contains("https://packages.sury.org/php/ bookworm main"));
        assert!(list.contains("[signed-by=/usr/share/keyrings/deb.sury.org-php.gpg]"));

        let keyring = dir.path().join("usr/share/keyrings/deb.sury.org-php.gpg");
        let curl = runner.calls().into_iter().find(|c| c.program == "curl").unwrap();
        assert_eq!(curl.args[3], keyring.to_string_lossy());
    }

    #[test]
    fn test_debian_keyring_fetched_once_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let keyring = dir.path().join("usr/share/keyrings/deb.sury.org-php.gpg");
        std::fs::create_dir_all(keyring.parent().unwrap()).unwrap();
        std::fs::write(&keyring, b"key").unwrap();

        let runner = RecordingRunner::new();
        let prov = Provisioner::new(&runner, dir.path());
        let platform = Platform::new(Family::DebianLike, "debian", 12);
        DebianProfile.register_repositories(&platform, &prov).unwrap();
        assert!(runner.calls().iter().all(|c| c.program != "curl"));
    }

    #[test]
    fn test_rhel_repositories_use_major_version() {
        let runner = RecordingRunner::new();
        let prov = Provisioner::new(&runner, "/");
        let platform = Platform::new(Family::RhelLike, "rocky", 9);
        RhelProfile.register_repositories(&platform, &prov).unwrap();
        let lines = runner.command_lines();
        assert_eq!(lines[0], "dnf install -y epel-release");
        assert!(lines[1].ends_with("remi-release-9.rpm"));
        assert_eq!(lines[3], "dnf module enable -y php:remi-8.3");
    }

    #[test]
    fn test_selinux_only_on_rhel() {
        let runner = RecordingRunner::new();
        let prov = Provisioner::new(&runner, "/");
        DebianProfile.configure_selinux(&prov).unwrap();
        assert_eq!(runner.call_count(), 0);
        RhelProfile.configure_selinux(&prov).unwrap();
        assert_eq!(runner.call_count(), 3);
    }

    #[test]
    fn test_firewall_commands() {
        let runner = RecordingRunner::new();
        let prov = Provisioner::new(&runner, "/");
        RhelProfile.configure_firewall(&prov).unwrap();
        let lines = runner.command_lines();
        assert!(lines.contains(&"firewall-cmd --permanent --add-service=https".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("firewall-cmd --reload"));
    }
}
