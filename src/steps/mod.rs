//! Panel install sequence
//!
//! Builds the ordered list of steps for a platform and configuration. Each
//! step body lives in a submodule grouped by concern; the bodies only act
//! through the step context, so the whole sequence can be driven by a
//! recording runner against a scratch root.
//!
//! | # | Step                          | Critical | Condition              |
//! |---|-------------------------------|----------|------------------------|
//! | 1 | refresh-package-index         | yes      |                        |
//! | 2 | register-repositories         | yes      |                        |
//! | 3 | install-dependencies          | yes      |                        |
//! | 4 | enable-services               | yes      |                        |
//! | 5 | install-composer              | yes      |                        |
//! | 6 | download-panel                | yes      |                        |
//! | 7 | create-database               | yes      |                        |
//! | 8 | install-composer-dependencies | yes      |                        |
//! | 9 | configure-panel               | yes      |                        |
//! |10 | create-admin-user             | no       |                        |
//! |11 | set-permissions               | yes      |                        |
//! |12 | install-cron                  | yes      |                        |
//! |13 | install-queue-worker          | yes      |                        |
//! |14 | configure-selinux             | no       | rhel-like              |
//! |15 | configure-firewall            | no       | firewall requested     |
//! |16 | obtain-certificate            | no       | Let's Encrypt requested|
//! |17 | configure-webserver           | yes      |                        |

mod database;
mod packages;
mod panel;
mod security;
mod webserver;

use crate::config::InstallConfig;
use crate::engine::Step;
use crate::error::Result;
use crate::platform::{Family, Platform};

/// Install location of the panel.
pub const PANEL_ROOT: &str = "/var/www/pterodactyl";

/// Database host the panel connects from.
pub const DATABASE_HOST: &str = "127.0.0.1";

/// Scheduler entry installed for the web-server account.
pub const SCHEDULE_CRON_LINE: &str = "* * * * * php /var/www/pterodactyl/artisan schedule:run >> /dev/null 2>&1";

pub const QUEUE_WORKER_UNIT_PATH: &str = "/etc/systemd/system/pteroq.service";

/// Path of the Let's Encrypt certificate chain for `domain`.
pub fn certificate_path(domain: &str) -> String {
    format!("/etc/letsencrypt/live/{}/fullchain.pem", domain)
}

/// Ordered install steps for `platform` and `config`.
///
/// # Errors
///
/// `UnsupportedPlatform` for hosts without a family handler.
pub fn panel_steps(platform: &Platform, config: &InstallConfig) -> Result<Vec<Step>> {
    platform.profile()?;

    let mut steps = vec![
        Step::critical("refresh-package-index", packages::refresh_package_index),
        Step::critical("register-repositories", packages::register_repositories),
        Step::critical("install-dependencies", packages::install_dependencies),
        Step::critical("enable-services", packages::enable_services),
        Step::critical("install-composer", packages::install_composer),
        Step::critical("download-panel", panel::download_panel),
        Step::critical("create-database", database::create_database),
        Step::critical("install-composer-dependencies", panel::install_composer_dependencies),
        Step::critical("configure-panel", panel::configure_panel),
        // p:user:make is not idempotent; a re-run fails here harmlessly
        Step::optional("create-admin-user", panel::create_admin_user),
        Step::critical("set-permissions", panel::set_permissions),
        Step::critical("install-cron", panel::install_cron),
        Step::critical("install-queue-worker", panel::install_queue_worker),
    ];

    if platform.family() == Family::RhelLike {
        steps.push(Step::optional("configure-selinux", security::configure_selinux));
    }
    if config.configure_firewall {
        steps.push(Step::optional("configure-firewall", security::configure_firewall));
    }
    if config.use_letsencrypt {
        steps.push(Step::optional("obtain-certificate", security::obtain_certificate));
    }
    steps.push(Step::critical("configure-webserver", webserver::configure_webserver));

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigInput;
    use crate::error::ProvisionError;

    fn config(firewall: bool, letsencrypt: bool) -> InstallConfig {
        ConfigInput {
            domain: Some("panel.acme.test".into()),
            admin_email: Some("admin@acme.test".into()),
            user_email: Some("owner@acme.test".into()),
            user_username: Some("owner".into()),
            user_first_name: Some("Pat".into()),
            user_last_name: Some("Doe".into()),
            configure_firewall: Some(firewall),
            use_letsencrypt: Some(letsencrypt),
            ..ConfigInput::default()
        }
        .build()
        .unwrap()
    }

    fn names(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(Step::name).collect()
    }

    #[test]
    fn test_debian_sequence_without_optional_steps() {
        let platform = Platform::new(Family::DebianLike, "ubuntu", 22);
        let steps = panel_steps(&platform, &config(false, false)).unwrap();
        let names = names(&steps);
        assert_eq!(names.first(), Some(&"refresh-package-index"));
        assert_eq!(names.last(), Some(&"configure-webserver"));
        assert!(!names.contains(&"configure-selinux"));
        assert!(!names.contains(&"configure-firewall"));
        assert!(!names.contains(&"obtain-certificate"));
        assert_eq!(steps.len(), 14);
    }

    #[test]
    fn test_rhel_sequence_with_everything() {
        let platform = Platform::new(Family::RhelLike, "rocky", 9);
        let steps = panel_steps(&platform, &config(true, true)).unwrap();
        let names = names(&steps);
        let pos = |n: &str| names.iter().position(|s| *s == n).unwrap();
        assert!(pos("configure-selinux") < pos("configure-firewall"));
        assert!(pos("obtain-certificate") < pos("configure-webserver"));
        assert!(pos("create-database") < pos("configure-panel"));
        assert!(!steps[pos("configure-firewall")].is_critical());
        assert!(steps[pos("configure-panel")].is_critical());
    }

    #[test]
    fn test_unknown_platform_has_no_steps() {
        let platform = Platform::new(Family::Unknown, "gentoo", 2);
        let err = panel_steps(&platform, &config(true, false)).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedPlatform(_)));
    }

    #[test]
    fn test_certificate_path() {
        assert_eq!(
            certificate_path("panel.acme.test"),
            "/etc/letsencrypt/live/panel.acme.test/fullchain.pem"
        );
    }
}
