//! Final credentials summary and machine-readable run report.
//!
//! The credentials summary is the only place secrets are written in
//! cleartext. It is created with mode 0600 and the mode is re-applied when
//! the file already existed, so only the privileged account can read it.

use crate::config::{ConfigSummary, InstallConfig};
use crate::engine::RunReport;
use crate::error::Result;
use crate::platform::Platform;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

const SUMMARY_MODE: u32 = 0o600;

/// Credentials summary text, secrets included.
pub fn render_credentials(config: &InstallConfig, platform: &Platform, report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pterodactyl panel installation ({})", platform);
    let _ = writeln!(out, "Generated: {}", chrono::Utc::now().to_rfc3339());
    let _ = writeln!(out);
    let _ = writeln!(out, "Panel URL:          {}", config.app_url());
    let _ = writeln!(out);
    let _ = writeln!(out, "[Database]");
    let _ = writeln!(out, "Name:               {}", config.db_name);
    let _ = writeln!(out, "User:               {}", config.db_user);
    let _ = writeln!(out, "Password:           {}", config.db_password.expose());
    let _ = writeln!(out);
    let _ = writeln!(out, "[Administrator]");
    let _ = writeln!(out, "Username:           {}", config.admin_user.username);
    let _ = writeln!(out, "Email:              {}", config.admin_user.email);
    let _ = writeln!(out, "Password:           {}", config.admin_user.password.expose());
    let _ = writeln!(out);
    out.push_str(&report.render_text());
    out
}

/// Write the credentials summary to `path` with owner-only permissions.
pub fn write_credentials(
    path: &Path,
    config: &InstallConfig,
    platform: &Platform,
    report: &RunReport,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(SUMMARY_MODE)
        .open(path)?;
    // mode() only applies on creation
    fs::set_permissions(path, fs::Permissions::from_mode(SUMMARY_MODE))?;
    file.write_all(render_credentials(config, platform, report).as_bytes())?;

    tracing::info!("Credentials summary written to {}", path.display());
    Ok(())
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    platform: &'a Platform,
    config: ConfigSummary<'a>,
    report: &'a RunReport,
}

/// Write the run report (without secrets) as pretty JSON.
pub fn write_report_json(
    path: &Path,
    config: &InstallConfig,
    platform: &Platform,
    report: &RunReport,
) -> Result<()> {
    let document = ReportDocument {
        platform,
        config: ConfigSummary::from(config),
        report,
    };
    fs::write(path, serde_json::to_string_pretty(&document)?)?;
    tracing::info!("Run report written to {}", path.display());
    Ok(())
}
