//! SELinux, firewall and TLS certificate.

use super::certificate_path;
use crate::command_runner::CommandSpec;
use crate::engine::StepContext;
use crate::error::Result;

pub fn configure_selinux(ctx: &StepContext<'_>) -> Result<()> {
    ctx.profile.configure_selinux(ctx.provisioner)
}

pub fn configure_firewall(ctx: &StepContext<'_>) -> Result<()> {
    ctx.profile.configure_firewall(ctx.provisioner)
}

/// Obtain a Let's Encrypt certificate with the standalone authenticator.
///
/// nginx is stopped first since the authenticator binds port 80.
pub fn obtain_certificate(ctx: &StepContext<'_>) -> Result<()> {
    let prov = ctx.provisioner;
    let config = ctx.config;

    if prov.exists(certificate_path(&config.domain)) {
        tracing::info!("Certificate for {} already present", config.domain);
        return Ok(());
    }

    let packages: Vec<String> = ctx
        .profile
        .certbot_packages()
        .iter()
        .map(ToString::to_string)
        .collect();
    prov.run(ctx.profile.install_command(&packages))?;
    prov.run(CommandSpec::new("systemctl").args(["stop", "nginx"]))?;
    prov.run(
        CommandSpec::new("certbot")
            .args([
                "certonly",
                "--standalone",
                "--no-eff-email",
                "--agree-tos",
                "--non-interactive",
                "--email",
                config.admin_email.as_str(),
                "-d",
                config.domain.as_str(),
            ])
            .streaming(),
    )?;
    Ok(())
}
