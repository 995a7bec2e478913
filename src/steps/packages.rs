//! Package index, repositories, dependencies and Composer.

use crate::command_runner::CommandSpec;
use crate::engine::StepContext;
use crate::error::Result;

const COMPOSER_BIN: &str = "/usr/local/bin/composer";
const COMPOSER_SETUP: &str = "/tmp/composer-setup.php";

pub fn refresh_package_index(ctx: &StepContext<'_>) -> Result<()> {
    ctx.provisioner.run(ctx.profile.refresh_command())?;
    Ok(())
}

pub fn register_repositories(ctx: &StepContext<'_>) -> Result<()> {
    ctx.profile.register_repositories(ctx.platform, ctx.provisioner)
}

pub fn install_dependencies(ctx: &StepContext<'_>) -> Result<()> {
    let packages = ctx.profile.packages();
    tracing::info!("Installing {} packages", packages.len());
    ctx.provisioner.run(ctx.profile.install_command(&packages))?;
    Ok(())
}

/// Database, cache and scheduler daemons the panel needs before setup.
pub fn enable_services(ctx: &StepContext<'_>) -> Result<()> {
    for service in [
        ctx.profile.database_service(),
        ctx.profile.redis_service(),
        ctx.profile.cron_service(),
    ] {
        ctx.provisioner.enable_service(service)?;
    }
    Ok(())
}

pub fn install_composer(ctx: &StepContext<'_>) -> Result<()> {
    if ctx.provisioner.exists(COMPOSER_BIN) {
        tracing::info!("Composer already installed at {}", COMPOSER_BIN);
        return Ok(());
    }

    let setup = ctx.host_arg(COMPOSER_SETUP);
    ctx.provisioner.run(
        CommandSpec::new("curl")
            .args(["-sS", "-o"])
            .arg(setup.as_str())
            .arg("https://getcomposer.org/installer"),
    )?;
    ctx.provisioner.run(
        CommandSpec::new("php")
            .arg(setup.as_str())
            .arg(format!("--install-dir={}", ctx.host_arg("/usr/local/bin")))
            .arg("--filename=composer"),
    )?;
    ctx.provisioner.remove_file(COMPOSER_SETUP)?;
    Ok(())
}
