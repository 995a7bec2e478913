//! Panel download, application setup and background jobs.

use super::{DATABASE_HOST, PANEL_ROOT, QUEUE_WORKER_UNIT_PATH, SCHEDULE_CRON_LINE};
use crate::command_runner::CommandSpec;
use crate::engine::StepContext;
use crate::error::Result;
use crate::template::{Placeholders, QUEUE_WORKER_UNIT};

const RELEASE_URL: &str = "https://github.com/pterodactyl/panel/releases/latest/download/panel.tar.gz";

fn panel_path(relative: &str) -> String {
    format!("{}/{}", PANEL_ROOT, relative)
}

/// `php artisan <args>` run from the panel directory.
fn artisan<I, S>(ctx: &StepContext<'_>, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("php")
        .arg("artisan")
        .args(args)
        .current_dir(ctx.host_arg(PANEL_ROOT))
}

pub fn download_panel(ctx: &StepContext<'_>) -> Result<()> {
    let prov = ctx.provisioner;
    let root = ctx.host_arg(PANEL_ROOT);
    let archive = ctx.host_arg(panel_path("panel.tar.gz"));

    prov.ensure_dir(PANEL_ROOT)?;
    prov.run(
        CommandSpec::new("curl")
            .args(["-fL", "-o"])
            .arg(archive.as_str())
            .arg(RELEASE_URL)
            .streaming(),
    )?;
    prov.run(CommandSpec::new("tar").args(["-xzf", archive.as_str(), "-C", root.as_str()]))?;
    prov.run(CommandSpec::new("chmod").args([
        "-R".to_string(),
        "755".to_string(),
        ctx.host_arg(panel_path("storage")),
        ctx.host_arg(panel_path("bootstrap/cache")),
    ]))?;
    prov.remove_file(panel_path("panel.tar.gz"))?;

    // An existing .env holds the application key; never overwrite it
    prov.copy_if_absent(panel_path(".env.example"), panel_path(".env"))?;
    Ok(())
}

pub fn install_composer_dependencies(ctx: &StepContext<'_>) -> Result<()> {
    ctx.provisioner.run(
        CommandSpec::new("composer")
            .args(["install", "--no-dev", "--optimize-autoloader", "--no-interaction"])
            .env("COMPOSER_ALLOW_SUPERUSER", "1")
            .current_dir(ctx.host_arg(PANEL_ROOT))
            .streaming(),
    )?;
    Ok(())
}

/// Whether `.env` content already carries a non-empty `APP_KEY`.
pub(crate) fn has_app_key(env: &str) -> bool {
    env.lines()
        .filter_map(|line| line.trim().strip_prefix("APP_KEY="))
        .any(|value| !value.trim().trim_matches('"').is_empty())
}

pub fn configure_panel(ctx: &StepContext<'_>) -> Result<()> {
    let prov = ctx.provisioner;
    let config = ctx.config;

    let env = prov.read_file(panel_path(".env")).unwrap_or_default();
    if has_app_key(&env) {
        tracing::info!("Application key already set, keeping it");
    } else {
        prov.run(artisan(ctx, ["key:generate", "--force"]))?;
    }

    prov.run(artisan(
        ctx,
        [
            "p:environment:setup".to_string(),
            format!("--author={}", config.admin_email),
            format!("--url={}", config.app_url()),
            format!("--timezone={}", config.timezone),
            "--cache=redis".to_string(),
            "--session=redis".to_string(),
            "--queue=redis".to_string(),
            "--redis-host=localhost".to_string(),
            "--redis-pass=null".to_string(),
            "--redis-port=6379".to_string(),
            "--settings-ui=true".to_string(),
            "--telemetry=false".to_string(),
        ],
    ))?;

    prov.run(
        artisan(
            ctx,
            [
                "p:environment:database".to_string(),
                format!("--host={}", DATABASE_HOST),
                "--port=3306".to_string(),
                format!("--database={}", config.db_name),
                format!("--username={}", config.db_user),
                format!("--password={}", config.db_password.expose()),
            ],
        )
        .secret(config.db_password.expose()),
    )?;

    prov.run(artisan(ctx, ["migrate", "--seed", "--force"]).streaming())?;
    Ok(())
}

pub fn create_admin_user(ctx: &StepContext<'_>) -> Result<()> {
    let admin = &ctx.config.admin_user;
    ctx.provisioner.run(
        artisan(
            ctx,
            [
                "p:user:make".to_string(),
                format!("--email={}", admin.email),
                format!("--username={}", admin.username),
                format!("--name-first={}", admin.first_name),
                format!("--name-last={}", admin.last_name),
                format!("--password={}", admin.password.expose()),
                "--admin=1".to_string(),
                "--no-interaction".to_string(),
            ],
        )
        .secret(admin.password.expose()),
    )?;
    Ok(())
}

pub fn set_permissions(ctx: &StepContext<'_>) -> Result<()> {
    ctx.provisioner
        .set_ownership(PANEL_ROOT, ctx.profile.web_user(), true)
}

pub fn install_cron(ctx: &StepContext<'_>) -> Result<()> {
    let change = ctx
        .provisioner
        .ensure_cron_line(ctx.profile.web_user(), SCHEDULE_CRON_LINE)?;
    tracing::debug!("Scheduler cron entry: {:?}", change);
    Ok(())
}

pub fn install_queue_worker(ctx: &StepContext<'_>) -> Result<()> {
    let values = Placeholders::from([
        ("user".to_string(), ctx.profile.web_user().to_string()),
        ("panel_root".to_string(), PANEL_ROOT.to_string()),
        ("redis_service".to_string(), ctx.profile.redis_service().to_string()),
    ]);
    let unit = QUEUE_WORKER_UNIT.render(&values)?;
    ctx.provisioner.install_system_unit(QUEUE_WORKER_UNIT_PATH, &unit)?;
    Ok(())
}
