//! PHP-FPM pool and nginx site.

use super::{certificate_path, PANEL_ROOT};
use crate::command_runner::CommandSpec;
use crate::engine::StepContext;
use crate::error::Result;
use crate::template::{Placeholders, Template, NGINX_HTTP, NGINX_SSL, PHP_FPM_POOL};

/// SSL site when a certificate is on disk or the operator vouches for one.
pub(crate) fn site_template(ctx: &StepContext<'_>) -> Template {
    let config = ctx.config;
    if config.assume_ssl || ctx.provisioner.exists(certificate_path(&config.domain)) {
        return NGINX_SSL;
    }
    if config.use_letsencrypt {
        tracing::warn!(
            "No certificate found for {}; serving the panel over plain HTTP",
            config.domain
        );
    }
    NGINX_HTTP
}

pub fn configure_webserver(ctx: &StepContext<'_>) -> Result<()> {
    let prov = ctx.provisioner;
    let profile = ctx.profile;

    if let Some(pool_path) = profile.php_fpm_pool_path() {
        let pool = PHP_FPM_POOL.render(&Placeholders::from([
            ("user".to_string(), profile.web_user().to_string()),
            ("php_socket".to_string(), profile.php_socket().to_string()),
        ]))?;
        prov.write_file(pool_path, &pool, 0o644)?;
    }
    prov.enable_service(profile.php_fpm_service())?;
    prov.restart_service(profile.php_fpm_service())?;

    let layout = profile.nginx();
    if let Some(default_site) = layout.default_site {
        prov.remove_file(default_site)?;
    }

    let template = site_template(ctx);
    let site = template.render(&Placeholders::from([
        ("domain".to_string(), ctx.config.domain.clone()),
        ("panel_root".to_string(), PANEL_ROOT.to_string()),
        ("php_socket".to_string(), profile.php_socket().to_string()),
    ]))?;
    let change = prov.write_file(layout.site_path, &site, 0o644)?;
    tracing::info!("nginx site {} ({:?}, {})", layout.site_path, change, template.name);

    if let Some(link) = layout.enabled_link {
        prov.ensure_symlink(layout.site_path, link)?;
    }

    prov.run(CommandSpec::new("nginx").arg("-t"))?;
    prov.enable_service("nginx")?;
    prov.restart_service("nginx")?;
    Ok(())
}
