use super::DATABASE_HOST;
use crate::engine::StepContext;
use crate::error::Result;
use crate::provision::PasswordRotation;

/// Create the panel database and its user, then grant the user full access to it.
///
/// The user's password is always reset to the configured one: the panel's
/// `.env` is rewritten with that value in the configure step.
pub fn create_database(ctx: &StepContext<'_>) -> Result<()> {
    let config = ctx.config;
    let prov = ctx.provisioner;

    let user = prov.ensure_database_user(
        &config.db_user,
        DATABASE_HOST,
        &config.db_password,
        PasswordRotation::Rotate,
    )?;
    tracing::info!("Database user {}: {:?}", config.db_user, user);

    let db = prov.ensure_database(&config.db_name)?;
    tracing::info!("Database {}: {:?}", config.db_name, db);

    prov.grant_all_privileges(&config.db_name, &config.db_user, DATABASE_HOST)
}
