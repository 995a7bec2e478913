//! Install configuration
//!
//! Input arrives as a [`ConfigInput`] (every field optional) from a JSON file,
//! CLI flags and environment variables. [`ConfigInput::build`] applies the
//! documented defaults, generates missing secrets and validates the result
//! into an immutable [`InstallConfig`]. Validation runs before any command
//! is executed, so an invalid input never half-provisions a host.

use crate::error::{ProvisionError, Result};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

pub const DEFAULT_DOMAIN: &str = "panel.example.com";
pub const DEFAULT_DB_NAME: &str = "panel";
pub const DEFAULT_DB_USER: &str = "pterodactyl";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const GENERATED_SECRET_LEN: usize = 32;

/// A sensitive string. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a random alphanumeric secret from the OS CSPRNG.
    pub fn generate(len: usize) -> Self {
        let value: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        Self(value)
    }

    /// The cleartext value. Only pass this to commands registered with
    /// `CommandSpec::secret` or to the operator-requested summary file.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

/// Initial administrator account for the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: Secret,
}

/// Validated, read-only configuration shared by every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    pub domain: String,
    /// Contact address for the panel author field and Let's Encrypt.
    pub admin_email: String,
    pub timezone: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: Secret,
    pub admin_user: AdminUser,
    pub assume_ssl: bool,
    pub use_letsencrypt: bool,
    pub configure_firewall: bool,
}

impl InstallConfig {
    /// Whether the panel is served over HTTPS.
    pub fn uses_ssl(&self) -> bool {
        self.assume_ssl || self.use_letsencrypt
    }

    /// Public URL of the panel.
    pub fn app_url(&self) -> String {
        let scheme = if self.uses_ssl() { "https" } else { "http" };
        format!("{}://{}", scheme, self.domain)
    }
}

/// Unvalidated configuration input; any field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigInput {
    pub domain: Option<String>,
    pub admin_email: Option<String>,
    pub timezone: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<Secret>,
    pub user_email: Option<String>,
    pub user_username: Option<String>,
    pub user_first_name: Option<String>,
    pub user_last_name: Option<String>,
    pub user_password: Option<Secret>,
    pub assume_ssl: Option<bool>,
    pub use_letsencrypt: Option<bool>,
    pub configure_firewall: Option<bool>,
}

impl ConfigInput {
    /// Load input from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            ProvisionError::validation(format!(
                "cannot read configuration file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Values set in `over` replace the ones in `self`.
    pub fn overlay(self, over: ConfigInput) -> Self {
        Self {
            domain: over.domain.or(self.domain),
            admin_email: over.admin_email.or(self.admin_email),
            timezone: over.timezone.or(self.timezone),
            db_name: over.db_name.or(self.db_name),
            db_user: over.db_user.or(self.db_user),
            db_password: over.db_password.or(self.db_password),
            user_email: over.user_email.or(self.user_email),
            user_username: over.user_username.or(self.user_username),
            user_first_name: over.user_first_name.or(self.user_first_name),
            user_last_name: over.user_last_name.or(self.user_last_name),
            user_password: over.user_password.or(self.user_password),
            assume_ssl: over.assume_ssl.or(self.assume_ssl),
            use_letsencrypt: over.use_letsencrypt.or(self.use_letsencrypt),
            configure_firewall: over.configure_firewall.or(self.configure_firewall),
        }
    }

    /// Apply defaults, generate missing secrets and validate.
    pub fn build(self) -> Result<InstallConfig> {
        let text = |value: Option<String>| value.map(|v| v.trim().to_string()).unwrap_or_default();
        let secret = |value: Option<Secret>, what: &str| match value {
            Some(s) if !s.is_empty() => s,
            _ => {
                tracing::info!("No {} supplied, generating one", what);
                Secret::generate(GENERATED_SECRET_LEN)
            }
        };

        let config = InstallConfig {
            domain: self.domain.map_or_else(|| DEFAULT_DOMAIN.to_string(), |d| d.trim().to_string()),
            admin_email: text(self.admin_email),
            timezone: self.timezone.map_or_else(|| DEFAULT_TIMEZONE.to_string(), |t| t.trim().to_string()),
            db_name: self.db_name.map_or_else(|| DEFAULT_DB_NAME.to_string(), |d| d.trim().to_string()),
            db_user: self.db_user.map_or_else(|| DEFAULT_DB_USER.to_string(), |u| u.trim().to_string()),
            db_password: secret(self.db_password, "database password"),
            admin_user: AdminUser {
                email: text(self.user_email),
                username: text(self.user_username),
                first_name: text(self.user_first_name),
                last_name: text(self.user_last_name),
                password: secret(self.user_password, "admin password"),
            },
            assume_ssl: self.assume_ssl.unwrap_or(false),
            use_letsencrypt: self.use_letsencrypt.unwrap_or(false),
            configure_firewall: self.configure_firewall.unwrap_or(true),
        };

        validate(&config)?;
        Ok(config)
    }
}

/// Check every field; the first problem found is returned.
pub fn validate(config: &InstallConfig) -> Result<()> {
    require("domain", &config.domain)?;
    if !is_hostname(&config.domain) {
        return Err(ProvisionError::validation(format!(
            "domain '{}' is not a valid hostname",
            config.domain
        )));
    }

    require("admin email", &config.admin_email)?;
    check_email("admin email", &config.admin_email)?;

    require("timezone", &config.timezone)?;
    if config.timezone != "UTC"
        && !(config.timezone.contains('/')
            && config
                .timezone
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '+')))
    {
        return Err(ProvisionError::validation(format!(
            "timezone '{}' must be UTC or Area/City",
            config.timezone
        )));
    }

    // Interpolated into SQL identifiers
    check_identifier("database name", &config.db_name)?;
    check_identifier("database user", &config.db_user)?;
    check_password("database password", &config.db_password)?;

    let admin = &config.admin_user;
    require("admin user email", &admin.email)?;
    check_email("admin user email", &admin.email)?;
    require("admin username", &admin.username)?;
    if !admin
        .username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ProvisionError::validation(
            "admin username can only contain letters, numbers, '_', '-' and '.'",
        ));
    }
    require("admin first name", &admin.first_name)?;
    require("admin last name", &admin.last_name)?;
    check_password("admin password", &admin.password)?;

    if config.use_letsencrypt && config.domain == DEFAULT_DOMAIN {
        return Err(ProvisionError::validation(
            "Let's Encrypt needs a real domain, not the default placeholder",
        ));
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ProvisionError::validation(format!("{} must be specified", field)))
    } else {
        Ok(())
    }
}

fn check_email(field: &str, value: &str) -> Result<()> {
    let valid = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    }) && !value.contains(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(ProvisionError::validation(format!("{} '{}' is not a valid address", field, value)))
    }
}

fn check_identifier(field: &str, value: &str) -> Result<()> {
    require(field, value)?;
    if value.len() > 32 || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ProvisionError::validation(format!(
            "{} may only contain letters, numbers and underscores (max 32)",
            field
        )));
    }
    Ok(())
}

fn check_password(field: &str, value: &Secret) -> Result<()> {
    let raw = value.expose();
    if raw.len() < 8 {
        return Err(ProvisionError::validation(format!("{} must be at least 8 characters", field)));
    }
    if raw.chars().any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | '`' | '$')) {
        return Err(ProvisionError::validation(format!(
            "{} cannot contain whitespace, quotes, backslashes, '`' or '$'",
            field
        )));
    }
    Ok(())
}

fn is_hostname(value: &str) -> bool {
    value.len() <= 253
        && value.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Serializable view of the configuration with secrets left out.
#[derive(Debug, Serialize)]
pub struct ConfigSummary<'a> {
    pub domain: &'a str,
    pub app_url: String,
    pub timezone: &'a str,
    pub db_name: &'a str,
    pub db_user: &'a str,
    pub admin_username: &'a str,
    pub admin_email: &'a str,
    pub assume_ssl: bool,
    pub use_letsencrypt: bool,
    pub configure_firewall: bool,
}

impl<'a> From<&'a InstallConfig> for ConfigSummary<'a> {
    fn from(config: &'a InstallConfig) -> Self {
        Self {
            domain: &config.domain,
            app_url: config.app_url(),
            timezone: &config.timezone,
            db_name: &config.db_name,
            db_user: &config.db_user,
            admin_username: &config.admin_user.username,
            admin_email: &config.admin_user.email,
            assume_ssl: config.assume_ssl,
            use_letsencrypt: config.use_letsencrypt,
            configure_firewall: config.configure_firewall,
        }
    }
}
