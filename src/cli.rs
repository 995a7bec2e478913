use crate::config::{ConfigInput, Secret};
use crate::policy::Decision;
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pterodactyl panel provisioner - installs and configures the panel on a fresh host
#[derive(Parser, Debug)]
#[command(name = "panel-provisioner")]
#[command(about = "Provision a Pterodactyl panel on Debian-like and RHEL-like hosts")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: log every command without executing it.
    ///
    /// Commands are recorded and treated as successful; no file on the host
    /// is written.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full panel installation
    Install(InstallArgs),
    /// Probe the host and report what an install would run against
    Check {
        /// Filesystem root to inspect
        #[arg(long, default_value = "/", hide = true)]
        root: PathBuf,
    },
}

/// What to do when a critical step fails.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnFailure {
    /// Ask on the terminal
    Prompt,
    /// Always continue with the next step
    Continue,
    /// Stop at the first failed step
    Abort,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

impl From<Answer> for Decision {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::Yes => Decision::Continue,
            Answer::No => Decision::Abort,
        }
    }
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// JSON file with any subset of the install settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Panel domain [default: panel.example.com]
    #[arg(long, env = "FQDN")]
    pub domain: Option<String>,

    /// Contact email (panel author, Let's Encrypt account)
    #[arg(long, env = "EMAIL")]
    pub email: Option<String>,

    /// Panel timezone [default: UTC]
    #[arg(long, env = "TIMEZONE")]
    pub timezone: Option<String>,

    /// Database name [default: panel]
    #[arg(long, env = "MYSQL_DB")]
    pub mysql_db: Option<String>,

    /// Database user [default: pterodactyl]
    #[arg(long, env = "MYSQL_USER")]
    pub mysql_user: Option<String>,

    /// Database password [default: generated]
    #[arg(long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: Option<String>,

    /// Administrator account email
    #[arg(long, env = "USER_EMAIL")]
    pub user_email: Option<String>,

    /// Administrator account username
    #[arg(long, env = "USER_USERNAME")]
    pub user_username: Option<String>,

    #[arg(long, env = "USER_FIRSTNAME")]
    pub user_firstname: Option<String>,

    #[arg(long, env = "USER_LASTNAME")]
    pub user_lastname: Option<String>,

    /// Administrator account password [default: generated]
    #[arg(long, env = "USER_PASSWORD", hide_env_values = true)]
    pub user_password: Option<String>,

    /// Serve the panel over HTTPS with an existing certificate [default: false]
    #[arg(long, env = "ASSUME_SSL", value_parser = BoolishValueParser::new(),
          num_args = 0..=1, default_missing_value = "true")]
    pub assume_ssl: Option<bool>,

    /// Obtain a Let's Encrypt certificate [default: false]
    #[arg(long, env = "CONFIGURE_LETSENCRYPT", value_parser = BoolishValueParser::new(),
          num_args = 0..=1, default_missing_value = "true")]
    pub configure_letsencrypt: Option<bool>,

    /// Open SSH/HTTP/HTTPS in the host firewall [default: true]
    #[arg(long, env = "CONFIGURE_FIREWALL", value_parser = BoolishValueParser::new(),
          num_args = 0..=1, default_missing_value = "true")]
    pub configure_firewall: Option<bool>,

    /// Failure handling for critical steps
    #[arg(long, value_enum, default_value_t = OnFailure::Prompt)]
    pub on_failure: OnFailure,

    /// Answer used when the prompt is confirmed with Enter
    #[arg(long, value_enum, default_value_t = Answer::No)]
    pub default_answer: Answer,

    /// Write generated credentials here (mode 0600)
    #[arg(long)]
    pub summary_file: Option<PathBuf>,

    /// Write the run report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Skip the root privilege check
    #[arg(long)]
    pub skip_root_check: bool,

    /// Filesystem root of the host to provision
    #[arg(long, default_value = "/", hide = true)]
    pub root: PathBuf,
}

impl InstallArgs {
    /// Settings given as flags or environment variables.
    pub fn overrides(&self) -> ConfigInput {
        ConfigInput {
            domain: self.domain.clone(),
            admin_email: self.email.clone(),
            timezone: self.timezone.clone(),
            db_name: self.mysql_db.clone(),
            db_user: self.mysql_user.clone(),
            db_password: self.mysql_password.clone().map(Secret::new),
            user_email: self.user_email.clone(),
            user_username: self.user_username.clone(),
            user_first_name: self.user_firstname.clone(),
            user_last_name: self.user_lastname.clone(),
            user_password: self.user_password.clone().map(Secret::new),
            assume_ssl: self.assume_ssl,
            use_letsencrypt: self.configure_letsencrypt,
            configure_firewall: self.configure_firewall,
        }
    }

    /// Config file values (if any) overlaid with flags and environment.
    pub fn config_input(&self) -> crate::error::Result<ConfigInput> {
        let base = match &self.config {
            Some(path) => ConfigInput::load_from_file(path)?,
            None => ConfigInput::default(),
        };
        Ok(base.overlay(self.overrides()))
    }
}
