//! Installer module
//!
//! Drives one full provisioning run: validate the configuration, check
//! privileges, probe the platform, build the step sequence and hand it to
//! the step engine. Validation and probing happen before the first command
//! is issued, so bad input never leaves a half-provisioned host behind.

use crate::command_runner::CommandRunner;
use crate::config::{ConfigInput, InstallConfig};
use crate::engine::{RunReport, StepContext, StepEngine};
use crate::error::Result;
use crate::platform::Platform;
use crate::policy::FailurePolicy;
use crate::provision::Provisioner;
use crate::sanity;
use crate::steps;
use std::path::PathBuf;

/// Knobs that do not belong to the install configuration itself.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Filesystem root of the host being provisioned.
    pub root: PathBuf,
    /// Record commands and skip file writes.
    pub dry_run: bool,
    pub skip_root_check: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            dry_run: false,
            skip_root_check: false,
        }
    }
}

/// Outcome of a run that got as far as the step engine.
#[derive(Debug)]
pub struct Installation {
    pub config: InstallConfig,
    pub platform: Platform,
    pub report: RunReport,
}

/// Installer instance
pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    options: InstallOptions,
    is_root: fn() -> bool,
}

impl<'a> Installer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, options: InstallOptions) -> Self {
        Self {
            runner,
            options,
            is_root: sanity::is_running_as_root,
        }
    }

    #[cfg(test)]
    fn assuming_root(mut self, is_root: fn() -> bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Run the whole install.
    ///
    /// # Errors
    ///
    /// `Validation`, `Permission` and `UnsupportedPlatform` before any step
    /// runs. Step failures end up in the returned report instead.
    pub fn run(&self, input: ConfigInput, policy: Box<dyn FailurePolicy>) -> Result<Installation> {
        let config = input.build()?;
        tracing::info!("Configuration valid for {}", config.app_url());

        if self.options.dry_run {
            tracing::info!("Dry run: no command is executed and no file is written");
        } else {
            sanity::require_root(self.options.skip_root_check, (self.is_root)())?;
        }

        let platform = Platform::detect_in(&self.options.root)?;
        if !platform.is_tested() {
            tracing::warn!(
                "{} is not a tested release; continuing with the {} handler",
                platform,
                platform.family()
            );
        }
        let profile = platform.profile()?;
        let steps = steps::panel_steps(&platform, &config)?;

        let provisioner = Provisioner::new(self.runner, self.options.root.clone())
            .with_dry_run(self.options.dry_run);
        let ctx = StepContext {
            platform: &platform,
            profile,
            config: &config,
            provisioner: &provisioner,
        };

        let report = StepEngine::new(policy).run(&ctx, &steps)?;
        tracing::info!("Run finished: {:?}", report.status());

        Ok(Installation {
            config,
            platform,
            report,
        })
    }
}
