//! Step definitions.

use crate::config::InstallConfig;
use crate::error::Result;
use crate::platform::{FamilyProfile, Platform};
use crate::provision::Provisioner;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Everything a step body may look at or act through.
pub struct StepContext<'a> {
    pub platform: &'a Platform,
    pub profile: &'a dyn FamilyProfile,
    pub config: &'a InstallConfig,
    pub provisioner: &'a Provisioner<'a>,
}

impl StepContext<'_> {
    /// `path` under the provisioning root, as a command argument.
    pub fn host_arg(&self, path: impl AsRef<Path>) -> String {
        self.provisioner.host_path(path).to_string_lossy().into_owned()
    }
}

type StepFn = Box<dyn Fn(&StepContext<'_>) -> Result<()>>;

/// A named unit of work within the install sequence.
pub struct Step {
    name: String,
    critical: bool,
    run: StepFn,
}

impl Step {
    /// A step whose failure is handed to the failure policy.
    pub fn critical<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&StepContext<'_>) -> Result<()> + 'static,
    {
        Self {
            name: name.into(),
            critical: true,
            run: Box::new(run),
        }
    }

    /// A step whose failure is recorded as a warning and never stops the run.
    pub fn optional<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&StepContext<'_>) -> Result<()> + 'static,
    {
        Self {
            name: name.into(),
            critical: false,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub(crate) fn execute(&self, ctx: &StepContext<'_>) -> Result<()> {
        (self.run)(ctx)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepResult {
    Success,
    Failure {
        reason: String,
        exit_code: Option<i32>,
    },
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("ok"),
            Self::Failure {
                reason,
                exit_code: Some(code),
            } => write!(f, "failed (exit {}): {}", code, reason),
            Self::Failure { reason, .. } => write!(f, "failed: {}", reason),
        }
    }
}
