//! Step engine
//!
//! Runs an ordered list of [`Step`]s against a [`StepContext`] and records an
//! append-only [`RunReport`]. The engine never prompts: after a critical step
//! fails with a recoverable error it consults the injected
//! [`FailurePolicy`]. Non-critical failures are logged as warnings and the run
//! moves on. Errors that cannot be recovered from halt the run immediately.

pub mod report;
pub mod step;

pub use report::{ReportEntry, RunReport, RunStatus};
pub use step::{Step, StepContext, StepResult};

use crate::error::{ProvisionError, Result};
use crate::platform::Family;
use crate::policy::{Decision, FailurePolicy};
use crate::step_state::StepState;
use chrono::Utc;

pub struct StepEngine {
    policy: Box<dyn FailurePolicy>,
}

impl StepEngine {
    pub fn new(policy: Box<dyn FailurePolicy>) -> Self {
        Self { policy }
    }

    /// Execute `steps` in order.
    ///
    /// # Errors
    ///
    /// `UnsupportedPlatform` if the context's platform family is unknown; no
    /// step runs in that case. Step failures are never returned as `Err`, they
    /// end up in the report.
    pub fn run(&mut self, ctx: &StepContext<'_>, steps: &[Step]) -> Result<RunReport> {
        if ctx.platform.family() == Family::Unknown {
            return Err(ProvisionError::unsupported(format!(
                "{} is not a supported distribution",
                ctx.platform
            )));
        }

        let mut report = RunReport::new(ctx.platform.to_string());
        let mut warnings = Vec::new();
        let total = steps.len();

        for (index, step) in steps.iter().enumerate() {
            let mut state = StepState::Pending.transition(StepState::Running)?;
            tracing::info!("[{}/{}] {}", index + 1, total, step.name());

            let outcome = step.execute(ctx);
            state = state.transition(if outcome.is_ok() {
                StepState::Succeeded
            } else {
                StepState::Failed
            })?;
            tracing::debug!("Step '{}' is {}", step.name(), state);

            let err = match outcome {
                Ok(()) => {
                    report.record(entry(step, StepResult::Success, None));
                    continue;
                }
                Err(err) => err,
            };

            let reason = err.to_string();
            let result = StepResult::Failure {
                reason: reason.clone(),
                exit_code: err.exit_code(),
            };

            if !err.is_recoverable() {
                tracing::error!("Step '{}' failed and cannot be continued past: {}", step.name(), reason);
                report.record(entry(step, result, None));
                report.finish(RunStatus::Halted {
                    step: step.name().to_string(),
                    reason,
                });
                return Ok(report);
            }

            if !step.is_critical() {
                tracing::warn!("Optional step '{}' failed: {}", step.name(), reason);
                report.record(entry(step, result, None));
                warnings.push(step.name().to_string());
                continue;
            }

            tracing::error!("Step '{}' failed: {}", step.name(), reason);
            let decision = self.policy.decide(step.name(), &reason);
            report.record(entry(step, result, Some(decision)));
            match decision {
                Decision::Continue => warnings.push(step.name().to_string()),
                Decision::Abort => {
                    report.finish(RunStatus::Aborted {
                        step: step.name().to_string(),
                    });
                    return Ok(report);
                }
            }
        }

        report.finish(if warnings.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::CompletedWithWarnings { failed: warnings }
        });
        Ok(report)
    }
}

fn entry(step: &Step, result: StepResult, decision: Option<Decision>) -> ReportEntry {
    ReportEntry {
        step: step.name().to_string(),
        critical: step.is_critical(),
        result,
        decision,
        finished_at: Utc::now(),
    }
}
