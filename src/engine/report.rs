//! Run report
//!
//! The report is append-only: entries are pushed in execution order and never
//! edited afterwards. Once [`RunReport::finish`] sets the final status the run
//! is over.

use super::step::StepResult;
use crate::policy::Decision;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// One executed step.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub step: String,
    pub critical: bool,
    pub result: StepResult,
    /// Policy decision taken after a failure of a critical step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    pub finished_at: DateTime<Utc>,
}

/// Final (or current) status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Succeeded,
    /// Every step ran; the named ones failed and were continued past.
    CompletedWithWarnings { failed: Vec<String> },
    /// The failure policy chose to stop after `step` failed.
    Aborted { step: String },
    /// `step` hit an error that cannot be continued past.
    Halted { step: String, reason: String },
}

impl RunStatus {
    /// Process exit code for this status.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Succeeded => 0,
            Self::CompletedWithWarnings { .. } => 2,
            Self::InProgress | Self::Aborted { .. } | Self::Halted { .. } => 1,
        }
    }
}

/// Ordered record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    platform: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    status: RunStatus,
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::InProgress,
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }

    pub fn entry(&self, step: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.step == step)
    }

    /// Human-readable step table plus the final status.
    pub fn render_text(&self) -> String {
        let width = self.entries.iter().map(|e| e.step.len()).max().unwrap_or(0);
        let mut out = String::new();
        let _ = writeln!(out, "Run report ({})", self.platform);
        for entry in &self.entries {
            let marker = match (&entry.result, entry.critical) {
                (StepResult::Success, _) => "✓",
                (StepResult::Failure { .. }, true) => "✗",
                (StepResult::Failure { .. }, false) => "!",
            };
            let _ = write!(out, "  {} {:<width$}  {}", marker, entry.step, entry.result, width = width);
            if let Some(decision) = entry.decision {
                let _ = write!(out, " [{}]", decision);
            }
            out.push('\n');
        }

        let _ = match &self.status {
            RunStatus::InProgress => writeln!(out, "Status: in progress"),
            RunStatus::Succeeded => writeln!(out, "Status: all steps succeeded"),
            RunStatus::CompletedWithWarnings { failed } => {
                writeln!(out, "Status: completed with {} failed step(s): {}", failed.len(), failed.join(", "))
            }
            RunStatus::Aborted { step } => writeln!(out, "Status: aborted after '{}' failed", step),
            RunStatus::Halted { step, reason } => writeln!(out, "Status: halted at '{}': {}", step, reason),
        };
        out
    }
}
