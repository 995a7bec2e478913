//! Step State Machine
//!
//! Each step moves through a fixed lifecycle:
//!
//! ```text
//! Pending ──▶ Running ──▶ Succeeded
//!                   └───▶ Failed
//! ```
//!
//! Terminal states never change again and nothing goes backwards. A run
//! that re-applies a step starts over from a fresh `Pending` in a new run.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a single step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepState {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }

    /// Validated transition.
    pub fn transition(self, next: Self) -> Result<Self, StepTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else if self.is_terminal() {
            Err(StepTransitionError::FromTerminalState { from: self })
        } else {
            Err(StepTransitionError::Illegal { from: self, to: next })
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepTransitionError {
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: StepState },

    #[error("Illegal step transition {from} -> {to}")]
    Illegal { from: StepState, to: StepState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = StepState::Pending;
        let state = state.transition(StepState::Running).unwrap();
        assert_eq!(state.transition(StepState::Succeeded), Ok(StepState::Succeeded));
        assert_eq!(state.transition(StepState::Failed), Ok(StepState::Failed));
    }

    #[test]
    fn test_cannot_skip_running() {
        assert_eq!(
            StepState::Pending.transition(StepState::Succeeded),
            Err(StepTransitionError::Illegal {
                from: StepState::Pending,
                to: StepState::Succeeded
            })
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [StepState::Succeeded, StepState::Failed] {
            assert!(terminal.is_terminal());
            for next in [StepState::Pending, StepState::Running, StepState::Succeeded, StepState::Failed] {
                assert_eq!(
                    terminal.transition(next),
                    Err(StepTransitionError::FromTerminalState { from: terminal })
                );
            }
        }
    }

    #[test]
    fn test_no_backward_transition() {
        assert!(StepState::Running.transition(StepState::Pending).is_err());
        assert!(StepState::Running.transition(StepState::Running).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(StepState::Running.to_string(), "running");
        let err = StepState::Failed.transition(StepState::Running).unwrap_err();
        assert_eq!(err.to_string(), "Cannot transition from terminal state failed");
    }
}
