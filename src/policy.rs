//! Continue/abort decisions for failed steps.
//!
//! The step engine is constructed with a boxed [`FailurePolicy`] and never
//! prompts on its own. Interactive runs use [`PromptPolicy`]; unattended runs
//! use a [`FixedPolicy`].

use serde::Serialize;
use std::io::{self, BufRead, BufReader, Stdin, Stderr, Write};
use strum::{Display, EnumString};

/// What to do after a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Continue,
    Abort,
}

/// Decision function consulted by the engine when a step fails.
pub trait FailurePolicy {
    fn decide(&mut self, step: &str, reason: &str) -> Decision;
}

/// Always returns the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub Decision);

impl FixedPolicy {
    pub fn always_continue() -> Self {
        Self(Decision::Continue)
    }

    pub fn always_abort() -> Self {
        Self(Decision::Abort)
    }
}

impl FailurePolicy for FixedPolicy {
    fn decide(&mut self, step: &str, _reason: &str) -> Decision {
        tracing::info!("Step '{}' failed; unattended policy decided: {}", step, self.0);
        self.0
    }
}

/// Asks the operator a yes/no question.
///
/// `y`/`yes` continue, `n`/`no` abort (case-insensitive), an empty answer
/// takes the configured default and anything else asks again. End of input
/// aborts: nobody is left to confirm a continuation.
pub struct PromptPolicy<R, W> {
    input: R,
    output: W,
    default: Decision,
}

impl<R: BufRead, W: Write> PromptPolicy<R, W> {
    pub fn new(input: R, output: W, default: Decision) -> Self {
        Self {
            input,
            output,
            default,
        }
    }

    fn ask(&mut self, step: &str, reason: &str) -> io::Result<Decision> {
        let hint = match self.default {
            Decision::Continue => "[Y/n]",
            Decision::Abort => "[y/N]",
        };
        writeln!(self.output, "\n✗ Step '{}' failed: {}", step, reason)?;

        loop {
            write!(self.output, "Continue with the remaining steps? {} ", hint)?;
            self.output.flush()?;

            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                writeln!(self.output)?;
                tracing::warn!("No answer available (end of input), aborting");
                return Ok(Decision::Abort);
            }

            match answer.trim().to_lowercase().as_str() {
                "" => return Ok(self.default),
                "y" | "yes" => return Ok(Decision::Continue),
                "n" | "no" => return Ok(Decision::Abort),
                other => writeln!(self.output, "Unrecognized answer '{}'; please type y or n.", other)?,
            }
        }
    }
}

impl PromptPolicy<BufReader<Stdin>, Stderr> {
    /// Prompt on the controlling terminal (question on stderr).
    pub fn stdio(default: Decision) -> Self {
        Self::new(BufReader::new(io::stdin()), io::stderr(), default)
    }
}

impl<R: BufRead, W: Write> FailurePolicy for PromptPolicy<R, W> {
    fn decide(&mut self, step: &str, reason: &str) -> Decision {
        match self.ask(step, reason) {
            Ok(decision) => {
                tracing::info!("Operator decided to {} after '{}' failed", decision, step);
                decision
            }
            Err(e) => {
                tracing::error!("Prompt failed ({}), aborting", e);
                Decision::Abort
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompt(answers: &str, default: Decision) -> (Decision, String) {
        let mut out = Vec::new();
        let decision = {
            let mut policy = PromptPolicy::new(Cursor::new(answers.to_string()), &mut out, default);
            policy.decide("install-dependencies", "exit code 100")
        };
        (decision, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_fixed_policies() {
        assert_eq!(FixedPolicy::always_continue().decide("s", "r"), Decision::Continue);
        assert_eq!(FixedPolicy::always_abort().decide("s", "r"), Decision::Abort);
    }

    #[test]
    fn test_prompt_accepts_case_insensitive_answers() {
        assert_eq!(prompt("Y\n", Decision::Abort).0, Decision::Continue);
        assert_eq!(prompt("yes\n", Decision::Abort).0, Decision::Continue);
        assert_eq!(prompt("N\n", Decision::Continue).0, Decision::Abort);
        assert_eq!(prompt("No\n", Decision::Continue).0, Decision::Abort);
    }

    #[test]
    fn test_prompt_empty_answer_uses_default() {
        let (decision, out) = prompt("\n", Decision::Continue);
        assert_eq!(decision, Decision::Continue);
        assert!(out.contains("[Y/n]"));

        let (decision, out) = prompt("\n", Decision::Abort);
        assert_eq!(decision, Decision::Abort);
        assert!(out.contains("[y/N]"));
    }

    #[test]
    fn test_prompt_reprompts_on_garbage() {
        let (decision, out) = prompt("maybe\nsure\ny\n", Decision::Abort);
        assert_eq!(decision, Decision::Continue);
        assert_eq!(out.matches("Continue with the remaining steps?").count(), 3);
        assert!(out.contains("Unrecognized answer 'maybe'"));
        assert!(out.contains("install-dependencies"));
    }

    #[test]
    fn test_prompt_eof_aborts() {
        assert_eq!(prompt("", Decision::Continue).0, Decision::Abort);
        assert_eq!(prompt("what\n", Decision::Continue).0, Decision::Abort);
    }

    #[test]
    fn test_decision_strings() {
        assert_eq!(Decision::Continue.to_string(), "continue");
        assert_eq!("abort".parse::<Decision>().unwrap(), Decision::Abort);
    }
}
