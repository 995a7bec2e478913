//! External command execution
//!
//! Every system change the provisioner makes goes through a [`CommandRunner`].
//! Runners never turn a non-zero exit into an error on their own; callers
//! inspect [`CommandOutput`] (or use [`CommandOutput::into_result`]) and decide.
//!
//! # Implementations
//!
//! - [`SystemRunner`] spawns real processes in their own process group,
//!   registers them for signal cleanup and optionally streams output
//!   line-by-line into the log while capturing it.
//! - [`RecordingRunner`] executes nothing. It records every invocation and
//!   answers with canned output; it backs `--dry-run` and the tests.

use crate::error::{ProvisionError, Result};
use crate::process_guard::{ChildGuard, CommandProcessGroup};
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;

const REDACTED: &str = "********";

/// Fully described external command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdin: Option<String>,
    /// Forward output lines to the log as they arrive.
    pub stream: bool,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Mark as long-running: output is streamed to the log.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Register a value that must never appear in logs or reports.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Redact registered secrets from arbitrary text.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), REDACTED))
    }
}

impl fmt::Display for CommandSpec {
    /// Shell-like rendering with secrets redacted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        f.write_str(&self.redact(&line))
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output carrying `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a non-zero exit into `ProvisionError::CommandFailed`.
    pub fn into_result(self, spec: &CommandSpec) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(self.failure(spec))
        }
    }

    /// `CommandFailed` describing this output (last stderr line, redacted).
    pub fn failure(&self, spec: &CommandSpec) -> ProvisionError {
        let tail = self.stderr.trim().lines().last().unwrap_or_default();
        ProvisionError::CommandFailed {
            command: spec.to_string(),
            exit_code: self.exit_code,
            stderr: spec.redact(tail),
        }
    }
}

/// Narrow interface every provisioning operation executes through.
pub trait CommandRunner {
    /// Run the command to completion.
    ///
    /// # Errors
    ///
    /// Only when the process cannot be started or waited on. A non-zero exit
    /// is reported through `CommandOutput::exit_code`, never as `Err`.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands on the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::info!("$ {}", spec);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(if spec.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ProvisionError::Spawn {
            command: spec.to_string(),
            source,
        })?;
        let _guard = ChildGuard::register(child.id());

        let writer = match (child.stdin.take(), spec.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(thread::spawn(move || {
                if let Err(e) = pipe.write_all(input.as_bytes()) {
                    tracing::warn!("Failed to write command stdin: {}", e);
                }
            })),
            _ => None,
        };

        let stream = spec.stream;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || collect_output(stdout, stream, false));
        let err_reader = thread::spawn(move || collect_output(stderr, stream, true));

        let status = child.wait()?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }

        let output = CommandOutput {
            exit_code: status.code(),
            stdout: out_reader.join().unwrap_or_default(),
            stderr: err_reader.join().unwrap_or_default(),
        };

        if output.success() {
            tracing::debug!("Command succeeded: {}", spec.program);
        } else {
            tracing::warn!(
                "Command {} exited with code {}",
                spec.program,
                output.exit_code.unwrap_or(-1)
            );
        }
        Ok(output)
    }
}

/// Drain a child pipe, optionally echoing each line to the log as it arrives.
fn collect_output<R: Read>(pipe: Option<R>, stream: bool, is_stderr: bool) -> String {
    let Some(pipe) = pipe else {
        return String::new();
    };

    let mut captured = String::new();
    for line in BufReader::new(pipe).lines().map_while(std::result::Result::ok) {
        if stream {
            if is_stderr {
                tracing::info!(target: "command::stderr", "  {}", line);
            } else {
                tracing::info!(target: "command::stdout", "  {}", line);
            }
        }
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

/// Runner that records invocations instead of executing them.
///
/// Unmatched commands succeed with empty output. Responses registered with
/// [`RecordingRunner::respond`] are matched by substring against the
/// redacted command line; the first matching rule wins.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    responses: Vec<(String, CommandOutput)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose line contains `pattern` with `output`.
    pub fn respond(mut self, pattern: impl Into<String>, output: CommandOutput) -> Self {
        self.responses.push((pattern.into(), output));
        self
    }

    /// Every invocation seen so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Redacted command lines of every invocation so far.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(ToString::to_string).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.to_string();
        tracing::info!("[dry-run] $ {}", line);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }

        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}
