//! Pterodactyl panel provisioner library
//!
//! Core functionality for installing the panel on a fresh Debian-like or
//! RHEL-like host: platform probing, command execution, template rendering,
//! idempotent resource provisioning and the policy-driven step engine.

pub mod cli;
pub mod command_runner;
pub mod config;
pub mod engine;
pub mod error;
pub mod installer;
pub mod platform;
pub mod policy;
pub mod process_guard;
pub mod provision;
pub mod sanity;
pub mod step_state;
pub mod steps;
pub mod summary;
pub mod template;

// Re-export main types for convenience
pub use command_runner::{CommandOutput, CommandRunner, CommandSpec, RecordingRunner, SystemRunner};
pub use config::{ConfigInput, InstallConfig, Secret};
pub use engine::{RunReport, RunStatus, Step, StepContext, StepEngine, StepResult};
pub use error::{ProvisionError, Result};
pub use installer::{InstallOptions, Installation, Installer};
pub use platform::{Family, FamilyProfile, PackageManagerKind, Platform};
pub use policy::{Decision, FailurePolicy, FixedPolicy, PromptPolicy};
pub use provision::{Change, CronChange, PasswordRotation, Provisioner, UserChange};
pub use step_state::{StepState, StepTransitionError};
