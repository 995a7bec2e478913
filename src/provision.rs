//! Idempotent resource provisioning
//!
//! Every creator in this module can be applied repeatedly: a second call
//! with the same inputs succeeds and leaves the host in the same state.
//! Re-running the whole install therefore stays cheap instead of harmful.
//!
//! All commands go through the injected [`CommandRunner`]. Files are written
//! relative to a filesystem root (normally `/`) so whole runs can be
//! exercised against a scratch directory.

use crate::command_runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::config::Secret;
use crate::error::{ProvisionError, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

/// Outcome of an idempotent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
}

/// What to do with an existing database user's password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRotation {
    /// Reset the password to the supplied value.
    Rotate,
    /// Leave the existing password alone (it may no longer match the config).
    Keep,
}

/// Outcome of [`Provisioner::ensure_database_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChange {
    Created,
    PasswordRotated,
    /// User existed and `PasswordRotation::Keep` was requested.
    KeptExisting,
}

/// Outcome of [`Provisioner::ensure_cron_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CronChange {
    Added,
    /// An entry with the same command was rewritten (schedule change or duplicates removed).
    Replaced,
    Unchanged,
}

/// Creates and mutates named host resources.
pub struct Provisioner<'a> {
    runner: &'a dyn CommandRunner,
    root: PathBuf,
    dry_run: bool,
}

impl<'a> Provisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            root: root.into(),
            dry_run: false,
        }
    }

    /// Skip file writes (commands still go to the runner, which is expected
    /// to be a recording one in this mode).
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Map an absolute host path under the provisioning root.
    pub fn host_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let relative: PathBuf = path
            .as_ref()
            .components()
            .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
            .collect();
        self.root.join(relative)
    }

    /// Run a command, turning a non-zero exit into `CommandFailed`.
    pub fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.runner.run(&spec)?.into_result(&spec)
    }

    /// Run a command and report its raw output, whatever the exit code.
    pub fn probe(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.runner.run(&spec)
    }

    // ------------------------------------------------------------------
    // Database
    // ------------------------------------------------------------------

    /// Statements carrying a secret are fed on stdin so they never show up
    /// in the process table.
    fn mysql(&self, sql: &str, secret: Option<&Secret>) -> Result<CommandOutput> {
        let spec = CommandSpec::new("mysql").args(["-u", "root", "-N", "-B"]);
        let spec = match secret {
            Some(secret) => spec.stdin(format!("{};\n", sql)).secret(secret.expose()),
            None => spec.args(["-e", sql]),
        };
        self.run(spec)
    }

    fn mysql_count(&self, sql: &str) -> Result<u64> {
        let output = self.mysql(sql, None)?;
        let count = output.stdout.trim();
        // Recorded commands answer with nothing; a dry run assumes the resource is absent.
        if self.dry_run && count.is_empty() {
            return Ok(0);
        }
        count.parse().map_err(|_| ProvisionError::CommandFailed {
            command: format!("mysql -e \"{}\"", sql),
            exit_code: output.exit_code,
            stderr: format!("expected a row count, got {:?}", count),
        })
    }

    /// Make sure `'name'@'host'` exists with `password`.
    ///
    /// An existing user is either rotated to the supplied password or left as
    /// is, as the caller decides; it is never silently kept by default.
    pub fn ensure_database_user(
        &self,
        name: &str,
        host: &str,
        password: &Secret,
        rotation: PasswordRotation,
    ) -> Result<UserChange> {
        let exists = self.mysql_count(&format!(
            "SELECT COUNT(*) FROM mysql.user WHERE User='{}' AND Host='{}'",
            name, host
        ))? > 0;

        match (exists, rotation) {
            (false, _) => {
                tracing::info!("Creating database user '{}'@'{}'", name, host);
                self.mysql(
                    &format!(
                        "CREATE USER '{}'@'{}' IDENTIFIED BY '{}'",
                        name,
                        host,
                        password.expose()
                    ),
                    Some(password),
                )?;
                Ok(UserChange::Created)
            }
            (true, PasswordRotation::Rotate) => {
                tracing::info!("Database user '{}'@'{}' exists, resetting its password", name, host);
                self.mysql(
                    &format!(
                        "ALTER USER '{}'@'{}' IDENTIFIED BY '{}'",
                        name,
                        host,
                        password.expose()
                    ),
                    Some(password),
                )?;
                Ok(UserChange::PasswordRotated)
            }
            (true, PasswordRotation::Keep) => {
                tracing::warn!(
                    "Database user '{}'@'{}' exists; keeping its current password",
                    name,
                    host
                );
                Ok(UserChange::KeptExisting)
            }
        }
    }

    /// Create the schema if it does not exist.
    pub fn ensure_database(&self, name: &str) -> Result<Change> {
        let exists = self.mysql_count(&format!(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME='{}'",
            name
        ))? > 0;
        if exists {
            tracing::info!("Database '{}' already exists", name);
            return Ok(Change::Unchanged);
        }
        tracing::info!("Creating database '{}'", name);
        self.mysql(&format!("CREATE DATABASE `{}`", name), None)?;
        Ok(Change::Created)
    }

    /// Grant every privilege on `db` to `'user'@'host'`. Safe to repeat.
    pub fn grant_all_privileges(&self, db: &str, user: &str, host: &str) -> Result<()> {
        tracing::info!("Granting privileges on '{}' to '{}'@'{}'", db, user, host);
        self.mysql(
            &format!(
                "GRANT ALL PRIVILEGES ON `{}`.* TO '{}'@'{}'; FLUSH PRIVILEGES;",
                db, user, host
            ),
            None,
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cron
    // ------------------------------------------------------------------

    /// Install `line` in `user`'s crontab, deduplicating by command.
    pub fn ensure_cron_line(&self, user: &str, line: &str) -> Result<CronChange> {
        let list = CommandSpec::new("crontab").args(["-u", user, "-l"]);
        let current = self.probe(list.clone())?;
        let existing = if current.success() {
            current.stdout
        } else if current.stderr.to_lowercase().contains("no crontab") {
            String::new()
        } else {
            return Err(current.failure(&list));
        };

        let (merged, change) = merge_cron_line(&existing, line);
        if change == CronChange::Unchanged {
            tracing::info!("Cron entry for {} already present", user);
            return Ok(change);
        }

        tracing::info!("Writing crontab for {} ({:?})", user, change);
        self.run(CommandSpec::new("crontab").args(["-u", user, "-"]).stdin(merged))?;
        Ok(change)
    }

    // ------------------------------------------------------------------
    // Files and units
    // ------------------------------------------------------------------

    /// Write `content` to `path` (under the root) when it differs, then apply `mode`.
    pub fn write_file(&self, path: impl AsRef<Path>, content: &str, mode: u32) -> Result<Change> {
        let target = self.host_path(&path);
        let change = match fs::read_to_string(&target) {
            Ok(existing) if existing == content => Change::Unchanged,
            Ok(_) => Change::Updated,
            Err(_) => Change::Created,
        };

        if self.dry_run {
            tracing::info!("[dry-run] would write {} ({:?})", path.as_ref().display(), change);
            return Ok(change);
        }

        if change != Change::Unchanged {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
            tracing::info!("Wrote {} ({:?})", path.as_ref().display(), change);
        }
        fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
        Ok(change)
    }

    /// Create a directory tree under the root.
    pub fn ensure_dir(&self, path: impl AsRef<Path>) -> Result<Change> {
        let target = self.host_path(&path);
        if target.is_dir() {
            return Ok(Change::Unchanged);
        }
        if !self.dry_run {
            fs::create_dir_all(&target)?;
        }
        Ok(Change::Created)
    }

    /// Remove a file or symlink if present.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> Result<Change> {
        let target = self.host_path(&path);
        if fs::symlink_metadata(&target).is_err() {
            return Ok(Change::Unchanged);
        }
        if !self.dry_run {
            fs::remove_file(&target)?;
        }
        tracing::info!("Removed {}", path.as_ref().display());
        Ok(Change::Updated)
    }

    /// Point `link` at `target` (target is written as given, not re-rooted).
    pub fn ensure_symlink(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<Change> {
        let link_path = self.host_path(&link);
        match fs::read_link(&link_path) {
            Ok(current) if current == target.as_ref() => return Ok(Change::Unchanged),
            Ok(_) => {
                if !self.dry_run {
                    fs::remove_file(&link_path)?;
                }
            }
            Err(_) => {}
        }
        if !self.dry_run {
            if let Some(parent) = link_path.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(target.as_ref(), &link_path)?;
        }
        Ok(Change::Created)
    }

    /// Copy `from` to `to` only if `to` does not exist yet.
    pub fn copy_if_absent(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<Change> {
        let dest = self.host_path(&to);
        if dest.exists() {
            return Ok(Change::Unchanged);
        }
        if !self.dry_run {
            fs::copy(self.host_path(&from), &dest)?;
        }
        Ok(Change::Created)
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.host_path(path).exists()
    }

    /// Read a file under the root; `None` if it is missing.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Option<String> {
        fs::read_to_string(self.host_path(path)).ok()
    }

    /// Write a systemd unit, reload the manager, then enable and start it.
    ///
    /// The reload always happens between the write and enable/start so the
    /// manager never starts a stale definition.
    pub fn install_system_unit(&self, path: impl AsRef<Path>, content: &str) -> Result<Change> {
        let path = path.as_ref();
        let unit = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ProvisionError::validation(format!("unit path {} has no file name", path.display()))
            })?
            .to_string();

        let change = self.write_file(path, content, 0o644)?;
        self.run(CommandSpec::new("systemctl").arg("daemon-reload"))?;
        self.run(CommandSpec::new("systemctl").args(["enable", "--now", unit.as_str()]))?;
        if change == Change::Updated {
            // enable --now does not restart an already running unit
            self.run(CommandSpec::new("systemctl").args(["restart", unit.as_str()]))?;
        }
        Ok(change)
    }

    /// Enable and start a service now.
    pub fn enable_service(&self, service: &str) -> Result<()> {
        self.run(CommandSpec::new("systemctl").args(["enable", "--now", service]))?;
        Ok(())
    }

    pub fn restart_service(&self, service: &str) -> Result<()> {
        self.run(CommandSpec::new("systemctl").args(["restart", service]))?;
        Ok(())
    }

    /// `chown` `path` to `owner` (group defaults to the same name).
    pub fn set_ownership(&self, path: impl AsRef<Path>, owner: &str, recursive: bool) -> Result<()> {
        let owner = if owner.contains(':') {
            owner.to_string()
        } else {
            format!("{0}:{0}", owner)
        };
        let mut spec = CommandSpec::new("chown");
        if recursive {
            spec = spec.arg("-R");
        }
        spec = spec
            .arg(owner)
            .arg(self.host_path(path).to_string_lossy().into_owned());
        self.run(spec)?;
        Ok(())
    }
}

/// Command part of a cron line, whitespace-normalized.
///
/// Comments, blank lines and environment assignments have no signature.
pub fn cron_signature(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut fields = line.split_whitespace();
    let schedule_fields = if line.starts_with('@') { 1 } else { 5 };
    let first = fields.next()?;
    if !line.starts_with('@') && first.contains('=') {
        return None;
    }
    let command: Vec<&str> = fields.skip(schedule_fields - 1).collect();
    if command.is_empty() {
        None
    } else {
        Some(command.join(" "))
    }
}

/// Merge `line` into a crontab body.
///
/// The first existing entry running the same command is kept (or replaced if
/// its schedule differs); later duplicates are dropped; otherwise the line
/// is appended. The result always ends with a newline.
pub fn merge_cron_line(existing: &str, line: &str) -> (String, CronChange) {
    let line = line.trim();
    let wanted = cron_signature(line);
    let mut seen = false;
    let mut change = CronChange::Unchanged;
    let mut out: Vec<&str> = Vec::new();

    for current in existing.lines() {
        if wanted.is_some() && cron_signature(current) == wanted {
            if seen {
                change = CronChange::Replaced;
                continue;
            }
            seen = true;
            if current.trim() == line {
                out.push(current);
            } else {
                out.push(line);
                change = CronChange::Replaced;
            }
        } else {
            out.push(current);
        }
    }

    if !seen {
        out.push(line);
        change = CronChange::Added;
    }

    let mut body = out.join("\n");
    body.push('\n');
    (body, change)
}
