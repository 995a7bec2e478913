//! Stateful fake host for integration tests
//!
//! Implements `CommandRunner` by interpreting the handful of commands whose
//! effects the tests observe (MariaDB accounts and schemas, crontabs) and
//! answering everything else with success. Commands matching a registered
//! failure pattern exit non-zero.

#![allow(dead_code)]

use panel_provisioner::{CommandOutput, CommandRunner, CommandSpec, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// Observable host state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostState {
    /// `'user'@'host'` -> password
    pub db_users: BTreeMap<String, String>,
    pub databases: BTreeSet<String>,
    /// `db -> 'user'@'host'`
    pub grants: BTreeSet<(String, String)>,
    pub crontabs: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
    commands: Mutex<Vec<String>>,
    failures: Vec<(String, i32, String)>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command whose redacted line contains `pattern`.
    pub fn fail_on(mut self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.failures.push((pattern.to_string(), code, stderr.to_string()));
        self
    }

    pub fn state(&self) -> HostState {
        self.state.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    fn mysql(&self, sql: &str) -> CommandOutput {
        let account = Regex::new(r"'([^']*)'@'([^']*)'").unwrap();
        let quoted = Regex::new(r"'([^']*)'").unwrap();
        let mut state = self.state.lock().unwrap();

        if sql.starts_with("SELECT COUNT(*) FROM mysql.user") {
            let values: Vec<&str> = quoted.captures_iter(sql).map(|c| c.get(1).unwrap().as_str()).collect();
            let key = format!("'{}'@'{}'", values[0], values[1]);
            return CommandOutput::ok(format!("{}\n", u8::from(state.db_users.contains_key(&key))));
        }
        if sql.starts_with("SELECT COUNT(*) FROM information_schema.SCHEMATA") {
            let name = &quoted.captures(sql).unwrap()[1];
            return CommandOutput::ok(format!("{}\n", u8::from(state.databases.contains(name))));
        }
        if let Some(rest) = sql.strip_prefix("CREATE USER ") {
            let key = account.find(rest).unwrap().as_str().to_string();
            let password = rest.rsplit('\'').nth(1).unwrap().to_string();
            if state.db_users.contains_key(&key) {
                return CommandOutput::failed(1, format!("ERROR 1396 (HY000): Operation CREATE USER failed for {}", key));
            }
            state.db_users.insert(key, password);
            return CommandOutput::ok("");
        }
        if let Some(rest) = sql.strip_prefix("ALTER USER ") {
            let key = account.find(rest).unwrap().as_str().to_string();
            let password = rest.rsplit('\'').nth(1).unwrap().to_string();
            return match state.db_users.get_mut(&key) {
                Some(current) => {
                    *current = password;
                    CommandOutput::ok("")
                }
                None => CommandOutput::failed(1, format!("ERROR 1396 (HY000): Operation ALTER USER failed for {}", key)),
            };
        }
        if let Some(rest) = sql.strip_prefix("CREATE DATABASE ") {
            let name = rest.trim_matches('`').to_string();
            if !state.databases.insert(name.clone()) {
                return CommandOutput::failed(1, format!("ERROR 1007 (HY000): Can't create database '{}'; database exists", name));
            }
            return CommandOutput::ok("");
        }
        if sql.starts_with("GRANT ALL PRIVILEGES ON ") {
            let db = sql.split('`').nth(1).unwrap().to_string();
            let key = account.find(sql).unwrap().as_str().to_string();
            if !state.db_users.contains_key(&key) {
                return CommandOutput::failed(1, "ERROR 1133 (28000): Can't find any matching row in the user table");
            }
            state.grants.insert((db, key));
            return CommandOutput::ok("");
        }
        CommandOutput::ok("")
    }

    fn crontab(&self, spec: &CommandSpec) -> CommandOutput {
        let user = spec.args[1].clone();
        let mut state = self.state.lock().unwrap();
        match spec.args.get(2).map(String::as_str) {
            Some("-l") => match state.crontabs.get(&user) {
                Some(body) => CommandOutput::ok(body.clone()),
                None => CommandOutput::failed(1, format!("no crontab for {}", user)),
            },
            Some("-") => {
                state
                    .crontabs
                    .insert(user, spec.stdin.clone().unwrap_or_default());
                CommandOutput::ok("")
            }
            _ => CommandOutput::ok(""),
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.to_string();
        self.commands.lock().unwrap().push(line.clone());

        if let Some((_, code, stderr)) = self.failures.iter().find(|(p, _, _)| line.contains(p.as_str())) {
            return Ok(CommandOutput::failed(*code, stderr.clone()));
        }

        Ok(match spec.program.as_str() {
            "mysql" => match (&spec.stdin, spec.args.iter().position(|a| a == "-e")) {
                (Some(sql), _) => self.mysql(sql.trim()),
                (None, Some(i)) => self.mysql(&spec.args[i + 1]),
                (None, None) => CommandOutput::ok(""),
            },
            "crontab" => self.crontab(spec),
            _ => CommandOutput::ok(""),
        })
    }
}

pub const UBUNTU_22: &str = r#"NAME="Ubuntu"
VERSION_ID="22.04"
ID=ubuntu
ID_LIKE=debian
PRETTY_NAME="Ubuntu 22.04.4 LTS"
VERSION_CODENAME=jammy
"#;

pub const DEBIAN_12: &str = r#"PRETTY_NAME="Debian GNU/Linux 12 (bookworm)"
NAME="Debian GNU/Linux"
VERSION_ID="12"
VERSION_CODENAME=bookworm
ID=debian
"#;

pub const ROCKY_9: &str = r#"NAME="Rocky Linux"
VERSION="9.3 (Blue Onyx)"
ID="rocky"
ID_LIKE="rhel centos fedora"
VERSION_ID="9.3"
PRETTY_NAME="Rocky Linux 9.3 (Blue Onyx)"
"#;

pub const ARCH: &str = r#"NAME="Arch Linux"
PRETTY_NAME="Arch Linux"
ID=arch
BUILD_ID=rolling
"#;

/// Lay out a scratch host root: os-release plus the files a panel release
/// archive would have provided.
pub fn scratch_root(root: &Path, os_release: &str) {
    fs::create_dir_all(root.join("etc")).unwrap();
    fs::write(root.join("etc/os-release"), os_release).unwrap();
    fs::create_dir_all(root.join("var/www/pterodactyl")).unwrap();
    fs::write(
        root.join("var/www/pterodactyl/.env.example"),
        "APP_ENV=production\nAPP_KEY=\n",
    )
    .unwrap();
}

/// Fully specified configuration input.
pub fn config_input() -> panel_provisioner::ConfigInput {
    panel_provisioner::ConfigInput {
        domain: Some("panel.acme.test".into()),
        admin_email: Some("admin@acme.test".into()),
        db_password: Some(panel_provisioner::Secret::new("DbPassw0rd99")),
        user_email: Some("owner@acme.test".into()),
        user_username: Some("owner".into()),
        user_first_name: Some("Pat".into()),
        user_last_name: Some("Doe".into()),
        user_password: Some(panel_provisioner::Secret::new("AdminPassw0rd77")),
        ..Default::default()
    }
}
