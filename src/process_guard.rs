//! Child process lifecycle
//!
//! Package installs and migrations can run for minutes. If the provisioner
//! is interrupted, those children must not keep mutating the host on their
//! own, so every spawned command:
//!
//! - runs in its own process group with a parent-death signal,
//! - is tracked in a global registry while it runs,
//! - is terminated (SIGTERM, then SIGKILL after a grace period) when the
//!   provisioner receives SIGINT, SIGTERM or SIGHUP.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Mutex<ChildRegistry>> = OnceLock::new();

/// Process groups of commands that are currently running.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static Mutex<ChildRegistry> {
        CHILD_REGISTRY.get_or_init(|| Mutex::new(ChildRegistry::default()))
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::trace!("Tracking child process group {}", pid);
    }

    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::trace!("Released child process group {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Signal every tracked group, escalating to SIGKILL after `grace`.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.pids.is_empty() {
            return;
        }
        tracing::warn!("Terminating {} running command(s)", self.pids.len());

        for &pid in &self.pids {
            if let Err(e) = signal_group(pid, Signal::SIGTERM) {
                tracing::warn!("SIGTERM to process group {} failed: {}", pid, e);
            }
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && self.pids.iter().any(|&pid| is_alive(pid)) {
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in self.pids.iter().filter(|&&pid| is_alive(pid)) {
            tracing::warn!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
            let _ = signal_group(pid, Signal::SIGKILL);
        }
        self.pids.clear();
    }
}

/// Registers a child on creation and releases it when dropped.
#[derive(Debug)]
pub struct ChildGuard {
    pid: u32,
}

impl ChildGuard {
    pub fn register(pid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        Self { pid }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

fn signal_group(pgid: u32, sig: Signal) -> Result<(), nix::Error> {
    // Negative PID addresses the whole group (php, composer, apt's dpkg, ...)
    signal::kill(Pid::from_raw(-(pgid as i32)), sig)
}

fn is_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    // Zombies still accept signals but are done
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(stat.split_whitespace().nth(2), Some("Z" | "X")),
        Err(_) => true,
    }
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that clean up running commands.
///
/// Call once at program start. The process exits with `128 + signal`.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::warn!("Received signal {}, stopping provisioning", sig);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(Duration::from_secs(3));
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for `std::process::Command` to isolate children.
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        // SAFETY: the closure only calls async-signal-safe functions
        // (setpgid, prctl) between fork and exec.
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();
        registry.register(1234);
        registry.register(5678);
        registry.register(1234);
        assert_eq!(registry.count(), 2);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_terminate_all_kills_sleeping_group() {
        let child = Command::new("sleep")
            .arg("30")
            .in_new_process_group()
            .spawn()
            .expect("sleep should spawn");
        let pid = child.id();

        let mut registry = ChildRegistry::default();
        registry.register(pid);
        registry.terminate_all(Duration::from_secs(2));
        assert_eq!(registry.count(), 0);

        let output = child.wait_with_output().expect("wait should succeed");
        assert!(!output.status.success());
    }

    #[test]
    fn test_terminate_all_with_nothing_tracked_is_noop() {
        let mut registry = ChildRegistry::default();
        registry.terminate_all(Duration::from_millis(10));
        assert_eq!(registry.count(), 0);
    }
}
