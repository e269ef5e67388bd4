//! Background process control for the BreakTime daemon
//!
//! The daemon records itself in two small files under [`runtime_dir`]:
//! `breaktime.pid` and `breaktime.version`. The CLI reads them to decide
//! whether a daemon is alive and whether it was built from the same release.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use eyre::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::VERSION;

/// How long `stop` waits after SIGTERM before sending SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

/// Directory holding the PID, version and socket files
pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("breaktime")
}

/// How a stop request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Terminated,
    Killed,
}

/// What the daemon wrote about itself when it came up
#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    pid: u32,
    version: Option<String>,
}

#[derive(Debug)]
pub struct DaemonManager {
    pid_file: PathBuf,
    version_file: PathBuf,
}

impl Default for DaemonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonManager {
    pub fn new() -> Self {
        debug!("DaemonManager::new: called");
        Self::with_pid_file(runtime_dir().join("breaktime.pid"))
    }

    /// Place the runtime files next to `pid_file`; the version file shares its stem
    pub fn with_pid_file(pid_file: PathBuf) -> Self {
        let version_file = pid_file.with_extension("version");
        Self { pid_file, version_file }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn registration(&self) -> Option<Registration> {
        let pid = read_trimmed(&self.pid_file)?.parse().ok()?;
        Some(Registration {
            pid,
            version: read_trimmed(&self.version_file),
        })
    }

    /// PID of a live daemon, ignoring a stale PID file
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.registration().map(|r| r.pid).filter(|&pid| process_alive(pid));
        debug!(?pid, "DaemonManager::running_pid: resolved");
        pid
    }

    pub fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Release string the daemon registered with, if any
    pub fn read_version(&self) -> Option<String> {
        self.registration().and_then(|r| r.version)
    }

    /// True when the registered daemon was built from this CLI's release
    pub fn version_matches(&self) -> bool {
        let registered = self.read_version();
        let matches = registered.as_deref() == Some(VERSION);
        debug!(?registered, cli = VERSION, matches, "DaemonManager::version_matches: compared");
        matches
    }

    /// Spawn `bt run-daemon` detached from the terminal and return its PID
    pub fn start(&self, config_path: Option<&Path>) -> Result<u32> {
        debug!(?config_path, "DaemonManager::start: called");
        if let Some(pid) = self.running_pid() {
            return Err(eyre::eyre!("BreakTime daemon already running with PID {}", pid));
        }

        let exe = std::env::current_exe().context("Cannot locate the bt executable")?;
        let mut command = Command::new(exe);
        if let Some(path) = config_path {
            command.arg("--config").arg(path);
        }
        let child = command
            .arg("run-daemon")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("Failed to spawn BreakTime daemon")?;

        let pid = child.id();
        write_file(&self.pid_file, &pid.to_string()).context("Failed to record daemon PID")?;
        info!(pid, "BreakTime daemon spawned");
        Ok(pid)
    }

    /// Send SIGTERM and escalate to SIGKILL once the grace period runs out
    pub fn stop(&self) -> Result<StopOutcome> {
        debug!("DaemonManager::stop: called");
        let pid = self
            .running_pid()
            .ok_or_else(|| eyre::eyre!("BreakTime daemon is not running"))?;

        signal(pid, Signal::SIGTERM).context("Failed to send SIGTERM")?;
        let outcome = if wait_for_exit(pid, STOP_GRACE) {
            StopOutcome::Terminated
        } else {
            warn!(pid, "Daemon ignored SIGTERM, sending SIGKILL");
            if let Err(e) = signal(pid, Signal::SIGKILL) {
                warn!(pid, error = %e, "SIGKILL failed");
            }
            StopOutcome::Killed
        };

        self.clear_files()?;
        info!(pid, ?outcome, "BreakTime daemon stopped");
        Ok(outcome)
    }

    /// Record the calling process as the daemon, along with this build's version
    pub fn register_self(&self) -> Result<()> {
        let pid = std::process::id();
        write_file(&self.pid_file, &pid.to_string()).context("Failed to record daemon PID")?;
        write_file(&self.version_file, VERSION).context("Failed to record daemon version")?;
        info!(pid, version = VERSION, "BreakTime daemon registered");
        Ok(())
    }

    /// Remove the runtime files, but only while they still name this process
    pub fn unregister_self(&self) {
        let owned = self.registration().is_some_and(|r| r.pid == std::process::id());
        if !owned {
            debug!("DaemonManager::unregister_self: files belong to another process");
            return;
        }
        if let Err(e) = self.clear_files() {
            warn!(error = %e, "Failed to clean up daemon runtime files");
        }
    }

    pub fn status(&self) -> DaemonStatus {
        let pid = self.running_pid();
        DaemonStatus {
            running: pid.is_some(),
            pid,
            version: pid.and_then(|_| self.read_version()),
            pid_file: self.pid_file.clone(),
        }
    }

    fn clear_files(&self) -> Result<()> {
        for path in [&self.pid_file, &self.version_file] {
            match fs::remove_file(path) {
                Ok(()) => debug!(?path, "Removed runtime file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context(format!("Failed to remove {}", path.display())),
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<u32>,
    /// Only reported while the daemon is alive
    pub version: Option<String>,
    pub pid_file: PathBuf,
}

fn read_trimmed(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create runtime directory")?;
    }
    fs::write(path, contents)?;
    Ok(())
}

fn wait_for_exit(pid: u32, grace: Duration) -> bool {
    let mut waited = Duration::ZERO;
    while process_alive(pid) {
        if waited >= grace {
            return false;
        }
        std::thread::sleep(STOP_POLL);
        waited += STOP_POLL;
    }
    true
}

fn signal(pid: u32, sig: Signal) -> Result<()> {
    let raw = i32::try_from(pid).context("PID out of range")?;
    kill(Pid::from_raw(raw), sig)?;
    Ok(())
}

fn process_alive(pid: u32) -> bool {
    // A null signal only checks that the process exists
    i32::try_from(pid).is_ok_and(|raw| kill(Pid::from_raw(raw), None).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> DaemonManager {
        DaemonManager::with_pid_file(temp.path().join("run").join("breaktime.pid"))
    }

    #[test]
    fn test_runtime_dir_is_namespaced() {
        assert!(runtime_dir().ends_with("breaktime"));
    }

    #[test]
    fn test_nothing_running_without_files() {
        let temp = TempDir::new().unwrap();
        let daemon = manager(&temp);
        assert!(!daemon.is_running());
        assert!(daemon.stop().is_err());
        assert!(!daemon.status().running);
    }

    #[test]
    fn test_stale_pid_is_ignored() {
        let temp = TempDir::new().unwrap();
        let daemon = manager(&temp);
        // PIDs above i32::MAX can never name a live process
        write_file(daemon.pid_file(), &u32::MAX.to_string()).unwrap();
        assert_eq!(daemon.running_pid(), None);
        assert_eq!(daemon.status().version, None);
    }

    #[test]
    fn test_register_and_unregister_self() {
        let temp = TempDir::new().unwrap();
        let daemon = manager(&temp);

        daemon.register_self().unwrap();
        let status = daemon.status();
        assert!(status.running);
        assert_eq!(status.pid, Some(std::process::id()));
        assert_eq!(status.version.as_deref(), Some(VERSION));
        assert!(daemon.version_matches());

        daemon.unregister_self();
        assert!(!daemon.pid_file().exists());
        assert!(!daemon.version_file.exists());
    }

    #[test]
    fn test_unregister_keeps_another_daemons_files() {
        let temp = TempDir::new().unwrap();
        let daemon = manager(&temp);

        write_file(daemon.pid_file(), &(std::process::id() + 1).to_string()).unwrap();
        daemon.unregister_self();
        assert!(daemon.pid_file().exists());
    }

    #[test]
    fn test_version_from_another_release_does_not_match() {
        let temp = TempDir::new().unwrap();
        let daemon = manager(&temp);
        assert!(!daemon.version_matches());

        write_file(daemon.pid_file(), &std::process::id().to_string()).unwrap();
        write_file(&daemon.version_file, "0.0.0-old").unwrap();
        assert_eq!(daemon.read_version().as_deref(), Some("0.0.0-old"));
        assert!(!daemon.version_matches());
    }

    #[test]
    fn test_version_file_shares_pid_file_stem() {
        let daemon = DaemonManager::with_pid_file(PathBuf::from("/run/bt/breaktime.pid"));
        assert_eq!(daemon.version_file, PathBuf::from("/run/bt/breaktime.version"));
    }
}
