//! PTY (Pseudo-Terminal) abstraction
//!
//! Wraps portable-pty to spawn one shell executable on a fresh
//! pseudo-terminal and control it afterwards (resize, kill).

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::local::env::{build_environment, Environment, HostEnvironment};
use crate::local::shell::{default_shell_args, resolve_shell, ShellInfo};

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

/// Error type for PTY operations
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("Failed to create PTY: {0}")]
    CreateFailed(String),

    #[error("Failed to spawn {}: {reason}", shell.display())]
    SpawnFailed { shell: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("PTY system error: {0}")]
    PtySystemError(String),
}

/// Everything needed to spawn a shell-bound PTY
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub shell_path: PathBuf,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    pub environment: Environment,
    pub initial_cols: u16,
    pub initial_rows: u16,
}

impl LaunchSpec {
    /// Resolve shell, arguments and environment for this host
    pub fn resolve(host: &HostEnvironment, cols: u16, rows: u16) -> Self {
        Self {
            shell_path: resolve_shell(),
            args: default_shell_args(host.platform),
            working_directory: host.working_directory(),
            environment: build_environment(host),
            initial_cols: cols,
            initial_rows: rows,
        }
    }
}

/// A freshly spawned shell, split into the parts the session hands to its
/// pump threads. The handle stays with the session.
pub struct SpawnedPty {
    pub handle: PtyHandle,
    pub child: Box<dyn Child + Send + Sync>,
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Control side of a running PTY: resize and kill.
pub struct PtyHandle {
    master: Mutex<Box<dyn MasterPty + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    pid: Option<u32>,
    shell: ShellInfo,
}

impl PtyHandle {
    /// Open a PTY and spawn `shell` on it using the rest of `spec`
    pub fn spawn(spec: &LaunchSpec, shell: &Path) -> Result<SpawnedPty, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: spec.initial_rows,
                cols: spec.initial_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::CreateFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        for arg in &spec.args {
            cmd.arg(arg);
        }
        cmd.cwd(&spec.working_directory);
        cmd.env_clear();
        for (key, value) in &spec.environment {
            cmd.env(key, value);
        }

        tracing::info!(
            "Spawning PTY shell: {:?} (cwd: {:?}, {}x{})",
            shell,
            spec.working_directory,
            spec.initial_cols,
            spec.initial_rows
        );

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            tracing::warn!("Failed to spawn PTY shell {:?}: {}", shell, e);
            PtyError::SpawnFailed {
                shell: shell.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        // Only the child keeps the slave open, so reads hit EOF once it exits
        drop(pair.slave);

        let pid = child.process_id();
        tracing::info!("PTY shell spawned successfully, PID: {:?}", pid);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::PtySystemError(format!("Failed to clone reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::PtySystemError(format!("Failed to take writer: {}", e)))?;
        let killer = child.clone_killer();

        Ok(SpawnedPty {
            handle: Self {
                master: Mutex::new(pair.master),
                killer: Mutex::new(killer),
                pid,
                shell: ShellInfo::from_path(shell),
            },
            child,
            reader,
            writer,
        })
    }

    /// Resize the PTY
    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        self.master
            .lock()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::PtySystemError(e.to_string()))
    }

    /// Shell this PTY is running
    pub fn shell(&self) -> &ShellInfo {
        &self.shell
    }

    /// Get the process ID of the child
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Kill the child process
    pub fn kill(&self) -> Result<(), PtyError> {
        tracing::info!("Killing PTY child process (PID: {:?})", self.pid);
        self.killer.lock().kill()?;
        Ok(())
    }

    /// Kill the entire process group (PGID) so jobs started from the shell
    /// (vim, btop, ...) go down with it. The shell leads its own session, so
    /// its PID is the PGID.
    #[cfg(unix)]
    pub fn kill_process_group(&self) -> Result<(), PtyError> {
        let Some(pid) = self.pid else {
            return self.kill();
        };
        tracing::debug!("Killing process group for PID {}", pid);
        let pgid = Pid::from_raw(pid as i32);

        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            tracing::warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
        }

        // Give processes a brief moment to handle SIGTERM
        std::thread::sleep(std::time::Duration::from_millis(50));

        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            // Expected when the group already exited
            tracing::debug!("SIGKILL to process group {} (may have already exited): {}", pid, e);
        }

        // The group may not have included the shell if it changed its own pgid
        if let Err(e) = self.kill() {
            tracing::debug!("Direct kill of PID {} (may have already exited): {}", pid, e);
        }
        Ok(())
    }

    #[cfg(windows)]
    pub fn kill_process_group(&self) -> Result<(), PtyError> {
        if let Some(pid) = self.pid {
            tracing::debug!("Killing process tree for PID {} (Windows)", pid);
            let _ = std::process::Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .output();
        }
        self.kill()
    }
}
