//! Worker launch contract
//!
//! A launch is fire-and-forget: the launcher returns a [`WorkerHandle`] at once
//! and reports the end of the process (or its failure to start) later, as a
//! [`WorkerExit`] on the lobby's completion channel.

use crate::config::WorkerSettings;
use crate::types::LobbyId;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::sync::{mpsc, oneshot};

/// Channel on which a lobby receives the exits of the workers it launched
pub type WorkerExitSender = mpsc::UnboundedSender<WorkerExit>;
pub type WorkerExitReceiver = mpsc::UnboundedReceiver<WorkerExit>;

/// Fully resolved command line for one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub lobby_id: LobbyId,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// `<exe> <extra args..> <room flag> <lobby id> [<address flag> <address>] <port flag> <port>`
    pub fn build(settings: &WorkerSettings, lobby_id: &str, port: u16) -> Self {
        let mut args = settings.extra_args.clone();
        args.push(settings.room_id_flag.clone());
        args.push(lobby_id.to_string());
        if let (Some(flag), Some(address)) = (&settings.address_flag, &settings.address) {
            args.push(flag.clone());
            args.push(address.clone());
        }
        args.push(settings.port_flag.clone());
        args.push(port.to_string());

        Self {
            lobby_id: lobby_id.to_string(),
            program: settings.exe_path.clone(),
            args,
        }
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How a worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub launch_id: u64,
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// Set when the process could not be started or waited on
    pub error: Option<String>,
}

impl WorkerExit {
    pub fn from_status(launch_id: u64, status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            launch_id,
            code: status.code(),
            signal,
            error: None,
        }
    }

    pub fn failed(launch_id: u64, error: impl Into<String>) -> Self {
        Self {
            launch_id,
            code: None,
            signal: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.code != Some(0)
    }

    /// Label used for metrics
    pub fn status_label(&self) -> &'static str {
        if self.error.is_some() {
            "spawn_failed"
        } else if self.signal.is_some() {
            "signaled"
        } else if self.code == Some(0) {
            "success"
        } else {
            "failure"
        }
    }
}

/// Ownership of one launched worker
#[derive(Debug)]
pub struct WorkerHandle {
    launch_id: u64,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(launch_id: u64, pid: Option<u32>, kill_tx: oneshot::Sender<()>) -> Self {
        Self {
            launch_id,
            pid,
            kill_tx: Some(kill_tx),
        }
    }

    /// Handle without process control, e.g. for a worker that never started
    pub fn detached(launch_id: u64) -> Self {
        Self {
            launch_id,
            pid: None,
            kill_tx: None,
        }
    }

    pub fn launch_id(&self) -> u64 {
        self.launch_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the watcher to kill the process. The exit is still reported on the
    /// completion channel. Returns false if no kill could be requested.
    pub fn terminate(&mut self) -> bool {
        match self.kill_tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// Starts worker processes
pub trait WorkerLauncher: Send + Sync {
    /// Start one worker. Must not block; failures arrive on `exits`.
    fn launch(&self, launch_id: u64, command: WorkerCommand, exits: WorkerExitSender)
        -> WorkerHandle;
}
