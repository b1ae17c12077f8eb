//! OS process launcher backed by `tokio::process`

use crate::worker::launch::{WorkerCommand, WorkerExit, WorkerExitSender, WorkerHandle, WorkerLauncher};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Launches workers as detached child processes of the coordinator.
///
/// Each worker gets its own process group and no pipe back to the
/// coordinator, so it survives a coordinator restart and ignores a Ctrl-C
/// aimed at it. Output goes to `<log_dir>/<lobby id>-<launch id>.log`, or is
/// discarded without a log directory.
#[derive(Debug, Clone, Default)]
pub struct ProcessWorkerLauncher {
    log_dir: Option<PathBuf>,
}

impl ProcessWorkerLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir }
    }

    fn output(&self, command: &WorkerCommand, launch_id: u64) -> (Stdio, Stdio) {
        let Some(dir) = &self.log_dir else {
            return (Stdio::null(), Stdio::null());
        };
        match open_log(dir, &command.lobby_id, launch_id) {
            Ok(streams) => streams,
            Err(e) => {
                warn!(
                    "Cannot open worker log in {} for lobby {}, discarding output: {}",
                    dir.display(),
                    command.lobby_id,
                    e
                );
                (Stdio::null(), Stdio::null())
            }
        }
    }
}

fn open_log(dir: &Path, lobby_id: &str, launch_id: u64) -> io::Result<(Stdio, Stdio)> {
    fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{}-{}.log", lobby_id, launch_id)))?;
    let stderr = file.try_clone()?;
    Ok((Stdio::from(file), Stdio::from(stderr)))
}

impl WorkerLauncher for ProcessWorkerLauncher {
    fn launch(
        &self,
        launch_id: u64,
        command: WorkerCommand,
        exits: WorkerExitSender,
    ) -> WorkerHandle {
        let (stdout, stderr) = self.output(&command, launch_id);
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    "Worker launch failed for lobby {} ({}): {}",
                    command.lobby_id, command, e
                );
                // Reported like any other exit so the lobby sees it on its own timeline
                let _ = exits.send(WorkerExit::failed(launch_id, e.to_string()));
                return WorkerHandle::detached(launch_id);
            }
        };

        let pid = child.id();
        info!(
            "Worker launched for lobby {} - pid: {:?}, command: {}",
            command.lobby_id, pid, command
        );

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_worker(
            command.lobby_id,
            launch_id,
            child,
            kill_rx,
            exits,
        ));

        WorkerHandle::new(launch_id, pid, kill_tx)
    }
}

async fn watch_worker(
    lobby_id: String,
    launch_id: u64,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    exits: WorkerExitSender,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = &mut kill_rx => {
            info!("Terminating worker for lobby {} (launch {})", lobby_id, launch_id);
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill worker for lobby {}: {}", lobby_id, e);
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => WorkerExit::from_status(launch_id, status),
        Err(e) => WorkerExit::failed(launch_id, format!("failed to wait on worker: {}", e)),
    };

    debug!(
        "Worker for lobby {} exited - launch: {}, code: {:?}, signal: {:?}",
        lobby_id, launch_id, exit.code, exit.signal
    );

    if exits.send(exit).is_err() {
        debug!("Lobby {} is gone, dropping worker exit", lobby_id);
    }
}
