//! Worker (game-server) process orchestration
//!
//! Builds the command line for a lobby's worker, starts it detached and
//! reports its termination back to the owning lobby.

pub mod launch;
pub mod process;

pub use launch::{
    WorkerCommand, WorkerExit, WorkerExitReceiver, WorkerExitSender, WorkerHandle, WorkerLauncher,
};
pub use process::ProcessWorkerLauncher;
