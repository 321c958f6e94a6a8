//! Worker supervision.
//!
//! A worker is the out-of-process bot that actually joins a meeting. The
//! supervisor only knows how to start one, ask whether it is still alive, and
//! stop it; the substrate (local process or container) is a [`WorkerBackend`].

pub mod backend;
pub mod container;
pub mod output;
pub mod process;
pub mod spec;
pub mod supervisor;

#[cfg(test)]
pub mod testing;

pub use backend::{LaunchedWorker, WorkerBackend, WorkerProcess};
pub use container::ContainerBackend;
pub use process::LocalProcessBackend;
pub use spec::{worker_env, LaunchSettings, WorkerLaunchSpec};
pub use supervisor::{TerminationOutcome, WorkerHandle, WorkerStatus, WorkerSupervisor};

/// Exit code reported when the real one is unknown (killed by a signal,
/// or the status could not be read).
pub const UNKNOWN_EXIT_CODE: i32 = -1;

pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}
