use super::spec::WorkerLaunchSpec;
use anyhow::Result;
use async_trait::async_trait;
use std::io;
use tokio::io::AsyncRead;

pub type OutputReader = Box<dyn AsyncRead + Send + Unpin>;

/// A started worker plus the pipes its output arrives on.
pub struct LaunchedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub stdout: Option<OutputReader>,
    pub stderr: Option<OutputReader>,
}

/// Where workers run. Implementations only launch; supervision policy lives
/// in [`super::WorkerSupervisor`].
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self, spec: &WorkerLaunchSpec) -> Result<LaunchedWorker>;
}

/// Process-level primitives for one running worker.
#[async_trait]
pub trait WorkerProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Exit code if the worker has finished. Must never block.
    fn try_exit_code(&mut self) -> io::Result<Option<i32>>;

    /// Ask the worker to stop (SIGTERM or the substrate's equivalent).
    async fn request_stop(&mut self) -> io::Result<()>;

    async fn wait(&mut self) -> io::Result<i32>;

    /// Kill without giving the worker a chance to clean up.
    async fn force_kill(&mut self) -> io::Result<()>;
}
