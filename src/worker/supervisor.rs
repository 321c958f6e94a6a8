use super::backend::{WorkerBackend, WorkerProcess};
use super::output::{self, OutputStream};
use super::spec::WorkerLaunchSpec;
use super::UNKNOWN_EXIT_CODE;
use crate::error::OrchestratorError;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Exited(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The worker had already exited before the stop request.
    AlreadyExited(i32),
    /// The worker exited within the grace period.
    Graceful(i32),
    /// The worker ignored the stop request and was killed.
    Forced,
}

/// Opaque reference to one running worker.
pub struct WorkerHandle {
    label: String,
    process: Box<dyn WorkerProcess>,
    exit_code: Option<i32>,
    readers: Vec<JoinHandle<usize>>,
}

impl WorkerHandle {
    pub fn new(label: impl Into<String>, process: Box<dyn WorkerProcess>) -> Self {
        Self {
            label: label.into(),
            process,
            exit_code: None,
            readers: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Last observed exit code, if the worker is known to have finished.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("label", &self.label)
            .field("pid", &self.process.pid())
            .field("exit_code", &self.exit_code)
            .field("readers", &self.readers.len())
            .finish()
    }
}

/// Spawns, polls and stops workers on one backend.
pub struct WorkerSupervisor {
    backend: Box<dyn WorkerBackend>,
    spawn_grace: Duration,
    termination_timeout: Duration,
}

impl WorkerSupervisor {
    pub fn new(
        backend: Box<dyn WorkerBackend>,
        spawn_grace: Duration,
        termination_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            spawn_grace,
            termination_timeout,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn termination_timeout(&self) -> Duration {
        self.termination_timeout
    }

    /// Launch a worker and give it `spawn_grace` to fall over. A worker that
    /// has already exited by then is reported as a spawn failure.
    pub async fn spawn(&self, spec: &WorkerLaunchSpec) -> Result<WorkerHandle, OrchestratorError> {
        let spawn_error = |reason: String| OrchestratorError::SpawnError {
            meeting_id: spec.job_id.clone(),
            reason,
        };

        let launched = self
            .backend
            .launch(spec)
            .await
            .map_err(|e| spawn_error(format!("{e:#}")))?;

        let mut handle = WorkerHandle::new(spec.job_id.clone(), launched.process);
        if let Some(stdout) = launched.stdout {
            handle
                .readers
                .push(output::drain(spec.job_id.clone(), OutputStream::Stdout, stdout));
        }
        if let Some(stderr) = launched.stderr {
            handle
                .readers
                .push(output::drain(spec.job_id.clone(), OutputStream::Stderr, stderr));
        }

        info!(
            "Launched {} worker for meeting {} (pid {:?})",
            self.backend.name(),
            spec.job_id,
            handle.pid()
        );

        if !self.spawn_grace.is_zero() {
            tokio::time::sleep(self.spawn_grace).await;
        }

        match self.poll(&mut handle) {
            WorkerStatus::Running => Ok(handle),
            WorkerStatus::Exited(code) => Err(spawn_error(format!(
                "exited with code {code} during startup"
            ))),
        }
    }

    /// Non-blocking liveness check. Exit codes are remembered, so polling a
    /// finished worker again keeps reporting the same code.
    pub fn poll(&self, handle: &mut WorkerHandle) -> WorkerStatus {
        if let Some(code) = handle.exit_code {
            return WorkerStatus::Exited(code);
        }

        match handle.process.try_exit_code() {
            Ok(Some(code)) => {
                handle.exit_code = Some(code);
                WorkerStatus::Exited(code)
            }
            Ok(None) => WorkerStatus::Running,
            Err(e) => {
                warn!("Could not read status of worker {}: {}", handle.label, e);
                handle.exit_code = Some(UNKNOWN_EXIT_CODE);
                WorkerStatus::Exited(UNKNOWN_EXIT_CODE)
            }
        }
    }

    /// Stop a worker: request a graceful stop, wait up to the termination
    /// timeout, then kill it. Safe to call on a worker that already exited.
    pub async fn terminate(&self, handle: &mut WorkerHandle) -> TerminationOutcome {
        if let WorkerStatus::Exited(code) = self.poll(handle) {
            debug!("Worker {} already exited with code {}", handle.label, code);
            return TerminationOutcome::AlreadyExited(code);
        }

        if let Err(e) = handle.process.request_stop().await {
            warn!("Failed to send stop request to worker {}: {}", handle.label, e);
        }

        match tokio::time::timeout(self.termination_timeout, handle.process.wait()).await {
            Ok(Ok(code)) => {
                handle.exit_code = Some(code);
                info!("Worker {} stopped with code {}", handle.label, code);
                return TerminationOutcome::Graceful(code);
            }
            Ok(Err(e)) => warn!("Failed waiting for worker {}: {}", handle.label, e),
            Err(_) => warn!(
                "Worker {} still running {}s after stop request, killing",
                handle.label,
                self.termination_timeout.as_secs()
            ),
        }

        if let Err(e) = handle.process.force_kill().await {
            warn!("Failed to kill worker {}: {}", handle.label, e);
        }
        let code = match handle.process.wait().await {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed reaping worker {}: {}", handle.label, e);
                UNKNOWN_EXIT_CODE
            }
        };
        handle.exit_code = Some(code);
        TerminationOutcome::Forced
    }
}
