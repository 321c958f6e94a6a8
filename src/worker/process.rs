//! Workers as local child processes.

use super::backend::{LaunchedWorker, OutputReader, WorkerBackend, WorkerProcess};
use super::exit_code;
use super::spec::WorkerLaunchSpec;
use crate::config::WorkerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::warn;

pub struct LocalProcessBackend {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl LocalProcessBackend {
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir,
        }
    }

    /// Resolve the configured program on `PATH` once; a missing binary is
    /// only a warning since it may be installed later.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let program = match which::which(&config.program) {
            Ok(path) => path,
            Err(_) => {
                warn!(
                    "Worker program {:?} not found on PATH; spawns will fail until it is installed",
                    config.program
                );
                PathBuf::from(&config.program)
            }
        };
        Self::new(program, config.args.clone(), config.working_dir.clone())
    }
}

#[async_trait]
impl WorkerBackend for LocalProcessBackend {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn launch(&self, spec: &WorkerLaunchSpec) -> Result<LaunchedWorker> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start worker {:?}", self.program))?;

        let stdout = child.stdout.take().map(|s| Box::new(s) as OutputReader);
        let stderr = child.stderr.take().map(|s| Box::new(s) as OutputReader);

        Ok(LaunchedWorker {
            process: Box::new(LocalProcess { child }),
            stdout,
            stderr,
        })
    }
}

pub struct LocalProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for LocalProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit_code(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    async fn request_stop(&mut self) -> io::Result<()> {
        // No pid means the child was already reaped.
        match self.child.id() {
            Some(pid) => send_terminate(pid, &mut self.child),
            None => Ok(()),
        }
    }

    async fn wait(&mut self) -> io::Result<i32> {
        self.child.wait().await.map(exit_code)
    }

    async fn force_kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32, _child: &mut Child) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32, child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::worker::testing::spec_for;
    use crate::worker::{TerminationOutcome, WorkerStatus, WorkerSupervisor};
    use std::time::Duration;

    fn shell(script: &str) -> LocalProcessBackend {
        LocalProcessBackend::new("sh", vec!["-c".to_string(), script.to_string()], None)
    }

    fn supervisor(backend: LocalProcessBackend) -> WorkerSupervisor {
        WorkerSupervisor::new(
            Box::new(backend),
            Duration::from_millis(200),
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_worker_sees_meeting_environment() {
        let backend =
            shell(r#"test "$MEETING_ID" = 123456789 && test "$MEETING_PWD" = abc && sleep 5"#);
        let supervisor = supervisor(backend);

        let mut handle = supervisor.spawn(&spec_for("m1", "u1")).await.unwrap();
        assert_eq!(supervisor.poll(&mut handle), WorkerStatus::Running);
        assert_eq!(
            supervisor.terminate(&mut handle).await,
            TerminationOutcome::Graceful(-1)
        );
    }

    #[tokio::test]
    async fn test_worker_failing_at_startup_is_spawn_error() {
        let supervisor = supervisor(shell("echo 'cannot join' >&2; exit 3"));
        let err = supervisor.spawn(&spec_for("m1", "u1")).await.unwrap_err();
        assert_eq!(err.kind(), "spawn_error");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let backend = LocalProcessBackend::new("/nonexistent/meeting-bot", Vec::new(), None);
        let err = supervisor(backend).spawn(&spec_for("m1", "u1")).await.unwrap_err();
        assert_eq!(err.kind(), "spawn_error");
    }

    #[tokio::test]
    async fn test_worker_ignoring_sigterm_is_killed() {
        let supervisor = supervisor(shell("trap '' TERM; exec sleep 30"));
        let mut handle = supervisor.spawn(&spec_for("m1", "u1")).await.unwrap();

        assert_eq!(supervisor.terminate(&mut handle).await, TerminationOutcome::Forced);
        assert!(matches!(supervisor.poll(&mut handle), WorkerStatus::Exited(_)));
    }

    #[tokio::test]
    async fn test_clean_exit_is_observed() {
        let supervisor = supervisor(shell("sleep 0.5; exit 0"));
        let mut handle = supervisor.spawn(&spec_for("m1", "u1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(supervisor.poll(&mut handle), WorkerStatus::Exited(0));
    }

    #[tokio::test]
    async fn test_worker_survives_non_utf8_output() {
        let script = concat!(
            r"printf 'ok\n\377\n'; ",
            "for i in 1 2 3 4 5; do echo line $i; done; ",
            "exec sleep 30"
        );
        let supervisor = supervisor(shell(script));
        let mut handle = supervisor.spawn(&spec_for("m1", "u1")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(supervisor.poll(&mut handle), WorkerStatus::Running);
        assert_eq!(
            supervisor.terminate(&mut handle).await,
            TerminationOutcome::Graceful(-1)
        );
    }
}
