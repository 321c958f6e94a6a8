//! Workers as containers driven through the docker CLI.
//!
//! Secrets are passed as bare `-e NAME` flags with the value set on the
//! docker client's own environment, so they never show up in `ps` output.

use super::backend::{LaunchedWorker, OutputReader, WorkerBackend, WorkerProcess};
use super::exit_code;
use super::spec::WorkerLaunchSpec;
use crate::config::WorkerConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Label shared by every bot container this orchestrator starts.
pub const APP_LABEL: &str = "app=meeting-bot";

pub struct ContainerBackend {
    docker: PathBuf,
    image: String,
    args: Vec<String>,
    cpus: Option<String>,
    memory: Option<String>,
    kill_timeout: Duration,
}

impl ContainerBackend {
    pub fn from_config(config: &WorkerConfig) -> Self {
        let docker = match which::which(&config.docker_binary) {
            Ok(path) => path,
            Err(_) => {
                warn!(
                    "Container runtime {:?} not found on PATH; \
                     spawns will fail until it is installed",
                    config.docker_binary
                );
                PathBuf::from(&config.docker_binary)
            }
        };

        Self {
            docker,
            image: config.image.clone(),
            args: config.args.clone(),
            cpus: config.cpus.clone(),
            memory: config.memory.clone(),
            kill_timeout: config.termination_timeout(),
        }
    }

    /// Arguments for `docker run`, without any secret values.
    pub fn run_args(&self, spec: &WorkerLaunchSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            spec.instance_name.clone(),
            "--label".to_string(),
            APP_LABEL.to_string(),
            "--label".to_string(),
            format!("user={}", spec.user_id),
            "--label".to_string(),
            format!("meeting={}", spec.job_id),
        ];

        for key in spec.env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }
        if let Some(cpus) = &self.cpus {
            args.push("--cpus".to_string());
            args.push(cpus.clone());
        }
        if let Some(memory) = &self.memory {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }

        args.push(self.image.clone());
        args.extend(self.args.iter().cloned());
        args
    }
}

#[async_trait]
impl WorkerBackend for ContainerBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn launch(&self, spec: &WorkerLaunchSpec) -> Result<LaunchedWorker> {
        let args = self.run_args(spec);
        debug!("Starting container {} from {}", spec.instance_name, self.image);

        let mut child = Command::new(&self.docker)
            .args(&args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to run {:?}", self.docker))?;

        let stdout = child.stdout.take().map(|s| Box::new(s) as OutputReader);
        let stderr = child.stderr.take().map(|s| Box::new(s) as OutputReader);

        Ok(LaunchedWorker {
            process: Box::new(Container {
                docker: self.docker.clone(),
                name: spec.instance_name.clone(),
                kill_timeout: self.kill_timeout,
                child,
            }),
            stdout,
            stderr,
        })
    }
}

/// A running `docker run` client attached to its container.
pub struct Container {
    docker: PathBuf,
    name: String,
    kill_timeout: Duration,
    child: Child,
}

impl Container {
    /// Run `docker kill`, giving up after `kill_timeout` so a hung daemon
    /// cannot stall termination.
    async fn docker_kill(&self, signal: Option<&str>) -> io::Result<()> {
        let mut command = Command::new(&self.docker);
        command.arg("kill");
        if let Some(signal) = signal {
            command.args(["--signal", signal]);
        }
        command
            .arg(&self.name)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.kill_timeout, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "docker kill {} did not finish within {}ms",
                        self.name,
                        self.kill_timeout.as_millis()
                    ),
                ))
            }
        };

        if !output.status.success() {
            // The container may already be gone; the client exit code is
            // authoritative for liveness.
            debug!(
                "docker kill {} failed: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerProcess for Container {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit_code(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    async fn request_stop(&mut self) -> io::Result<()> {
        self.docker_kill(Some("TERM")).await
    }

    async fn wait(&mut self) -> io::Result<i32> {
        self.child.wait().await.map(exit_code)
    }

    async fn force_kill(&mut self) -> io::Result<()> {
        // The client goes down whatever the daemon says.
        let container_result = self.docker_kill(None).await;
        match self.child.start_kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        container_result
    }
}
