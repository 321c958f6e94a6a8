//! In-memory worker backend for tests.

use super::backend::{LaunchedWorker, WorkerBackend, WorkerProcess};
use super::spec::{LaunchSettings, WorkerLaunchSpec};
use super::UNKNOWN_EXIT_CODE;
use crate::admission::MeetingCredentials;
use crate::directory::{MeetingJob, ScheduledStart};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveTime;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct FakeState {
    exit_code: Option<i32>,
    honors_stop: bool,
    stop_requests: usize,
    force_kills: usize,
}

/// Test-side view of a [`FakeProcess`].
#[derive(Debug, Clone)]
pub struct FakeProbe(Arc<Mutex<FakeState>>);

impl FakeProbe {
    pub fn exit(&self, code: i32) {
        self.0.lock().unwrap().exit_code = Some(code);
    }

    pub fn is_alive(&self) -> bool {
        self.0.lock().unwrap().exit_code.is_none()
    }

    pub fn stop_requests(&self) -> usize {
        self.0.lock().unwrap().stop_requests
    }

    pub fn force_kills(&self) -> usize {
        self.0.lock().unwrap().force_kills
    }
}

pub struct FakeProcess(Arc<Mutex<FakeState>>);

impl FakeProcess {
    fn with_state(state: FakeState) -> (Self, FakeProbe) {
        let shared = Arc::new(Mutex::new(state));
        (Self(shared.clone()), FakeProbe(shared))
    }

    /// Exits with code 0 when asked to stop.
    pub fn running() -> (Self, FakeProbe) {
        Self::with_state(FakeState {
            honors_stop: true,
            ..FakeState::default()
        })
    }

    /// Ignores stop requests; only a forced kill ends it.
    pub fn stubborn() -> (Self, FakeProbe) {
        Self::with_state(FakeState::default())
    }

    pub fn exited(code: i32) -> (Self, FakeProbe) {
        Self::with_state(FakeState {
            exit_code: Some(code),
            ..FakeState::default()
        })
    }
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn try_exit_code(&mut self) -> io::Result<Option<i32>> {
        Ok(self.0.lock().unwrap().exit_code)
    }

    async fn request_stop(&mut self) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        state.stop_requests += 1;
        if state.honors_stop && state.exit_code.is_none() {
            state.exit_code = Some(0);
        }
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<i32> {
        loop {
            let exit_code = self.0.lock().unwrap().exit_code;
            if let Some(code) = exit_code {
                return Ok(code);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn force_kill(&mut self) -> io::Result<()> {
        let mut state = self.0.lock().unwrap();
        state.force_kills += 1;
        state.exit_code.get_or_insert(UNKNOWN_EXIT_CODE);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum NextLaunch {
    Running,
    Stubborn,
    ExitsImmediately(i32),
    Fails,
}

#[derive(Default)]
struct BackendState {
    next: Vec<NextLaunch>,
    launches: Vec<WorkerLaunchSpec>,
    probes: HashMap<String, FakeProbe>,
}

/// Records every launch and hands out controllable fake processes.
#[derive(Clone, Default)]
pub struct FakeBackend(Arc<Mutex<BackendState>>);

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_exits_immediately(&self, code: i32) {
        self.0.lock().unwrap().next.push(NextLaunch::ExitsImmediately(code));
    }

    pub fn next_launch_fails(&self) {
        self.0.lock().unwrap().next.push(NextLaunch::Fails);
    }

    pub fn next_is_stubborn(&self) {
        self.0.lock().unwrap().next.push(NextLaunch::Stubborn);
    }

    pub fn launches(&self) -> Vec<WorkerLaunchSpec> {
        self.0.lock().unwrap().launches.clone()
    }

    pub fn probe(&self, job_id: &str) -> Option<FakeProbe> {
        self.0.lock().unwrap().probes.get(job_id).cloned()
    }
}

#[async_trait]
impl WorkerBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn launch(&self, spec: &WorkerLaunchSpec) -> Result<LaunchedWorker> {
        let mut state = self.0.lock().unwrap();
        let next = if state.next.is_empty() {
            NextLaunch::Running
        } else {
            state.next.remove(0)
        };
        state.launches.push(spec.clone());

        let (process, probe) = match next {
            NextLaunch::Running => FakeProcess::running(),
            NextLaunch::Stubborn => FakeProcess::stubborn(),
            NextLaunch::ExitsImmediately(code) => FakeProcess::exited(code),
            NextLaunch::Fails => bail!("no such worker binary"),
        };
        state.probes.insert(spec.job_id.clone(), probe);

        Ok(LaunchedWorker {
            process: Box::new(process),
            stdout: None,
            stderr: None,
        })
    }
}

pub fn spec_for(job_id: &str, user_id: &str) -> WorkerLaunchSpec {
    let job = MeetingJob {
        id: job_id.to_string(),
        user_id: user_id.to_string(),
        join_link: "https://zoom.us/j/123456789?pwd=abc".to_string(),
        scheduled_start: ScheduledStart::TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        duration_minutes: 30,
    };
    let credentials = MeetingCredentials {
        meeting_number: "123456789".to_string(),
        password: "abc".to_string(),
    };
    WorkerLaunchSpec::new(&job, &credentials, &LaunchSettings::default())
}
