//! The control loop that ties discovery, admission and supervision together.
//!
//! One [`Orchestrator`] owns the registry and is its only writer. Each tick
//! runs reconcile, expire, refresh, admit and status in that order; the only
//! awaits that can hold a tick up are the directory fetch and a worker's
//! bounded termination.

pub mod signals;
pub mod status;

pub use signals::shutdown_on_signal;
pub use status::{BotStatus, StatusHandle, StatusState, StatusSummary};

use crate::admission::{AdmissionDecision, AdmissionPolicy, Rejection};
use crate::directory::{self, MeetingDirectory, MeetingJob};
use crate::error::OrchestratorError;
use crate::registry::{BotInstance, BotRegistry, BotState, StopReason};
use crate::worker::{
    LaunchSettings, TerminationOutcome, WorkerLaunchSpec, WorkerStatus, WorkerSupervisor,
};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one tick did, in the order it happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub exited: Vec<String>,
    pub crashed: Vec<String>,
    pub expired: Vec<String>,
    pub admitted: Vec<String>,
    pub failures: Vec<OrchestratorError>,
    pub directory_ok: bool,
}

impl TickReport {
    pub fn has_failure(&self, kind: &str) -> bool {
        self.failures.iter().any(|f| f.kind() == kind)
    }
}

pub struct Orchestrator {
    directory: Box<dyn MeetingDirectory>,
    supervisor: WorkerSupervisor,
    registry: BotRegistry,
    policy: AdmissionPolicy,
    launch: LaunchSettings,
    tick_interval: Duration,
    status: StatusHandle,
    ticks: u64,
    last_error: Option<String>,
    users_monitored: usize,
    meetings_listed: usize,
    /// Meetings whose bot already ended, with the instant it ended. A meeting
    /// is not joined twice within the same occurrence.
    finished: HashMap<String, DateTime<Local>>,
}

impl Orchestrator {
    pub fn new(
        directory: Box<dyn MeetingDirectory>,
        supervisor: WorkerSupervisor,
        policy: AdmissionPolicy,
        launch: LaunchSettings,
        tick_interval: Duration,
    ) -> Self {
        Self {
            directory,
            supervisor,
            registry: BotRegistry::new(),
            policy,
            launch,
            tick_interval,
            status: StatusHandle::default(),
            ticks: 0,
            last_error: None,
            users_monitored: 0,
            meetings_listed: 0,
            finished: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &BotRegistry {
        &self.registry
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run ticks until `cancel` fires, then stop every remaining bot.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Orchestrator running: {} backend, checking every {}s",
            self.supervisor.backend_name(),
            self.tick_interval.as_secs()
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.tick(Local::now(), &cancel).await {
                error!("Tick failed ({}): {}", e.kind(), e);
                self.last_error = Some(e.to_string());
            }

            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        self.shutdown().await;
    }

    pub async fn tick(
        &mut self,
        now: DateTime<Local>,
        cancel: &CancellationToken,
    ) -> Result<TickReport, OrchestratorError> {
        self.ticks += 1;
        let mut report = TickReport::default();

        self.reconcile(now, &mut report);
        self.expire(now, &mut report).await;

        match self.directory.fetch_all().await {
            Ok(jobs) => {
                report.directory_ok = true;
                self.users_monitored = directory::count_users(&jobs);
                self.meetings_listed = jobs.len();
                self.finished
                    .retain(|meeting_id, _| jobs.iter().any(|job| &job.id == meeting_id));

                if cancel.is_cancelled() {
                    debug!("Shutdown requested, skipping admission");
                } else {
                    self.admit(&jobs, now, cancel, &mut report).await;
                }
            }
            Err(e) => {
                warn!("{}; keeping {} active bots as they are", e, self.registry.len());
                self.record_failure(&mut report, e);
            }
        }

        self.publish_status(now, report.directory_ok).await;
        Ok(report)
    }

    /// Drop every entry whose worker has exited on its own. Nothing is restarted.
    fn reconcile(&mut self, now: DateTime<Local>, report: &mut TickReport) {
        for meeting_id in self.registry.meeting_ids() {
            let Some(bot) = self.registry.get_mut(&meeting_id) else {
                continue;
            };

            let code = match self.supervisor.poll(&mut bot.handle) {
                WorkerStatus::Running => continue,
                WorkerStatus::Exited(code) => code,
            };

            if code == 0 {
                bot.state = BotState::Stopped(StopReason::Exited);
                info!("Bot for meeting {} finished normally", meeting_id);
                report.exited.push(meeting_id.clone());
            } else {
                bot.state = BotState::Stopped(StopReason::Crashed);
                let failure = OrchestratorError::WorkerCrashed {
                    meeting_id: meeting_id.clone(),
                    code,
                };
                error!("{}", failure);
                report.crashed.push(meeting_id.clone());
                self.record_failure(report, failure);
            }

            self.registry.remove(&meeting_id);
            self.finished.insert(meeting_id, now);
        }
    }

    /// Stop every bot that has been running for its full duration.
    async fn expire(&mut self, now: DateTime<Local>, report: &mut TickReport) {
        for meeting_id in self.registry.meeting_ids() {
            let Some(bot) = self.registry.get_mut(&meeting_id) else {
                continue;
            };
            if bot.state != BotState::Running || !bot.is_expired(now) {
                continue;
            }

            info!(
                "Meeting {} reached its {} minute duration, stopping bot",
                meeting_id, bot.duration_minutes
            );
            bot.state = BotState::Stopping(StopReason::Expired);
            let outcome = self.supervisor.terminate(&mut bot.handle).await;
            bot.state = BotState::Stopped(StopReason::Expired);

            self.registry.remove(&meeting_id);
            self.finished.insert(meeting_id.clone(), now);
            report.expired.push(meeting_id.clone());

            if outcome == TerminationOutcome::Forced {
                let failure = OrchestratorError::TerminationTimedOut {
                    meeting_id,
                    timeout_secs: self.supervisor.termination_timeout().as_secs(),
                };
                warn!("{}", failure);
                self.record_failure(report, failure);
            }
        }
    }

    async fn admit(
        &mut self,
        jobs: &[MeetingJob],
        now: DateTime<Local>,
        cancel: &CancellationToken,
        report: &mut TickReport,
    ) {
        for job in directory::latest_per_user(jobs) {
            if cancel.is_cancelled() {
                debug!("Shutdown requested, no further admissions this tick");
                break;
            }
            if self.already_served(job, now) {
                debug!("Meeting {} already had a bot this occurrence", job.id);
                continue;
            }

            let credentials = match self.policy.evaluate(job, now, &self.registry) {
                AdmissionDecision::Admit(credentials) => credentials,
                AdmissionDecision::Reject(rejection) => {
                    self.log_rejection(job, rejection, report);
                    continue;
                }
            };

            let spec = WorkerLaunchSpec::new(job, &credentials, &self.launch);
            info!(
                "Starting bot for meeting {} (user {}, meeting number {}, {} min)",
                job.id, job.user_id, credentials.meeting_number, job.duration_minutes
            );

            let handle = match self.supervisor.spawn(&spec).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!("{}", e);
                    self.record_failure(report, e);
                    continue;
                }
            };

            let bot = BotInstance::running(
                job.id.clone(),
                job.user_id.clone(),
                credentials.meeting_number,
                handle,
                now,
                job.duration_minutes,
            );
            if self.register(bot, report).await {
                report.admitted.push(job.id.clone());
            }
        }
    }

    /// Track a freshly spawned bot. A bot the registry refuses is stopped
    /// again so no worker runs untracked.
    async fn register(&mut self, mut bot: BotInstance, report: &mut TickReport) -> bool {
        if let Err(e) = self.registry.ensure_vacant(&bot.meeting_id, &bot.user_id) {
            error!("Cannot track bot for meeting {}: {}, stopping it", bot.meeting_id, e);
            self.supervisor.terminate(&mut bot.handle).await;
            self.record_failure(report, e);
            return false;
        }
        match self.registry.insert(bot) {
            Ok(()) => true,
            Err(e) => {
                self.record_failure(report, e);
                false
            }
        }
    }

    /// True when a bot for this meeting already ended after the current
    /// occurrence's join window opened.
    fn already_served(&self, job: &MeetingJob, now: DateTime<Local>) -> bool {
        match self.finished.get(&job.id) {
            Some(ended_at) => {
                let (opens, _) = self.policy.window(job, now);
                *ended_at >= opens
            }
            None => false,
        }
    }

    fn log_rejection(&mut self, job: &MeetingJob, rejection: Rejection, report: &mut TickReport) {
        match rejection {
            Rejection::AlreadyRunning => {}
            Rejection::UserBusy => {
                debug!("User {} already has an active bot, skipping {}", job.user_id, job.id)
            }
            Rejection::TooEarly { .. } => debug!("Meeting {}: {}", job.id, rejection),
            Rejection::TooLate { .. } => info!("Skipping meeting {}: {}", job.id, rejection),
            Rejection::InvalidLink(e) => {
                warn!("Skipping meeting {}: {}", job.id, e);
                self.record_failure(report, e);
            }
        }
    }

    fn record_failure(&mut self, report: &mut TickReport, failure: OrchestratorError) {
        self.last_error = Some(failure.to_string());
        report.failures.push(failure);
    }

    pub fn summary(&self, now: DateTime<Local>, directory_ok: bool) -> StatusSummary {
        StatusSummary {
            generated_at: now,
            tick: self.ticks,
            active_bots: self.registry.len(),
            users_monitored: self.users_monitored,
            meetings_listed: self.meetings_listed,
            directory_ok,
            bots: self
                .registry
                .iter()
                .map(|bot| BotStatus::from_instance(bot, now))
                .collect(),
            last_error: self.last_error.clone(),
        }
    }

    async fn publish_status(&self, now: DateTime<Local>, directory_ok: bool) {
        let summary = self.summary(now, directory_ok);
        for line in summary.log_lines() {
            info!("{}", line);
        }
        self.status.publish(summary).await;
    }

    /// Terminate every registered bot, one at a time, and empty the registry.
    pub async fn shutdown(&mut self) -> Vec<(String, TerminationOutcome)> {
        self.status.set_shutting_down().await;
        info!("Shutting down, stopping {} active bots", self.registry.len());

        let mut outcomes = Vec::new();
        for mut bot in self.registry.drain() {
            bot.state = BotState::Stopping(StopReason::Shutdown);
            let outcome = self.supervisor.terminate(&mut bot.handle).await;
            bot.state = BotState::Stopped(StopReason::Shutdown);
            info!("Stopped bot for meeting {} ({:?})", bot.meeting_id, outcome);
            outcomes.push((bot.meeting_id, outcome));
        }

        let now = Local::now();
        self.status.publish(self.summary(now, false)).await;
        outcomes
    }
}
