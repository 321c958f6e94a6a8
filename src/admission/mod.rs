//! Admission policy: decides whether a meeting may get a bot right now.
//!
//! Pure with respect to its inputs. Nothing is remembered between ticks, so a
//! rejected job is evaluated afresh the next time the directory reports it.

pub mod credentials;

pub use credentials::{extract_credentials, MeetingCredentials};

use crate::config::ScheduleConfig;
use crate::directory::MeetingJob;
use crate::error::OrchestratorError;
use crate::registry::BotRegistry;
use chrono::{DateTime, Duration, Local};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub early: Duration,
    pub late: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            early: Duration::seconds(120),
            late: Duration::seconds(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit(MeetingCredentials),
    Reject(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    AlreadyRunning,
    UserBusy,
    TooEarly { starts_in: Duration },
    TooLate { late_by: Duration },
    InvalidLink(OrchestratorError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "bot already running for this meeting"),
            Self::UserBusy => write!(f, "user already has an active bot"),
            Self::TooEarly { starts_in } => {
                write!(f, "too early, starts in {}s", starts_in.num_seconds())
            }
            Self::TooLate { late_by } => {
                write!(f, "join window closed {}s ago", late_by.num_seconds())
            }
            Self::InvalidLink(err) => write!(f, "{err}"),
        }
    }
}

impl AdmissionPolicy {
    pub fn from_config(schedule: &ScheduleConfig) -> Self {
        Self {
            early: Duration::seconds(schedule.join_early_seconds as i64),
            late: Duration::seconds(schedule.join_late_seconds as i64),
        }
    }

    /// Inclusive `[start - early, start + late]` for the job's start as seen from `now`.
    pub fn window(
        &self,
        job: &MeetingJob,
        now: DateTime<Local>,
    ) -> (DateTime<Local>, DateTime<Local>) {
        let start = job.scheduled_start.resolve(now);
        (start - self.early, start + self.late)
    }

    pub fn evaluate(
        &self,
        job: &MeetingJob,
        now: DateTime<Local>,
        registry: &BotRegistry,
    ) -> AdmissionDecision {
        if registry.contains_meeting(&job.id) {
            return AdmissionDecision::Reject(Rejection::AlreadyRunning);
        }
        if registry.has_user(&job.user_id) {
            return AdmissionDecision::Reject(Rejection::UserBusy);
        }

        let (opens, closes) = self.window(job, now);
        if now < opens {
            return AdmissionDecision::Reject(Rejection::TooEarly {
                starts_in: job.scheduled_start.resolve(now) - now,
            });
        }
        if now > closes {
            return AdmissionDecision::Reject(Rejection::TooLate {
                late_by: now - closes,
            });
        }

        match extract_credentials(&job.join_link) {
            Ok(credentials) => AdmissionDecision::Admit(credentials),
            Err(err) => AdmissionDecision::Reject(Rejection::InvalidLink(err)),
        }
    }

    pub fn should_admit(
        &self,
        job: &MeetingJob,
        now: DateTime<Local>,
        registry: &BotRegistry,
    ) -> bool {
        matches!(self.evaluate(job, now, registry), AdmissionDecision::Admit(_))
    }
}
