//! Launch record handed to a worker backend.
//!
//! Built once at admission from the job, its extracted credentials and the
//! orchestrator settings. Workers receive everything through their
//! environment.

use crate::admission::MeetingCredentials;
use crate::directory::MeetingJob;
use std::collections::BTreeMap;

/// Environment variable names every worker receives.
pub mod worker_env {
    pub const MEETING_ID: &str = "MEETING_ID";
    pub const MEETING_PWD: &str = "MEETING_PWD";
    pub const MEETING_DURATION_MINUTES: &str = "MEETING_DURATION_MINUTES";
    pub const MEETING_JOIN_LINK: &str = "MEETING_JOIN_LINK";
    pub const JOB_ID: &str = "JOB_ID";
    pub const USER_ID: &str = "USER_ID";
    pub const INSTANCE_ID: &str = "INSTANCE_ID";
    pub const DISPLAY_NAME: &str = "DISPLAY_NAME";
    pub const API_BASE_URL: &str = "API_BASE_URL";
}

/// Orchestrator-wide values copied into every launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSettings {
    pub api_base_url: String,
    /// Values of the configured passthrough variables, captured at startup.
    pub passthrough: BTreeMap<String, String>,
}

impl LaunchSettings {
    /// Capture `names` from the environment via `lookup`; unset names are skipped.
    pub fn capture<F>(api_base_url: &str, names: &[String], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let passthrough = names
            .iter()
            .filter_map(|name| lookup(name).map(|value| (name.clone(), value)))
            .collect();

        Self {
            api_base_url: api_base_url.to_string(),
            passthrough,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunchSpec {
    pub job_id: String,
    pub user_id: String,
    pub meeting_number: String,
    pub password: String,
    pub duration_minutes: u32,
    pub join_link: String,
    pub display_name: String,
    /// Stable name for the worker, usable as a container name.
    pub instance_name: String,
    pub env: BTreeMap<String, String>,
}

impl WorkerLaunchSpec {
    pub fn new(
        job: &MeetingJob,
        credentials: &MeetingCredentials,
        settings: &LaunchSettings,
    ) -> Self {
        let display_name = format!("Bot-{}", job.user_id);
        let instance_name = instance_name(&job.user_id, &job.id);

        let mut env = settings.passthrough.clone();
        for (key, value) in [
            (worker_env::MEETING_ID, credentials.meeting_number.clone()),
            (worker_env::MEETING_PWD, credentials.password.clone()),
            (worker_env::MEETING_DURATION_MINUTES, job.duration_minutes.to_string()),
            (worker_env::MEETING_JOIN_LINK, job.join_link.clone()),
            (worker_env::JOB_ID, job.id.clone()),
            (worker_env::USER_ID, job.user_id.clone()),
            (worker_env::INSTANCE_ID, instance_name.clone()),
            (worker_env::DISPLAY_NAME, display_name.clone()),
            (worker_env::API_BASE_URL, settings.api_base_url.clone()),
        ] {
            env.insert(key.to_string(), value);
        }

        Self {
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            meeting_number: credentials.meeting_number.clone(),
            password: credentials.password.clone(),
            duration_minutes: job.duration_minutes,
            join_link: job.join_link.clone(),
            display_name,
            instance_name,
            env,
        }
    }
}

/// `bot-<user>-<meeting>`, restricted to `[a-z0-9_.-]`.
pub fn instance_name(user_id: &str, meeting_id: &str) -> String {
    format!("bot-{user_id}-{meeting_id}")
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
