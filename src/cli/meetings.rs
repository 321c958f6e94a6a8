//! `meetbot meetings`: one directory fetch, printed with admission verdicts.
//!
//! Nothing is spawned; the verdicts are computed against an empty registry.

use crate::admission::{AdmissionDecision, AdmissionPolicy};
use crate::cli::MeetingsCliArgs;
use crate::config::Config;
use crate::directory::{latest_per_user, HttpMeetingDirectory, MeetingDirectory, MeetingJob};
use crate::registry::BotRegistry;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::Path;

pub async fn handle_meetings_command(
    args: MeetingsCliArgs,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate().context("Invalid configuration")?;

    let directory = HttpMeetingDirectory::from_config(
        &config.directory,
        config.schedule.default_duration_minutes,
    )?;
    let jobs = directory.fetch_all().await?;
    let policy = AdmissionPolicy::from_config(&config.schedule);

    println!("{} meetings from {}", jobs.len(), directory.url());
    println!();
    for line in describe(&jobs, Local::now(), &policy, args.all) {
        println!("{line}");
    }
    Ok(())
}

fn describe(
    jobs: &[MeetingJob],
    now: DateTime<Local>,
    policy: &AdmissionPolicy,
    include_superseded: bool,
) -> Vec<String> {
    let registry = BotRegistry::new();
    let candidates: HashSet<&str> = latest_per_user(jobs)
        .into_iter()
        .map(|j| j.id.as_str())
        .collect();

    jobs.iter()
        .filter_map(|job| {
            let verdict = if candidates.contains(job.id.as_str()) {
                match policy.evaluate(job, now, &registry) {
                    AdmissionDecision::Admit(credentials) => {
                        format!("would join meeting {}", credentials.meeting_number)
                    }
                    AdmissionDecision::Reject(rejection) => rejection.to_string(),
                }
            } else if include_superseded {
                "superseded by a newer meeting".to_string()
            } else {
                return None;
            };

            Some(format!(
                "{:<20} {:<16} {} ({}m): {}",
                job.user_id,
                job.id,
                job.scheduled_start.resolve(now).format("%Y-%m-%d %H:%M"),
                job.duration_minutes,
                verdict
            ))
        })
        .collect()
}
