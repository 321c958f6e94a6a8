//! Meeting directory: the external read API listing scheduled meetings.
//!
//! Every tick pulls a fresh snapshot; nothing is diffed against the previous
//! one. Only the most recently created meeting of each user is a candidate.

pub mod client;
pub mod job;

pub use client::HttpMeetingDirectory;
pub use job::{MeetingJob, ScheduledStart};

use crate::error::OrchestratorError;
use async_trait::async_trait;
use std::collections::HashSet;

/// Read endpoint for scheduled meetings.
#[async_trait]
pub trait MeetingDirectory: Send + Sync {
    /// Fetch all meetings, most recently created first. No retries: the
    /// caller's tick interval is the retry cadence.
    async fn fetch_all(&self) -> Result<Vec<MeetingJob>, OrchestratorError>;
}

/// First meeting per user in snapshot order, users in order of first appearance.
pub fn latest_per_user(jobs: &[MeetingJob]) -> Vec<&MeetingJob> {
    let mut seen = HashSet::new();
    jobs.iter()
        .filter(|job| seen.insert(job.user_id.as_str()))
        .collect()
}

pub fn count_users(jobs: &[MeetingJob]) -> usize {
    jobs.iter()
        .map(|job| job.user_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn job(id: &str, user: &str) -> MeetingJob {
        MeetingJob {
            id: id.to_string(),
            user_id: user.to_string(),
            join_link: format!("https://zoom.us/j/1000{id}?pwd=x"),
            scheduled_start: ScheduledStart::TimeOfDay(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            duration_minutes: 30,
        }
    }

    #[test]
    fn test_latest_per_user_keeps_first_entry() {
        let jobs = vec![job("3", "alice"), job("2", "bob"), job("1", "alice")];

        let latest: Vec<&str> = latest_per_user(&jobs).iter().map(|j| j.id.as_str()).collect();
        assert_eq!(latest, vec!["3", "2"]);
    }

    #[test]
    fn test_latest_per_user_empty() {
        assert!(latest_per_user(&[]).is_empty());
    }

    #[test]
    fn test_count_users() {
        let jobs = vec![job("3", "alice"), job("2", "bob"), job("1", "alice")];
        assert_eq!(count_users(&jobs), 2);
    }
}
