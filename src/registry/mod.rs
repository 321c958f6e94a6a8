//! In-memory table of active bot instances.
//!
//! The lifecycle loop is the only writer. Uniqueness per meeting and per user
//! is checked on every insert; entries leave the table in the same step that
//! terminates or observes the exit of their worker.

use crate::error::OrchestratorError;
use crate::worker::WorkerHandle;
use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Expired,
    Crashed,
    Exited,
    Shutdown,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Crashed => "crashed",
            Self::Exited => "exited",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum BotState {
    Starting,
    Running,
    Stopping(StopReason),
    Stopped(StopReason),
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping(_) => "stopping",
            Self::Stopped(_) => "stopped",
        }
    }
}

#[derive(Debug)]
pub struct BotInstance {
    pub meeting_id: String,
    pub user_id: String,
    /// Numeric meeting number the worker was told to join.
    pub meeting_number: String,
    pub handle: WorkerHandle,
    pub started_at: DateTime<Local>,
    /// Copied from the job at spawn time and never re-read.
    pub duration_minutes: u32,
    pub state: BotState,
}

impl BotInstance {
    pub fn running(
        meeting_id: impl Into<String>,
        user_id: impl Into<String>,
        meeting_number: impl Into<String>,
        handle: WorkerHandle,
        started_at: DateTime<Local>,
        duration_minutes: u32,
    ) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            user_id: user_id.into(),
            meeting_number: meeting_number.into(),
            handle,
            started_at,
            duration_minutes,
            state: BotState::Running,
        }
    }

    pub fn elapsed(&self, now: DateTime<Local>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        (self.allotted() - self.elapsed(now)).max(Duration::zero())
    }

    pub fn allotted(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }

    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.elapsed(now) >= self.allotted()
    }
}

#[derive(Debug, Default)]
pub struct BotRegistry {
    bots: BTreeMap<String, BotInstance>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly spawned bot. Fails without modifying the table if the
    /// meeting or the user already has a bot.
    pub fn insert(&mut self, instance: BotInstance) -> Result<(), OrchestratorError> {
        self.ensure_vacant(&instance.meeting_id, &instance.user_id)?;
        self.bots.insert(instance.meeting_id.clone(), instance);
        Ok(())
    }

    /// Whether a bot for this meeting and user could be inserted right now.
    pub fn ensure_vacant(&self, meeting_id: &str, user_id: &str) -> Result<(), OrchestratorError> {
        if self.contains_meeting(meeting_id) {
            return Err(OrchestratorError::DuplicateMeeting(meeting_id.to_string()));
        }
        if self.has_user(user_id) {
            return Err(OrchestratorError::DuplicateUser(user_id.to_string()));
        }
        Ok(())
    }

    pub fn remove(&mut self, meeting_id: &str) -> Option<BotInstance> {
        self.bots.remove(meeting_id)
    }

    pub fn get(&self, meeting_id: &str) -> Option<&BotInstance> {
        self.bots.get(meeting_id)
    }

    pub fn get_mut(&mut self, meeting_id: &str) -> Option<&mut BotInstance> {
        self.bots.get_mut(meeting_id)
    }

    pub fn contains_meeting(&self, meeting_id: &str) -> bool {
        self.bots.contains_key(meeting_id)
    }

    pub fn has_user(&self, user_id: &str) -> bool {
        self.bots.values().any(|bot| bot.user_id == user_id)
    }

    pub fn meeting_ids(&self) -> Vec<String> {
        self.bots.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BotInstance> {
        self.bots.values()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Take every entry out, leaving the table empty.
    pub fn drain(&mut self) -> Vec<BotInstance> {
        std::mem::take(&mut self.bots).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::FakeProcess;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).single().unwrap()
    }

    fn bot(meeting_id: &str, user_id: &str) -> BotInstance {
        let (process, _probe) = FakeProcess::running();
        BotInstance::running(
            meeting_id,
            user_id,
            "123",
            WorkerHandle::new(meeting_id, Box::new(process)),
            now(),
            30,
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = BotRegistry::new();
        registry.insert(bot("m1", "u1")).unwrap();
        registry.insert(bot("m2", "u2")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains_meeting("m1"));
        assert!(registry.has_user("u2"));
        assert!(!registry.has_user("u3"));
        assert_eq!(registry.get("m1").unwrap().user_id, "u1");
        assert_eq!(registry.meeting_ids(), vec!["m1".to_string(), "m2".to_string()]);
    }

    #[test]
    fn test_duplicate_meeting_rejected() {
        let mut registry = BotRegistry::new();
        registry.insert(bot("m1", "u1")).unwrap();

        let err = registry.insert(bot("m1", "u2")).unwrap_err();
        assert_eq!(err, OrchestratorError::DuplicateMeeting("m1".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("m1").unwrap().user_id, "u1");
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let mut registry = BotRegistry::new();
        registry.insert(bot("m1", "u1")).unwrap();

        let err = registry.insert(bot("m2", "u1")).unwrap_err();
        assert_eq!(err, OrchestratorError::DuplicateUser("u1".to_string()));
        assert!(!registry.contains_meeting("m2"));
    }

    #[test]
    fn test_remove_and_drain() {
        let mut registry = BotRegistry::new();
        registry.insert(bot("m1", "u1")).unwrap();
        registry.insert(bot("m2", "u2")).unwrap();

        assert!(registry.remove("m1").is_some());
        assert!(registry.remove("m1").is_none());
        assert!(!registry.has_user("u1"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_elapsed_and_expiry() {
        let instance = bot("m1", "u1");

        let at_29 = now() + Duration::minutes(29);
        assert!(!instance.is_expired(at_29));
        assert_eq!(instance.remaining(at_29), Duration::minutes(1));

        let at_30 = now() + Duration::minutes(30);
        assert!(instance.is_expired(at_30));

        let at_31 = now() + Duration::minutes(31);
        assert!(instance.is_expired(at_31));
        assert_eq!(instance.remaining(at_31), Duration::zero());
        assert_eq!(instance.elapsed(now() - Duration::minutes(1)), Duration::zero());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(BotState::Running.as_str(), "running");
        assert_eq!(BotState::Stopping(StopReason::Expired).as_str(), "stopping");
        assert_eq!(StopReason::Crashed.as_str(), "crashed");
    }
}
