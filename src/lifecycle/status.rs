//! Status snapshot published once per tick, and the handle that shares it.

use crate::registry::{BotInstance, BotState};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotStatus {
    pub meeting_id: String,
    pub user_id: String,
    pub meeting_number: String,
    #[serde(flatten)]
    pub state: BotState,
    pub pid: Option<u32>,
    pub started_at: DateTime<Local>,
    pub elapsed_minutes: i64,
    pub remaining_minutes: i64,
}

impl BotStatus {
    pub fn from_instance(bot: &BotInstance, now: DateTime<Local>) -> Self {
        Self {
            meeting_id: bot.meeting_id.clone(),
            user_id: bot.user_id.clone(),
            meeting_number: bot.meeting_number.clone(),
            state: bot.state,
            pid: bot.handle.pid(),
            started_at: bot.started_at,
            elapsed_minutes: bot.elapsed(now).num_minutes(),
            remaining_minutes: bot.remaining(now).num_minutes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub generated_at: DateTime<Local>,
    pub tick: u64,
    pub active_bots: usize,
    pub users_monitored: usize,
    pub meetings_listed: usize,
    pub directory_ok: bool,
    pub bots: Vec<BotStatus>,
    pub last_error: Option<String>,
}

impl StatusSummary {
    pub fn bots_for_user<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a BotStatus> {
        self.bots.iter().filter(move |bot| bot.user_id == user_id)
    }

    /// One line per bot, as written to the log after every tick.
    pub fn log_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Active bots: {} | users monitored: {} | meetings listed: {}",
            self.active_bots, self.users_monitored, self.meetings_listed
        )];
        for bot in &self.bots {
            let state = match bot.state {
                BotState::Stopping(reason) | BotState::Stopped(reason) => {
                    format!("{} ({})", bot.state.as_str(), reason.as_str())
                }
                other => other.as_str().to_string(),
            };
            lines.push(format!(
                "  {} (user {}): {} for {}m, {}m remaining",
                bot.meeting_id,
                bot.user_id,
                state,
                bot.elapsed_minutes,
                bot.remaining_minutes
            ));
        }
        lines
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusState {
    /// `None` until the first tick completes.
    pub summary: Option<StatusSummary>,
    pub shutting_down: bool,
}

impl StatusState {
    pub fn is_ready(&self) -> bool {
        self.summary.is_some() && !self.shutting_down
    }
}

/// Thread-safe handle shared between the lifecycle loop and API handlers.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<StatusState>>,
}

impl StatusHandle {
    pub async fn get(&self) -> StatusState {
        self.inner.lock().await.clone()
    }

    pub async fn publish(&self, summary: StatusSummary) {
        self.inner.lock().await.summary = Some(summary);
    }

    pub async fn set_shutting_down(&self) {
        self.inner.lock().await.shutting_down = true;
    }
}
