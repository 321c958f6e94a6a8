use chrono::{
    DateTime, Days, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scheduled meeting as reported by the directory. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingJob {
    pub id: String,
    pub user_id: String,
    pub join_link: String,
    pub scheduled_start: ScheduledStart,
    pub duration_minutes: u32,
}

/// When a meeting starts. The directory may send a full timestamp or only a
/// time of day, which is re-anchored to the local calendar on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledStart {
    At(DateTime<Utc>),
    TimeOfDay(NaiveTime),
}

impl ScheduledStart {
    /// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]` (local time) and `HH:MM[:SS]`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::At(at.with_timezone(&Utc)));
        }

        for format in [
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M",
        ] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return local_instant(naive).map(|at| Self::At(at.with_timezone(&Utc)));
            }
        }

        for format in ["%H:%M:%S", "%H:%M"] {
            if let Ok(time) = NaiveTime::parse_from_str(raw, format) {
                return Some(Self::TimeOfDay(time));
            }
        }

        None
    }

    /// Concrete start instant relative to `now`.
    ///
    /// A time of day resolves to whichever occurrence (yesterday, today or
    /// tomorrow) lies closest to `now`, so a 23:59 start is still "two
    /// minutes ago" at 00:01.
    pub fn resolve(&self, now: DateTime<Local>) -> DateTime<Local> {
        match self {
            Self::At(at) => at.with_timezone(&Local),
            Self::TimeOfDay(time) => {
                let today = now.date_naive();
                [
                    today.checked_sub_days(Days::new(1)),
                    Some(today),
                    today.checked_add_days(Days::new(1)),
                ]
                .into_iter()
                .flatten()
                .filter_map(|day| at_local(day, *time))
                .min_by_key(|candidate| (*candidate - now).num_seconds().abs())
                .unwrap_or(now)
            }
        }
    }
}

impl fmt::Display for ScheduledStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(at) => write!(
                f,
                "{}",
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            Self::TimeOfDay(time) => write!(f, "{} (daily)", time.format("%H:%M:%S")),
        }
    }
}

fn at_local(day: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    local_instant(day.and_time(time))
}

fn local_instant(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

/// Wire shape of one directory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "startTime", default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub duration: Option<DurationField>,
}

/// The meeting API stores duration as free text, so both forms are accepted.
/// Anything else is kept so the record can be rejected on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationField {
    Minutes(i64),
    Text(String),
    Other(serde_json::Value),
}

impl MeetingRecord {
    /// Turn a wire record into a job, or explain why it is unusable.
    pub fn into_job(self, default_duration_minutes: u32) -> Result<MeetingJob, String> {
        let user_id = self
            .user_id
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| "missing userId".to_string())?;

        let start_raw = self
            .start_time
            .ok_or_else(|| "missing startTime".to_string())?;
        let scheduled_start = ScheduledStart::parse(&start_raw)
            .ok_or_else(|| format!("unparseable startTime {start_raw:?}"))?;

        let duration_minutes = match self.duration {
            None => default_duration_minutes,
            Some(DurationField::Minutes(minutes)) => positive_minutes(minutes)?,
            Some(DurationField::Text(text)) if text.trim().is_empty() => default_duration_minutes,
            Some(DurationField::Text(text)) => {
                let minutes = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| format!("non-numeric duration {text:?}"))?;
                positive_minutes(minutes)?
            }
            Some(DurationField::Other(value)) => {
                return Err(format!("unsupported duration {value}"));
            }
        };

        Ok(MeetingJob {
            id: self.id,
            user_id,
            join_link: self.link.unwrap_or_default(),
            scheduled_start,
            duration_minutes,
        })
    }
}

fn positive_minutes(minutes: i64) -> Result<u32, String> {
    u32::try_from(minutes)
        .ok()
        .filter(|m| *m >= 1)
        .ok_or_else(|| format!("duration must be at least one minute, got {minutes}"))
}
