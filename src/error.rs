//! Typed failure categories for the orchestrator.
//!
//! None of these ever reach a caller synchronously: the lifecycle loop logs
//! them and records them in the tick report so tests can assert on which
//! failure occurred.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("meeting directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("could not extract meeting credentials from {link:?}: {reason}")]
    CredentialExtractionFailed { link: String, reason: String },

    #[error("worker for meeting {meeting_id} failed to start: {reason}")]
    SpawnError { meeting_id: String, reason: String },

    #[error("worker for meeting {meeting_id} exited with code {code}")]
    WorkerCrashed { meeting_id: String, code: i32 },

    #[error("worker for meeting {meeting_id} ignored stop request for {timeout_secs}s and was killed")]
    TerminationTimedOut { meeting_id: String, timeout_secs: u64 },

    #[error("meeting {0} already has an active bot")]
    DuplicateMeeting(String),

    #[error("user {0} already has an active bot")]
    DuplicateUser(String),
}

impl OrchestratorError {
    /// Short stable label used in logs and status output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectoryUnavailable(_) => "directory_unavailable",
            Self::CredentialExtractionFailed { .. } => "credential_extraction_failed",
            Self::SpawnError { .. } => "spawn_error",
            Self::WorkerCrashed { .. } => "worker_crashed",
            Self::TerminationTimedOut { .. } => "termination_timed_out",
            Self::DuplicateMeeting(_) => "duplicate_meeting",
            Self::DuplicateUser(_) => "duplicate_user",
        }
    }
}
