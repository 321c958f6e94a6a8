//! HTTP client for the meeting API's orchestrator endpoint.

use super::job::{MeetingJob, MeetingRecord};
use super::MeetingDirectory;
use crate::config::DirectoryConfig;
use crate::error::OrchestratorError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MEETINGS_PATH: &str = "/api/orchestrator/meetings";

/// The API wraps the list as `{"meetings": [...]}`; a bare array is accepted too.
/// Records stay untyped here so one bad record cannot sink the whole list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MeetingsResponse {
    Envelope { meetings: Vec<Value> },
    Bare(Vec<Value>),
}

impl MeetingsResponse {
    fn into_records(self) -> Vec<Value> {
        match self {
            Self::Envelope { meetings } => meetings,
            Self::Bare(meetings) => meetings,
        }
    }
}

pub struct HttpMeetingDirectory {
    client: reqwest::Client,
    url: String,
    api_key: String,
    default_duration_minutes: u32,
}

impl HttpMeetingDirectory {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        default_duration_minutes: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), MEETINGS_PATH),
            api_key: api_key.to_string(),
            default_duration_minutes,
        })
    }

    pub fn from_config(config: &DirectoryConfig, default_duration_minutes: u32) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .context("directory.api_key is not configured")?;
        Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.request_timeout_seconds),
            default_duration_minutes,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn parse_body(&self, body: &str) -> Result<Vec<MeetingJob>, OrchestratorError> {
        let response: MeetingsResponse = serde_json::from_str(body).map_err(|e| {
            OrchestratorError::DirectoryUnavailable(format!("malformed meetings payload: {e}"))
        })?;

        let mut jobs = Vec::new();
        for raw in response.into_records() {
            let id = match raw.get("id") {
                Some(Value::String(id)) => id.clone(),
                Some(other) => other.to_string(),
                None => "<no id>".to_string(),
            };
            let record = match serde_json::from_value::<MeetingRecord>(raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping meeting {}: {}", id, e);
                    continue;
                }
            };
            match record.into_job(self.default_duration_minutes) {
                Ok(job) => jobs.push(job),
                Err(reason) => warn!("Skipping meeting {}: {}", id, reason),
            }
        }
        Ok(jobs)
    }
}

#[async_trait]
impl MeetingDirectory for HttpMeetingDirectory {
    async fn fetch_all(&self) -> Result<Vec<MeetingJob>, OrchestratorError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| OrchestratorError::DirectoryUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            OrchestratorError::DirectoryUnavailable(format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(OrchestratorError::DirectoryUnavailable(format!(
                "meetings API returned {status}"
            )));
        }

        let jobs = self.parse_body(&body)?;
        debug!("Fetched {} meetings from {}", jobs.len(), self.url);
        Ok(jobs)
    }
}
