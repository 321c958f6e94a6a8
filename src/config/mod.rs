use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variables that override values from the config file.
pub mod config_env {
    pub const API_BASE_URL: &str = "API_BASE_URL";
    pub const API_KEY: &str = "USER_MEETINGS_API_KEY";
    pub const TICK_INTERVAL_SECS: &str = "MEETBOT_TICK_INTERVAL_SECS";
    pub const WORKER_BACKEND: &str = "MEETBOT_WORKER_BACKEND";
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub directory: DirectoryConfig,
    pub schedule: ScheduleConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL of the meeting API; meetings are read from
    /// `{base_url}/api/orchestrator/meetings`.
    pub base_url: String,
    /// Bearer credential for the orchestrator endpoint.
    pub api_key: Option<String>,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_interval_seconds: u64,
    /// How long before the scheduled start a bot may join.
    pub join_early_seconds: u64,
    /// How long after the scheduled start a bot may still join.
    pub join_late_seconds: u64,
    /// Used when the directory reports no duration for a meeting.
    pub default_duration_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerBackendKind {
    Process,
    Container,
}

impl WorkerBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Container => "container",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "process" => Some(Self::Process),
            "container" | "docker" => Some(Self::Container),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub backend: WorkerBackendKind,
    /// Worker executable for the process backend.
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub spawn_grace_seconds: u64,
    pub termination_timeout_seconds: u64,
    /// Variables copied from the orchestrator's environment into every worker.
    pub passthrough_env: Vec<String>,
    /// Image for the container backend.
    pub image: String,
    pub docker_binary: String,
    pub cpus: Option<String>,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: None,
            request_timeout_seconds: 10,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 30,
            join_early_seconds: 120,
            join_late_seconds: 300,
            default_duration_minutes: 60,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend: WorkerBackendKind::Process,
            program: "meeting-bot".to_string(),
            args: Vec::new(),
            working_dir: None,
            spawn_grace_seconds: 2,
            termination_timeout_seconds: 10,
            passthrough_env: vec![
                "ZOOM_APP_CLIENT_ID".to_string(),
                "ZOOM_APP_CLIENT_SECRET".to_string(),
                "ZOOM_JWT_TOKEN".to_string(),
                "DEEPGRAM_API_KEY".to_string(),
                config_env::API_KEY.to_string(),
            ],
            image: "meeting-bot:latest".to_string(),
            docker_binary: "docker".to_string(),
            cpus: Some("0.5".to_string()),
            memory: Some("512m".to_string()),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:3838".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

impl WorkerConfig {
    pub fn spawn_grace(&self) -> Duration {
        Duration::from_secs(self.spawn_grace_seconds)
    }

    pub fn termination_timeout(&self) -> Duration {
        Duration::from_secs(self.termination_timeout_seconds)
    }
}

impl Config {
    /// Load from `path_override` or the default location, then apply
    /// environment overrides.
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let path = match path_override {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Read a config file, creating one with defaults on first run.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config = if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            config
        } else {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        };
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        global::config_file()
    }

    /// Environment lookup is injected so tests never touch the process env.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(config_env::API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.directory.base_url = url;
        }
        if let Some(key) = lookup(config_env::API_KEY).filter(|v| !v.trim().is_empty()) {
            self.directory.api_key = Some(key);
        }
        if let Some(raw) = lookup(config_env::TICK_INTERVAL_SECS) {
            self.schedule.tick_interval_seconds = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer", config_env::TICK_INTERVAL_SECS))?;
        }
        if let Some(raw) = lookup(config_env::WORKER_BACKEND) {
            self.worker.backend = WorkerBackendKind::parse(&raw).with_context(|| {
                format!(
                    "{} must be 'process' or 'container', got {raw:?}",
                    config_env::WORKER_BACKEND
                )
            })?;
        }
        Ok(())
    }

    /// Checked once at startup; everything downstream assumes a valid config.
    pub fn validate(&self) -> Result<()> {
        if self
            .directory
            .api_key
            .as_deref()
            .map_or(true, |k| k.trim().is_empty())
        {
            bail!(
                "directory.api_key is required (or set {})",
                config_env::API_KEY
            );
        }
        url::Url::parse(&self.directory.base_url).with_context(|| {
            format!("directory.base_url is not a URL: {}", self.directory.base_url)
        })?;
        if self.directory.request_timeout_seconds == 0 {
            bail!("directory.request_timeout_seconds must be greater than zero");
        }
        if self.schedule.tick_interval_seconds == 0 {
            bail!("schedule.tick_interval_seconds must be greater than zero");
        }
        if self.schedule.default_duration_minutes == 0 {
            bail!("schedule.default_duration_minutes must be at least 1");
        }
        // A day-long window overlaps the neighbouring time-of-day occurrence.
        if self
            .schedule
            .join_early_seconds
            .saturating_add(self.schedule.join_late_seconds)
            >= 86_400
        {
            bail!("schedule join window must be shorter than a day");
        }
        if self.worker.termination_timeout_seconds == 0 {
            bail!("worker.termination_timeout_seconds must be greater than zero");
        }
        match self.worker.backend {
            WorkerBackendKind::Process if self.worker.program.trim().is_empty() => {
                bail!("worker.program is required for the process backend")
            }
            WorkerBackendKind::Container if self.worker.image.trim().is_empty() => {
                bail!("worker.image is required for the container backend")
            }
            _ => {}
        }
        if self.api.enabled {
            self.api
                .bind
                .parse::<std::net::SocketAddr>()
                .with_context(|| format!("api.bind is not a socket address: {}", self.api.bind))?;
        }
        Ok(())
    }

    /// Copy safe for printing: the API key is reduced to its first characters.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.directory.api_key = copy.directory.api_key.as_deref().map(mask_secret);
        copy
    }
}

fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}...")
}
