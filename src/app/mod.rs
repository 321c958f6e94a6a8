use crate::admission::AdmissionPolicy;
use crate::api::ApiServer;
use crate::config::{config_env, Config, WorkerBackendKind};
use crate::directory::HttpMeetingDirectory;
use crate::lifecycle::{shutdown_on_signal, Orchestrator};
use crate::worker::{
    ContainerBackend, LaunchSettings, LocalProcessBackend, WorkerBackend, WorkerSupervisor,
};
use anyhow::{Context, Result};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub async fn run_service(config_path: Option<&Path>) -> Result<()> {
    info!("Starting meetbot {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(config_path)?;
    config.validate().context("Invalid configuration")?;

    let mut orchestrator = build_orchestrator(&config)?;
    let cancel = CancellationToken::new();
    shutdown_on_signal(cancel.clone());

    let api_task = if config.api.enabled {
        let server = ApiServer::new(orchestrator.status_handle(), &config.api)?;
        let api_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.start(api_cancel).await {
                error!("Status API failed: {:#}", e);
            }
        }))
    } else {
        info!("Status API disabled");
        None
    };

    info!(
        "Watching {} for meetings (join window -{}s/+{}s, {} workers)",
        config.directory.base_url,
        config.schedule.join_early_seconds,
        config.schedule.join_late_seconds,
        config.worker.backend.as_str()
    );

    orchestrator.run(cancel.clone()).await;

    cancel.cancel();
    if let Some(task) = api_task {
        let _ = task.await;
    }

    info!("meetbot stopped");
    Ok(())
}

pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let directory = HttpMeetingDirectory::from_config(
        &config.directory,
        config.schedule.default_duration_minutes,
    )?;
    let supervisor = WorkerSupervisor::new(
        build_backend(config),
        config.worker.spawn_grace(),
        config.worker.termination_timeout(),
    );
    let launch = LaunchSettings::capture(
        &config.directory.base_url,
        &config.worker.passthrough_env,
        |name| std::env::var(name).ok(),
    );
    info!(
        "Passing {} of {} configured variables through to workers",
        launch.passthrough.len(),
        config.worker.passthrough_env.len()
    );

    Ok(Orchestrator::new(
        Box::new(directory),
        supervisor,
        AdmissionPolicy::from_config(&config.schedule),
        launch,
        config.schedule.tick_interval(),
    ))
}

pub fn build_backend(config: &Config) -> Box<dyn WorkerBackend> {
    match config.worker.backend {
        WorkerBackendKind::Process => Box::new(LocalProcessBackend::from_config(&config.worker)),
        WorkerBackendKind::Container => Box::new(ContainerBackend::from_config(&config.worker)),
    }
}

/// Where the directory API key comes from, as shown by `meetbot config`.
pub fn api_key_source(config: &Config) -> &'static str {
    if std::env::var(config_env::API_KEY).is_ok() {
        "environment"
    } else if config.directory.api_key.is_some() {
        "config file"
    } else {
        "missing"
    }
}
