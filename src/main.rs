use anyhow::Result;
use clap::Parser;
use meetbot::{
    app,
    cli::{handle_config_command, handle_meetings_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Some(CliCommand::Version) => {
            println!("meetbot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Config) => handle_config_command(config_path),
        Some(CliCommand::Meetings(args)) => handle_meetings_command(args, config_path).await,
        Some(CliCommand::Run) | None => app::run_service(config_path).await,
    }
}
