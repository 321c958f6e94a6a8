//! `meetbot config`: show the effective configuration.

use crate::app::api_key_source;
use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;

pub fn handle_config_command(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };
    let config = Config::load(Some(&path))?;

    print!("{}", render(&config, &path)?);

    if let Err(e) = config.validate() {
        println!();
        println!("Warning: {:#}", e);
    }
    Ok(())
}

fn render(config: &Config, path: &Path) -> Result<String> {
    let body = toml::to_string_pretty(&config.redacted()).context("Failed to serialize config")?;
    Ok(format!(
        "# {}\n# API key source: {}\n\n{}",
        path.display(),
        api_key_source(config),
        body
    ))
}
