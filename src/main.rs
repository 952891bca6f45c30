#![cfg(not(tarpaulin_include))]

use bidsheet::app;
use bidsheet::config::Config;
use std::env;
use std::path::PathBuf;

/// Entry point of the worksheet server.
///
/// Reads an optional JSON config file from the first argument, applies
/// `BIDSHEET_*` environment overrides and serves the JSON API.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    log::info!(
        "Starting worksheet server, data in {}",
        config.data_dir.display()
    );
    app::run(config).await
}
