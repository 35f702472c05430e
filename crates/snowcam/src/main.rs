mod commands;
mod config;
mod discord;
mod instant;
mod schedule;
mod subscribers;
mod timeparse;
mod version;
mod weather;
mod webcam;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use crate::{
    config::{open_config, write_default_config},
    subscribers::SubscriberStore,
    version::{build_info, short_version},
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Write a default configuration to `--config` and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(build = build_info(), "Starting snowcam");

    let config = open_config(&args.config).context("Failed to load configuration")?;
    info!(
        resort = %config.resort.name,
        timezone = %config.resort.timezone,
        feed = %config.webcam.feed_id,
        slots = config.schedule.len(),
        "Configuration loaded"
    );

    let mut store = SubscriberStore::load(&config.subscribers.path);
    store
        .merge(&config.subscribers.seed)
        .context("Failed to seed subscribers")?;
    info!(subscribers = store.len(), path = ?config.subscribers.path, "Subscribers loaded");

    discord::run(config, store).await
}
