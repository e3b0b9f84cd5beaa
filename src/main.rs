use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod bot;
mod config;
mod error;
mod playback;
mod sources;
mod ui;
mod voice;

use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::playback::PlaybackScheduler;
use crate::sources::{CookieStore, StreamResolver, YtDlpExtractor};
use crate::voice::{ConnectTuning, ConnectionManager, SongbirdGateway};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cookie jar is optional; a missing file just means unauthenticated
    // extraction.
    let cookies = Arc::new(CookieStore::new(config.cookie_file.clone()));
    if let Err(e) = cookies.load().await {
        info!("Continuing without cookies: {}", e);
    }

    let extractor = Arc::new(YtDlpExtractor::new(cookies.clone()));
    let resolver = Arc::new(StreamResolver::new(extractor, cookies.clone()));

    // One songbird instance shared between serenity's gateway hooks and the
    // engine's connection manager.
    let songbird = Songbird::serenity();
    let gateway = Arc::new(SongbirdGateway::new(songbird.clone())?);
    let connections = Arc::new(ConnectionManager::new(
        gateway,
        ConnectTuning::from_config(&config),
    ));

    let (scheduler, notices) = PlaybackScheduler::spawn(connections, resolver, &config);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES;

    let handler = JukeboxBot::new(config.clone(), scheduler, cookies, notices);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to register Ctrl+C handler");
        info!("⚠️ Shutdown signal received, exiting...");
        std::process::exit(0);
    });

    info!("🚀 Bot started successfully");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Verify the external extractor is runnable (used by container probes).
async fn health_check() -> Result<()> {
    let yt_dlp = tokio::process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp is not runnable");
    }
}
