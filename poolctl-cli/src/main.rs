mod cli;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use poolctl_engine::{
    DiscordNotifier, HlsDownloaderFactory, HttpPlaylistFetcher, LogNotifier, MistApi, Notifier,
    PicartoDirectory, PoolController, StreamPool, build_client,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.pool_config();
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    let client = build_client(&config.http).context("Failed to build HTTP client")?;
    let playlists = Arc::new(HttpPlaylistFetcher::new(client.clone()));
    let directory = Arc::new(
        PicartoDirectory::new(client.clone(), &args.directory_url)
            .context("Invalid directory URL")?,
    );
    let transcoder = Arc::new(
        MistApi::new(client.clone(), args.mist_config()).context("Invalid transcoder host")?,
    );
    let downloaders = Arc::new(HlsDownloaderFactory::new(playlists.clone(), client.clone()));
    let notifier: Arc<dyn Notifier> = match args.discord_config() {
        Some(discord) => Arc::new(DiscordNotifier::new(client, discord)),
        None => Arc::new(LogNotifier),
    };

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(token.clone()));

    info!(
        host = %config.host,
        target = config.target_size,
        profiles = config.profiles,
        "Starting stream pool"
    );
    let pool = StreamPool::new(
        config.clone(),
        playlists,
        directory,
        downloaders,
        notifier.clone(),
        token.clone(),
    );
    let controller = PoolController::new(
        pool,
        transcoder,
        notifier,
        config.timing,
        config.debug_segments,
        token,
    );
    controller
        .run()
        .await
        .context("Unable to start any stream")?;

    info!("Stream pool stopped");
    Ok(())
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Received Ctrl-C, shutting down");
    token.cancel();
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("poolctl=info,poolctl_engine=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(verbose))
        .init();
}
