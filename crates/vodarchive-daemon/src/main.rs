//! The VOD archiver binary: CLI bootstrap, configuration, logging, and wiring for the
//! Job Pipeline (Dispatcher + Lease Keeper + Progress Throttle + Failure Policy) and
//! the Ingestor. Business logic lives in `vodarchive-pipeline`, `vodarchive-workers`,
//! and `vodarchive-store`; this crate only assembles them.

mod cli;
mod config;
mod ingestor;
mod logging;
mod metadata;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vodarchive_pipeline::Dispatcher;
use vodarchive_store::JobStore;

use crate::cli::{Cli, Command};
use crate::config::DaemonConfig;
use crate::ingestor::{Ingestor, NullVodSource};
use crate::metadata::StoreMetadataProvider;

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    let config = DaemonConfig::from_env();
    logging::init(config.log_json);

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Status => status(config).await,
        Command::Retry { vod_id, reset_fail_count } => retry(config, vod_id, reset_fail_count).await,
    };

    if let Err(err) = result {
        error!(error = %err, "vodarchive exited with an error");
        std::process::exit(1);
    }
}

/// Run the Dispatcher and Ingestor loops until a shutdown signal arrives (§5).
async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!(database_url = %config.database_url, base_dir = %config.base_dir, "starting vodarchive");

    let store = JobStore::connect(&config.database_url).await?;
    let metadata = Arc::new(StoreMetadataProvider::new(store.clone()));
    let cancel = CancellationToken::new();

    let dispatcher = Dispatcher::new(
        store.clone(),
        metadata,
        config.base_dir.clone(),
        config.upload_oauth_token.clone(),
        config.dispatcher_holder.clone(),
        cancel.clone(),
    );

    let ingestor = Ingestor::new(NullVodSource, store, config.ingest_interval);

    let shutdown_cancel = cancel.clone();
    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_cancel.cancel();
    });

    let dispatcher_handle = tokio::spawn(async move { dispatcher.run().await });
    let ingestor_cancel = cancel.clone();
    let ingestor_handle = tokio::spawn(async move { ingestor.run(ingestor_cancel).await });

    let _ = tokio::join!(dispatcher_handle, ingestor_handle);
    shutdown_handle.abort();

    info!("vodarchive shutdown complete");
    Ok(())
}

/// `vodarchive status`: list every job row and its current position (§6 Operator surface).
async fn status(config: DaemonConfig) -> anyhow::Result<()> {
    let store = JobStore::connect(&config.database_url).await?;
    let jobs = store.list_all().await?;

    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }

    println!("{:<24} {:<24} {:>5} {:>5} description", "vod_id", "stage", "failed", "count");
    for job in jobs {
        println!(
            "{:<24} {:<24} {:>5} {:>5} {}",
            job.vod_id.as_str(),
            job.stage.as_str(),
            job.failed,
            job.fail_count,
            job.description
        );
    }

    let stale = store.stale_leases(chrono::Utc::now()).await?;
    if !stale.is_empty() {
        println!("\nstale leases (> {:?}):", vodarchive_store::LEASE_STALE_THRESHOLD);
        for job in stale {
            println!("  {} leased_by={} leased_at={}", job.vod_id, job.leased_by, job.leased_at_utc);
        }
    }

    Ok(())
}

/// `vodarchive retry <vod-id>`: clear `Failed` (and optionally `FailCount`) on a
/// permanently-failed job so the Dispatcher selects it again (§6 Operator surface).
async fn retry(config: DaemonConfig, vod_id: String, reset_fail_count: bool) -> anyhow::Result<()> {
    let store = JobStore::connect(&config.database_url).await?;
    let vod_id = vodarchive_models::VodId::new(vod_id);

    let job = store
        .get(&vod_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no job with vod_id '{vod_id}'"))?;

    let reset = job.reset_failure(reset_fail_count);
    store.save(&reset).await?;

    println!("reset failure state for {vod_id}, stage now {:?}", reset.stage);
    Ok(())
}
