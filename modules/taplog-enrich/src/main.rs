use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taplog_common::Config;
use taplog_enrich::backfill::BackfillJob;
use taplog_enrich::batch::EnrichJob;
use taplog_enrich::engine::{Pacing, ReconcileEngine};
use taplog_enrich::foursquare::FoursquareClient;
use taplog_enrich::untappd::UntappdClient;
use taplog_store::{backup, S3ObjectStore};

#[derive(Parser)]
#[command(name = "taplog-enrich", about = "Venue location enrichment jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile unresolved venues against both sources
    Enrich,
    /// Premium-tier completion pass, then rotate registry backups
    Backfill,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("taplog=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::enrich_from_env();
    let store = S3ObjectStore::new(&config.bucket).await;
    let lookup = FoursquareClient::new(
        &config.lookup_base_url,
        &config.foursquare_client_id,
        &config.foursquare_client_secret,
        config.request_timeout,
    );

    match cli.command {
        Command::Enrich => {
            let site = UntappdClient::new(config.request_timeout);
            let engine = ReconcileEngine::new(
                Box::new(site),
                Box::new(lookup),
                &config.untappd_base_url,
                Pacing::new(config.scrape_pause, config.lookup_pause),
            );
            let job = EnrichJob::new(&store, engine, config.checkpoint_interval);

            let (tx, mut rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing current venue");
                    let _ = tx.send(true);
                }
            });

            let stats = job.run(&mut rx).await?;
            info!("{stats}");
        }
        Command::Backfill => {
            let job = BackfillJob::new(&store, Box::new(lookup), config.lookup_pause);
            let stats = job.run().await?;
            info!("{stats}");

            backup::rotate_backups(&store, Utc::now().date_naive()).await?;
        }
    }

    Ok(())
}
