use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use taplog_common::Config;
use taplog_ingest::feed::RssCheckinFeed;
use taplog_ingest::parse::ParseJob;
use taplog_ingest::poll::PollJob;
use taplog_ingest::post::PostParser;
use taplog_store::S3ObjectStore;

#[derive(Parser)]
#[command(name = "taplog-ingest", about = "Checkin feed ingestion jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the checkin feeds and store new posts
    Poll,
    /// Parse stored posts into the aggregate log and venue list
    Parse,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("taplog=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::ingest_from_env();
    let store = Arc::new(S3ObjectStore::new(&config.bucket).await);

    match cli.command {
        Command::Poll => {
            let feed = Arc::new(RssCheckinFeed::new(
                &config.feed_base_url,
                config.request_timeout,
            ));
            let stats = PollJob::new(store, feed, config.breweries).run().await?;
            info!("{stats}");
        }
        Command::Parse => {
            let job = ParseJob::new(store, PostParser::default(), config.breweries);
            let stats = job.run().await?;
            info!("{stats}");
        }
    }

    Ok(())
}
