use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// Passed into the engines at construction so tests can substitute doubles
/// for credentials and source endpoints.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target bucket for posts, cursors, and the venue registry.
    pub bucket: String,
    /// Brewery ids whose checkin feeds are ingested.
    pub breweries: Vec<String>,

    // Lookup API credentials
    pub foursquare_client_id: String,
    pub foursquare_client_secret: String,

    // Source endpoints, overridable for tests
    pub feed_base_url: String,
    pub untappd_base_url: String,
    pub lookup_base_url: String,

    // Rate discipline and time budget
    pub scrape_pause: Duration,
    pub lookup_pause: Duration,
    pub request_timeout: Duration,
    /// Safely below the 15-minute host execution ceiling.
    pub checkpoint_interval: Duration,
}

impl Config {
    /// Config for the feed poll and batch parse jobs. No lookup credentials
    /// needed.
    pub fn ingest_from_env() -> Self {
        Self {
            bucket: required_env("TAPLOG_BUCKET"),
            breweries: required_env("TAPLOG_BREWERIES")
                .split(',')
                .map(str::to_string)
                .collect(),
            foursquare_client_id: String::new(),
            foursquare_client_secret: String::new(),
            feed_base_url: env_or("TAPLOG_FEED_BASE_URL", "https://untappd.com/rss/brewery"),
            untappd_base_url: env_or("TAPLOG_UNTAPPD_BASE_URL", "https://untappd.com"),
            lookup_base_url: String::new(),
            scrape_pause: Duration::from_millis(4000),
            lookup_pause: Duration::from_millis(750),
            request_timeout: Duration::from_secs(30),
            checkpoint_interval: checkpoint_interval_from_env(),
        }
    }

    /// Config for the enrichment and backfill jobs.
    pub fn enrich_from_env() -> Self {
        Self {
            bucket: required_env("TAPLOG_BUCKET"),
            breweries: Vec::new(),
            foursquare_client_id: required_env("FOURSQUARE_CLIENT_ID"),
            foursquare_client_secret: required_env("FOURSQUARE_CLIENT_SECRET"),
            feed_base_url: String::new(),
            untappd_base_url: env_or("TAPLOG_UNTAPPD_BASE_URL", "https://untappd.com"),
            lookup_base_url: env_or("TAPLOG_LOOKUP_BASE_URL", "https://api.foursquare.com/v2"),
            scrape_pause: Duration::from_millis(4000),
            lookup_pause: Duration::from_millis(750),
            request_timeout: Duration::from_secs(30),
            checkpoint_interval: checkpoint_interval_from_env(),
        }
    }
}

fn checkpoint_interval_from_env() -> Duration {
    // 14m45s default, ~98% of the 15-minute ceiling
    let secs = env::var("TAPLOG_CHECKPOINT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(885);
    Duration::from_secs(secs)
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
