//! Checkin feed source. The RSS transport is behind a trait so the poll job
//! can be driven by scripted feeds in tests.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A raw checkin post exactly as stored in the post objects. Parsing into a
/// structured record happens later, in the batch parse pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    pub id: u64,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published: String,
}

#[async_trait]
pub trait CheckinFeed: Send + Sync {
    /// Current window of posts for one brewery feed, newest first. Windows
    /// overlap between polls; dedup is the caller's job.
    async fn fetch(&self, brewery: &str) -> Result<Vec<RawPost>>;
}

pub struct RssCheckinFeed {
    client: reqwest::Client,
    base_url: String,
}

impl RssCheckinFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build feed HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CheckinFeed for RssCheckinFeed {
    async fn fetch(&self, brewery: &str) -> Result<Vec<RawPost>> {
        let url = format!("{}/{brewery}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "taplog/0.1")
            .send()
            .await
            .context("Feed fetch failed")?;
        let bytes = resp.bytes().await.context("Failed to read feed body")?;
        let feed = feed_rs::parser::parse(&bytes[..]).context("Failed to parse RSS feed")?;

        let posts: Vec<RawPost> = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                // Post id is the trailing segment of the entry id, e.g.
                // `https://untappd.com/user/alice/checkin/756802330`
                let id = match entry.id.rsplit('/').next().and_then(|s| s.parse().ok()) {
                    Some(id) => id,
                    None => {
                        warn!(entry_id = entry.id.as_str(), "unparsable post id, skipping entry");
                        return None;
                    }
                };
                let link = entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_else(|| entry.id.clone());
                Some(RawPost {
                    id,
                    title: entry.title.map(|t| t.content).unwrap_or_default(),
                    summary: entry.summary.map(|t| t.content).unwrap_or_default(),
                    link,
                    published: entry
                        .published
                        .map(|d| d.to_rfc3339())
                        .unwrap_or_default(),
                })
            })
            .collect();

        info!(brewery, posts = posts.len(), "feed fetched");
        Ok(posts)
    }
}
