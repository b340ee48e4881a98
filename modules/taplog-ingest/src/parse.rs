//! Batch parse job: read path of the incremental ingestion.
//!
//! Pages through unparsed post objects per brewery (storage-native key
//! order, ≤1000 per page), parses each into a `PostRecord`, appends the
//! rows to the aggregate log and any newly seen venues to the venue list,
//! and only then persists the advanced parse cursors. Cursor writes after
//! data writes: never advance-then-lose.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use taplog_common::{PostRecord, VenueSeed};
use taplog_store::registry::{append_post_rows, load_venue_list, save_venue_list};
use taplog_store::{keys, ObjectStore, ParseCursors, StoreError};

use crate::feed::RawPost;
use crate::post::PostParser;

/// Page size for the unparsed-object listing; the backing store caps list
/// responses at 1000 keys.
pub const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug, Default)]
pub struct ParseStats {
    pub run_id: String,
    pub posts_parsed: u32,
    pub posts_malformed: u32,
    pub venues_added: u32,
}

impl fmt::Display for ParseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Parse Run Complete ===")?;
        writeln!(f, "Posts parsed:    {}", self.posts_parsed)?;
        writeln!(f, "Posts malformed: {}", self.posts_malformed)?;
        write!(f, "Venues added:    {}", self.venues_added)
    }
}

pub struct ParseJob {
    store: Arc<dyn ObjectStore>,
    parser: PostParser,
    breweries: Vec<String>,
    page_size: usize,
}

impl ParseJob {
    pub fn new(store: Arc<dyn ObjectStore>, parser: PostParser, breweries: Vec<String>) -> Self {
        Self {
            store,
            parser,
            breweries,
            page_size: LIST_PAGE_SIZE,
        }
    }

    /// Smaller list pages, for exercising pagination in tests.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub async fn run(&self) -> Result<ParseStats> {
        let mut stats = ParseStats {
            run_id: Uuid::new_v4().to_string(),
            ..Default::default()
        };
        info!(run_id = stats.run_id.as_str(), "parse run starting");

        let mut cursors = ParseCursors::load(self.store.as_ref()).await?;
        let loaded_cursors = cursors.clone();
        let mut rows: Vec<PostRecord> = Vec::new();

        for brewery in &self.breweries {
            let mut start_after = cursors.start_after(brewery);
            loop {
                let page = self
                    .store
                    .list(&keys::post_prefix(brewery), &start_after, self.page_size)
                    .await?;
                if page.is_empty() {
                    break;
                }
                for key in &page {
                    match self.parse_one(brewery, key, &mut stats).await? {
                        Some(record) => {
                            cursors.set(brewery, record.global_id);
                            rows.push(record);
                        }
                        // Malformed object: skip it but advance past it so
                        // the cursor does not wedge on a bad key
                        None => {
                            if let Some(id) = keys::post_id_from_key(key) {
                                cursors.set(brewery, id);
                            }
                        }
                    }
                }
                start_after = page.last().cloned().unwrap_or_default();
            }
        }

        if rows.is_empty() {
            // A run of nothing but malformed objects still moved the
            // cursors past them; persist that so they are not re-listed
            // every run.
            if cursors != loaded_cursors {
                cursors.save(self.store.as_ref()).await?;
            }
            info!(run_id = stats.run_id.as_str(), "no new posts");
            return Ok(stats);
        }

        self.append_aggregate(&rows).await?;
        stats.venues_added = self.append_venues(&rows).await?;

        // Durable appends above succeeded; only now advance the cursors
        cursors.save(self.store.as_ref()).await?;

        info!(
            run_id = stats.run_id.as_str(),
            parsed = stats.posts_parsed,
            venues = stats.venues_added,
            "parse run complete"
        );
        Ok(stats)
    }

    async fn parse_one(
        &self,
        brewery: &str,
        key: &str,
        stats: &mut ParseStats,
    ) -> Result<Option<PostRecord>> {
        let bytes = match self.store.get(key).await {
            Ok(b) => b,
            Err(StoreError::NotFound(_)) => {
                warn!(key, "listed object vanished, skipping");
                stats.posts_malformed += 1;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let raw: RawPost = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                // Structural failure: one bad payload must not abort the run
                warn!(key, error = %e, "unreadable post payload, skipping");
                stats.posts_malformed += 1;
                return Ok(None);
            }
        };
        stats.posts_parsed += 1;
        Ok(Some(self.parser.parse(brewery, &raw)))
    }

    async fn append_aggregate(&self, rows: &[PostRecord]) -> Result<()> {
        let existing = match self.store.get(keys::AGGREGATE_DATA).await {
            Ok(bytes) => Some(bytes),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        let body = append_post_rows(existing.as_deref(), rows)?;
        self.store
            .put(keys::AGGREGATE_DATA, Bytes::from(body))
            .await?;
        Ok(())
    }

    /// Append venues not seen before, deduplicating against both the stored
    /// list and the current batch. Posts without a venue are ignored.
    async fn append_venues(&self, rows: &[PostRecord]) -> Result<u32> {
        let mut seeds = load_venue_list(self.store.as_ref()).await?;
        let mut known: HashSet<String> = seeds.iter().map(|s| s.name.clone()).collect();

        let mut added = 0;
        for post in rows {
            if post.venue.is_empty() || !known.insert(post.venue.clone()) {
                continue;
            }
            seeds.push(VenueSeed {
                name: post.venue.clone(),
                checkin_url: post.permalink.clone(),
            });
            added += 1;
        }

        if added > 0 {
            save_venue_list(self.store.as_ref(), &seeds).await?;
        }
        Ok(added)
    }
}
