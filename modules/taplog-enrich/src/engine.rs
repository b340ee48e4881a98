//! Source reconciliation for a single venue: scrape-derived source first,
//! then the lookup API, merging outcomes monotonically into the record.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{debug, info, warn};

use taplog_common::{CountryMatch, FieldState, VenueRecord, VenueSeed};

use crate::foursquare::{self, SearchOutcome, VenueLookup};
use crate::untappd::{self, CheckinSite, PageFetch};

/// Mandatory pauses between upstream requests. Both sources rate-limit by
/// IP; sequential paced requests are the only limiter.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub scrape_pause: Duration,
    pub scrape_jitter: Duration,
    pub lookup_pause: Duration,
}

impl Pacing {
    pub fn new(scrape_pause: Duration, lookup_pause: Duration) -> Self {
        Self {
            scrape_pause,
            scrape_jitter: scrape_pause / 4,
            lookup_pause,
        }
    }

    /// No sleeping in tests.
    pub fn none() -> Self {
        Self {
            scrape_pause: Duration::ZERO,
            scrape_jitter: Duration::ZERO,
            lookup_pause: Duration::ZERO,
        }
    }

    async fn pause_scrape(&self) {
        let jitter_ms = self.scrape_jitter.as_millis() as i64;
        let base_ms = self.scrape_pause.as_millis() as i64;
        let ms = if jitter_ms > 0 {
            base_ms + rand::rng().random_range(-jitter_ms..=jitter_ms)
        } else {
            base_ms
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        }
    }

    async fn pause_lookup(&self) {
        if !self.lookup_pause.is_zero() {
            tokio::time::sleep(self.lookup_pause).await;
        }
    }
}

/// How a venue attempt ended, as seen by the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Settled or deferred; move on to the next venue.
    Done { changed: bool },
    /// Scrape source failed transiently. Without permalinks no venue can
    /// make progress, so the whole run stops here.
    ScrapeTripped,
    /// Lookup API failed transiently, assumed to be a rate limit or outage
    /// hitting every later call equally. The run stops here.
    LookupTripped,
}

pub struct ReconcileEngine {
    site: Box<dyn CheckinSite>,
    lookup: Box<dyn VenueLookup>,
    site_base: String,
    pacing: Pacing,
}

impl ReconcileEngine {
    pub fn new(
        site: Box<dyn CheckinSite>,
        lookup: Box<dyn VenueLookup>,
        site_base: &str,
        pacing: Pacing,
    ) -> Self {
        Self {
            site,
            lookup,
            site_base: site_base.to_string(),
            pacing,
        }
    }

    /// One reconciliation attempt for one venue. Fields move only out of
    /// `Unresolved`; a settled record returns without any upstream call.
    pub async fn enrich(&self, record: &mut VenueRecord, seed: &VenueSeed) -> Result<StepOutcome> {
        if record.fully_settled() {
            return Ok(StepOutcome::Done { changed: false });
        }

        let before = record.clone();
        let mut scrape_paused = false;

        if record.needs_scrape() {
            match self.scrape(record, seed, &mut scrape_paused).await? {
                ScrapeStep::Advanced => {}
                ScrapeStep::Tripped => return Ok(StepOutcome::ScrapeTripped),
            }
        }

        if record.needs_lookup() {
            if self.lookup_attempt(record, scrape_paused).await?.tripped() {
                return Ok(StepOutcome::LookupTripped);
            }
        }

        let changed = *record != before;
        if changed {
            debug!(venue = %record.name, "venue record advanced");
        }
        Ok(StepOutcome::Done { changed })
    }

    /// Checkin page → venue permalink → venue page → lookup permalink and
    /// coordinates. A 404 at either hop means the post or venue was deleted
    /// and the whole record settles as unavailable.
    async fn scrape(
        &self,
        record: &mut VenueRecord,
        seed: &VenueSeed,
        scrape_paused: &mut bool,
    ) -> Result<ScrapeStep> {
        let checkin_page = match self.site.fetch_page(&seed.checkin_url).await? {
            PageFetch::Page(body) => body,
            PageFetch::Gone => {
                info!(venue = %record.name, "checkin deleted, settling record unavailable");
                settle_record_unavailable(record);
                return Ok(ScrapeStep::Advanced);
            }
            PageFetch::Transient => {
                warn!(venue = %record.name, "checkin fetch failed");
                return Ok(ScrapeStep::Tripped);
            }
        };
        self.pacing.pause_scrape().await;
        *scrape_paused = true;

        let venue_href = match untappd::venue_link(&checkin_page) {
            Some(href) => href,
            None => {
                info!(venue = %record.name, "checkin page carries no venue link");
                settle_record_unavailable(record);
                return Ok(ScrapeStep::Advanced);
            }
        };
        let venue_url = untappd::absolute_url(&self.site_base, &venue_href);

        let venue_page = match self.site.fetch_page(&venue_url).await? {
            PageFetch::Page(body) => body,
            PageFetch::Gone => {
                info!(venue = %record.name, "venue page deleted, settling record unavailable");
                settle_record_unavailable(record);
                return Ok(ScrapeStep::Advanced);
            }
            PageFetch::Transient => {
                warn!(venue = %record.name, "venue fetch failed");
                return Ok(ScrapeStep::Tripped);
            }
        };
        self.pacing.pause_scrape().await;
        *scrape_paused = true;

        record.untappd_url.fill(FieldState::Resolved(venue_url));
        match untappd::venue_page_data(&venue_page) {
            Some((fs_url, lat, lng)) => {
                record.foursquare_url.fill(FieldState::Resolved(fs_url));
                record.latitude.fill(FieldState::Resolved(lat));
                record.longitude.fill(FieldState::Resolved(lng));
            }
            None => {
                // The page rendered without a lookup link or coordinates;
                // nothing downstream can ever run for this venue.
                info!(venue = %record.name, "venue page missing lookup data");
                settle_lookup_unavailable(record);
            }
        }
        Ok(ScrapeStep::Advanced)
    }

    /// Search-by-name near the scraped coordinates, accepting only the
    /// candidate whose id matches the scraped permalink. The candidate
    /// itself carries address, categories, and country, so a venue costs
    /// one lookup call; fetch-by-id stays with the backfill pass.
    async fn lookup_attempt(
        &self,
        record: &mut VenueRecord,
        scrape_paused: bool,
    ) -> Result<LookupStep> {
        let (fs_url, lat, lng) = match (
            record.foursquare_url.as_resolved().cloned(),
            record.latitude.as_resolved().copied(),
            record.longitude.as_resolved().copied(),
        ) {
            (Some(u), Some(lat), Some(lng)) => (u, lat, lng),
            // One of the inputs settled as unavailable upstream; the
            // lookup path can never run for this venue.
            _ => {
                settle_lookup_unavailable(record);
                return Ok(LookupStep::Advanced);
            }
        };
        let venue_id = match foursquare::venue_id_from_url(&fs_url) {
            Some(id) => id.to_string(),
            None => {
                warn!(venue = %record.name, url = %fs_url, "unparseable lookup permalink");
                settle_lookup_unavailable(record);
                return Ok(LookupStep::Advanced);
            }
        };

        // First lookup call rides on a pause the scrape already paid.
        if !scrape_paused {
            self.pacing.pause_lookup().await;
        }
        match self.lookup.search(&record.name, lat, lng, &venue_id).await? {
            SearchOutcome::Match(matched) => {
                record.address.fill(FieldState::Resolved(matched.address));
                record.categories.fill(FieldState::Resolved(matched.categories));
                record.country.fill(matched.country);
            }
            SearchOutcome::NoMatch => {
                info!(venue = %record.name, "no matching lookup candidate");
                settle_lookup_unavailable(record);
            }
            SearchOutcome::Transient => {
                warn!(venue = %record.name, "lookup search failed");
                return Ok(LookupStep::Tripped);
            }
        }
        Ok(LookupStep::Advanced)
    }
}

enum ScrapeStep {
    Advanced,
    Tripped,
}

enum LookupStep {
    Advanced,
    Tripped,
}

impl LookupStep {
    fn tripped(&self) -> bool {
        matches!(self, LookupStep::Tripped)
    }
}

/// Post or venue deleted upstream: every column settles as unavailable.
fn settle_record_unavailable(record: &mut VenueRecord) {
    record.untappd_url.fill(FieldState::Unavailable);
    settle_lookup_unavailable(record);
}

/// The lookup path can never run for this venue; its columns settle so the
/// record stops being retried.
fn settle_lookup_unavailable(record: &mut VenueRecord) {
    record.foursquare_url.fill(FieldState::Unavailable);
    record.address.fill(FieldState::Unavailable);
    record.latitude.fill(FieldState::Unavailable);
    record.longitude.fill(FieldState::Unavailable);
    record.categories.fill(FieldState::Unavailable);
    record.country.fill(CountryMatch::Unknown);
}
