//! Lookup-source client. The proximity search answers address, categories,
//! and country in a single request; the fetch-by-id shape exists for the
//! premium-tier backfill pass, where a precise id is already known.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;

use taplog_common::{CountryMatch, FieldState};

const SEARCH_RADIUS_METERS: u32 = 25_000;
const SEARCH_LIMIT: u32 = 10;
const UNITED_STATES: &str = "United States";
const UNCATEGORIZED: &str = "Uncategorized";

/// Columns lifted straight from the matched search candidate. The search
/// shape coerces the country field to a United States yes/no; it never
/// produces the `Unknown` outcome, which belongs to fetch-by-id alone.
#[derive(Debug, Clone)]
pub struct SearchMatch {
    pub address: String,
    pub categories: String,
    pub country: CountryMatch,
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Match(SearchMatch),
    /// Authoritative: the venue is not findable at these coordinates.
    NoMatch,
    /// Quota exhaustion, outage, or an unreadable response. Retry next run.
    Transient,
}

/// Address and categories are `Unavailable` when the response omits their
/// keys entirely: the venue exists but is privacy-restricted.
#[derive(Debug, Clone)]
pub struct DetailRecord {
    pub address: FieldState<String>,
    pub categories: FieldState<String>,
    pub country: CountryMatch,
}

#[derive(Debug, Clone)]
pub enum DetailsOutcome {
    Record(DetailRecord),
    /// The id no longer resolves. Authoritative.
    Gone,
    Transient,
}

#[async_trait]
pub trait VenueLookup: Send + Sync {
    /// Search by name near the given coordinates. `venue_id` is the
    /// scrape-derived id hint extracted from the lookup permalink; the
    /// matched candidate carries its own address, categories, and country,
    /// so a regular enrichment costs one call per venue.
    async fn search(&self, name: &str, lat: f64, lng: f64, venue_id: &str)
        -> Result<SearchOutcome>;

    /// Fetch by id. Only the backfill pass uses this shape; its quota
    /// belongs to the premium tier.
    async fn details(&self, venue_id: &str) -> Result<DetailsOutcome>;
}

pub struct FoursquareClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl FoursquareClient {
    pub fn new(base_url: &str, client_id: &str, client_secret: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build lookup HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }

    fn version_stamp() -> String {
        Utc::now().format("%Y%m%d").to_string()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    response: SearchPayload,
}

#[derive(Deserialize)]
struct SearchPayload {
    #[serde(default)]
    venues: Vec<VenueBody>,
}

#[derive(Deserialize)]
struct DetailsResponse {
    response: DetailsPayload,
}

#[derive(Deserialize)]
struct DetailsPayload {
    venue: VenueBody,
}

/// Both response shapes serve the same venue object.
#[derive(Deserialize)]
struct VenueBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    location: VenueLocation,
    categories: Option<Vec<VenueCategory>>,
}

#[derive(Deserialize, Default)]
struct VenueLocation {
    #[serde(rename = "formattedAddress")]
    formatted_address: Option<Lines>,
    #[serde(default)]
    country: Option<String>,
}

/// The API has served this field both as a string and as a list of lines.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lines {
    One(String),
    Many(Vec<String>),
}

impl Lines {
    fn join(&self) -> String {
        match self {
            Lines::One(s) => s.clone(),
            Lines::Many(v) => v.join(", "),
        }
    }
}

#[derive(Deserialize)]
struct VenueCategory {
    name: String,
}

#[async_trait]
impl VenueLookup for FoursquareClient {
    async fn search(
        &self,
        name: &str,
        lat: f64,
        lng: f64,
        venue_id: &str,
    ) -> Result<SearchOutcome> {
        let url = format!("{}/venues/search", self.base_url);
        let resp = match self
            .client
            .get(&url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("v", &Self::version_stamp()),
                ("intent", "browse"),
                ("ll", &format!("{lat},{lng}")),
                ("radius", &SEARCH_RADIUS_METERS.to_string()),
                ("limit", &SEARCH_LIMIT.to_string()),
                ("query", name),
            ])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(name, error = %e, "lookup search request failed");
                return Ok(SearchOutcome::Transient);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(name, status = status.as_u16(), "lookup search rejected");
            return Ok(SearchOutcome::Transient);
        }

        let body: SearchResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(name, error = %e, "undecodable lookup search response");
                return Ok(SearchOutcome::Transient);
            }
        };

        // The scrape-derived id hint outranks name similarity. Without a
        // hint, nothing in the result set is trustworthy enough to claim.
        let matched = body
            .response
            .venues
            .into_iter()
            .filter(|v| !venue_id.is_empty() && v.id == venue_id)
            .find_map(search_match);
        match matched {
            Some(m) => Ok(SearchOutcome::Match(m)),
            None => Ok(SearchOutcome::NoMatch),
        }
    }

    async fn details(&self, venue_id: &str) -> Result<DetailsOutcome> {
        let url = format!("{}/venues/{}", self.base_url, venue_id);
        let resp = match self
            .client
            .get(&url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("v", &Self::version_stamp()),
            ])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(venue_id, error = %e, "lookup details request failed");
                return Ok(DetailsOutcome::Transient);
            }
        };

        let status = resp.status();
        if status.as_u16() == 400 {
            return Ok(DetailsOutcome::Gone);
        }
        if !status.is_success() {
            warn!(venue_id, status = status.as_u16(), "lookup details rejected");
            return Ok(DetailsOutcome::Transient);
        }

        match resp.json::<DetailsResponse>().await {
            Ok(body) => Ok(DetailsOutcome::Record(detail_record(body.response.venue))),
            Err(e) => {
                warn!(venue_id, error = %e, "undecodable lookup details response");
                Ok(DetailsOutcome::Transient)
            }
        }
    }
}

/// Columns of a matched search candidate. A candidate missing its address,
/// category, or country key is privacy-restricted and indistinguishable
/// from no match at all; the caller settles the row either way.
fn search_match(venue: VenueBody) -> Option<SearchMatch> {
    let address = venue.location.formatted_address?.join();
    let country = match venue.location.country?.as_str() {
        UNITED_STATES => CountryMatch::UnitedStates,
        _ => CountryMatch::Foreign,
    };
    let categories = flatten_categories(venue.categories?);
    Some(SearchMatch {
        address,
        categories,
        country,
    })
}

/// The fetch-by-id mapping keeps per-column outcomes: a missing key is
/// `Unavailable` for that column alone, and a missing country field is the
/// distinct `Unknown` state.
fn detail_record(venue: VenueBody) -> DetailRecord {
    let address = match venue.location.formatted_address {
        Some(lines) => FieldState::Resolved(lines.join()),
        None => FieldState::Unavailable,
    };
    let categories = match venue.categories {
        None => FieldState::Unavailable,
        Some(list) => FieldState::Resolved(flatten_categories(list)),
    };
    let country = match venue.location.country.as_deref() {
        Some(UNITED_STATES) => CountryMatch::UnitedStates,
        Some(_) => CountryMatch::Foreign,
        None => CountryMatch::Unknown,
    };
    DetailRecord {
        address,
        categories,
        country,
    }
}

/// An empty list is a successful categorization that found none.
fn flatten_categories(list: Vec<VenueCategory>) -> String {
    if list.is_empty() {
        UNCATEGORIZED.to_string()
    } else {
        list.into_iter().map(|c| c.name).collect::<Vec<_>>().join(", ")
    }
}

/// Venue id segment of a lookup permalink, e.g.
/// `https://foursquare.com/v/4abc123` → `4abc123`.
pub fn venue_id_from_url(url: &str) -> Option<&str> {
    let trimmed = url.trim_end_matches('/');
    let id = trimmed.rsplit('/').next()?;
    if id.is_empty() || id == "v" {
        return None;
    }
    Some(id)
}
