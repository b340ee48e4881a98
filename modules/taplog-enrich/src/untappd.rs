//! Scrape-derived venue source: checkin page → venue page → lookup
//! permalink and coordinates.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::prelude::IndexedRandom;
use tracing::{info, warn};

use crate::scanner::{self, NestedLinkRule};

/// Browser User-Agent strings rotated across scrape requests.
const USER_AGENTS: [&str; 7] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.169 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/72.0.3626.121 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/74.0.3729.157 Safari/537.36",
    "Mozilla/5.0 (Windows NT 6.1; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/46.0.2490.80 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/50.0.2661.102 Safari/537.36",
    "Mozilla/4.0 (compatible; MSIE 6.0; Windows NT 5.1; SV1)",
    "Mozilla/5.0 (Windows NT 6.1; WOW64; Trident/7.0; rv:11.0) like Gecko",
];

const VENUE_LINK_RULE: NestedLinkRule<'static> = NestedLinkRule {
    container: "p",
    container_class: "location",
    link_class: None,
};

const LOOKUP_LINK_RULE: NestedLinkRule<'static> = NestedLinkRule {
    container: "div",
    container_class: "venue-social",
    link_class: Some("fs track-click"),
};

const LATITUDE_PROPERTY: &str = "place:location:latitude";
const LONGITUDE_PROPERTY: &str = "place:location:longitude";

/// Outcome of fetching one scrape-source page.
#[derive(Debug, Clone)]
pub enum PageFetch {
    Page(String),
    /// 404: the checkin or venue was deleted. Authoritative, never retried.
    Gone,
    /// Rejected status or transport failure. Retry next run.
    Transient,
}

#[async_trait]
pub trait CheckinSite: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<PageFetch>;
}

pub struct UntappdClient {
    client: reqwest::Client,
}

impl UntappdClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build scrape HTTP client");
        Self { client }
    }

}

/// Absolute venue URL from a scanner-relative permalink.
pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{href}", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl CheckinSite for UntappdClient {
    async fn fetch_page(&self, url: &str) -> Result<PageFetch> {
        let user_agent = *USER_AGENTS
            .choose(&mut rand::rng())
            .expect("non-empty user agent list");
        let resp = match self
            .client
            .get(url)
            .header("User-Agent", user_agent)
            .header("Content-Type", "text/html")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "scrape request failed");
                return Ok(PageFetch::Transient);
            }
        };

        let status = resp.status();
        if status.as_u16() == 404 {
            info!(url, "scrape page gone");
            return Ok(PageFetch::Gone);
        }
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "scrape request rejected");
            return Ok(PageFetch::Transient);
        }
        match resp.text().await {
            Ok(body) => Ok(PageFetch::Page(body)),
            Err(e) => {
                warn!(url, error = %e, "failed to read scrape body");
                Ok(PageFetch::Transient)
            }
        }
    }
}

/// First venue permalink on a checkin page. More than one qualifying link
/// may exist (desktop/mobile variants); document order decides.
pub fn venue_link(html: &str) -> Option<String> {
    let events = scanner::tokenize(html);
    VENUE_LINK_RULE.extract(&events).into_iter().next()
}

/// Lookup-source permalink and coordinates from a venue page. The lookup
/// link's query string (tracking parameters) is stripped. `None` when any
/// piece is absent — the page rendered without the needed data.
pub fn venue_page_data(html: &str) -> Option<(String, f64, f64)> {
    let events = scanner::tokenize(html);

    let lookup_url = LOOKUP_LINK_RULE
        .extract(&events)
        .into_iter()
        .next()
        .map(|href| href.split('?').next().unwrap_or(&href).to_string())?;

    let coords = scanner::meta_property_values(&events, &[LATITUDE_PROPERTY, LONGITUDE_PROPERTY]);
    let (lat, lng) = match coords.as_slice() {
        [lat, lng, ..] => (lat.parse().ok()?, lng.parse().ok()?),
        _ => return None,
    };

    Some((lookup_url, lat, lng))
}
