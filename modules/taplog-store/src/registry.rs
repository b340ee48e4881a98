//! Venue registry and companion CSV tables.
//!
//! Column order is part of the format contract; the enrichment engine and
//! downstream consumers both depend on it. Field-state sentinels: empty
//! string = unresolved (retry later), literal `Unavailable` = the source
//! authoritatively had no data (never retried automatically), anything else
//! is a resolved value.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::warn;

use taplog_common::{CountryMatch, FieldState, PostRecord, TaplogError, VenueRecord, VenueSeed};

use crate::{keys, ObjectStore, StoreError};

pub const REGISTRY_COLUMNS: [&str; 8] = [
    "venue",
    "untappd_url",
    "foursquare_url",
    "address",
    "lat",
    "long",
    "categories",
    "in_united_states",
];

pub const AGGREGATE_COLUMNS: [&str; 9] = [
    "guid",
    "username",
    "brewery",
    "beer",
    "venue",
    "comment",
    "rating",
    "date",
    "url",
];

pub const VENUE_LIST_COLUMNS: [&str; 2] = ["venue", "checkin_url"];

const UNAVAILABLE: &str = "Unavailable";

/// The in-memory venue registry for one run. `BTreeMap` keeps iteration
/// deterministic across runs.
#[derive(Debug, Default)]
pub struct VenueRegistry {
    records: BTreeMap<String, VenueRecord>,
}

impl VenueRegistry {
    /// Load the registry, treating a missing object as an empty registry
    /// (first run).
    pub async fn load(store: &dyn ObjectStore) -> Result<Self, TaplogError> {
        match store.get(keys::VENUE_LOCATIONS).await {
            Ok(bytes) => Self::decode(&bytes),
            Err(StoreError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, store: &dyn ObjectStore) -> Result<(), TaplogError> {
        let bytes = self.encode()?;
        store
            .put(keys::VENUE_LOCATIONS, Bytes::from(bytes))
            .await
            .map_err(Into::into)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TaplogError> {
        let mut records = BTreeMap::new();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);
        for row in reader.records() {
            let row = row.map_err(|e| TaplogError::Registry(e.to_string()))?;
            match decode_record(&row) {
                Some(rec) => {
                    if !rec.is_consistent() {
                        warn!(venue = rec.name.as_str(), "inconsistent registry row");
                    }
                    records.insert(rec.name.clone(), rec);
                }
                None => warn!(row = ?row, "skipping malformed registry row"),
            }
        }
        Ok(Self { records })
    }

    pub fn encode(&self) -> Result<Vec<u8>, TaplogError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(REGISTRY_COLUMNS)
            .map_err(|e| TaplogError::Registry(e.to_string()))?;
        for rec in self.records.values() {
            writer
                .write_record(encode_record(rec))
                .map_err(|e| TaplogError::Registry(e.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|e| TaplogError::Registry(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&VenueRecord> {
        self.records.get(name)
    }

    /// Record for `name`, created blank if not yet present.
    pub fn entry(&mut self, name: &str) -> &mut VenueRecord {
        self.records
            .entry(name.to_string())
            .or_insert_with(|| VenueRecord::new(name))
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut VenueRecord> {
        self.records.values_mut()
    }

    pub fn records(&self) -> impl Iterator<Item = &VenueRecord> {
        self.records.values()
    }
}

fn encode_field_str(f: &FieldState<String>) -> String {
    match f {
        FieldState::Unresolved => String::new(),
        FieldState::Resolved(v) => v.clone(),
        FieldState::Unavailable => UNAVAILABLE.to_string(),
    }
}

fn decode_field_str(cell: &str) -> FieldState<String> {
    match cell {
        "" => FieldState::Unresolved,
        UNAVAILABLE => FieldState::Unavailable,
        v => FieldState::Resolved(v.to_string()),
    }
}

fn encode_field_f64(f: &FieldState<f64>) -> String {
    match f {
        FieldState::Unresolved => String::new(),
        FieldState::Resolved(v) => v.to_string(),
        FieldState::Unavailable => UNAVAILABLE.to_string(),
    }
}

fn decode_field_f64(cell: &str) -> FieldState<f64> {
    match cell {
        "" => FieldState::Unresolved,
        UNAVAILABLE => FieldState::Unavailable,
        v => match v.parse() {
            Ok(n) => FieldState::Resolved(n),
            Err(_) => {
                // Structural: a coordinate cell we cannot read is retried,
                // not trusted.
                warn!(cell = v, "unreadable coordinate cell, treating as unresolved");
                FieldState::Unresolved
            }
        },
    }
}

fn encode_country(c: CountryMatch) -> String {
    match c {
        CountryMatch::Unresolved => String::new(),
        CountryMatch::UnitedStates => "true".to_string(),
        CountryMatch::Foreign => "false".to_string(),
        CountryMatch::Unknown => UNAVAILABLE.to_string(),
    }
}

fn decode_country(cell: &str) -> CountryMatch {
    match cell {
        "" => CountryMatch::Unresolved,
        "true" => CountryMatch::UnitedStates,
        "false" => CountryMatch::Foreign,
        UNAVAILABLE => CountryMatch::Unknown,
        other => {
            warn!(cell = other, "unreadable country cell, treating as unresolved");
            CountryMatch::Unresolved
        }
    }
}

fn encode_record(rec: &VenueRecord) -> [String; 8] {
    [
        rec.name.clone(),
        encode_field_str(&rec.untappd_url),
        encode_field_str(&rec.foursquare_url),
        encode_field_str(&rec.address),
        encode_field_f64(&rec.latitude),
        encode_field_f64(&rec.longitude),
        encode_field_str(&rec.categories),
        encode_country(rec.country),
    ]
}

fn decode_record(row: &csv::StringRecord) -> Option<VenueRecord> {
    if row.len() != REGISTRY_COLUMNS.len() || row.get(0)?.is_empty() {
        return None;
    }
    Some(VenueRecord {
        name: row.get(0)?.to_string(),
        untappd_url: decode_field_str(row.get(1)?),
        foursquare_url: decode_field_str(row.get(2)?),
        address: decode_field_str(row.get(3)?),
        latitude: decode_field_f64(row.get(4)?),
        longitude: decode_field_f64(row.get(5)?),
        categories: decode_field_str(row.get(6)?),
        country: decode_country(row.get(7)?),
    })
}

// --- venue list (name + first-seen checkin permalink) ---

pub fn decode_venue_list(bytes: &[u8]) -> Result<Vec<VenueSeed>, TaplogError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);
    let mut seeds = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| TaplogError::Registry(e.to_string()))?;
        let (Some(name), Some(url)) = (row.get(0), row.get(1)) else {
            warn!(row = ?row, "skipping malformed venue list row");
            continue;
        };
        if name.is_empty() {
            continue;
        }
        seeds.push(VenueSeed {
            name: name.to_string(),
            checkin_url: url.to_string(),
        });
    }
    Ok(seeds)
}

pub fn encode_venue_list(seeds: &[VenueSeed]) -> Result<Vec<u8>, TaplogError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(VENUE_LIST_COLUMNS)
        .map_err(|e| TaplogError::Registry(e.to_string()))?;
    for seed in seeds {
        writer
            .write_record([seed.name.as_str(), seed.checkin_url.as_str()])
            .map_err(|e| TaplogError::Registry(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| TaplogError::Registry(e.to_string()))
}

pub async fn load_venue_list(store: &dyn ObjectStore) -> Result<Vec<VenueSeed>, TaplogError> {
    match store.get(keys::VENUE_LIST).await {
        Ok(bytes) => decode_venue_list(&bytes),
        Err(StoreError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub async fn save_venue_list(
    store: &dyn ObjectStore,
    seeds: &[VenueSeed],
) -> Result<(), TaplogError> {
    let bytes = encode_venue_list(seeds)?;
    store
        .put(keys::VENUE_LIST, Bytes::from(bytes))
        .await
        .map_err(Into::into)
}

// --- aggregate post log ---

/// Append parsed post rows to the aggregate CSV body. The backing store
/// cannot append in place, so the caller downloads, appends, re-uploads.
/// `existing` of `None` starts a fresh file with headers.
pub fn append_post_rows(
    existing: Option<&[u8]>,
    rows: &[PostRecord],
) -> Result<Vec<u8>, TaplogError> {
    let mut out = match existing {
        Some(bytes) => {
            let mut v = bytes.to_vec();
            if !v.is_empty() && !v.ends_with(b"\n") {
                v.push(b'\n');
            }
            v
        }
        None => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record(AGGREGATE_COLUMNS)
                .map_err(|e| TaplogError::Registry(e.to_string()))?;
            writer
                .into_inner()
                .map_err(|e| TaplogError::Registry(e.to_string()))?
        }
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for post in rows {
        writer
            .write_record([
                post.global_id.to_string(),
                post.actor.clone(),
                post.brewery.clone(),
                post.beverage.clone(),
                post.venue.clone(),
                post.comment.clone(),
                post.rating.map(|r| r.to_string()).unwrap_or_default(),
                post.published.clone(),
                post.permalink.clone(),
            ])
            .map_err(|e| TaplogError::Registry(e.to_string()))?;
    }
    out.extend(
        writer
            .into_inner()
            .map_err(|e| TaplogError::Registry(e.to_string()))?,
    );
    Ok(out)
}
