//! Venue enrichment: reconciles each venue in the registry against the
//! scrape-derived checkin site and the lookup API, under strict sequential
//! rate pacing and a checkpointed time budget.

pub mod backfill;
pub mod batch;
pub mod engine;
pub mod foursquare;
pub mod scanner;
pub mod untappd;
