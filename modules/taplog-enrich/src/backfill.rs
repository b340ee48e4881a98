//! Premium completion pass: a higher-quota API tier fetches venue details
//! directly by id, re-attempting columns the regular run settled as
//! unavailable. Resolved values are still never overwritten.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use taplog_common::VenueRecord;
use taplog_store::{ObjectStore, VenueRegistry};

use crate::foursquare::{self, DetailsOutcome, VenueLookup};

#[derive(Debug, Default)]
pub struct BackfillStats {
    pub venues_eligible: usize,
    pub venues_updated: usize,
    pub lookup_tripped: bool,
}

impl fmt::Display for BackfillStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backfill Pass Complete ===")?;
        writeln!(f, "Venues eligible: {}", self.venues_eligible)?;
        writeln!(f, "Venues updated:  {}", self.venues_updated)?;
        if self.lookup_tripped {
            writeln!(f, "Stopped early: lookup API unavailable")?;
        }
        Ok(())
    }
}

pub struct BackfillJob<'a> {
    store: &'a dyn ObjectStore,
    lookup: Box<dyn VenueLookup>,
    pause: Duration,
}

impl<'a> BackfillJob<'a> {
    pub fn new(store: &'a dyn ObjectStore, lookup: Box<dyn VenueLookup>, pause: Duration) -> Self {
        Self {
            store,
            lookup,
            pause,
        }
    }

    /// Eligible: a known lookup id plus at least one refillable column. The
    /// registry is saved once at the end, including on the breaker path.
    pub async fn run(&self) -> Result<BackfillStats> {
        let mut registry = VenueRegistry::load(self.store).await?;
        let mut stats = BackfillStats::default();
        info!(known = registry.len(), "backfill pass starting");

        for record in registry.records_mut() {
            let venue_id = match eligible_id(record) {
                Some(id) => id,
                None => continue,
            };
            stats.venues_eligible += 1;

            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            match self.lookup.details(&venue_id).await? {
                DetailsOutcome::Record(detail) => {
                    let mut changed = record.address.refill(detail.address);
                    changed |= record.categories.refill(detail.categories);
                    changed |= record.country.refill(detail.country);
                    if changed {
                        stats.venues_updated += 1;
                    }
                }
                DetailsOutcome::Gone => {
                    info!(venue = %record.name, "lookup id no longer exists");
                }
                DetailsOutcome::Transient => {
                    warn!(venue = %record.name, "backfill lookup failed, stopping pass");
                    stats.lookup_tripped = true;
                    break;
                }
            }
        }

        registry.save(self.store).await?;
        Ok(stats)
    }
}

fn eligible_id(record: &VenueRecord) -> Option<String> {
    let url = record.foursquare_url.as_resolved()?;
    let refillable = !record.address.is_resolved()
        || !record.categories.is_resolved()
        || matches!(
            record.country,
            taplog_common::CountryMatch::Unresolved | taplog_common::CountryMatch::Unknown
        );
    if !refillable {
        return None;
    }
    foursquare::venue_id_from_url(url).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use taplog_common::{CountryMatch, FieldState};
    use taplog_store::MemoryObjectStore;

    use crate::engine::tests::ScriptedLookup;
    use crate::foursquare::DetailRecord;

    use super::*;

    fn settled_unavailable(name: &str) -> VenueRecord {
        VenueRecord {
            name: name.into(),
            untappd_url: FieldState::Resolved(format!("https://untappd.com/venue/{name}/1")),
            foursquare_url: FieldState::Resolved("https://foursquare.com/v/4abc".into()),
            address: FieldState::Unavailable,
            latitude: FieldState::Resolved(32.7),
            longitude: FieldState::Resolved(-117.1),
            categories: FieldState::Unavailable,
            country: CountryMatch::Unknown,
        }
    }

    async fn seed_registry(store: &MemoryObjectStore, records: Vec<VenueRecord>) {
        let mut registry = VenueRegistry::default();
        for rec in records {
            let name = rec.name.clone();
            *registry.entry(&name) = rec;
        }
        registry.save(store).await.unwrap();
    }

    #[tokio::test]
    async fn refills_unavailable_columns_only() {
        let store = MemoryObjectStore::new();
        let mut resolved = settled_unavailable("Resolved Hall");
        resolved.address = FieldState::Resolved("5 Old Rd".into());
        resolved.categories = FieldState::Resolved("Pub".into());
        resolved.country = CountryMatch::Foreign;
        seed_registry(&store, vec![settled_unavailable("Alpha"), resolved]).await;

        let lookup = ScriptedLookup::new(
            vec![],
            vec![DetailsOutcome::Record(DetailRecord {
                address: FieldState::Resolved("1 Main St".into()),
                categories: FieldState::Resolved("Brewery".into()),
                country: CountryMatch::UnitedStates,
            })],
        );
        let job = BackfillJob::new(&store, Box::new(lookup.clone()), Duration::ZERO);
        let stats = job.run().await.unwrap();

        assert_eq!(stats.venues_eligible, 1);
        assert_eq!(stats.venues_updated, 1);
        // Only Alpha was eligible; the fully resolved record cost no call.
        assert_eq!(*lookup.detail_calls.lock().unwrap(), 1);

        let registry = VenueRegistry::load(&store).await.unwrap();
        let alpha = registry.get("Alpha").unwrap();
        assert_eq!(alpha.address, FieldState::Resolved("1 Main St".into()));
        assert_eq!(alpha.categories, FieldState::Resolved("Brewery".into()));
        assert_eq!(alpha.country, CountryMatch::UnitedStates);

        let untouched = registry.get("Resolved Hall").unwrap();
        assert_eq!(untouched.address, FieldState::Resolved("5 Old Rd".into()));
        assert_eq!(untouched.country, CountryMatch::Foreign);
    }

    #[tokio::test]
    async fn transient_failure_stops_pass_and_persists() {
        let store = MemoryObjectStore::new();
        seed_registry(
            &store,
            vec![settled_unavailable("Alpha"), settled_unavailable("Beta")],
        )
        .await;

        let lookup = ScriptedLookup::new(vec![], vec![DetailsOutcome::Transient]);
        let job = BackfillJob::new(&store, Box::new(lookup.clone()), Duration::ZERO);
        let stats = job.run().await.unwrap();

        assert!(stats.lookup_tripped);
        assert_eq!(*lookup.detail_calls.lock().unwrap(), 1);
        // The registry round-trips even when the pass stops early.
        assert_eq!(VenueRegistry::load(&store).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn gone_id_leaves_record_unchanged() {
        let store = MemoryObjectStore::new();
        seed_registry(&store, vec![settled_unavailable("Alpha")]).await;

        let lookup = ScriptedLookup::new(vec![], vec![DetailsOutcome::Gone]);
        let job = BackfillJob::new(&store, Box::new(lookup.clone()), Duration::ZERO);
        let stats = job.run().await.unwrap();

        assert_eq!(stats.venues_eligible, 1);
        assert_eq!(stats.venues_updated, 0);
        let registry = VenueRegistry::load(&store).await.unwrap();
        assert_eq!(registry.get("Alpha").unwrap().address, FieldState::Unavailable);
    }
}
