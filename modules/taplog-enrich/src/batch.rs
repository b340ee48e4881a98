//! Checkpointed batch loop: drives reconciliation over the venue list in
//! order, persisting the registry on a wall-clock interval and once more,
//! unconditionally, before returning.

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use taplog_store::{self as store, ObjectStore, VenueRegistry};

use crate::engine::{ReconcileEngine, StepOutcome};

#[derive(Debug, Default)]
pub struct EnrichStats {
    pub venues_seen: usize,
    pub venues_changed: usize,
    pub venues_settled: usize,
    pub checkpoints: usize,
    pub scrape_tripped: bool,
    pub lookup_tripped: bool,
    pub interrupted: bool,
}

impl fmt::Display for EnrichStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Enrichment Run Complete ===")?;
        writeln!(f, "Venues visited:   {}", self.venues_seen)?;
        writeln!(f, "Venues advanced:  {}", self.venues_changed)?;
        writeln!(f, "Venues settled:   {}", self.venues_settled)?;
        writeln!(f, "Mid-run saves:    {}", self.checkpoints)?;
        if self.scrape_tripped {
            writeln!(f, "Stopped early: scrape source unavailable")?;
        }
        if self.lookup_tripped {
            writeln!(f, "Stopped early: lookup API unavailable")?;
        }
        if self.interrupted {
            writeln!(f, "Stopped early: shutdown requested")?;
        }
        Ok(())
    }
}

pub struct EnrichJob<'a> {
    store: &'a dyn ObjectStore,
    engine: ReconcileEngine,
    checkpoint_interval: Duration,
}

impl<'a> EnrichJob<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        engine: ReconcileEngine,
        checkpoint_interval: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            checkpoint_interval,
        }
    }

    /// One enrichment run over the whole venue list. The registry is saved
    /// whenever the checkpoint interval elapses, and once more on every exit
    /// path, so work survives circuit breakers and shutdown alike.
    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) -> Result<EnrichStats> {
        let mut registry = VenueRegistry::load(self.store).await?;
        let seeds = store::load_venue_list(self.store).await?;
        info!(venues = seeds.len(), known = registry.len(), "enrichment run starting");

        let mut stats = EnrichStats::default();
        let mut last_save = Instant::now();

        for seed in &seeds {
            // Cancellation is checked only between venues, never mid-request.
            if *shutdown.borrow() {
                warn!("shutdown requested, persisting and stopping");
                stats.interrupted = true;
                break;
            }

            let record = registry.entry(&seed.name);
            stats.venues_seen += 1;
            match self.engine.enrich(record, seed).await? {
                StepOutcome::Done { changed } => {
                    if changed {
                        stats.venues_changed += 1;
                    }
                    if record.fully_settled() {
                        stats.venues_settled += 1;
                    }
                }
                StepOutcome::ScrapeTripped => {
                    stats.scrape_tripped = true;
                    break;
                }
                StepOutcome::LookupTripped => {
                    stats.lookup_tripped = true;
                    break;
                }
            }

            if last_save.elapsed() >= self.checkpoint_interval {
                registry.save(self.store).await?;
                last_save = Instant::now();
                stats.checkpoints += 1;
                info!(venues_seen = stats.venues_seen, "registry checkpoint saved");
            }
        }

        registry.save(self.store).await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use bytes::Bytes;

    use taplog_common::VenueSeed;
    use taplog_store::{keys, MemoryObjectStore};

    use crate::engine::tests::{matched, ScriptedLookup, ScriptedSite, CHECKIN_PAGE, VENUE_PAGE};
    use crate::engine::Pacing;
    use crate::foursquare::SearchOutcome;
    use crate::untappd::PageFetch;

    use super::*;

    async fn put_venue_list(store: &MemoryObjectStore, seeds: &[VenueSeed]) {
        store::save_venue_list(store, seeds).await.unwrap();
    }

    fn seeds() -> Vec<VenueSeed> {
        vec![
            VenueSeed {
                name: "Alpha".into(),
                checkin_url: "https://untappd.com/user/a/checkin/1".into(),
            },
            VenueSeed {
                name: "Beta".into(),
                checkin_url: "https://untappd.com/user/b/checkin/2".into(),
            },
        ]
    }

    #[tokio::test]
    async fn run_persists_registry_with_every_seed() {
        let store = MemoryObjectStore::new();
        put_venue_list(&store, &seeds()).await;

        let site = ScriptedSite::new(vec![
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
        ]);
        let lookup = ScriptedLookup::new(vec![matched(), matched()], vec![]);
        let engine = ReconcileEngine::new(
            Box::new(site.clone()),
            Box::new(lookup.clone()),
            "https://untappd.com",
            Pacing::none(),
        );
        let job = EnrichJob::new(&store, engine, Duration::from_secs(600));

        let (_tx, mut rx) = watch::channel(false);
        let stats = job.run(&mut rx).await.unwrap();

        assert_eq!(stats.venues_seen, 2);
        assert_eq!(stats.venues_changed, 2);
        assert_eq!(stats.venues_settled, 2);
        assert!(!stats.lookup_tripped);

        // Regular runs resolve every lookup column from the search response
        // alone; fetch-by-id stays with the backfill pass.
        assert_eq!(*lookup.search_calls.lock().unwrap(), 2);
        assert_eq!(*lookup.detail_calls.lock().unwrap(), 0);

        let registry = VenueRegistry::load(&store).await.unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("Alpha").unwrap().fully_settled());
        assert!(registry.get("Beta").unwrap().fully_settled());
    }

    #[tokio::test]
    async fn lookup_breaker_stops_run_but_still_persists() {
        let store = MemoryObjectStore::new();
        put_venue_list(&store, &seeds()).await;

        // Alpha's search hits a rate limit after the scrape half succeeded.
        let site = ScriptedSite::new(vec![
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
        ]);
        let lookup = ScriptedLookup::new(
            vec![SearchOutcome::Transient],
            vec![],
        );
        let engine = ReconcileEngine::new(
            Box::new(site.clone()),
            Box::new(lookup.clone()),
            "https://untappd.com",
            Pacing::none(),
        );
        let job = EnrichJob::new(&store, engine, Duration::from_secs(600));

        let (_tx, mut rx) = watch::channel(false);
        let stats = job.run(&mut rx).await.unwrap();

        assert!(stats.lookup_tripped);
        assert_eq!(stats.venues_seen, 1);
        // Beta was never attempted; no further calls after the breaker.
        assert_eq!(site.call_count(), 2);
        assert_eq!(*lookup.search_calls.lock().unwrap(), 1);

        // Alpha's scraped progress was persisted and Beta stays untouched.
        let registry = VenueRegistry::load(&store).await.unwrap();
        assert!(registry.get("Alpha").unwrap().untappd_url.is_resolved());
        assert!(registry.get("Alpha").unwrap().address.is_unresolved());
        assert!(registry.get("Beta").is_none() || registry.get("Beta").unwrap().needs_scrape());
    }

    #[tokio::test]
    async fn breaker_on_third_venue_stops_all_later_calls() {
        let store = MemoryObjectStore::new();
        let mut list = seeds();
        list.push(VenueSeed {
            name: "Gamma".into(),
            checkin_url: "https://untappd.com/user/c/checkin/3".into(),
        });
        list.push(VenueSeed {
            name: "Delta".into(),
            checkin_url: "https://untappd.com/user/d/checkin/4".into(),
        });
        put_venue_list(&store, &list).await;

        let site = ScriptedSite::new(vec![
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
        ]);
        let lookup = ScriptedLookup::new(
            vec![matched(), matched(), SearchOutcome::Transient],
            vec![],
        );
        let engine = ReconcileEngine::new(
            Box::new(site.clone()),
            Box::new(lookup.clone()),
            "https://untappd.com",
            Pacing::none(),
        );
        let job = EnrichJob::new(&store, engine, Duration::from_secs(600));

        let (_tx, mut rx) = watch::channel(false);
        let stats = job.run(&mut rx).await.unwrap();

        assert!(stats.lookup_tripped);
        assert_eq!(stats.venues_seen, 3);
        // No lookup call after the failing third search, and Delta's scrape
        // never started.
        assert_eq!(*lookup.search_calls.lock().unwrap(), 3);
        assert_eq!(site.call_count(), 6);

        let registry = VenueRegistry::load(&store).await.unwrap();
        assert!(registry.get("Alpha").unwrap().fully_settled());
        assert!(registry.get("Beta").unwrap().fully_settled());
        // Gamma keeps its scraped half; its lookup columns stay retryable.
        let gamma = registry.get("Gamma").unwrap();
        assert!(gamma.untappd_url.is_resolved());
        assert!(gamma.address.is_unresolved());
        assert!(registry.get("Delta").is_none());
    }

    #[tokio::test]
    async fn shutdown_between_venues_persists_progress() {
        let store = MemoryObjectStore::new();
        put_venue_list(&store, &seeds()).await;

        let site = ScriptedSite::new(vec![]);
        let lookup = ScriptedLookup::new(vec![], vec![]);
        let engine = ReconcileEngine::new(
            Box::new(site.clone()),
            Box::new(lookup.clone()),
            "https://untappd.com",
            Pacing::none(),
        );
        let job = EnrichJob::new(&store, engine, Duration::from_secs(600));

        let (tx, mut rx) = watch::channel(true);
        let stats = job.run(&mut rx).await.unwrap();
        drop(tx);

        assert!(stats.interrupted);
        assert_eq!(stats.venues_seen, 0);
        assert_eq!(site.call_count(), 0);
        // The final unconditional save still ran.
        assert!(store.contains(keys::VENUE_LOCATIONS));
    }

    /// Store wrapper that keeps a copy of every registry write, so mid-run
    /// checkpoints are observable after the fact.
    #[derive(Clone)]
    struct SnapshottingStore {
        inner: Arc<MemoryObjectStore>,
        registry_writes: Arc<Mutex<Vec<Bytes>>>,
    }

    impl SnapshottingStore {
        fn new(inner: Arc<MemoryObjectStore>) -> Self {
            Self {
                inner,
                registry_writes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for SnapshottingStore {
        async fn get(&self, key: &str) -> store::Result<Bytes> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, body: Bytes) -> store::Result<()> {
            if key == keys::VENUE_LOCATIONS {
                self.registry_writes.lock().unwrap().push(body.clone());
            }
            self.inner.put(key, body).await
        }

        async fn copy(&self, from: &str, to: &str) -> store::Result<()> {
            self.inner.copy(from, to).await
        }

        async fn delete_batch(&self, keys: &[String]) -> store::Result<()> {
            self.inner.delete_batch(keys).await
        }

        async fn list(
            &self,
            prefix: &str,
            start_after: &str,
            max_keys: usize,
        ) -> store::Result<Vec<String>> {
            self.inner.list(prefix, start_after, max_keys).await
        }
    }

    async fn decode_registry(body: Bytes) -> VenueRegistry {
        let store = MemoryObjectStore::new();
        store.put(keys::VENUE_LOCATIONS, body).await.unwrap();
        VenueRegistry::load(&store).await.unwrap()
    }

    #[tokio::test]
    async fn elapsed_interval_checkpoints_registry_mid_run() {
        let inner = Arc::new(MemoryObjectStore::new());
        put_venue_list(&inner, &seeds()).await;
        let store = SnapshottingStore::new(inner);

        let site = ScriptedSite::new(vec![
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
            PageFetch::Page(CHECKIN_PAGE.into()),
            PageFetch::Page(VENUE_PAGE.into()),
        ]);
        let lookup = ScriptedLookup::new(vec![matched(), matched()], vec![]);
        let engine = ReconcileEngine::new(
            Box::new(site.clone()),
            Box::new(lookup.clone()),
            "https://untappd.com",
            Pacing::none(),
        );
        // Zero interval: every venue crosses the checkpoint threshold.
        let job = EnrichJob::new(&store, engine, Duration::ZERO);

        let (_tx, mut rx) = watch::channel(false);
        let stats = job.run(&mut rx).await.unwrap();

        assert_eq!(stats.checkpoints, 2);
        // Two mid-run checkpoints plus the final unconditional save.
        let writes = store.registry_writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 3);

        // The first checkpoint captured exactly the first venue's progress.
        let first = decode_registry(writes[0].clone()).await;
        assert_eq!(first.len(), 1);
        assert!(first.get("Alpha").unwrap().fully_settled());
        assert!(first.get("Beta").is_none());

        let last = decode_registry(writes[2].clone()).await;
        assert_eq!(last.len(), 2);
        assert!(last.get("Beta").unwrap().fully_settled());
    }
}
