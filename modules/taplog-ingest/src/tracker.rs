//! Monotonic watermark admission for the poll path.

use std::collections::HashSet;

use taplog_store::FeedWatermark;

/// Decides which feed posts are new for this run. The baseline is the
/// persisted watermark from the previous run; ids at or below it are never
/// admitted again. Within a run, each distinct id is admitted exactly once
/// even when overlapping feed windows deliver it repeatedly, and
/// out-of-order delivery of new ids is tolerated.
#[derive(Debug)]
pub struct WatermarkTracker {
    baseline: u64,
    highest: u64,
    admitted: HashSet<u64>,
}

impl WatermarkTracker {
    pub fn new(watermark: FeedWatermark) -> Self {
        Self {
            baseline: watermark.id,
            highest: watermark.id,
            admitted: HashSet::new(),
        }
    }

    /// True iff `id` has not been ingested before. The watermark never
    /// decreases.
    pub fn admit_if_new(&mut self, id: u64) -> bool {
        if id <= self.baseline || !self.admitted.insert(id) {
            return false;
        }
        self.highest = self.highest.max(id);
        true
    }

    pub fn watermark(&self) -> FeedWatermark {
        FeedWatermark { id: self.highest }
    }
}
