//! Lock-free run counters
//!
//! Every stage of a run bumps counters here instead of failing: files that
//! could not be read, tracks without embeddings, gated transitions and so on.
//! The final [`RunSummary`] is logged and embedded in the run report.
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical counters
//! only and never drive control flow.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Match distance bucket boundaries (cosine distance x 1000)
/// Buckets: ≤50, ≤100, ≤150, ≤200, ≤250, ≤300, ≤400, ≤600, ≤1000, ≤1500, >1500
const MATCH_DIST_BOUNDS: [u64; 10] = [50, 100, 150, 200, 250, 300, 400, 600, 1000, 1500];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a match distance using binary search
#[inline]
fn match_dist_bucket_index(dist_milli: u64) -> usize {
    MATCH_DIST_BOUNDS.partition_point(|&bound| bound < dist_milli)
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// Lock-free metrics collector shared by all stages of a run
pub struct Metrics {
    /// Track files loaded
    files_loaded: AtomicU64,
    /// Track files skipped as unreadable
    files_skipped: AtomicU64,
    /// Tracks loaded across all files
    tracks_loaded: AtomicU64,
    /// Tracks left without a global id (no usable embedding)
    tracks_missing_embedding: AtomicU64,
    /// New global identities minted
    identities_created: AtomicU64,
    /// Tracks attached to an existing identity
    matches: AtomicU64,
    /// Candidates removed by the camera-network gate
    gated_candidates: AtomicU64,
    /// Transitions with a negative time gap (clock skew tolerated)
    clock_skew: AtomicU64,
    /// Histogram of accepted match distances
    match_distance_buckets: [AtomicU64; NUM_BUCKETS],
    /// Zones rejected at load time
    zones_rejected: AtomicU64,
    /// Event lines that could not be parsed
    events_lines_skipped: AtomicU64,
    events_confirmed: AtomicU64,
    events_ended: AtomicU64,
    events_enriched: AtomicU64,
    /// Events absorbed into a representative during dedup
    duplicates_merged: AtomicU64,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            files_loaded: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            tracks_loaded: AtomicU64::new(0),
            tracks_missing_embedding: AtomicU64::new(0),
            identities_created: AtomicU64::new(0),
            matches: AtomicU64::new(0),
            gated_candidates: AtomicU64::new(0),
            clock_skew: AtomicU64::new(0),
            match_distance_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            zones_rejected: AtomicU64::new(0),
            events_lines_skipped: AtomicU64::new(0),
            events_confirmed: AtomicU64::new(0),
            events_ended: AtomicU64::new(0),
            events_enriched: AtomicU64::new(0),
            duplicates_merged: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn record_file_loaded(&self, tracks: usize) {
        self.files_loaded.fetch_add(1, Ordering::Relaxed);
        self.tracks_loaded.fetch_add(tracks as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_file_skipped(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_missing_embedding(&self) {
        self.tracks_missing_embedding.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_identity_created(&self) {
        self.identities_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted match and its cosine distance
    #[inline]
    pub fn record_match(&self, distance: f64) {
        self.matches.fetch_add(1, Ordering::Relaxed);
        let milli = (distance.max(0.0) * 1000.0).round() as u64;
        self.match_distance_buckets[match_dist_bucket_index(milli)]
            .fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gated_candidate(&self) {
        self.gated_candidates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_clock_skew(&self) {
        self.clock_skew.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_zone_rejected(&self) {
        self.zones_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_line_skipped(&self) {
        self.events_lines_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_confirmed(&self) {
        self.events_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_ended(&self) {
        self.events_ended.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_enriched(&self) {
        self.events_enriched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicates_merged(&self, count: usize) {
        self.duplicates_merged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn identities_created(&self) -> u64 {
        self.identities_created.load(Ordering::Relaxed)
    }

    pub fn matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    pub fn gated_candidates(&self) -> u64 {
        self.gated_candidates.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters
    pub fn report(&self) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            files_loaded: load(&self.files_loaded),
            files_skipped: load(&self.files_skipped),
            tracks_loaded: load(&self.tracks_loaded),
            tracks_missing_embedding: load(&self.tracks_missing_embedding),
            identities_created: load(&self.identities_created),
            matches: load(&self.matches),
            gated_candidates: load(&self.gated_candidates),
            clock_skew: load(&self.clock_skew),
            match_distance_buckets: load_buckets(&self.match_distance_buckets),
            zones_rejected: load(&self.zones_rejected),
            events_lines_skipped: load(&self.events_lines_skipped),
            events_confirmed: load(&self.events_confirmed),
            events_ended: load(&self.events_ended),
            events_enriched: load(&self.events_enriched),
            duplicates_merged: load(&self.duplicates_merged),
        }
    }
}

/// Counter snapshot for logging and the run report
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub elapsed_ms: u64,
    pub files_loaded: u64,
    pub files_skipped: u64,
    pub tracks_loaded: u64,
    pub tracks_missing_embedding: u64,
    pub identities_created: u64,
    pub matches: u64,
    pub gated_candidates: u64,
    pub clock_skew: u64,
    /// Bounds (distance x 1000): ≤50, ≤100, ≤150, ≤200, ≤250, ≤300, ≤400,
    /// ≤600, ≤1000, ≤1500, >1500
    pub match_distance_buckets: [u64; NUM_BUCKETS],
    pub zones_rejected: u64,
    pub events_lines_skipped: u64,
    pub events_confirmed: u64,
    pub events_ended: u64,
    pub events_enriched: u64,
    pub duplicates_merged: u64,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            elapsed_ms = %self.elapsed_ms,
            files = %self.files_loaded,
            files_skipped = %self.files_skipped,
            tracks = %self.tracks_loaded,
            no_embedding = %self.tracks_missing_embedding,
            identities = %self.identities_created,
            matches = %self.matches,
            gated = %self.gated_candidates,
            clock_skew = %self.clock_skew,
            zones_rejected = %self.zones_rejected,
            confirmed = %self.events_confirmed,
            ended = %self.events_ended,
            enriched = %self.events_enriched,
            merged = %self.duplicates_merged,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        let summary = metrics.report();
        assert_eq!(summary.tracks_loaded, 0);
        assert_eq!(summary.match_distance_buckets.iter().sum::<u64>(), 0);
    }

    #[test]
    fn test_record_file_loaded() {
        let metrics = Metrics::new();
        metrics.record_file_loaded(3);
        metrics.record_file_loaded(2);
        metrics.record_file_skipped();

        let summary = metrics.report();
        assert_eq!(summary.files_loaded, 2);
        assert_eq!(summary.tracks_loaded, 5);
        assert_eq!(summary.files_skipped, 1);
    }

    #[test]
    fn test_match_distance_buckets() {
        assert_eq!(match_dist_bucket_index(0), 0);
        assert_eq!(match_dist_bucket_index(50), 0);
        assert_eq!(match_dist_bucket_index(51), 1);
        assert_eq!(match_dist_bucket_index(299), 5);
        assert_eq!(match_dist_bucket_index(5000), 10);

        let metrics = Metrics::new();
        metrics.record_match(0.02);
        metrics.record_match(0.29);
        let summary = metrics.report();
        assert_eq!(summary.matches, 2);
        assert_eq!(summary.match_distance_buckets[0], 1);
        assert_eq!(summary.match_distance_buckets[5], 1);
    }

    #[test]
    fn test_report_does_not_reset() {
        let metrics = Metrics::new();
        metrics.record_identity_created();
        metrics.record_duplicates_merged(2);
        assert_eq!(metrics.report().identities_created, 1);
        assert_eq!(metrics.report().duplicates_merged, 2);
    }

    #[test]
    fn test_summary_serializes() {
        let metrics = Metrics::new();
        metrics.record_event_confirmed();
        let value = serde_json::to_value(metrics.report()).unwrap();
        assert_eq!(value["events_confirmed"], 1);
        assert_eq!(value["match_distance_buckets"].as_array().unwrap().len(), NUM_BUCKETS);
    }
}
