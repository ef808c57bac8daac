//! Batch run orchestration
//!
//! load -> match -> scan (or read raw events) -> enrich -> dedup -> write ->
//! report. Every phase finishes its own output before the next one starts, so
//! a run stopped between phases leaves consistent files behind.

use crate::domain::event::Event;
use crate::domain::track::ChronologicalOrder;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::events::{read_events, write_events, EventWriter};
use crate::io::report::RunReport;
use crate::io::track_store::{LoadedTracks, TrackStore};
use crate::services::camera_network::CameraNetwork;
use crate::services::correlator::{AppearanceIndex, EnrichStats, EventCorrelator};
use crate::services::identity_matcher::{IdentityMatcher, IdentityRegistry, ResolveStats};
use crate::services::scanner::{IntrusionScanner, ScanStats};
use crate::services::zone_manager::ZoneManager;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// What a full run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub resolve: ResolveStats,
    pub scan: Option<ScanStats>,
    pub enrich: EnrichStats,
    pub events_written: usize,
    pub report: RunReport,
}

pub struct Pipeline {
    config: Config,
    version: String,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(config: Config, version: &str) -> Self {
        Self { config, version: version.to_string(), metrics: Arc::new(Metrics::new()) }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn load_zones(&self) -> anyhow::Result<ZoneManager> {
        let zones = ZoneManager::load(self.config.zones_file())
            .with_context(|| format!("Failed to load zones from {}", self.config.zones_file()))?;
        for _ in zones.rejected() {
            self.metrics.record_zone_rejected();
        }
        Ok(zones)
    }

    pub fn load_network(&self) -> CameraNetwork {
        CameraNetwork::load(self.config.camera_network_file())
    }

    fn store(&self) -> TrackStore {
        TrackStore::new(self.config.trajectories_dir())
    }

    pub fn load_tracks(&self) -> anyhow::Result<LoadedTracks> {
        self.store().load_all(Some(self.metrics.as_ref())).with_context(|| {
            format!("Failed to list trajectories in {}", self.config.trajectories_dir())
        })
    }

    /// Resolve identities over `loaded` and persist the new `global_id`s
    pub fn match_identities(
        &self,
        loaded: &mut LoadedTracks,
        network: &CameraNetwork,
    ) -> anyhow::Result<(IdentityRegistry, ResolveStats)> {
        let order = ChronologicalOrder::new(&loaded.files);
        let mut registry = IdentityRegistry::new(self.config.max_embeddings());
        let matcher = IdentityMatcher::new(self.config.match_threshold())
            .with_network(network)
            .with_selection(self.config.embedding_selection())
            .with_metrics(self.metrics.clone());
        let stats = matcher.resolve(&mut registry, &mut loaded.files, &order);

        self.store().save_all(loaded).context("Failed to save track files")?;
        Ok((registry, stats))
    }

    /// Rebuild raw events from trajectories and write them to the raw
    /// events file (replacing it, or appending when `append` is set)
    pub fn scan(
        &self,
        loaded: &LoadedTracks,
        zones: &ZoneManager,
        append: bool,
    ) -> anyhow::Result<(Vec<Event>, ScanStats)> {
        let scanner =
            IntrusionScanner::new(zones, self.config.intrusion_class(), self.config.min_duration_s())
                .with_zone_test(self.config.zone_test())
                .with_metrics(self.metrics.clone());
        let (mut events, stats) = scanner.scan(&loaded.files);

        let generated_at = chrono::Utc::now().to_rfc3339();
        for event in &mut events {
            event.timestamp.get_or_insert_with(|| generated_at.clone());
        }

        let path = self.config.events_file();
        if append {
            let written = EventWriter::new(path).append_all(&events);
            anyhow::ensure!(
                written == events.len(),
                "Only {written} of {} events appended to {path}",
                events.len()
            );
        } else {
            write_events(path, &events)
                .with_context(|| format!("Failed to write raw events to {path}"))?;
        }
        Ok((events, stats))
    }

    /// Read the raw events file
    pub fn read_raw_events(&self) -> anyhow::Result<Vec<Event>> {
        let path = self.config.events_file();
        let read = read_events(path).with_context(|| format!("Failed to read events {path}"))?;
        for _ in 0..read.skipped_lines {
            self.metrics.record_event_line_skipped();
        }
        Ok(read.events)
    }

    /// Enrich, deduplicate and write the output events file
    pub fn correlate(
        &self,
        mut events: Vec<Event>,
        index: &AppearanceIndex,
        network: &CameraNetwork,
        zones: &ZoneManager,
    ) -> anyhow::Result<(Vec<Event>, EnrichStats, usize)> {
        let correlator = EventCorrelator::new(index, network)
            .with_zones(zones)
            .with_dedup_window(self.config.dedup_window_s())
            .with_metrics(self.metrics.clone());

        let enrich = correlator.enrich(&mut events);
        let events = if self.config.dedup_enabled() { correlator.dedup(events) } else { events };

        let path = self.config.output_events_file();
        let written = write_events(path, &events)
            .with_context(|| format!("Failed to write correlated events to {path}"))?;
        Ok((events, enrich, written))
    }

    /// Full batch run
    pub fn run(&self, append_raw: bool) -> anyhow::Result<RunOutcome> {
        info!(
            site = %self.config.site_id(),
            config = %self.config.config_file(),
            trajectories = %self.config.trajectories_dir(),
            "run_started"
        );

        let zones = self.load_zones()?;
        let network = self.load_network();
        let mut loaded = self.load_tracks()?;

        let (_registry, resolve) = self.match_identities(&mut loaded, &network)?;

        let (raw_events, scan) = if self.config.reanalyze() {
            let (events, stats) = self.scan(&loaded, &zones, append_raw)?;
            (events, Some(stats))
        } else {
            (self.read_raw_events()?, None)
        };

        let index = AppearanceIndex::new(&loaded.files);
        let (events, enrich, events_written) =
            self.correlate(raw_events, &index, &network, &zones)?;

        let summary = self.metrics.report();
        summary.log();
        let report = RunReport::build(&self.config, &self.version, summary, &events, &index);
        report
            .write(self.config.report_file())
            .with_context(|| format!("Failed to write report {}", self.config.report_file()))?;

        info!(
            identities = %resolve.identities,
            events = %events_written,
            run_id = %report.run.run_id,
            "run_complete"
        );
        Ok(RunOutcome { resolve, scan, enrich, events_written, report })
    }
}
