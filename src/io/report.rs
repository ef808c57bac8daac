//! Run report (JSON)
//!
//! Summarizes one run: configuration echo, counters, events by type, class,
//! zone and camera, and the identities with the cameras each one visited.

use crate::domain::error::{CorrelatorError, Result};
use crate::domain::event::Event;
use crate::domain::types::normalize_camera_id;
use crate::infra::config::Config;
use crate::infra::metrics::RunSummary;
use crate::services::correlator::AppearanceIndex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub generated_at: String,
    pub site_id: String,
    pub version: String,
    pub config_file: String,
}

/// Settings that shaped the results
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEcho {
    pub trajectories_dir: String,
    pub zones_file: String,
    pub camera_network_file: String,
    pub match_threshold: f64,
    pub max_embeddings: usize,
    pub min_duration_s: f64,
    pub intrusion_class: String,
    pub dedup_enabled: bool,
    pub dedup_window_s: f64,
}

impl From<&Config> for ConfigEcho {
    fn from(config: &Config) -> Self {
        Self {
            trajectories_dir: config.trajectories_dir().to_string(),
            zones_file: config.zones_file().to_string(),
            camera_network_file: config.camera_network_file().to_string(),
            match_threshold: config.match_threshold(),
            max_embeddings: config.max_embeddings(),
            min_duration_s: config.min_duration_s(),
            intrusion_class: config.intrusion_class().to_string(),
            dedup_enabled: config.dedup_enabled(),
            dedup_window_s: config.dedup_window_s(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventsSummary {
    pub total: usize,
    pub with_global_id: usize,
    pub merged_duplicates: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_class: BTreeMap<String, usize>,
    pub by_zone: BTreeMap<String, usize>,
    pub by_camera: BTreeMap<String, usize>,
}

impl EventsSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let mut summary = Self { total: events.len(), ..Default::default() };
        for event in events {
            *summary.by_type.entry(event.event_type.as_str().to_string()).or_default() += 1;
            let class = event.class_name.as_deref().unwrap_or(UNKNOWN).to_string();
            *summary.by_class.entry(class).or_default() += 1;
            *summary.by_zone.entry(event.zone_id.clone()).or_default() += 1;
            *summary.by_camera.entry(event.video_id.clone()).or_default() += 1;
            if event.global_id.is_some() {
                summary.with_global_id += 1;
            }
            summary.merged_duplicates += event.merged_from.len();
        }
        summary
    }
}

/// Cameras one identity was seen on, in time order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityPath {
    pub global_id: u64,
    pub tracks: usize,
    /// Consecutive sightings on the same camera are collapsed
    pub cameras: Vec<String>,
    pub t_first_sync: Option<f64>,
    pub t_last_sync: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IdentitiesSummary {
    pub total_unique_global_ids: usize,
    pub tracks_total: usize,
    pub tracks_with_global_id: usize,
    /// Distinct identities seen per camera
    pub per_camera: BTreeMap<String, usize>,
    /// Identities seen on more than one camera
    pub multi_camera: usize,
    pub paths: Vec<IdentityPath>,
}

impl IdentitiesSummary {
    pub fn from_index(index: &AppearanceIndex) -> Self {
        let mut summary = Self { tracks_total: index.len(), ..Default::default() };
        let mut per_camera: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();

        for gid in index.identities() {
            let mut path = IdentityPath {
                global_id: gid.0,
                tracks: 0,
                cameras: Vec::new(),
                t_first_sync: None,
                t_last_sync: None,
            };
            let mut distinct: BTreeSet<String> = BTreeSet::new();
            let mut last_camera: Option<String> = None;
            for app in index.appearances_of(gid) {
                path.tracks += 1;
                per_camera.entry(app.video_id.clone()).or_default().insert(gid.0);
                let camera = normalize_camera_id(&app.video_id);
                if last_camera.as_deref() != Some(camera.as_str()) {
                    path.cameras.push(app.video_id.clone());
                }
                distinct.insert(camera.clone());
                last_camera = Some(camera);
                path.t_first_sync = min_opt(path.t_first_sync, app.t_start_sync);
                path.t_last_sync = max_opt(path.t_last_sync, app.t_end_sync);
            }
            summary.tracks_with_global_id += path.tracks;
            if distinct.len() > 1 {
                summary.multi_camera += 1;
            }
            summary.paths.push(path);
        }

        summary.total_unique_global_ids = summary.paths.len();
        summary.per_camera = per_camera.into_iter().map(|(cam, ids)| (cam, ids.len())).collect();
        summary
    }
}

fn min_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

fn max_opt(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: RunInfo,
    pub config: ConfigEcho,
    pub metrics: RunSummary,
    pub events: EventsSummary,
    pub identities: IdentitiesSummary,
}

impl RunReport {
    pub fn build(
        config: &Config,
        version: &str,
        metrics: RunSummary,
        events: &[Event],
        index: &AppearanceIndex,
    ) -> Self {
        Self {
            run: RunInfo {
                run_id: Uuid::now_v7().to_string(),
                generated_at: chrono::Utc::now().to_rfc3339(),
                site_id: config.site_id().to_string(),
                version: version.to_string(),
                config_file: config.config_file().to_string(),
            },
            config: ConfigEcho::from(config),
            metrics,
            events: EventsSummary::from_events(events),
            identities: IdentitiesSummary::from_index(index),
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| CorrelatorError::io(parent, e))?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .map_err(|e| CorrelatorError::io(path, e))?;
        info!(
            path = %path.display(),
            run_id = %self.run.run_id,
            events = %self.events.total,
            identities = %self.identities.total_unique_global_ids,
            "run_report_written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;
    use crate::domain::track::{Frame, Track, TrackFile};
    use crate::domain::types::{BBox, GlobalId, TrackKey};
    use crate::infra::metrics::Metrics;
    use tempfile::tempdir;

    fn track(id: &str, gid: Option<u64>, t: f64) -> Track {
        let mut track = Track::new(id);
        track.frames.push(Frame::new(0, t, BBox::new(0.0, 0.0, 1.0, 1.0)));
        track.frames.push(Frame::new(1, t + 1.0, BBox::new(0.0, 0.0, 1.0, 1.0)));
        track.global_id = gid.map(GlobalId);
        track
    }

    fn index() -> AppearanceIndex {
        let mut hall = TrackFile::new("HALL", 0.0);
        hall.trajectories = vec![track("1", Some(1), 0.0), track("2", Some(2), 5.0), track("3", None, 6.0)];
        let mut corridor = TrackFile::new("CORRIDOR", 0.0);
        corridor.trajectories = vec![track("8", Some(1), 3.0), track("9", Some(1), 4.5)];
        let mut files = vec![hall, corridor];
        for f in &mut files {
            f.normalize_times();
        }
        AppearanceIndex::new(&files)
    }

    #[test]
    fn test_identities_summary() {
        let summary = IdentitiesSummary::from_index(&index());
        assert_eq!(summary.total_unique_global_ids, 2);
        assert_eq!(summary.tracks_total, 5);
        assert_eq!(summary.tracks_with_global_id, 4);
        assert_eq!(summary.multi_camera, 1);
        assert_eq!(summary.per_camera["HALL"], 2);
        assert_eq!(summary.per_camera["CORRIDOR"], 1);

        let first = &summary.paths[0];
        assert_eq!(first.global_id, 1);
        assert_eq!(first.tracks, 3);
        // Two consecutive CORRIDOR tracks collapse into one hop
        assert_eq!(first.cameras, vec!["HALL", "CORRIDOR"]);
        assert_eq!(first.t_first_sync, Some(0.0));
        assert_eq!(first.t_last_sync, Some(5.5));
    }

    #[test]
    fn test_events_summary() {
        let key = TrackKey::new("HALL", "1");
        let mut confirmed = Event::new(EventKind::IntrusionConfirmed, &key, "Z1", 1);
        confirmed.class_name = Some("person".to_string());
        confirmed.global_id = Some(GlobalId(1));
        let ended = Event::new(EventKind::IntrusionEnded, &key, "Z1", 9);

        let summary = EventsSummary::from_events(&[confirmed, ended]);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.with_global_id, 1);
        assert_eq!(summary.by_type["intrusion_confirmed"], 1);
        assert_eq!(summary.by_class["person"], 1);
        assert_eq!(summary.by_class["unknown"], 1);
        assert_eq!(summary.by_zone["Z1"], 2);
        assert_eq!(summary.by_camera["HALL"], 2);
    }

    #[test]
    fn test_write_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join("run_report.json");
        let config = Config::default();
        let report =
            RunReport::build(&config, "0.1.0-test", Metrics::new().report(), &[], &index());
        report.write(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["run"]["version"], "0.1.0-test");
        assert_eq!(raw["run"]["run_id"].as_str().unwrap().len(), 36);
        assert_eq!(raw["config"]["match_threshold"], 0.3);
        assert_eq!(raw["events"]["total"], 0);
        assert_eq!(raw["identities"]["total_unique_global_ids"], 2);
        assert!(raw["metrics"]["tracks_loaded"].is_number());
    }
}
