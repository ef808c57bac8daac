//! Rebuild intrusion events from stored trajectories
//!
//! Runs every track of the watched class through the zone queries and the
//! dwell-time state machine, then flushes the track after its last frame so
//! that tracks vanishing inside a zone still end their intrusion.

use crate::domain::event::{Event, EventKind};
use crate::domain::track::{Frame, TrackFile};
use crate::domain::types::ZoneSet;
use crate::infra::config::ZoneTest;
use crate::infra::metrics::Metrics;
use crate::services::intrusion::{IntrusionStateMachine, Observation};
use crate::services::zone_manager::ZoneManager;
use std::sync::Arc;
use tracing::info;

/// Counters of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub videos_scanned: usize,
    pub tracks_scanned: usize,
    pub frames_scanned: usize,
}

pub struct IntrusionScanner<'a> {
    zones: &'a ZoneManager,
    zone_test: ZoneTest,
    class_name: String,
    min_duration: f64,
    metrics: Option<Arc<Metrics>>,
}

impl<'a> IntrusionScanner<'a> {
    pub fn new(zones: &'a ZoneManager, class_name: &str, min_duration: f64) -> Self {
        Self {
            zones,
            zone_test: ZoneTest::Bbox,
            class_name: class_name.to_string(),
            min_duration,
            metrics: None,
        }
    }

    pub fn with_zone_test(mut self, zone_test: ZoneTest) -> Self {
        self.zone_test = zone_test;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn zones_at(&self, frame: &Frame, camera: &str) -> Option<ZoneSet> {
        match self.zone_test {
            ZoneTest::Bbox => frame.bbox.map(|b| self.zones.bbox_intersects_zones(&b, Some(camera))),
            ZoneTest::Center => {
                frame.center().map(|[x, y]| self.zones.point_in_zones(x, y, Some(camera)))
            }
        }
    }

    /// Scan all tracks; events come out per track, in frame order
    pub fn scan(&self, files: &[TrackFile]) -> (Vec<Event>, ScanStats) {
        let mut machine = IntrusionStateMachine::new(self.min_duration);
        let mut events = Vec::new();
        let mut stats = ScanStats::default();

        for file in files {
            stats.videos_scanned += 1;
            let camera = file.video_id.as_str();

            for track in &file.trajectories {
                if track.frames.is_empty() || track.class_or_default() != self.class_name {
                    continue;
                }
                stats.tracks_scanned += 1;
                let key = file.key(track);
                let class_name = Some(track.class_or_default());
                let mut last: Option<Observation<'_>> = None;

                for frame in &track.frames {
                    let Some(zone_ids) = self.zones_at(frame, camera) else {
                        continue;
                    };
                    let obs = Observation {
                        key: &key,
                        frame_id: frame.frame,
                        t: frame.local_time(),
                        t_sync: frame.sync_time(),
                        class_name,
                    };
                    events.extend(machine.update(&obs, &zone_ids));
                    last = Some(obs);
                    stats.frames_scanned += 1;
                }

                if let Some(obs) = last {
                    events.extend(machine.flush(&obs));
                }
            }
        }

        for event in &mut events {
            event.zone_name = self.zones.get(&event.zone_id).map(|z| z.name.clone());
            if let Some(m) = &self.metrics {
                match event.event_type {
                    EventKind::IntrusionConfirmed => m.record_event_confirmed(),
                    EventKind::IntrusionEnded => m.record_event_ended(),
                    EventKind::Unknown => {}
                }
            }
        }

        info!(
            videos = %stats.videos_scanned,
            tracks = %stats.tracks_scanned,
            frames = %stats.frames_scanned,
            events = %events.len(),
            class_name = %self.class_name,
            "intrusion_scan_complete"
        );
        (events, stats)
    }
}
