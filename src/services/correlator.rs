//! Event enrichment and cross-camera deduplication
//!
//! Runs once identities are final. Enrichment joins each event to its track
//! to attach the `global_id` and the cameras the identity was seen on just
//! before and just after. Deduplication merges events raised for the same
//! intrusion by overlapping cameras.

use crate::domain::event::{CameraHop, Event, EventKind};
use crate::domain::track::TrackFile;
use crate::domain::types::{normalize_camera_id, same_camera, GlobalId, TrackKey};
use crate::infra::metrics::Metrics;
use crate::services::camera_network::CameraNetwork;
use crate::services::zone_manager::ZoneManager;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Default maximum t_sync gap between duplicate events (seconds)
pub const DEFAULT_DEDUP_WINDOW_S: f64 = 2.0;

/// One track, reduced to what enrichment and reporting need
#[derive(Debug, Clone, PartialEq)]
pub struct TrackAppearance {
    pub video_id: String,
    pub track_id: String,
    pub class_name: Option<String>,
    pub global_id: Option<GlobalId>,
    pub t_start_sync: Option<f64>,
    pub t_end_sync: Option<f64>,
}

impl TrackAppearance {
    fn to_hop(&self) -> CameraHop {
        CameraHop {
            video_id: self.video_id.clone(),
            track_id: self.track_id.clone(),
            t_start_sync: self.t_start_sync,
            t_end_sync: self.t_end_sync,
        }
    }
}

/// Lookup of tracks by key and by identity
#[derive(Debug, Clone, Default)]
pub struct AppearanceIndex {
    appearances: Vec<TrackAppearance>,
    by_key: FxHashMap<TrackKey, usize>,
    /// Per identity, appearance indices sorted by `t_start_sync` (unknown last)
    by_identity: BTreeMap<GlobalId, Vec<usize>>,
}

impl AppearanceIndex {
    pub fn new(files: &[TrackFile]) -> Self {
        let mut index = Self::default();
        for file in files {
            for track in &file.trajectories {
                let appearance = TrackAppearance {
                    video_id: file.video_id.clone(),
                    track_id: track.track_id.clone(),
                    class_name: track.class_name.clone(),
                    global_id: track.global_id,
                    t_start_sync: track.t_start_sync(),
                    t_end_sync: track.t_end_sync(),
                };
                let i = index.appearances.len();
                index.by_key.insert(lookup_key(&appearance.video_id, &appearance.track_id), i);
                if let Some(gid) = appearance.global_id {
                    index.by_identity.entry(gid).or_default().push(i);
                }
                index.appearances.push(appearance);
            }
        }

        let appearances = &index.appearances;
        for indices in index.by_identity.values_mut() {
            indices.sort_by(|&a, &b| {
                let ta = appearances[a].t_start_sync.unwrap_or(f64::INFINITY);
                let tb = appearances[b].t_start_sync.unwrap_or(f64::INFINITY);
                ta.total_cmp(&tb)
            });
        }
        index
    }

    pub fn get(&self, video_id: &str, track_id: &str) -> Option<&TrackAppearance> {
        self.by_key.get(&lookup_key(video_id, track_id)).map(|&i| &self.appearances[i])
    }

    /// Appearances of one identity in time order
    pub fn appearances_of(&self, global_id: GlobalId) -> impl Iterator<Item = &TrackAppearance> {
        self.by_identity.get(&global_id).into_iter().flatten().map(|&i| &self.appearances[i])
    }

    /// Identities in ascending id order
    pub fn identities(&self) -> impl Iterator<Item = GlobalId> + '_ {
        self.by_identity.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.appearances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appearances.is_empty()
    }
}

fn lookup_key(video_id: &str, track_id: &str) -> TrackKey {
    TrackKey::new(normalize_camera_id(video_id), track_id.trim())
}

/// True if `video_id` is one of the (normalized) cameras in `list`
fn listed(list: &[&str], video_id: &str) -> bool {
    let cam = normalize_camera_id(video_id);
    list.iter().any(|&c| c == cam)
}

/// Counters of one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    pub events_total: usize,
    pub events_enriched: usize,
    pub events_with_global_id: usize,
}

pub struct EventCorrelator<'a> {
    index: &'a AppearanceIndex,
    network: &'a CameraNetwork,
    zones: Option<&'a ZoneManager>,
    dedup_window_s: f64,
    metrics: Option<Arc<Metrics>>,
}

impl<'a> EventCorrelator<'a> {
    pub fn new(index: &'a AppearanceIndex, network: &'a CameraNetwork) -> Self {
        Self { index, network, zones: None, dedup_window_s: DEFAULT_DEDUP_WINDOW_S, metrics: None }
    }

    /// Fill missing zone names from the zone registry
    pub fn with_zones(mut self, zones: &'a ZoneManager) -> Self {
        self.zones = Some(zones);
        self
    }

    pub fn with_dedup_window(mut self, seconds: f64) -> Self {
        self.dedup_window_s = seconds;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attach `global_id`, `class_name`, `zone_name` and the neighboring
    /// camera hops to every event whose track is known.
    ///
    /// The enrichment fields are recomputed from the tracks on every pass,
    /// so running it again leaves them unchanged. Events whose track cannot
    /// be found are left as they are.
    pub fn enrich(&self, events: &mut [Event]) -> EnrichStats {
        let mut stats = EnrichStats { events_total: events.len(), ..Default::default() };

        for event in events.iter_mut() {
            if event.zone_name.is_none() {
                if let Some(zone) = self.zones.and_then(|z| z.get(&event.zone_id)) {
                    event.zone_name = Some(zone.name.clone());
                }
            }

            let Some(app) = self.index.get(&event.video_id, &event.track_id) else {
                debug!(video_id = %event.video_id, track_id = %event.track_id, "event_track_unknown");
                continue;
            };

            if event.class_name.is_none() {
                event.class_name = app.class_name.clone();
            }
            event.global_id = app.global_id;
            let (prev, next) = match (app.global_id, event.t_sync) {
                (Some(gid), Some(t)) => self.neighbors(gid, &event.video_id, t),
                _ => (None, None),
            };
            event.prev_camera = prev;
            event.next_camera = next;
            event.enriched = true;

            stats.events_enriched += 1;
            if event.global_id.is_some() {
                stats.events_with_global_id += 1;
            }
            if let Some(m) = &self.metrics {
                m.record_event_enriched();
            }
        }

        info!(
            events = %stats.events_total,
            enriched = %stats.events_enriched,
            with_global_id = %stats.events_with_global_id,
            "events_enriched"
        );
        stats
    }

    /// Closest preceding and following sighting of `global_id` on another
    /// camera, restricted to declared neighbors when the network has edges
    fn neighbors(
        &self,
        global_id: GlobalId,
        camera: &str,
        t_sync: f64,
    ) -> (Option<CameraHop>, Option<CameraHop>) {
        let restrict = !self.network.is_open();
        let sources = self.network.neighbors_in(camera);
        let targets = self.network.neighbors_out(camera);

        let mut prev: Option<&TrackAppearance> = None;
        let mut next: Option<&TrackAppearance> = None;
        for app in self.index.appearances_of(global_id) {
            if same_camera(&app.video_id, camera) {
                continue;
            }
            if let Some(end) = app.t_end_sync {
                let closer = prev.and_then(|p| p.t_end_sync).map_or(true, |best| end > best);
                if end < t_sync && closer && (!restrict || listed(&sources, &app.video_id)) {
                    prev = Some(app);
                }
            }
            if let Some(start) = app.t_start_sync {
                let closer = next.and_then(|n| n.t_start_sync).map_or(true, |best| start < best);
                if start > t_sync && closer && (!restrict || listed(&targets, &app.video_id)) {
                    next = Some(app);
                }
            }
        }
        (prev.map(TrackAppearance::to_hop), next.map(TrackAppearance::to_hop))
    }

    /// Merge duplicate events, returning representatives in t_sync order.
    ///
    /// Two events are duplicates when they share `global_id`, `event_type`
    /// and zone (normalized name, else id), their cameras are the same or
    /// adjacent, and their t_sync values are at most the window apart. The
    /// earliest event of a group is kept and records the others in
    /// `merged_from`. Events without `global_id` or `t_sync` never merge and
    /// keep their relative order after the timed ones.
    pub fn dedup(&self, events: Vec<Event>) -> Vec<Event> {
        let total = events.len();
        let mut ordered = events;
        // Stable: ties keep input order
        ordered.sort_by(|a, b| match (a.t_sync, b.t_sync) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let mut kept: Vec<Event> = Vec::with_capacity(ordered.len());
        let mut groups: FxHashMap<(GlobalId, EventKind, String), Vec<usize>> = FxHashMap::default();
        let mut merged = 0usize;

        for event in ordered {
            let (Some(gid), Some(t)) = (event.global_id, event.t_sync) else {
                kept.push(event);
                continue;
            };
            let group = groups.entry((gid, event.event_type, event.zone_key())).or_default();

            let representative = group.iter().copied().find(|&r| {
                let rep = &kept[r];
                let close = rep.t_sync.is_some_and(|rt| (t - rt).abs() <= self.dedup_window_s);
                close
                    && (same_camera(&rep.video_id, &event.video_id)
                        || self.network.are_adjacent(&rep.video_id, &event.video_id))
            });

            match representative {
                Some(r) => {
                    debug!(
                        global_id = %gid,
                        kept = %kept[r].key(),
                        merged = %event.key(),
                        zone = %event.zone_id,
                        "event_merged"
                    );
                    let rep = &mut kept[r];
                    rep.merged_from.push(event.to_merged_ref());
                    rep.merged_from.extend(event.merged_from);
                    merged += 1;
                }
                None => {
                    group.push(kept.len());
                    kept.push(event);
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.record_duplicates_merged(merged);
        }
        info!(
            events_in = %total,
            events_out = %kept.len(),
            merged = %merged,
            window_s = %self.dedup_window_s,
            "events_deduplicated"
        );
        kept
    }
}
