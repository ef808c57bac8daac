//! Cross-camera identity resolution
//!
//! Greedy online clustering: each track, taken in first-appearance order,
//! either joins the closest existing identity (minimum cosine distance over
//! that identity's recent embeddings) or opens a new one. Earlier decisions
//! are never revisited.
//!
//! Topology gating:
//! - candidates whose `last_camera -> camera` transition is disallowed for
//!   the elapsed time are skipped before any distance is computed
//! - if the gate removes the best candidate, the next best one under the
//!   threshold still wins

use crate::domain::track::{ChronologicalOrder, Embedding, EmbeddingSelection, TrackFile};
use crate::domain::types::GlobalId;
use crate::infra::metrics::Metrics;
use crate::services::camera_network::CameraNetwork;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ring buffer size used when none is configured
pub const DEFAULT_MAX_EMBEDDINGS: usize = 10;

/// One physical entity seen across cameras
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalIdentity {
    pub global_id: GlobalId,
    embeddings: VecDeque<Embedding>,
    pub last_seen: f64,
    pub last_camera: Option<String>,
}

impl GlobalIdentity {
    pub fn embeddings(&self) -> impl Iterator<Item = &Embedding> {
        self.embeddings.iter()
    }

    pub fn embedding_count(&self) -> usize {
        self.embeddings.len()
    }

    /// Minimum distance to any stored embedding; `None` when no stored
    /// embedding is comparable
    fn min_distance(&self, embedding: &Embedding) -> Option<f64> {
        self.embeddings.iter().filter_map(|e| e.cosine_distance(embedding)).reduce(f64::min)
    }
}

/// Identity table of one run, in ascending `global_id` order
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    identities: Vec<GlobalIdentity>,
    max_embeddings: usize,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EMBEDDINGS)
    }
}

impl IdentityRegistry {
    pub fn new(max_embeddings: usize) -> Self {
        Self { identities: Vec::new(), max_embeddings: max_embeddings.max(1) }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlobalIdentity> {
        self.identities.iter()
    }

    pub fn get(&self, global_id: GlobalId) -> Option<&GlobalIdentity> {
        // Ids are dense and start at 1
        let index = usize::try_from(global_id.0).ok()?.checked_sub(1)?;
        self.identities.get(index)
    }

    fn create(&mut self, embedding: Embedding, timestamp: f64, camera: Option<&str>) -> GlobalId {
        let global_id = GlobalId(self.identities.len() as u64 + 1);
        self.identities.push(GlobalIdentity {
            global_id,
            embeddings: VecDeque::from([embedding]),
            last_seen: timestamp,
            last_camera: camera.map(str::to_string),
        });
        global_id
    }

    fn absorb(&mut self, index: usize, embedding: Embedding, timestamp: f64, camera: Option<&str>) {
        let max = self.max_embeddings;
        let identity = &mut self.identities[index];
        identity.embeddings.push_back(embedding);
        while identity.embeddings.len() > max {
            identity.embeddings.pop_front();
        }
        identity.last_seen = timestamp;
        identity.last_camera = camera.map(str::to_string);
    }
}

/// Outcome of resolving a whole track set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub tracks_matched: usize,
    pub tracks_without_embedding: usize,
    /// Tracks with no frames, hence no first-appearance time
    pub tracks_without_frames: usize,
    pub identities: usize,
}

/// Greedy embedding matcher
pub struct IdentityMatcher<'a> {
    threshold: f64,
    network: Option<&'a CameraNetwork>,
    selection: EmbeddingSelection,
    metrics: Option<Arc<Metrics>>,
}

impl<'a> IdentityMatcher<'a> {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, network: None, selection: EmbeddingSelection::First, metrics: None }
    }

    pub fn with_network(mut self, network: &'a CameraNetwork) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_selection(mut self, selection: EmbeddingSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Assign `embedding`, observed at `timestamp` (t_sync) on `camera`, to
    /// an identity and return its id.
    ///
    /// Candidates are visited in ascending id order; the first one with the
    /// strictly smallest distance wins. The embedding joins it when that
    /// distance is below the threshold, otherwise a new identity is created.
    pub fn match_embedding(
        &self,
        registry: &mut IdentityRegistry,
        embedding: &Embedding,
        timestamp: f64,
        camera: Option<&str>,
    ) -> GlobalId {
        let mut best: Option<(usize, f64)> = None;

        for (i, identity) in registry.identities.iter().enumerate() {
            if !self.passes_gate(identity, timestamp, camera) {
                continue;
            }
            let Some(distance) = identity.min_distance(embedding) else {
                continue;
            };
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((i, distance));
            }
        }

        match best {
            Some((index, distance)) if distance < self.threshold => {
                registry.absorb(index, embedding.clone(), timestamp, camera);
                let global_id = registry.identities[index].global_id;
                debug!(
                    global_id = %global_id,
                    distance = %format!("{distance:.4}"),
                    camera = ?camera,
                    "identity_matched"
                );
                if let Some(m) = &self.metrics {
                    m.record_match(distance);
                }
                global_id
            }
            _ => {
                let global_id = registry.create(embedding.clone(), timestamp, camera);
                debug!(
                    global_id = %global_id,
                    best_distance = ?best.map(|(_, d)| d),
                    camera = ?camera,
                    "identity_created"
                );
                if let Some(m) = &self.metrics {
                    m.record_identity_created();
                }
                global_id
            }
        }
    }

    fn passes_gate(&self, identity: &GlobalIdentity, timestamp: f64, camera: Option<&str>) -> bool {
        let Some(network) = self.network else {
            return true;
        };
        let mut dt = timestamp - identity.last_seen;
        if dt < 0.0 {
            // Imperfect ordering or clock offsets
            dt = -dt;
            if let Some(m) = &self.metrics {
                m.record_clock_skew();
            }
        }
        let allowed = network.allowed_transition(identity.last_camera.as_deref(), camera, dt);
        if !allowed {
            debug!(
                global_id = %identity.global_id,
                from = ?identity.last_camera,
                to = ?camera,
                dt_s = %format!("{dt:.2}"),
                "transition_gated"
            );
            if let Some(m) = &self.metrics {
                m.record_gated_candidate();
            }
        }
        allowed
    }

    /// Resolve every track of `files` in chronological order, rewriting
    /// each track's `global_id`.
    ///
    /// Tracks without a usable embedding (or without frames) end up with
    /// `global_id = None`.
    pub fn resolve(
        &self,
        registry: &mut IdentityRegistry,
        files: &mut [TrackFile],
        order: &ChronologicalOrder,
    ) -> ResolveStats {
        for track in files.iter_mut().flat_map(|f| f.trajectories.iter_mut()) {
            track.global_id = None;
        }

        let mut stats =
            ResolveStats { tracks_without_frames: order.skipped(), ..ResolveStats::default() };
        if stats.tracks_without_frames > 0 {
            warn!(tracks = %stats.tracks_without_frames, "tracks_without_frames_unmatched");
        }
        for r in order.iter() {
            let Some(file) = files.get_mut(r.file) else {
                continue;
            };
            let camera = file.video_id.clone();
            let Some(track) = file.trajectories.get_mut(r.track) else {
                continue;
            };

            let Some(embedding) = track.matching_embedding(self.selection) else {
                debug!(camera = %camera, track_id = %track.track_id, "track_without_embedding");
                stats.tracks_without_embedding += 1;
                if let Some(m) = &self.metrics {
                    m.record_missing_embedding();
                }
                continue;
            };

            let global_id =
                self.match_embedding(registry, &embedding, r.t_start_sync, Some(&camera));
            track.global_id = Some(global_id);
            stats.tracks_matched += 1;
        }
        stats.identities = registry.len();

        info!(
            tracks = %stats.tracks_matched,
            without_embedding = %stats.tracks_without_embedding,
            without_frames = %stats.tracks_without_frames,
            identities = %stats.identities,
            threshold = %self.threshold,
            gated = %self.network.is_some_and(|n| !n.is_open()),
            "identities_resolved"
        );
        stats
    }
}
