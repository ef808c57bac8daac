//! Track data model: per-camera trajectories with appearance embeddings
//!
//! A [`TrackFile`] is one camera's output envelope; it owns the camera's
//! [`Track`]s. Unknown fields at every level are kept in `extra` so that the
//! read-modify-write of `global_id` does not lose upstream metadata.

use crate::domain::types::{deserialize_track_id, BBox, GlobalId, Point, TrackKey};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Class assumed for tracks written before class names were recorded
pub const DEFAULT_CLASS: &str = "person";

/// One observation of a track in one video frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_sync: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Frame {
    pub fn new(frame: u64, t: f64, bbox: BBox) -> Self {
        let [cx, cy] = bbox.center();
        Self {
            frame,
            x: Some(cx),
            y: Some(cy),
            t: Some(t),
            t_sync: None,
            bbox: Some(bbox),
            extra: Map::new(),
        }
    }

    /// Camera-local time; the frame index stands in when `t` was never recorded
    #[inline]
    pub fn local_time(&self) -> f64 {
        self.t.unwrap_or(self.frame as f64)
    }

    /// Synchronized time (falls back to local time before normalization)
    #[inline]
    pub fn sync_time(&self) -> f64 {
        self.t_sync.unwrap_or_else(|| self.local_time())
    }

    /// Center point: recorded `x`/`y`, else the bbox center
    pub fn center(&self) -> Option<Point> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some([x, y]),
            _ => self.bbox.map(|b| b.center()),
        }
    }
}

/// Appearance embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    #[inline]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    fn norm(&self) -> f64 {
        self.0.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>().sqrt()
    }

    /// Cosine distance in `[0, 2]` (0 = identical direction).
    ///
    /// Returns `None` for mismatched dimensions or zero-norm vectors, where
    /// the distance is undefined.
    pub fn cosine_distance(&self, other: &Embedding) -> Option<f64> {
        if self.dim() != other.dim() || self.0.is_empty() {
            return None;
        }
        let na = self.norm();
        let nb = other.norm();
        if na == 0.0 || nb == 0.0 {
            return None;
        }
        let dot: f64 =
            self.0.iter().zip(&other.0).map(|(&a, &b)| f64::from(a) * f64::from(b)).sum();
        Some((1.0 - dot / (na * nb)).clamp(0.0, 2.0))
    }

    /// L2-normalized mean of same-dimension embeddings
    pub fn mean(embeddings: &[Embedding]) -> Option<Embedding> {
        let first = embeddings.first()?;
        let dim = first.dim();
        let mut acc = vec![0.0f64; dim];
        let mut count = 0usize;
        for e in embeddings.iter().filter(|e| e.dim() == dim) {
            for (a, &v) in acc.iter_mut().zip(&e.0) {
                *a += f64::from(v);
            }
            count += 1;
        }
        if count == 0 || dim == 0 {
            return None;
        }
        let norm = acc.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return None;
        }
        Some(Embedding(acc.into_iter().map(|v| (v / norm) as f32).collect()))
    }
}

/// How a track's embeddings are reduced to the one vector used for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSelection {
    /// Earliest embedding of the track
    #[default]
    First,
    /// Normalized mean of all the track's embeddings
    Mean,
}

/// One continuous single-camera observation of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(deserialize_with = "deserialize_track_id")]
    pub track_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeddings: Vec<Embedding>,
    #[serde(
        default,
        deserialize_with = "deserialize_global_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub global_id: Option<GlobalId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Track {
    pub fn new(track_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            class_name: None,
            frames: Vec::new(),
            embeddings: Vec::new(),
            global_id: None,
            extra: Map::new(),
        }
    }

    /// Class name, with legacy tracks treated as persons
    pub fn class_or_default(&self) -> &str {
        self.class_name.as_deref().unwrap_or(DEFAULT_CLASS)
    }

    /// Earliest synchronized time of the track
    pub fn t_start_sync(&self) -> Option<f64> {
        self.frames.iter().map(Frame::sync_time).reduce(f64::min)
    }

    /// Latest synchronized time of the track
    pub fn t_end_sync(&self) -> Option<f64> {
        self.frames.iter().map(Frame::sync_time).reduce(f64::max)
    }

    /// Frame indices strictly increase along the track
    pub fn frames_in_order(&self) -> bool {
        self.frames.windows(2).all(|w| w[0].frame < w[1].frame)
    }

    /// Vector used for identity matching, or `None` when the track has no
    /// usable embedding
    pub fn matching_embedding(&self, selection: EmbeddingSelection) -> Option<Embedding> {
        match selection {
            EmbeddingSelection::First => self.embeddings.first().cloned(),
            EmbeddingSelection::Mean => Embedding::mean(&self.embeddings),
        }
    }
}

fn deserialize_global_id<'de, D>(deserializer: D) -> Result<Option<GlobalId>, D::Error>
where
    D: Deserializer<'de>,
{
    // Older exports wrote ids as strings
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().map(GlobalId),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok().map(GlobalId),
        _ => None,
    })
}

/// Per-camera track store document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFile {
    #[serde(default)]
    pub video_id: String,
    #[serde(default)]
    pub sync_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_applied: Option<i64>,
    #[serde(default)]
    pub trajectories: Vec<Track>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackFile {
    pub fn new(video_id: impl Into<String>, sync_offset: f64) -> Self {
        Self {
            video_id: video_id.into(),
            sync_offset,
            rotation_applied: None,
            trajectories: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Fill missing `t_sync` values as `t_local + sync_offset`
    pub fn normalize_times(&mut self) -> usize {
        let offset = self.sync_offset;
        let mut filled = 0;
        for frame in self.trajectories.iter_mut().flat_map(|t| t.frames.iter_mut()) {
            if frame.t_sync.is_none() {
                frame.t_sync = Some(frame.local_time() + offset);
                filled += 1;
            }
        }
        filled
    }

    pub fn key(&self, track: &Track) -> TrackKey {
        TrackKey::new(self.video_id.clone(), track.track_id.clone())
    }
}

/// Position of one track inside a slice of [`TrackFile`]s
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRef {
    pub file: usize,
    pub track: usize,
    pub t_start_sync: f64,
}

/// Tracks of all cameras in non-decreasing first-appearance `t_sync` order.
///
/// Identity matching is greedy and online: it only compares against
/// identities already observed, so it must be fed in this order. Ties keep
/// input order (stable sort). Tracks without frames have no timestamp and are
/// left out; [`ChronologicalOrder::skipped`] counts them.
#[derive(Debug, Clone, Default)]
pub struct ChronologicalOrder {
    refs: Vec<TrackRef>,
    skipped: usize,
}

impl ChronologicalOrder {
    pub fn new(files: &[TrackFile]) -> Self {
        let mut refs: Vec<TrackRef> = files
            .iter()
            .enumerate()
            .flat_map(|(fi, file)| {
                file.trajectories.iter().enumerate().filter_map(move |(ti, track)| {
                    track.t_start_sync().map(|t| TrackRef { file: fi, track: ti, t_start_sync: t })
                })
            })
            .collect();
        refs.sort_by(|a, b| a.t_start_sync.total_cmp(&b.t_start_sync));
        let total: usize = files.iter().map(|f| f.trajectories.len()).sum();
        Self { skipped: total - refs.len(), refs }
    }

    /// Tracks left out because they have no frames
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
