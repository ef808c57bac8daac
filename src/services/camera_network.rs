//! Camera topology used to gate implausible identity matches
//!
//! A network with no edges is "open": every transition is allowed and no
//! camera has declared neighbors. Camera ids are compared after
//! normalization, like zone cameras.

use crate::domain::types::normalize_camera_id;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Directed allowed transition with an optional time window (seconds)
#[derive(Debug, Clone, PartialEq)]
pub struct CameraEdge {
    pub from: String,
    pub to: String,
    pub min_s: Option<f64>,
    pub max_s: Option<f64>,
}

impl CameraEdge {
    pub fn new(from: &str, to: &str) -> Self {
        Self { from: normalize_camera_id(from), to: normalize_camera_id(to), min_s: None, max_s: None }
    }

    pub fn with_window(mut self, min_s: Option<f64>, max_s: Option<f64>) -> Self {
        self.min_s = min_s;
        self.max_s = max_s;
        self
    }

    fn has_window(&self) -> bool {
        self.min_s.is_some() || self.max_s.is_some()
    }

    /// Missing bounds are open-ended
    fn window_contains(&self, dt: f64) -> bool {
        dt >= self.min_s.unwrap_or(0.0) && dt <= self.max_s.unwrap_or(f64::INFINITY)
    }
}

#[derive(Debug, Deserialize)]
struct NetworkDocument {
    #[serde(default)]
    default_max_gap_s: Option<Value>,
    #[serde(default)]
    allow_same_camera_match: Option<bool>,
    #[serde(default)]
    edges: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    from: Value,
    to: Value,
    #[serde(default)]
    min_s: Option<f64>,
    #[serde(default)]
    max_s: Option<f64>,
}

/// Indices into `CameraNetwork::edges`
type EdgeList = SmallVec<[usize; 4]>;

/// Allowed camera-to-camera transitions
#[derive(Debug, Clone)]
pub struct CameraNetwork {
    edges: Vec<CameraEdge>,
    default_max_gap_s: Option<f64>,
    allow_same_camera_match: bool,
    /// from -> indices into `edges`
    outgoing: FxHashMap<String, EdgeList>,
    /// to -> indices into `edges`
    incoming: FxHashMap<String, EdgeList>,
}

impl Default for CameraNetwork {
    fn default() -> Self {
        Self::open()
    }
}

impl CameraNetwork {
    pub fn new(
        edges: Vec<CameraEdge>,
        default_max_gap_s: Option<f64>,
        allow_same_camera_match: bool,
    ) -> Self {
        let mut outgoing: FxHashMap<String, EdgeList> = FxHashMap::default();
        let mut incoming: FxHashMap<String, EdgeList> = FxHashMap::default();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.from.clone()).or_default().push(i);
            incoming.entry(edge.to.clone()).or_default().push(i);
        }
        Self { edges, default_max_gap_s, allow_same_camera_match, outgoing, incoming }
    }

    /// Network without edges: everything allowed
    pub fn open() -> Self {
        Self::new(Vec::new(), None, true)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[CameraEdge] {
        &self.edges
    }

    pub fn allow_same_camera_match(&self) -> bool {
        self.allow_same_camera_match
    }

    /// Whether an identity last seen on `prev` may reappear on `new` after
    /// `dt_s` seconds.
    ///
    /// Unknown cameras and open networks always allow. A same-camera
    /// re-match follows `allow_same_camera_match`. Gaps beyond
    /// `default_max_gap_s` are rejected, then a `prev -> new` edge must
    /// exist whose window (if any) contains `|dt_s|`.
    pub fn allowed_transition(&self, prev: Option<&str>, new: Option<&str>, dt_s: f64) -> bool {
        let (Some(prev), Some(new)) = (prev, new) else {
            return true;
        };
        if self.is_open() {
            return true;
        }

        let prev = normalize_camera_id(prev);
        let new = normalize_camera_id(new);
        if prev == new {
            return self.allow_same_camera_match;
        }

        if self.default_max_gap_s.is_some_and(|max_gap| dt_s > max_gap) {
            return false;
        }

        let dt = dt_s.abs();
        self.outgoing
            .get(&prev)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(|e| e.to == new)
            .any(|e| !e.has_window() || e.window_contains(dt))
    }

    /// Cameras reachable from `camera_id`; empty for an open network
    pub fn neighbors_out(&self, camera_id: &str) -> Vec<&str> {
        self.outgoing
            .get(&normalize_camera_id(camera_id))
            .into_iter()
            .flatten()
            .map(|&i| self.edges[i].to.as_str())
            .collect()
    }

    /// Cameras leading to `camera_id`; empty for an open network
    pub fn neighbors_in(&self, camera_id: &str) -> Vec<&str> {
        self.incoming
            .get(&normalize_camera_id(camera_id))
            .into_iter()
            .flatten()
            .map(|&i| self.edges[i].from.as_str())
            .collect()
    }

    /// True if an edge joins `a` and `b` in either direction; always true
    /// for an open network
    pub fn are_adjacent(&self, a: &str, b: &str) -> bool {
        if self.is_open() {
            return true;
        }
        let a = normalize_camera_id(a);
        let b = normalize_camera_id(b);
        self.neighbors_out(&a).contains(&b.as_str()) || self.neighbors_out(&b).contains(&a.as_str())
    }

    /// Load the network document.
    ///
    /// A missing or unparseable document yields an open network; malformed
    /// edges are skipped.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "camera_network_missing_open");
            return Self::open();
        }
        let doc = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<NetworkDocument>(&s).map_err(|e| e.to_string()));
        let doc = match doc {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "camera_network_unreadable_open");
                return Self::open();
            }
        };

        let mut edges = Vec::with_capacity(doc.edges.len());
        for (i, raw) in doc.edges.into_iter().enumerate() {
            match parse_edge(raw) {
                Some(edge) => edges.push(edge),
                None => debug!(index = %i, "camera_edge_skipped"),
            }
        }
        let default_max_gap_s = doc.default_max_gap_s.as_ref().and_then(number_like);

        let network =
            Self::new(edges, default_max_gap_s, doc.allow_same_camera_match.unwrap_or(true));
        info!(
            path = %path.display(),
            edges = %network.edges.len(),
            max_gap_s = ?network.default_max_gap_s,
            same_camera = %network.allow_same_camera_match,
            "camera_network_loaded"
        );
        network
    }
}

fn parse_edge(raw: Value) -> Option<CameraEdge> {
    let record: EdgeRecord = serde_json::from_value(raw).ok()?;
    let from = camera_like(&record.from)?;
    let to = camera_like(&record.to)?;
    Some(CameraEdge::new(&from, &to).with_window(record.min_s, record.max_s))
}

fn camera_like(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn corridor() -> CameraNetwork {
        CameraNetwork::new(
            vec![
                CameraEdge::new("HALL", "CORRIDOR").with_window(Some(2.0), Some(30.0)),
                CameraEdge::new("CORRIDOR", "SERVER"),
            ],
            Some(600.0),
            true,
        )
    }

    #[test]
    fn test_open_network_allows_everything() {
        let net = CameraNetwork::open();
        assert!(net.is_open());
        for dt in [-50.0, 0.0, 1e6] {
            assert!(net.allowed_transition(Some("A"), Some("B"), dt));
            assert!(net.allowed_transition(Some("A"), Some("A"), dt));
        }
        assert!(net.neighbors_out("A").is_empty());
        assert!(net.neighbors_in("A").is_empty());
        assert!(net.are_adjacent("A", "Z"));
    }

    #[test]
    fn test_unknown_camera_allows() {
        let net = corridor();
        assert!(net.allowed_transition(None, Some("SERVER"), 1e9));
        assert!(net.allowed_transition(Some("HALL"), None, 1e9));
    }

    #[test]
    fn test_time_window() {
        let net = corridor();
        assert!(net.allowed_transition(Some("HALL"), Some("CORRIDOR"), 10.0));
        assert!(!net.allowed_transition(Some("HALL"), Some("CORRIDOR"), 1.0));
        assert!(!net.allowed_transition(Some("HALL"), Some("CORRIDOR"), 31.0));
        // Negative gaps are checked by magnitude
        assert!(net.allowed_transition(Some("HALL"), Some("CORRIDOR"), -10.0));
    }

    #[test]
    fn test_edges_are_directed() {
        let net = corridor();
        assert!(net.allowed_transition(Some("CORRIDOR"), Some("SERVER"), 500.0));
        assert!(!net.allowed_transition(Some("SERVER"), Some("CORRIDOR"), 5.0));
        assert!(!net.allowed_transition(Some("HALL"), Some("SERVER"), 5.0));
    }

    #[test]
    fn test_max_gap_rejects_before_edges() {
        let net = corridor();
        assert!(!net.allowed_transition(Some("CORRIDOR"), Some("SERVER"), 601.0));
    }

    #[test]
    fn test_same_camera_flag() {
        let net = corridor();
        assert!(net.allowed_transition(Some("HALL"), Some("camera_hall"), 1e6));
        let strict = CameraNetwork::new(vec![CameraEdge::new("A", "B")], None, false);
        assert!(!strict.allowed_transition(Some("A"), Some("A"), 1.0));
    }

    #[test]
    fn test_neighbors_and_adjacency() {
        let net = corridor();
        assert_eq!(net.neighbors_out("hall"), vec!["CORRIDOR"]);
        assert_eq!(net.neighbors_in("CORRIDOR"), vec!["HALL"]);
        assert!(net.neighbors_in("HALL").is_empty());
        assert!(net.are_adjacent("SERVER", "CORRIDOR"));
        assert!(!net.are_adjacent("HALL", "SERVER"));
    }

    #[test]
    fn test_load_skips_malformed_edges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("network.json");
        fs::write(
            &path,
            r#"{
                "default_max_gap_s": "120",
                "allow_same_camera_match": false,
                "edges": [
                    {"from": "HALL", "to": "CORRIDOR", "min_s": 1, "max_s": 20},
                    {"from": "CORRIDOR"},
                    {"from": 3, "to": "HALL"},
                    "garbage"
                ]
            }"#,
        )
        .unwrap();

        let net = CameraNetwork::load(&path);
        assert_eq!(net.edges().len(), 2);
        assert!(!net.allow_same_camera_match());
        assert!(!net.allowed_transition(Some("HALL"), Some("CORRIDOR"), 121.0));
        assert!(net.allowed_transition(Some("3"), Some("HALL"), 50.0));
    }

    #[test]
    fn test_load_missing_or_corrupt_is_open() {
        let dir = tempdir().unwrap();
        assert!(CameraNetwork::load(dir.path().join("absent.json")).is_open());

        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(CameraNetwork::load(&path).is_open());
    }
}
