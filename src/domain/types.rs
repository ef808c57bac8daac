//! Shared types for the correlation engine

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Newtype wrapper for cross-camera identity IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct GlobalId(pub u64);

impl std::fmt::Display for GlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one track: `track_id` is only unique within its camera
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub camera_id: String,
    pub track_id: String,
}

impl TrackKey {
    pub fn new(camera_id: impl Into<String>, track_id: impl Into<String>) -> Self {
        Self { camera_id: camera_id.into(), track_id: track_id.into() }
    }
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.camera_id, self.track_id)
    }
}

/// Set of zone IDs a track currently occupies.
///
/// Ordered so that entering/leaving diffs and the events they produce come out
/// in a reproducible order.
pub type ZoneSet = BTreeSet<String>;

/// A 2D image-space point `[x, y]`
pub type Point = [f64; 2];

/// Axis-aligned bounding box `[x1, y1, x2, y2]` in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BBox(pub [f64; 4]);

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self([x1, y1, x2, y2])
    }

    /// Corners normalized so that min <= max on both axes
    pub fn min_max(&self) -> (Point, Point) {
        let [x1, y1, x2, y2] = self.0;
        ([x1.min(x2), y1.min(y2)], [x1.max(x2), y1.max(y2)])
    }

    #[inline]
    pub fn center(&self) -> Point {
        let [x1, y1, x2, y2] = self.0;
        [(x1 + x2) / 2.0, (y1 + y2) / 2.0]
    }

    /// Rectangle as a closed ring (4 corners, counter-clockwise in image space)
    pub fn corners(&self) -> [Point; 4] {
        let ([x1, y1], [x2, y2]) = self.min_max();
        [[x1, y1], [x2, y1], [x2, y2], [x1, y2]]
    }
}

/// Camera namespace prefixes ignored when comparing camera IDs
const CAMERA_PREFIXES: [&str; 4] = ["CAMERA_", "CAMERA-", "CAM_", "CAM-"];

/// Normalize a camera identifier for comparison.
///
/// Comparison is case-insensitive and a leading namespace token
/// (`CAMERA_`, `CAM_`, ...) is ignored, so `camera_Hall`, `HALL` and
/// `CAM-hall` all refer to the same camera.
pub fn normalize_camera_id(camera_id: &str) -> String {
    let upper = camera_id.trim().to_uppercase();
    for prefix in CAMERA_PREFIXES {
        if let Some(rest) = upper.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    upper
}

/// True if two camera IDs refer to the same camera after normalization
#[inline]
pub fn same_camera(a: &str, b: &str) -> bool {
    normalize_camera_id(a) == normalize_camera_id(b)
}

/// Deserialize a track ID that may be stored as a string or an integer
pub fn deserialize_track_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TrackIdVisitor;

    impl<'de> Visitor<'de> for TrackIdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer track id")
        }

        fn visit_str<E>(self, value: &str) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_string<E>(self, value: String) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<String, E>
        where
            E: de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(TrackIdVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_camera_id() {
        assert_eq!(normalize_camera_id("camera_Hall"), "HALL");
        assert_eq!(normalize_camera_id("CAM-hall"), "HALL");
        assert_eq!(normalize_camera_id(" hall "), "HALL");
        // Bare prefix is kept as-is rather than collapsing to ""
        assert_eq!(normalize_camera_id("CAMERA_"), "CAMERA_");
        assert!(same_camera("CAMERA_01", "01"));
        assert!(!same_camera("CAMERA_01", "02"));
    }

    #[test]
    fn test_bbox_geometry() {
        let bbox = BBox::new(10.0, 20.0, 0.0, 0.0);
        assert_eq!(bbox.min_max(), ([0.0, 0.0], [10.0, 20.0]));
        assert_eq!(bbox.center(), [5.0, 10.0]);
        assert_eq!(bbox.corners()[2], [10.0, 20.0]);
    }

    #[test]
    fn test_track_id_from_int_or_string() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_track_id")]
            id: String,
        }

        let w: Wrapper = serde_json::from_str(r#"{"id": 42}"#).unwrap();
        assert_eq!(w.id, "42");
        let w: Wrapper = serde_json::from_str(r#"{"id": "7"}"#).unwrap();
        assert_eq!(w.id, "7");
    }

    #[test]
    fn test_track_key_display() {
        assert_eq!(TrackKey::new("HALL", "3").to_string(), "HALL::3");
    }
}
