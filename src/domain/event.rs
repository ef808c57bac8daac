//! Intrusion events and their enrichment fields
//!
//! Events are created by the intrusion state machine, then enriched and
//! merged by the correlator. Serialized as one JSON object per line.

use crate::domain::types::{deserialize_track_id, GlobalId, TrackKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Intrusion event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IntrusionConfirmed,
    IntrusionEnded,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IntrusionConfirmed => "intrusion_confirmed",
            EventKind::IntrusionEnded => "intrusion_ended",
            EventKind::Unknown => "unknown",
        }
    }
}

/// Neighboring sighting of the same identity on another camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraHop {
    pub video_id: String,
    #[serde(deserialize_with = "deserialize_track_id")]
    pub track_id: String,
    #[serde(default)]
    pub t_start_sync: Option<f64>,
    #[serde(default)]
    pub t_end_sync: Option<f64>,
}

/// Duplicate event absorbed into a representative during dedup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRef {
    pub video_id: String,
    #[serde(deserialize_with = "deserialize_track_id")]
    pub track_id: String,
    pub zone_id: String,
    #[serde(default)]
    pub t_sync: Option<f64>,
    pub frame_id: u64,
}

/// One intrusion event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Wall-clock time the event was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub event_type: EventKind,
    pub video_id: String,
    #[serde(deserialize_with = "deserialize_track_id")]
    pub track_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub zone_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_name: Option<String>,
    #[serde(default)]
    pub duration: f64,
    pub frame_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_sync: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id: Option<GlobalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_camera: Option<CameraHop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_camera: Option<CameraHop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<MergedRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enriched: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    pub fn new(kind: EventKind, key: &TrackKey, zone_id: &str, frame_id: u64) -> Self {
        Self {
            timestamp: None,
            event_type: kind,
            video_id: key.camera_id.clone(),
            track_id: key.track_id.clone(),
            class_name: None,
            zone_id: zone_id.to_string(),
            zone_name: None,
            duration: 0.0,
            frame_id,
            t: None,
            t_sync: None,
            global_id: None,
            prev_camera: None,
            next_camera: None,
            merged_from: Vec::new(),
            enriched: false,
            extra: Map::new(),
        }
    }

    pub fn with_times(mut self, t: f64, t_sync: f64) -> Self {
        self.t = Some(t);
        self.t_sync = Some(t_sync);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_class(mut self, class_name: Option<&str>) -> Self {
        self.class_name = class_name.map(str::to_string);
        self
    }

    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.video_id.clone(), self.track_id.clone())
    }

    /// Zone identity used for dedup: normalized zone name, else zone id
    pub fn zone_key(&self) -> String {
        match self.zone_name.as_deref().map(normalize_zone_name) {
            Some(name) if !name.is_empty() => name,
            _ => self.zone_id.clone(),
        }
    }

    pub fn to_merged_ref(&self) -> MergedRef {
        MergedRef {
            video_id: self.video_id.clone(),
            track_id: self.track_id.clone(),
            zone_id: self.zone_id.clone(),
            t_sync: self.t_sync,
            frame_id: self.frame_id,
        }
    }
}

/// Lowercase, trim and collapse internal whitespace
pub fn normalize_zone_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_serde() {
        assert_eq!(
            serde_json::to_string(&EventKind::IntrusionConfirmed).unwrap(),
            "\"intrusion_confirmed\""
        );
        let kind: EventKind = serde_json::from_str("\"loitering\"").unwrap();
        assert_eq!(kind, EventKind::Unknown);
        assert_eq!(EventKind::IntrusionEnded.as_str(), "intrusion_ended");
    }

    #[test]
    fn test_zone_key_prefers_normalized_name() {
        let key = TrackKey::new("A", "1");
        let mut event = Event::new(EventKind::IntrusionConfirmed, &key, "Z_SRV_A", 10);
        assert_eq!(event.zone_key(), "Z_SRV_A");

        event.zone_name = Some("  Server   Room ".to_string());
        assert_eq!(event.zone_key(), "server room");

        event.zone_name = Some("   ".to_string());
        assert_eq!(event.zone_key(), "Z_SRV_A");
    }

    #[test]
    fn test_event_parses_minimal_line() {
        let line = r#"{"event_type":"intrusion_confirmed","video_id":"HALL","track_id":3,
            "zone_id":"Z1","frame_id":40,"t":1.5,"t_sync":11.5,"custom":"kept"}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(event.track_id, "3");
        assert_eq!(event.t_sync, Some(11.5));
        assert!(event.global_id.is_none());
        assert!(!event.enriched);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["custom"], "kept");
        assert!(value.get("merged_from").is_none());
        assert!(value.get("enriched").is_none());
    }
}
