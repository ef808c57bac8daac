//! Restricted zones per camera and the containment queries run against them
//!
//! Zones live in one JSON document keyed by `zone_id`. A polygon is validated
//! when the zone is created; on load, a zone whose polygon is invalid is
//! reported in [`ZoneManager::rejected`] and never takes part in queries.

use crate::domain::error::{CorrelatorError, Result};
use crate::domain::geometry::Polygon;
use crate::domain::types::{normalize_camera_id, same_camera, BBox, Point, ZoneSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// One restricted area on one camera
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub zone_id: String,
    pub name: String,
    pub camera_id: String,
    pub description: String,
    pub active: bool,
    polygon: Polygon,
}

impl Zone {
    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    pub fn area(&self) -> f64 {
        self.polygon.area()
    }

    /// True if the zone belongs to `camera_id` (case/prefix-insensitive);
    /// `None` matches every camera
    pub fn on_camera(&self, camera_id: Option<&str>) -> bool {
        camera_id.map_or(true, |cam| same_camera(&self.camera_id, cam))
    }

    fn to_record(&self) -> ZoneRecord {
        ZoneRecord {
            zone_id: Some(self.zone_id.clone()),
            name: self.name.clone(),
            camera_id: self.camera_id.clone(),
            polygon: self.polygon.vertices().to_vec(),
            description: self.description.clone(),
            active: self.active,
            area: Some(self.area().round()),
        }
    }
}

/// On-disk shape of a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zone_id: Option<String>,
    #[serde(default)]
    name: String,
    camera_id: String,
    polygon: Vec<Point>,
    #[serde(default)]
    description: String,
    #[serde(default = "default_active")]
    active: bool,
    /// Derived; recomputed on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    area: Option<f64>,
}

fn default_active() -> bool {
    true
}

/// A zone present in the document that could not be built
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedZone {
    pub zone_id: String,
    pub reason: String,
}

/// Zones of one camera, for the summary
#[derive(Debug, Clone, PartialEq)]
pub struct CameraZones<'a> {
    pub camera_id: String,
    pub zones: Vec<&'a Zone>,
}

/// Zone registry with containment queries
#[derive(Debug, Clone, Default)]
pub struct ZoneManager {
    zones: BTreeMap<String, Zone>,
    rejected: Vec<RejectedZone>,
}

impl ZoneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a zone. Fails with `InvalidPolygon` if the ring
    /// has fewer than 3 points or is not a simple polygon.
    pub fn create_zone(
        &mut self,
        zone_id: &str,
        name: &str,
        camera_id: &str,
        points: &[Point],
        description: &str,
    ) -> Result<&Zone> {
        let polygon =
            Polygon::new(points).map_err(|reason| CorrelatorError::invalid_polygon(zone_id, reason))?;

        let zone = Zone {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            camera_id: camera_id.to_string(),
            description: description.to_string(),
            active: true,
            polygon,
        };
        info!(
            zone_id = %zone_id,
            camera = %camera_id,
            points = %zone.polygon.vertices().len(),
            area = %format!("{:.0}", zone.area()),
            "zone_created"
        );

        self.rejected.retain(|r| r.zone_id != zone_id);
        self.zones.insert(zone_id.to_string(), zone);
        Ok(&self.zones[zone_id])
    }

    pub fn get(&self, zone_id: &str) -> Option<&Zone> {
        self.zones.get(zone_id)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zones in ascending `zone_id` order
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Zones from the loaded document that failed validation
    pub fn rejected(&self) -> &[RejectedZone] {
        &self.rejected
    }

    fn active_on(&self, camera_id: Option<&str>) -> impl Iterator<Item = &Zone> + '_ {
        // Normalize the query once instead of per zone
        let query = camera_id.map(normalize_camera_id);
        self.zones.values().filter(move |z| {
            z.active && query.as_deref().map_or(true, |q| normalize_camera_id(&z.camera_id) == q)
        })
    }

    /// Active zones that strictly contain the point (boundary is outside)
    pub fn point_in_zones(&self, x: f64, y: f64, camera_id: Option<&str>) -> ZoneSet {
        self.active_on(camera_id)
            .filter(|z| z.polygon.contains([x, y]))
            .map(|z| z.zone_id.clone())
            .collect()
    }

    /// Active zones the box intersects (edge touching counts)
    pub fn bbox_intersects_zones(&self, bbox: &BBox, camera_id: Option<&str>) -> ZoneSet {
        self.active_on(camera_id)
            .filter(|z| z.polygon.intersects_bbox(bbox))
            .map(|z| z.zone_id.clone())
            .collect()
    }

    pub fn activate_zone(&mut self, zone_id: &str) -> bool {
        self.set_active(zone_id, true)
    }

    pub fn deactivate_zone(&mut self, zone_id: &str) -> bool {
        self.set_active(zone_id, false)
    }

    fn set_active(&mut self, zone_id: &str, active: bool) -> bool {
        match self.zones.get_mut(zone_id) {
            Some(zone) => {
                zone.active = active;
                info!(zone_id = %zone_id, active = %active, "zone_state_changed");
                true
            }
            None => {
                warn!(zone_id = %zone_id, "zone_not_found");
                false
            }
        }
    }

    pub fn delete_zone(&mut self, zone_id: &str) -> bool {
        let removed = self.zones.remove(zone_id).is_some();
        if removed {
            info!(zone_id = %zone_id, "zone_deleted");
        }
        removed
    }

    /// All zones of a camera, active or not
    pub fn zones_for_camera(&self, camera_id: &str) -> Vec<&Zone> {
        self.zones.values().filter(|z| z.on_camera(Some(camera_id))).collect()
    }

    /// Zones grouped by camera, cameras sorted by id
    pub fn summary(&self) -> Vec<CameraZones<'_>> {
        let mut by_camera: BTreeMap<&str, Vec<&Zone>> = BTreeMap::new();
        for zone in self.zones.values() {
            by_camera.entry(zone.camera_id.as_str()).or_default().push(zone);
        }
        by_camera
            .into_iter()
            .map(|(camera_id, zones)| CameraZones { camera_id: camera_id.to_string(), zones })
            .collect()
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        info!(
            zones = %self.zones.len(),
            cameras = %summary.len(),
            rejected = %self.rejected.len(),
            "zones_summary"
        );
        for camera in &summary {
            for zone in &camera.zones {
                info!(
                    camera = %camera.camera_id,
                    zone_id = %zone.zone_id,
                    name = %zone.name,
                    active = %zone.active,
                    points = %zone.polygon.vertices().len(),
                    area = %format!("{:.0}", zone.area()),
                    "zone"
                );
            }
        }
        for rejected in &self.rejected {
            warn!(zone_id = %rejected.zone_id, reason = %rejected.reason, "zone_rejected");
        }
    }

    /// Load the zones document. A missing file yields an empty manager.
    ///
    /// Fails if the file cannot be read or parsed, or if its root is not a
    /// mapping. Individual zones with an invalid polygon or missing fields are
    /// kept out of queries and listed in [`Self::rejected`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "zones_file_missing");
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path).map_err(|e| CorrelatorError::io(path, e))?;
        let root: Value = serde_json::from_str(&content)?;
        let Value::Object(entries) = root else {
            return Err(CorrelatorError::InvalidStore { path: path.to_path_buf() });
        };

        let mut manager = Self::new();
        for (key, raw) in entries {
            match serde_json::from_value::<ZoneRecord>(raw) {
                Ok(record) => manager.insert_record(&key, record),
                Err(e) => manager.reject(&key, e.to_string()),
            }
        }
        info!(
            path = %path.display(),
            zones = %manager.zones.len(),
            rejected = %manager.rejected.len(),
            "zones_loaded"
        );
        Ok(manager)
    }

    fn insert_record(&mut self, key: &str, record: ZoneRecord) {
        let zone_id = record.zone_id.unwrap_or_else(|| key.to_string());
        match Polygon::new(&record.polygon) {
            Ok(polygon) => {
                debug!(zone_id = %zone_id, active = %record.active, "zone_loaded");
                self.zones.insert(
                    zone_id.clone(),
                    Zone {
                        zone_id,
                        name: record.name,
                        camera_id: record.camera_id,
                        description: record.description,
                        active: record.active,
                        polygon,
                    },
                );
            }
            Err(reason) => self.reject(&zone_id, reason),
        }
    }

    fn reject(&mut self, zone_id: &str, reason: String) {
        error!(zone_id = %zone_id, reason = %reason, "zone_invalid");
        self.rejected.push(RejectedZone { zone_id: zone_id.to_string(), reason });
    }

    /// Write the document as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| CorrelatorError::io(parent, e))?;
            }
        }
        let document: BTreeMap<&str, ZoneRecord> =
            self.zones.iter().map(|(id, zone)| (id.as_str(), zone.to_record())).collect();
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(path, json).map_err(|e| CorrelatorError::io(path, e))?;
        info!(path = %path.display(), zones = %self.zones.len(), "zones_saved");
        Ok(())
    }
}
