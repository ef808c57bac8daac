//! Per-camera track store on disk
//!
//! One JSON document per camera under the trajectories directory. Loading is
//! tolerant: a file that cannot be read or parsed is skipped and reported,
//! the rest of the batch still loads. Saving rewrites the whole document,
//! preserving fields this crate does not know about.

use crate::domain::error::{CorrelatorError, Result};
use crate::domain::track::TrackFile;
use crate::infra::metrics::Metrics;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Track files of one directory, with the paths they came from
#[derive(Debug, Default)]
pub struct LoadedTracks {
    pub paths: Vec<PathBuf>,
    pub files: Vec<TrackFile>,
    /// Files that were skipped, with the reason
    pub skipped: Vec<CorrelatorError>,
}

impl LoadedTracks {
    pub fn track_count(&self) -> usize {
        self.files.iter().map(|f| f.trajectories.len()).sum()
    }
}

/// Directory of `*.json` track files
pub struct TrackStore {
    dir: PathBuf,
}

impl TrackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse one track file.
    ///
    /// Fills `video_id` from the file stem when absent and derives missing
    /// `t_sync` values from `sync_offset`.
    pub fn load_file(path: &Path) -> Result<TrackFile> {
        let unreadable = |reason: String| CorrelatorError::UnreadableTrackFile {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let root: Value = serde_json::from_str(&content).map_err(|e| unreadable(e.to_string()))?;
        if !root.is_object() {
            return Err(CorrelatorError::InvalidStore { path: path.to_path_buf() });
        }
        let mut file: TrackFile =
            serde_json::from_value(root).map_err(|e| unreadable(e.to_string()))?;

        if file.video_id.trim().is_empty() {
            file.video_id =
                path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        }
        let filled = file.normalize_times();
        let unordered = file.trajectories.iter().filter(|t| !t.frames_in_order());
        for track in unordered {
            warn!(
                path = %path.display(),
                video_id = %file.video_id,
                track_id = %track.track_id,
                "frame_order_not_increasing"
            );
        }
        debug!(
            path = %path.display(),
            video_id = %file.video_id,
            tracks = %file.trajectories.len(),
            t_sync_filled = %filled,
            "track_file_loaded"
        );
        Ok(file)
    }

    /// Load every `*.json` file of the directory in file-name order.
    ///
    /// A missing directory yields an empty result.
    pub fn load_all(&self, metrics: Option<&Metrics>) -> Result<LoadedTracks> {
        let mut loaded = LoadedTracks::default();
        if !self.dir.exists() {
            warn!(dir = %self.dir.display(), "trajectories_dir_missing");
            return Ok(loaded);
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| CorrelatorError::io(&self.dir, e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match Self::load_file(&path) {
                Ok(file) => {
                    if let Some(m) = metrics {
                        m.record_file_loaded(file.trajectories.len());
                    }
                    loaded.paths.push(path);
                    loaded.files.push(file);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "track_file_skipped");
                    if let Some(m) = metrics {
                        m.record_file_skipped();
                    }
                    loaded.skipped.push(e);
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            files = %loaded.files.len(),
            tracks = %loaded.track_count(),
            skipped = %loaded.skipped.len(),
            "tracks_loaded"
        );
        Ok(loaded)
    }

    /// Rewrite one track file (temp file + rename)
    pub fn save_file(path: &Path, file: &TrackFile) -> Result<()> {
        let json = serde_json::to_string_pretty(file)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| CorrelatorError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| CorrelatorError::io(path, e))?;
        Ok(())
    }

    /// Rewrite every loaded file back to where it came from
    pub fn save_all(&self, loaded: &LoadedTracks) -> Result<usize> {
        for (path, file) in loaded.paths.iter().zip(&loaded.files) {
            Self::save_file(path, file)?;
        }
        info!(dir = %self.dir.display(), files = %loaded.files.len(), "tracks_saved");
        Ok(loaded.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::GlobalId;
    use tempfile::tempdir;

    const HALL: &str = r#"{
        "video_id": "HALL",
        "sync_offset": 2.0,
        "rotation_applied": 0,
        "stats": {"frames_processed": 10},
        "trajectories": [
            {"track_id": 1, "class_name": "person",
             "frames": [{"frame": 0, "t": 0.0, "bbox": [0, 0, 10, 10]},
                        {"frame": 30, "t": 1.0, "bbox": [5, 0, 15, 10]}],
             "embeddings": [[1.0, 0.0]]}
        ]
    }"#;

    #[test]
    fn test_load_file_normalizes_times() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hall.json");
        fs::write(&path, HALL).unwrap();

        let file = TrackStore::load_file(&path).unwrap();
        assert_eq!(file.video_id, "HALL");
        assert_eq!(file.trajectories[0].t_start_sync(), Some(2.0));
        assert_eq!(file.trajectories[0].t_end_sync(), Some(3.0));
    }

    #[test]
    fn test_out_of_order_frames_still_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dock.json");
        fs::write(
            &path,
            r#"{"video_id": "DOCK", "trajectories": [
                {"track_id": 2, "frames": [{"frame": 9, "t": 0.9}, {"frame": 3, "t": 0.3}]}
            ]}"#,
        )
        .unwrap();

        let file = TrackStore::load_file(&path).unwrap();
        let track = &file.trajectories[0];
        assert!(!track.frames_in_order());
        assert_eq!(track.frames.len(), 2);
        assert_eq!(track.t_start_sync(), Some(0.3));
    }

    #[test]
    fn test_video_id_falls_back_to_stem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("CORRIDOR.json");
        fs::write(&path, r#"{"trajectories": []}"#).unwrap();
        assert_eq!(TrackStore::load_file(&path).unwrap().video_id, "CORRIDOR");
    }

    #[test]
    fn test_root_must_be_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.json");
        fs::write(&path, "[]").unwrap();
        assert!(matches!(
            TrackStore::load_file(&path).unwrap_err(),
            CorrelatorError::InvalidStore { .. }
        ));
    }

    #[test]
    fn test_load_all_skips_bad_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a_hall.json"), HALL).unwrap();
        fs::write(dir.path().join("b_broken.json"), "{ nope").unwrap();
        fs::write(dir.path().join("c_list.json"), "[1]").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let metrics = Metrics::new();
        let loaded = TrackStore::new(dir.path()).load_all(Some(&metrics)).unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.skipped.len(), 2);
        assert!(matches!(loaded.skipped[0], CorrelatorError::UnreadableTrackFile { .. }));
        assert!(matches!(loaded.skipped[1], CorrelatorError::InvalidStore { .. }));

        let summary = metrics.report();
        assert_eq!(summary.files_loaded, 1);
        assert_eq!(summary.files_skipped, 2);
        assert_eq!(summary.tracks_loaded, 1);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let loaded = TrackStore::new(dir.path().join("absent")).load_all(None).unwrap();
        assert!(loaded.files.is_empty());
    }

    #[test]
    fn test_save_rewrites_global_id_and_keeps_unknown_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hall.json");
        fs::write(&path, HALL).unwrap();

        let store = TrackStore::new(dir.path());
        let mut loaded = store.load_all(None).unwrap();
        loaded.files[0].trajectories[0].global_id = Some(GlobalId(3));
        assert_eq!(store.save_all(&loaded).unwrap(), 1);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["trajectories"][0]["global_id"], 3);
        assert_eq!(raw["trajectories"][0]["frames"][1]["t_sync"], 3.0);
        assert_eq!(raw["stats"]["frames_processed"], 10);
        assert!(!dir.path().join("hall.json.tmp").exists());
    }
}
