//! Intrusion events in JSONL format (one JSON object per line)
//!
//! Raw events are appended as they are produced; enriched events rewrite the
//! whole output file. Reading skips blank lines and counts lines that do not
//! parse.

use crate::domain::error::{CorrelatorError, Result};
use crate::domain::event::Event;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Events read from a JSONL file
#[derive(Debug, Default)]
pub struct EventsRead {
    pub events: Vec<Event>,
    /// Non-blank lines that could not be parsed
    pub skipped_lines: usize,
}

/// Read every event of a JSONL file. A missing file yields no events.
pub fn read_events(path: impl AsRef<Path>) -> Result<EventsRead> {
    let path = path.as_ref();
    let mut read = EventsRead::default();
    if !path.exists() {
        info!(path = %path.display(), "events_file_missing");
        return Ok(read);
    }

    let file = File::open(path).map_err(|e| CorrelatorError::io(path, e))?;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| CorrelatorError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(event) => read.events.push(event),
            Err(e) => {
                warn!(path = %path.display(), line = %(index + 1), error = %e, "event_line_skipped");
                read.skipped_lines += 1;
            }
        }
    }

    info!(
        path = %path.display(),
        events = %read.events.len(),
        skipped = %read.skipped_lines,
        "events_read"
    );
    Ok(read)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Replace the file with `events`, one per line; returns the count written
pub fn write_events(path: impl AsRef<Path>, events: &[Event]) -> Result<usize> {
    let path = path.as_ref();
    ensure_parent(path).map_err(|e| CorrelatorError::io(path, e))?;

    let file = File::create(path).map_err(|e| CorrelatorError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n").map_err(|e| CorrelatorError::io(path, e))?;
    }
    writer.flush().map_err(|e| CorrelatorError::io(path, e))?;

    info!(path = %path.display(), events = %events.len(), "events_written");
    Ok(events.len())
}

/// Append-only writer for raw events
pub struct EventWriter {
    file_path: String,
}

impl EventWriter {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "event_writer_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one event, stamping `timestamp` with the current UTC time when
    /// absent. Returns true if successful.
    pub fn append(&self, event: &Event) -> bool {
        let line = if event.timestamp.is_some() {
            serde_json::to_string(event)
        } else {
            let mut stamped = event.clone();
            stamped.timestamp = Some(chrono::Utc::now().to_rfc3339());
            serde_json::to_string(&stamped)
        };

        let result = line
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|json| self.append_line(&json));
        match result {
            Ok(()) => {
                debug!(
                    event = %event.event_type.as_str(),
                    video_id = %event.video_id,
                    track_id = %event.track_id,
                    zone_id = %event.zone_id,
                    "event_appended"
                );
                true
            }
            Err(e) => {
                error!(
                    video_id = %event.video_id,
                    track_id = %event.track_id,
                    error = %e,
                    "event_append_failed"
                );
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);
        ensure_parent(path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Append several events; returns how many were written
    pub fn append_all(&self, events: &[Event]) -> usize {
        events.iter().filter(|e| self.append(e)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;
    use crate::domain::types::TrackKey;
    use tempfile::tempdir;

    fn sample(track: &str, t_sync: f64) -> Event {
        Event::new(EventKind::IntrusionConfirmed, &TrackKey::new("HALL", track), "Z1", 12)
            .with_times(t_sync - 5.0, t_sync)
    }

    #[test]
    fn test_append_creates_parents_and_stamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(path.to_str().unwrap());

        assert!(writer.append(&sample("1", 10.0)));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["event_type"], "intrusion_confirmed");
        assert_eq!(parsed["video_id"], "HALL");
        assert_eq!(parsed["t_sync"], 10.0);
        assert!(parsed["timestamp"].is_string());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        fs::write(&path, "{\"existing\":\"data\"}\n").unwrap();

        let writer = EventWriter::new(path.to_str().unwrap());
        assert_eq!(writer.append_all(&[sample("1", 10.0), sample("2", 11.0)]), 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));
    }

    #[test]
    fn test_read_skips_blank_and_corrupt_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let good = serde_json::to_string(&sample("1", 10.0)).unwrap();
        fs::write(&path, format!("{good}\n\n{{broken\n{{\"existing\":\"data\"}}\n{good}\n")).unwrap();

        let read = read_events(&path).unwrap();
        assert_eq!(read.events.len(), 2);
        assert_eq!(read.skipped_lines, 2);
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        let read = read_events(dir.path().join("absent.jsonl")).unwrap();
        assert!(read.events.is_empty());
        assert_eq!(read.skipped_lines, 0);
    }

    #[test]
    fn test_write_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        write_events(&path, &[sample("1", 10.0), sample("2", 11.0)]).unwrap();
        write_events(&path, &[sample("3", 12.0)]).unwrap();

        let read = read_events(&path).unwrap();
        assert_eq!(read.events.len(), 1);
        assert_eq!(read.events[0].track_id, "3");
        assert!(read.events[0].timestamp.is_none());
    }
}
