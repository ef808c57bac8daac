//! IO modules - files read and written by a run
//!
//! - `track_store` - Per-camera trajectory documents (JSON)
//! - `events` - Raw and correlated intrusion events (JSONL)
//! - `report` - Run report (JSON)

pub mod events;
pub mod report;
pub mod track_store;

pub use events::{read_events, write_events, EventWriter};
pub use report::RunReport;
pub use track_store::{LoadedTracks, TrackStore};
