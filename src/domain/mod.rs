//! Domain models - core data types of the correlation engine
//!
//! - `track` - per-camera tracks, frames, embeddings and the chronological order
//! - `event` - intrusion events and enrichment fields
//! - `geometry` - validated polygons and containment predicates
//! - `types` - identifiers, bounding boxes, zone sets, camera-id normalization
//! - `error` - error taxonomy

pub mod error;
pub mod event;
pub mod geometry;
pub mod track;
pub mod types;

pub use error::CorrelatorError;
pub use event::{CameraHop, Event, EventKind, MergedRef};
pub use track::{ChronologicalOrder, Embedding, EmbeddingSelection, Frame, Track, TrackFile};
pub use types::{BBox, GlobalId, TrackKey, ZoneSet};
