//! Error taxonomy for the correlation engine
//!
//! Only conditions that are fatal to a specific creation/parse call are
//! represented here. Per-track conditions (missing embeddings, gated
//! transitions, clock skew) are not errors: they are counted in
//! [`crate::infra::Metrics`] and the batch carries on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorrelatorError {
    /// Zone polygon rejected at creation (fatal to that zone only)
    #[error("invalid polygon for zone {zone_id}: {reason}")]
    InvalidPolygon { zone_id: String, reason: String },

    /// Track file could not be read or parsed (file is skipped)
    #[error("unreadable track file {}: {reason}", path.display())]
    UnreadableTrackFile { path: PathBuf, reason: String },

    /// A store document whose root is not a JSON object
    #[error("invalid store document {}: root is not a mapping", path.display())]
    InvalidStore { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CorrelatorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn invalid_polygon(zone_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPolygon { zone_id: zone_id.to_string(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, CorrelatorError>;
