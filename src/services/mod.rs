//! Services - identity resolution and intrusion correlation
//!
//! - `zone_manager` - Zone polygons per camera, persistence and hit tests
//! - `camera_network` - Allowed camera transitions used to gate matches
//! - `identity_matcher` - Cross-camera global identity assignment
//! - `intrusion` - Per (track, zone) dwell state machine
//! - `scanner` - Rebuilds intrusion events from stored trajectories
//! - `correlator` - Event enrichment and duplicate merging
//! - `pipeline` - Batch run orchestration

pub mod camera_network;
pub mod correlator;
pub mod identity_matcher;
pub mod intrusion;
pub mod pipeline;
pub mod scanner;
pub mod zone_manager;

// Re-export commonly used types
pub use camera_network::{CameraEdge, CameraNetwork};
pub use correlator::{AppearanceIndex, EventCorrelator};
pub use identity_matcher::{IdentityMatcher, IdentityRegistry};
pub use intrusion::{IntrusionState, IntrusionStateMachine, Observation};
pub use pipeline::{Pipeline, RunOutcome};
pub use scanner::IntrusionScanner;
pub use zone_manager::{Zone, ZoneManager};
