//! Snapping dragged objects onto the vertices and pivots of other objects.

pub mod candidates;
pub mod engine;
pub mod resolver;
pub mod vertex_source;

pub use candidates::{CandidateObject, build_ignore_set, collect_candidates};
pub use engine::{DragSnapEngine, SnapContext};
pub use resolver::{ClosestVertex, MAX_CAMERA_DISTANCE, SnapQuery, closest, closest_on_component};
pub use vertex_source::VertexSource;
