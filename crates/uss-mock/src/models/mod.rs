//! Data models for the mock USS.
//!
//! - `geo` - space-time volumes and the intersection predicate
//! - `intent` - operational intents and their state machine
//! - `flight` - this USS's own flight records
//! - `api` - flight planning request/response bodies

pub mod api;
pub mod flight;
pub mod geo;
pub mod intent;

pub use api::*;
pub use flight::*;
pub use geo::{
    bounding_volume, BoundingBoxIntersection, Circle, LatLngPoint, Outline, Polygon, Volume3D,
    Volume4D, VolumeIntersection,
};
pub use intent::*;
