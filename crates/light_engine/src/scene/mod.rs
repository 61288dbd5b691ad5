//! Scene geometry
//!
//! Bounding volumes and frustums used by light culling and shadow scheduling.
//! Spatial partitioning itself lives outside this crate and is reached through
//! [`crate::render::api::LightSectorRegistry`].

mod bounds;

pub use bounds::{Frustum, Plane, Sphere, AABB, OBB};
