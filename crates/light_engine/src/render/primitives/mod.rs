//! Core primitive types for rendering
//!
//! The camera service consumed by light culling and shadow scheduling.

pub mod camera;

pub use camera::{Camera, Projection};
