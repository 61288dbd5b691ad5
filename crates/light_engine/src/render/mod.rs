//! # Rendering System
//!
//! Renderer-facing side of the light pipeline. Nothing in here talks to a
//! graphics API; GPU work is reached through the traits in [`api`].
//!
//! ## Architecture
//!
//! - **API**: Contracts with the renderer backend, the shadow map pool and the spatial index
//! - **Primitives**: The camera service used for culling and projection
//! - **Lighting**: Light registry, culling, scissors, shadow scheduling and the frame context

pub mod api;
pub mod lighting;
pub mod primitives;

pub use api::{LightBackend, LightSectorRegistry, ShadowPoolAllocator};
pub use lighting::{LightFrameContext, RenderPassInfo};
pub use primitives::Camera;
