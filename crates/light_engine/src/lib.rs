//! # Light Engine
//!
//! Per-frame dynamic light management for a deferred renderer.
//!
//! ## Features
//!
//! - **Light Registry**: Owners resubmit lights every frame; records merge in place and expire when stale
//! - **Visibility Culling**: Sphere, oriented box and projector frustum tests against the view
//! - **Scissor Rectangles**: Tight screen-space bounds for every visible light
//! - **Shadow Scheduling**: Shadow passes within a fixed pool budget, plus per-object sun shadows
//! - **Static Light Cache**: Memoized light combinations for object rendering
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use light_engine::prelude::*;
//! # struct Renderer;
//! # impl LightBackend for Renderer {
//! #     fn accept_light(&mut self, _: &LightRecord) -> Option<SlotId> { None }
//! #     fn update_accepted_light(&mut self, _: SlotId, _: &LightRecord) {}
//! #     fn submit_shadow_passes(&mut self, _: Vec<ShadowFrustumDescriptor>) {}
//! # }
//! # struct Octree;
//! # impl LightSectorRegistry for Octree {
//! #     fn register_light_in_sector(&mut self, _: &LightRecord) {}
//! #     fn mark_caster_dirty(&mut self, _: EntityId) {}
//! # }
//! # struct Atlas;
//! # impl ShadowPoolAllocator for Atlas {
//! #     fn reserve(&mut self, _: &ShadowPoolRequest) -> PoolReservation { PoolReservation::Exhausted }
//! #     fn release(&mut self, _: &ShadowPoolRequest, _: PoolSlot) {}
//! # }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = LightSystemConfig::load_from_file("lights.toml")?;
//!     let mut lights = LightFrameContext::new(config);
//!     let (mut renderer, mut octree, mut atlas) = (Renderer, Octree, Atlas);
//!
//!     for frame in 1..=3 {
//!         lights.begin_frame(frame);
//!         let pass = RenderPassInfo::general(frame, Camera::default());
//!         lights.find_potential_light_sources(&pass, &octree);
//!         lights.prepare_view(&pass, &mut renderer, &mut octree);
//!         let passes = lights.schedule_shadows(&pass, &mut atlas, &mut renderer);
//!         lights.submit_shadow_passes(passes, &mut renderer);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::Config,
        core::config::{ConfigError, LightSystemConfig, LightingConfig, ShadowConfig},
        foundation::math::{Mat3, Mat4, Vec3, Vec4},
        render::api::{
            LightBackend, LightSectorRegistry, PoolReservation, PoolSlot, ShadowPoolAllocator, ShadowPoolRequest,
            SlotId,
        },
        render::lighting::{
            EntityId, LightFlags, LightFrameContext, LightKey, LightProperties, LightRecord, PassKind,
            PerObjectShadow, ProjectorTexture, RenderPassInfo, ScissorRect, ShadowFrustumDescriptor, StaticLight, SubmitOutcome,
        },
        render::primitives::Camera,
        scene::{Frustum, Sphere, AABB, OBB},
    };
}
