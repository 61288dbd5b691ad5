//! # Dynamic Lighting
//!
//! Per-frame light management for a deferred renderer: the light registry,
//! visibility culling, screen-space scissor rectangles, shadow pass
//! scheduling and the static light combination cache.
//!
//! ## Frame Flow
//!
//! ```text
//! submit_light ─► DynamicLightRegistry (merge / insert)
//!                     │
//! prepare_view ─► age ─► sort ─► cull ─► scissor ─► cap ─► accept
//!                     │
//! schedule_shadows ─► ShadowFrustumScheduler ─► submit_shadow_passes
//! ```
//!
//! [`AffectingLightsCache`] is queried by object rendering at any time and
//! is independent of the per-view flow.
//!
//! ## Usage
//!
//! ```rust
//! use light_engine::foundation::math::Vec3;
//! use light_engine::render::lighting::{EntityId, LightFrameContext, LightProperties, RenderPassInfo};
//! use light_engine::render::primitives::Camera;
//! # use light_engine::render::api::LightSectorRegistry;
//! # use light_engine::render::lighting::LightRecord;
//! # struct NoSectors;
//! # impl LightSectorRegistry for NoSectors {
//! #     fn register_light_in_sector(&mut self, _: &LightRecord) {}
//! #     fn mark_caster_dirty(&mut self, _: EntityId) {}
//! # }
//!
//! let mut lights = LightFrameContext::default();
//! lights.begin_frame(1);
//!
//! let mut camera = Camera::perspective(Vec3::zeros(), 60.0, 16.0 / 9.0, 0.1, 100.0);
//! camera.set_target(Vec3::new(0.0, 0.0, -1.0));
//! let pass = RenderPassInfo::general(1, camera);
//!
//! let lamp = LightProperties::point(Vec3::new(0.0, 2.0, -10.0), Vec3::new(1.0, 0.9, 0.8), 6.0);
//! lights.submit_light(lamp, EntityId(42), 1.0, &pass, &NoSectors);
//! assert_eq!(lights.registry().len(), 1);
//! ```

pub mod affecting;
pub mod frame;
pub mod light;
pub mod registry;
pub mod scissor;
pub mod shadows;
pub mod visibility;

pub use affecting::{AffectingLightsCache, CombinationHandle, StaticLight, StaticLightSet};
pub use frame::{LightFrameContext, PassKind, RenderPassInfo, ViewStats};
pub use light::{
    EntityId, LightFlags, LightKey, LightProperties, LightRecord, ProjectorTexture, ScissorRect,
};
pub use registry::{DynamicLightRegistry, LightSnapshot, SubmitContext, SubmitOutcome};
pub use scissor::LightVolumeProjector;
pub use shadows::{
    PerObjectShadow, ShadowFrustumDescriptor, ShadowFrustumScheduler, ShadowPassKind, ShadowState, ShadowStats,
};

#[cfg(test)]
pub(crate) mod tests;
