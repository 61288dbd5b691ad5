//! Shadow frustum scheduling
//!
//! Picks the lights that cast shadows this frame and turns them into shadow
//! pass descriptors, within the shadow pool ceiling. Each light walks a small
//! state machine per frame:
//!
//! ```text
//! NotScheduled -> Eligible -> Scheduled -> Submitted
//! ```
//!
//! A light is eligible when the pass renders shadows, it wants shadows and
//! the backend accepted it. It is scheduled once every side it needs either
//! fits in the pool or is cached, and submitted when the descriptors are
//! handed to the backend. Lights that do not fit render unshadowed.
//!
//! Per-object overrides are standalone sun shadow passes for single casters.
//! They are capped separately and never use the light pool.

use std::collections::HashMap;

use crate::core::ShadowConfig;
use crate::foundation::math::{utils, Vec3};
use crate::render::api::{
    LightBackend, LightSectorRegistry, PoolReservation, PoolSlot, ShadowPoolAllocator, ShadowPoolRequest,
};
use crate::render::lighting::light::{EntityId, LightFlags, LightKey, LightProperties, LightRecord};
use crate::render::lighting::registry::DynamicLightRegistry;
use crate::render::lighting::visibility::PROJECTOR_NEAR_PLANE;
use crate::render::primitives::Camera;
use crate::scene::AABB;

/// Smallest shadow texture size
pub const MIN_SHADOW_TEXTURE_SIZE: u32 = 64;

/// Sides of an omnidirectional light's cube map
pub const CUBE_SIDE_COUNT: u8 = 6;

/// Per-frame shadow state of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowState {
    /// Not considered for shadows this frame
    #[default]
    NotScheduled,
    /// May cast shadows but has no passes yet (or did not fit in the pool)
    Eligible,
    /// All needed sides fit in the pool
    Scheduled,
    /// Passes handed to the backend
    Submitted,
}

/// What a shadow pass renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPassKind {
    /// One orthographic cascade of the sun
    SunCascade,
    /// The single frustum of a projector
    Projector,
    /// One face of a point light's cube map
    CubeSide,
    /// A single caster lit by the sun
    PerObject,
}

/// One shadow rendering pass request
#[derive(Debug, Clone)]
pub struct ShadowFrustumDescriptor {
    /// Light the pass belongs to, `None` for per-object overrides
    pub light: Option<LightKey>,
    /// Light owner, or the caster for per-object overrides
    pub owner: EntityId,
    /// Pass type
    pub kind: ShadowPassKind,
    /// Cascade or cube side index
    pub side: u8,
    /// Camera the pass renders through
    pub camera: Camera,
    /// Shadow map size in texels
    pub texture_size: u32,
    /// Pool slot, `None` for per-object overrides
    pub pool_slot: Option<PoolSlot>,
    /// Constant depth bias
    pub const_bias: f32,
    /// Slope-scaled depth bias
    pub slope_bias: f32,
    /// Filter jitter width
    pub jitter: f32,
}

impl ShadowFrustumDescriptor {
    /// Pass comes from a per-object override
    pub fn is_per_object(&self) -> bool {
        self.kind == ShadowPassKind::PerObject
    }
}

/// Standalone sun shadow for one caster
#[derive(Debug, Clone, PartialEq)]
pub struct PerObjectShadow {
    /// Shadow caster identity
    pub caster: EntityId,
    /// Caster bounds in world space
    pub caster_bounds: AABB,
    /// Constant depth bias
    pub const_bias: f32,
    /// Slope-scaled depth bias
    pub slope_bias: f32,
    /// Filter jitter width
    pub jitter: f32,
    /// Scale applied to the caster bounds
    pub bbox_scale: Vec3,
    /// Requested texture size before the resolution scale
    pub texture_size: u32,
}

/// Inputs of one scheduling run
#[derive(Debug, Clone, Copy)]
pub struct ShadowContext<'a> {
    /// Current main frame
    pub frame_id: u64,
    /// The pass renders shadow maps
    pub render_shadows: bool,
    /// Shadow settings
    pub config: &'a ShadowConfig,
    /// View camera
    pub camera: &'a Camera,
    /// Sun used for per-object overrides
    pub sun: Option<&'a LightProperties>,
}

/// Counters of the last scheduling run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowStats {
    /// Lights that met the eligibility rules
    pub eligible_lights: usize,
    /// Lights whose sides all fit
    pub scheduled_lights: usize,
    /// Lights left without shadows because the pool was full
    pub truncated_lights: usize,
    /// Lights withheld by the shadow mask limit
    pub suppressed_lights: usize,
    /// Light passes emitted
    pub light_passes: usize,
    /// Sides skipped because their cached map is valid
    pub cached_sides: usize,
    /// Per-object passes emitted
    pub per_object_passes: usize,
}

struct PlannedSide {
    kind: ShadowPassKind,
    side: u8,
    camera: Camera,
}

/// Decides which lights cast shadows and builds their passes
#[derive(Debug, Default)]
pub struct ShadowFrustumScheduler {
    per_object: Vec<PerObjectShadow>,
    caster_pass_counts: HashMap<EntityId, u32>,
    last_stats: ShadowStats,
}

impl ShadowFrustumScheduler {
    /// Create a scheduler with no overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule this frame's shadow passes
    ///
    /// Applies the shadow mask limit, reserves pool slots for every eligible
    /// real light in priority order, refreshes the backend's copy of every
    /// accepted light and appends per-object passes.
    pub fn schedule(
        &mut self,
        registry: &mut DynamicLightRegistry,
        allocator: &mut dyn ShadowPoolAllocator,
        backend: &mut dyn LightBackend,
        ctx: &ShadowContext<'_>,
    ) -> Vec<ShadowFrustumDescriptor> {
        let config = ctx.config;
        let real_count = registry.real_light_count();
        let keys: Vec<LightKey> = registry.keys().iter().take(real_count).copied().collect();
        let allowed = if config.shadows_masks_limit > 0 {
            (config.shadows_masks_limit as usize * 4).min(real_count)
        } else {
            real_count
        };

        let mut stats = ShadowStats::default();
        let mut passes = Vec::new();

        for (index, key) in keys.iter().enumerate() {
            let Some(record) = registry.get_mut(*key) else {
                continue;
            };
            record.shadows_suppressed = index >= allowed;
            record.shadow_state = ShadowState::NotScheduled;
            if record.shadows_suppressed && record.flags().contains(LightFlags::CAST_SHADOWS) {
                stats.suppressed_lights += 1;
            }

            let eligible = ctx.render_shadows
                && config.shadows_enabled
                && record.casts_shadows()
                && record.backend_slot.is_some();
            if !eligible {
                continue;
            }
            record.shadow_state = ShadowState::Eligible;
            stats.eligible_lights += 1;

            let sides = plan_sides(record, ctx);
            let side_count = sides.len() as u8;
            let texture_size = config.default_texture_size.clamp(MIN_SHADOW_TEXTURE_SIZE, config.max_texture_size);
            let mut light_passes = Vec::new();
            let mut reserved = Vec::new();
            let mut cached_sides = 0;
            let mut exhausted = false;

            for planned in sides {
                let request = ShadowPoolRequest {
                    owner: record.owner,
                    side: planned.side,
                    side_count,
                    texture_size,
                    frame_id: ctx.frame_id,
                };
                match allocator.reserve(&request) {
                    PoolReservation::NeedsUpdate(slot) => {
                        reserved.push((request, slot));
                        light_passes.push(ShadowFrustumDescriptor {
                            light: Some(*key),
                            owner: record.owner,
                            kind: planned.kind,
                            side: planned.side,
                            camera: planned.camera,
                            texture_size,
                            pool_slot: Some(slot),
                            const_bias: 0.0,
                            slope_bias: 0.0,
                            jitter: 0.0,
                        });
                    }
                    PoolReservation::Cached(_) => cached_sides += 1,
                    PoolReservation::Exhausted => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if exhausted || stats.light_passes + light_passes.len() > config.shadow_pool_slots {
                log::trace!(
                    "Shadow pool full, {:?} renders without shadows ({} sides released)",
                    record.owner,
                    reserved.len()
                );
                for (request, slot) in &reserved {
                    allocator.release(request, *slot);
                }
                stats.truncated_lights += 1;
                continue;
            }

            record.shadow_state = ShadowState::Scheduled;
            stats.scheduled_lights += 1;
            stats.cached_sides += cached_sides;
            stats.light_passes += light_passes.len();
            passes.extend(light_passes);
        }

        for key in &keys {
            if let Some(record) = registry.get(*key) {
                if let Some(slot) = record.backend_slot {
                    backend.update_accepted_light(slot, record);
                }
            }
        }

        if ctx.render_shadows && config.per_object_shadows_enabled {
            if let Some(sun) = ctx.sun {
                for shadow in self.per_object.iter().take(config.max_per_object_shadows) {
                    passes.push(per_object_descriptor(shadow, sun, ctx.camera.position, config));
                    stats.per_object_passes += 1;
                }
            }
        }

        if ctx.render_shadows {
            self.reset_caster_statistics();
        }

        log::debug!(
            "Shadow schedule: {} eligible, {} scheduled, {} truncated, {} light passes, {} per-object passes",
            stats.eligible_lights,
            stats.scheduled_lights,
            stats.truncated_lights,
            stats.light_passes,
            stats.per_object_passes
        );
        self.last_stats = stats;
        passes
    }

    /// Hand the passes to the backend and mark their lights submitted
    pub fn submit(
        &self,
        registry: &mut DynamicLightRegistry,
        backend: &mut dyn LightBackend,
        passes: Vec<ShadowFrustumDescriptor>,
    ) {
        let keys: Vec<LightKey> = registry.keys().to_vec();
        for key in keys {
            if let Some(record) = registry.get_mut(key) {
                if record.shadow_state == ShadowState::Scheduled {
                    record.shadow_state = ShadowState::Submitted;
                }
            }
        }
        backend.submit_shadow_passes(passes);
    }

    /// Add or replace the per-object override of a caster
    ///
    /// A caster seen for the first time has its sector marked dirty.
    pub fn add_per_object_shadow(&mut self, shadow: PerObjectShadow, sectors: &mut dyn LightSectorRegistry) {
        let caster = shadow.caster;
        match self.per_object.iter_mut().find(|existing| existing.caster == caster) {
            Some(existing) => *existing = shadow,
            None => {
                self.per_object.push(shadow);
                sectors.mark_caster_dirty(caster);
            }
        }
    }

    /// Remove the per-object override of a caster
    pub fn remove_per_object_shadow(&mut self, caster: EntityId, sectors: &mut dyn LightSectorRegistry) -> bool {
        let Some(index) = self.per_object.iter().position(|shadow| shadow.caster == caster) else {
            return false;
        };
        self.per_object.remove(index);
        sectors.mark_caster_dirty(caster);
        true
    }

    /// Forget everything about a deleted caster
    pub fn on_caster_deleted(&mut self, caster: EntityId, sectors: &mut dyn LightSectorRegistry) {
        self.caster_pass_counts.remove(&caster);
        self.remove_per_object_shadow(caster, sectors);
    }

    /// Registered overrides
    pub fn per_object_shadows(&self) -> &[PerObjectShadow] {
        &self.per_object
    }

    /// Count a shadow pass rendered for `owner` (debug statistics)
    pub fn record_caster_pass(&mut self, owner: EntityId) {
        *self.caster_pass_counts.entry(owner).or_insert(0) += 1;
    }

    /// Debug pass count of an owner
    pub fn caster_pass_count(&self, owner: EntityId) -> Option<u32> {
        self.caster_pass_counts.get(&owner).copied()
    }

    /// Zero the debug pass counts, keeping the owners
    pub fn reset_caster_statistics(&mut self) {
        for count in self.caster_pass_counts.values_mut() {
            *count = 0;
        }
    }

    /// Counters of the last run
    pub fn last_stats(&self) -> ShadowStats {
        self.last_stats
    }
}

/// Shadow sides a light needs this frame
fn plan_sides(record: &LightRecord, ctx: &ShadowContext<'_>) -> Vec<PlannedSide> {
    let light = &record.properties;

    if record.is_sun() {
        let toward_sun = (light.origin - ctx.camera.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vec3::y);
        return (0..ctx.config.sun_cascade_count)
            .map(|cascade| {
                let half_extent = ctx.config.sun_cascade_base_extent * 2.0_f32.powi(i32::from(cascade));
                let depth = half_extent * 4.0;
                PlannedSide {
                    kind: ShadowPassKind::SunCascade,
                    side: cascade,
                    camera: Camera::orthographic(
                        ctx.camera.position + toward_sun * depth,
                        ctx.camera.position,
                        half_extent,
                        0.0,
                        depth * 2.0,
                    ),
                }
            })
            .collect();
    }

    let far = light.radius.max(PROJECTOR_NEAR_PLANE * 2.0);

    if light.flags.contains(LightFlags::PROJECTOR) && light.frustum_half_angle < 90.0 {
        return vec![PlannedSide {
            kind: ShadowPassKind::Projector,
            side: 0,
            camera: Camera::projector(
                light.origin,
                light.projection_direction(),
                light.frustum_half_angle * 2.0,
                PROJECTOR_NEAR_PLANE,
                far,
            ),
        }];
    }

    let directions = [Vec3::x(), -Vec3::x(), Vec3::y(), -Vec3::y(), Vec3::z(), -Vec3::z()];
    directions
        .iter()
        .zip(0..CUBE_SIDE_COUNT)
        .map(|(direction, side)| PlannedSide {
            kind: ShadowPassKind::CubeSide,
            side,
            camera: Camera::projector(light.origin, *direction, 90.0, PROJECTOR_NEAR_PLANE, far),
        })
        .collect()
}

/// Texture size of a per-object pass: scaled, clamped, rounded down to a power of two
pub fn per_object_texture_size(requested: u32, resolution_scale: f32, max_texture_size: u32) -> u32 {
    let scaled = (requested as f32 * resolution_scale) as u32;
    utils::floor_power_of_two(scaled.clamp(MIN_SHADOW_TEXTURE_SIZE, max_texture_size.max(MIN_SHADOW_TEXTURE_SIZE)))
}

/// Build the sun pass that tightly frames one caster
fn per_object_descriptor(
    shadow: &PerObjectShadow,
    sun: &LightProperties,
    camera_position: Vec3,
    config: &ShadowConfig,
) -> ShadowFrustumDescriptor {
    let center = shadow.caster_bounds.center();
    let extents = shadow.caster_bounds.size().component_mul(&shadow.bbox_scale) * 0.5;
    let radius = AABB::from_center_extents(center, extents).radius();

    let light_relative = sun.origin - camera_position;
    let distance = light_relative.magnitude();
    let light_position = center + light_relative;
    let fov = utils::rad_to_deg((radius / distance.max(f32::EPSILON)).atan()) * 2.0;
    let near = (distance - radius).max(PROJECTOR_NEAR_PLANE);
    let far = (distance + radius).max(near + f32::EPSILON);

    ShadowFrustumDescriptor {
        light: None,
        owner: shadow.caster,
        kind: ShadowPassKind::PerObject,
        side: 0,
        camera: Camera::projector(light_position, center - light_position, fov, near, far),
        texture_size: per_object_texture_size(shadow.texture_size, config.per_object_resolution_scale, config.max_texture_size),
        pool_slot: None,
        const_bias: shadow.const_bias,
        slope_bias: shadow.slope_bias,
        jitter: shadow.jitter,
    }
}
