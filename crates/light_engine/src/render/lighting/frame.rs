//! Per-view light pipeline
//!
//! [`LightFrameContext`] owns every piece of light state that lives across
//! frames and runs the per-view steps in order:
//!
//! 1. [`find_potential_light_sources`](LightFrameContext::find_potential_light_sources)
//!    and [`submit_light`](LightFrameContext::submit_light) fill the registry.
//! 2. [`prepare_view`](LightFrameContext::prepare_view) ages, sorts, culls,
//!    computes scissors, caps the real light count and accepts lights.
//! 3. [`schedule_shadows`](LightFrameContext::schedule_shadows) and
//!    [`submit_shadow_passes`](LightFrameContext::submit_shadow_passes) emit
//!    this frame's shadow passes.
//!
//! The context is owned by whatever drives rendering and passed by reference
//! into each step. Recursive views (portals, reflections) run between
//! [`begin_recursive_pass`](LightFrameContext::begin_recursive_pass) and
//! [`end_recursive_pass`](LightFrameContext::end_recursive_pass), which keep
//! the light list structurally frozen.

use std::collections::HashSet;

use crate::core::LightSystemConfig;
use crate::foundation::logging::RateLimiter;
use crate::render::api::{LightBackend, LightSectorRegistry, ShadowPoolAllocator, SlotId};
use crate::render::lighting::affecting::{AffectingLightsCache, CombinationHandle, StaticLight, StaticLightSet};
use crate::render::lighting::light::{EntityId, LightFlags, LightKey, LightProperties, LightRecord};
use crate::render::lighting::registry::{DynamicLightRegistry, LightSnapshot, SubmitContext, SubmitOutcome};
use crate::render::lighting::scissor::LightVolumeProjector;
use crate::render::lighting::shadows::{
    PerObjectShadow, ShadowContext, ShadowFrustumDescriptor, ShadowFrustumScheduler,
};
use crate::render::lighting::visibility::{light_visible, light_volume_visible};
use crate::render::primitives::Camera;
use crate::scene::AABB;

/// Fraction of a light's view distance it stays at full brightness
const FADE_START: f32 = 0.75;

/// Kind of view being rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Main view: ages, sorts, culls and accepts lights
    General,
    /// Portal or reflection view reusing the main view's light list
    Recursive,
}

/// Description of the view a light pipeline step runs for
#[derive(Debug, Clone)]
pub struct RenderPassInfo {
    /// Main frame counter
    pub frame_id: u64,
    /// View camera
    pub camera: Camera,
    /// View kind
    pub kind: PassKind,
    /// The view renders shadow maps
    pub render_shadows: bool,
    /// Recursion depth, 0 for the main view
    pub recursion_depth: u32,
}

impl RenderPassInfo {
    /// Main view with shadows
    pub fn general(frame_id: u64, camera: Camera) -> Self {
        Self {
            frame_id,
            camera,
            kind: PassKind::General,
            render_shadows: true,
            recursion_depth: 0,
        }
    }

    /// Recursive view without shadows
    pub fn recursive(frame_id: u64, camera: Camera, recursion_depth: u32) -> Self {
        Self {
            frame_id,
            camera,
            kind: PassKind::Recursive,
            render_shadows: false,
            recursion_depth,
        }
    }

    /// Enable or disable shadow rendering for the view
    pub fn with_shadows(mut self, render_shadows: bool) -> Self {
        self.render_shadows = render_shadows;
        self
    }
}

/// What [`LightFrameContext::prepare_view`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewStats {
    /// Records dropped for staleness or a disable request
    pub expired: usize,
    /// Records outside the view
    pub culled: usize,
    /// Real lights removed past the per-frame maximum
    pub over_limit: usize,
    /// Real lights left after the cap
    pub real_lights: usize,
    /// Lights given a backend slot during preparation
    pub accepted: usize,
    /// Lights registered in spatial sectors
    pub sector_registrations: usize,
}

/// All light state of one renderer, passed through a frame's steps
#[derive(Debug)]
pub struct LightFrameContext {
    config: LightSystemConfig,
    registry: DynamicLightRegistry,
    static_lights: StaticLightSet,
    affecting: AffectingLightsCache,
    shadows: ShadowFrustumScheduler,
    frame_id: u64,
    sector_registered: HashSet<LightKey>,
    over_limit_warning: RateLimiter,
}

impl LightFrameContext {
    /// Create a context with the given settings
    pub fn new(config: LightSystemConfig) -> Self {
        Self {
            config,
            registry: DynamicLightRegistry::new(),
            static_lights: StaticLightSet::new(),
            affecting: AffectingLightsCache::new(),
            shadows: ShadowFrustumScheduler::new(),
            frame_id: 0,
            sector_registered: HashSet::new(),
            over_limit_warning: RateLimiter::default(),
        }
    }

    /// Current settings
    pub fn config(&self) -> &LightSystemConfig {
        &self.config
    }

    /// Replace the settings between frames
    pub fn set_config(&mut self, config: LightSystemConfig) {
        self.config = config;
    }

    /// Start a new main frame
    pub fn begin_frame(&mut self, frame_id: u64) {
        self.frame_id = frame_id;
    }

    /// Current main frame
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    fn submit_context(&self, pass: &RenderPassInfo) -> SubmitContext {
        SubmitContext {
            frame_id: self.frame_id,
            dynamic_lights_enabled: self.config.lighting.dynamic_lights_enabled,
            max_lights: self.config.lighting.max_dynamic_lights,
            render_shadows: pass.render_shadows && self.config.shadows.shadows_enabled,
        }
    }

    /// Submit an owner's light for this frame
    ///
    /// Applies the sun rules and the optional area-visibility gate before the
    /// registry sees the light.
    pub fn submit_light(
        &mut self,
        light: LightProperties,
        owner: EntityId,
        fade_factor: f32,
        pass: &RenderPassInfo,
        sectors: &dyn LightSectorRegistry,
    ) -> SubmitOutcome {
        let lighting = &self.config.lighting;
        let is_sun = light.flags.contains(LightFlags::SUN);

        if is_sun {
            let brightest = light.color.x.max(light.color.y).max(light.color.z);
            if !lighting.sun_enabled || brightest <= 0.0 {
                return SubmitOutcome::Refused;
            }
        }

        if lighting.frame_id_vis_test && !light.flags.contains(LightFlags::POST_RENDERER) {
            let visible = if is_sun {
                sectors.sun_is_needed()
            } else {
                let mut depth = lighting.vis_test_recursion_depth;
                if light.flags.contains(LightFlags::THIS_AREA_ONLY) {
                    depth = depth.saturating_sub(1);
                }
                sectors.is_owner_area_visible(owner, depth, &light)
            };
            if !visible {
                log::trace!("Light of {:?} dropped by the area visibility test", owner);
                return SubmitOutcome::Refused;
            }
        }

        let ctx = self.submit_context(pass);
        self.registry.submit(light, owner, fade_factor, &ctx)
    }

    /// Remove an owner's light
    pub fn retire_owner(&mut self, owner: EntityId) -> SubmitOutcome {
        self.registry.retire(owner)
    }

    /// Add or update a level light entity
    pub fn register_static_light(&mut self, light: StaticLight) {
        log::debug!("Registered static light {:?}", light.id);
        self.static_lights.register(light);
    }

    /// Delete a level light entity
    ///
    /// Removes it from every cached light combination and retires its dynamic record.
    pub fn unregister_static_light(&mut self, id: EntityId) -> Option<StaticLight> {
        let removed = self.static_lights.unregister(id)?;
        self.affecting.invalidate(id);
        self.registry.retire(id);
        log::debug!("Unregistered static light {:?}", id);
        Some(removed)
    }

    /// Submit every level light that is in range and visible from the view
    ///
    /// Returns the number of submissions that reached the registry.
    pub fn find_potential_light_sources(&mut self, pass: &RenderPassInfo, sectors: &dyn LightSectorRegistry) -> usize {
        let camera = &pass.camera;
        let view = camera.frustum();
        let cast_ratio = self.config.shadows.cast_view_dist_ratio_lights;
        let render_shadows = pass.render_shadows && self.config.shadows.shadows_enabled;

        let mut candidates = Vec::new();
        for light in self.static_lights.iter_mut() {
            let distance = if light.properties.flags.contains(LightFlags::POST_RENDERER) {
                (camera.position - light.properties.origin).magnitude()
            } else {
                light.bounds().distance_sq_to_point(camera.position).sqrt() * camera.zoom_factor
            };
            if distance > light.max_view_distance {
                continue;
            }
            if !light_visible(&view, &light.properties) {
                continue;
            }

            light.update_cast_shadow_flag(distance, cast_ratio, render_shadows);

            let fade_factor = if light.max_view_distance > 0.0 {
                1.0 - (distance / light.max_view_distance - FADE_START).max(0.0)
            } else {
                1.0
            };
            candidates.push((light.id, light.properties.clone(), fade_factor));
        }

        let mut submitted = 0;
        for (id, properties, fade_factor) in candidates {
            match self.submit_light(properties, id, fade_factor, pass, sectors) {
                SubmitOutcome::Inserted(_) | SubmitOutcome::Merged(_) | SubmitOutcome::Deferred => submitted += 1,
                SubmitOutcome::Removed | SubmitOutcome::Refused => {}
            }
        }
        submitted
    }

    /// Prepare the light list for one view
    ///
    /// A general view ages, sorts, culls and scissors the lights, caps the
    /// real light count and accepts lights eagerly where configured. A
    /// recursive view only re-accepts the real lights.
    pub fn prepare_view(
        &mut self,
        pass: &RenderPassInfo,
        backend: &mut dyn LightBackend,
        sectors: &mut dyn LightSectorRegistry,
    ) -> ViewStats {
        self.sector_registered.clear();
        match pass.kind {
            PassKind::General => self.prepare_general_view(pass, backend, sectors),
            PassKind::Recursive => self.prepare_recursive_view(backend, sectors),
        }
    }

    fn prepare_general_view(
        &mut self,
        pass: &RenderPassInfo,
        backend: &mut dyn LightBackend,
        sectors: &mut dyn LightSectorRegistry,
    ) -> ViewStats {
        let mut stats = ViewStats {
            expired: self.registry.age_and_expire(self.frame_id),
            ..ViewStats::default()
        };
        self.registry.sort_by_priority();

        let view = pass.camera.frustum();
        let culled = self.registry.retain(|_, record| light_volume_visible(&view, &record.properties));
        for owner in &culled {
            log::trace!("Culled light of {:?}", owner);
        }
        stats.culled = culled.len();

        let projector = LightVolumeProjector::new(&pass.camera);
        let keys = self.registry.keys().to_vec();
        for key in &keys {
            if let Some(record) = self.registry.get_mut(*key) {
                record.scissor = projector.scissor(&record.properties);
                record.backend_slot = None;
            }
        }

        let max_real = self.config.lighting.max_lights_per_frame;
        let (real, over_limit) = self.registry.partition_real_lights(max_real, |record| backend.is_fake_light(record));
        if over_limit > 0 && self.over_limit_warning.allow(self.frame_id) {
            log::warn!("{} lights over the per-frame maximum of {} were dropped", over_limit, max_real);
        }
        stats.real_lights = real;
        stats.over_limit = over_limit;

        let eager = self.config.lighting.consistent_sort_order;
        let min_sector_radius = self.config.lighting.min_sector_radius;
        let real_keys: Vec<LightKey> = self.registry.real_lights().map(|(key, _)| key).collect();
        for key in real_keys {
            let Some(record) = self.registry.get_mut(key) else {
                continue;
            };
            if eager || record.is_sun() {
                if let Some(slot) = backend.accept_light(record) {
                    record.backend_slot = Some(slot);
                    stats.accepted += 1;
                }
            }
            if record.properties.radius >= min_sector_radius && self.sector_registered.insert(key) {
                sectors.register_light_in_sector(record);
                stats.sector_registrations += 1;
            }
        }

        log::debug!(
            "Prepared view for frame {}: {} lights ({} real), {} culled, {} expired, {} accepted",
            self.frame_id,
            self.registry.len(),
            stats.real_lights,
            stats.culled,
            stats.expired,
            stats.accepted
        );
        stats
    }

    fn prepare_recursive_view(
        &mut self,
        backend: &mut dyn LightBackend,
        sectors: &mut dyn LightSectorRegistry,
    ) -> ViewStats {
        let mut stats = ViewStats {
            real_lights: self.registry.real_light_count(),
            ..ViewStats::default()
        };

        let keys = self.registry.keys().to_vec();
        let real_count = self.registry.real_light_count();
        for (index, key) in keys.iter().enumerate() {
            let Some(record) = self.registry.get_mut(*key) else {
                continue;
            };
            record.backend_slot = None;
            if index >= real_count || backend.is_fake_light(record) {
                continue;
            }
            if let Some(slot) = backend.accept_light(record) {
                record.backend_slot = Some(slot);
                stats.accepted += 1;
                if self.sector_registered.insert(*key) {
                    sectors.register_light_in_sector(record);
                    stats.sector_registrations += 1;
                }
            }
        }
        stats
    }

    /// Accept a light on demand, returning its slot
    ///
    /// Fake lights and lights already holding a slot are not re-accepted.
    pub fn request_light_slot(&mut self, key: LightKey, backend: &mut dyn LightBackend) -> Option<SlotId> {
        let record = self.registry.get_mut(key)?;
        if record.backend_slot.is_some() {
            return record.backend_slot;
        }
        if backend.is_fake_light(record) {
            return None;
        }
        record.backend_slot = backend.accept_light(record);
        record.backend_slot
    }

    /// Build this frame's shadow passes
    pub fn schedule_shadows(
        &mut self,
        pass: &RenderPassInfo,
        allocator: &mut dyn ShadowPoolAllocator,
        backend: &mut dyn LightBackend,
    ) -> Vec<ShadowFrustumDescriptor> {
        let sun = self
            .registry
            .iter()
            .find(|(_, record)| record.is_sun())
            .map(|(_, record)| record.properties.clone())
            .or_else(|| self.static_lights.sun().map(|sun| sun.properties.clone()));

        let ctx = ShadowContext {
            frame_id: self.frame_id,
            render_shadows: pass.render_shadows,
            config: &self.config.shadows,
            camera: &pass.camera,
            sun: sun.as_ref(),
        };
        self.shadows.schedule(&mut self.registry, allocator, backend, &ctx)
    }

    /// Hand the scheduled passes to the backend
    pub fn submit_shadow_passes(&mut self, passes: Vec<ShadowFrustumDescriptor>, backend: &mut dyn LightBackend) {
        self.shadows.submit(&mut self.registry, backend, passes);
    }

    /// Static light combination for an object
    pub fn affecting_lights(&mut self, bbox: &AABB) -> CombinationHandle {
        self.affecting.query(bbox, &self.static_lights)
    }

    /// Lights of a combination handle
    pub fn combination(&self, handle: CombinationHandle) -> Option<&[EntityId]> {
        self.affecting.combination(handle)
    }

    /// Light amount a record casts onto `bbox`
    pub fn light_amount(&self, key: LightKey, bbox: &AABB) -> f32 {
        self.registry.get(key).map_or(0.0, |record| record.light_amount(bbox))
    }

    /// Register or replace a caster's per-object shadow
    pub fn add_per_object_shadow(&mut self, shadow: PerObjectShadow, sectors: &mut dyn LightSectorRegistry) {
        self.shadows.add_per_object_shadow(shadow, sectors);
    }

    /// Drop a caster's per-object shadow
    pub fn remove_per_object_shadow(&mut self, caster: EntityId, sectors: &mut dyn LightSectorRegistry) -> bool {
        self.shadows.remove_per_object_shadow(caster, sectors)
    }

    /// A shadow caster was destroyed
    pub fn on_caster_deleted(&mut self, caster: EntityId, sectors: &mut dyn LightSectorRegistry) {
        self.shadows.on_caster_deleted(caster, sectors);
    }

    /// Enter a recursive view
    pub fn begin_recursive_pass(&mut self) {
        self.registry.freeze();
    }

    /// Leave a recursive view; returns the number of queued changes applied
    pub fn end_recursive_pass(&mut self) -> usize {
        self.registry.thaw()
    }

    /// Lights in priority order
    pub fn lights(&self) -> impl Iterator<Item = (LightKey, &LightRecord)> + '_ {
        self.registry.iter()
    }

    /// Light order with its generation
    pub fn snapshot(&self) -> LightSnapshot {
        self.registry.snapshot()
    }

    /// The dynamic light registry
    pub fn registry(&self) -> &DynamicLightRegistry {
        &self.registry
    }

    /// Level light entities
    pub fn static_lights(&self) -> &StaticLightSet {
        &self.static_lights
    }

    /// The shadow scheduler
    pub fn shadows(&self) -> &ShadowFrustumScheduler {
        &self.shadows
    }

    /// Mutable shadow scheduler, for debug statistics
    pub fn shadows_mut(&mut self) -> &mut ShadowFrustumScheduler {
        &mut self.shadows
    }
}

impl Default for LightFrameContext {
    fn default() -> Self {
        Self::new(LightSystemConfig::default())
    }
}
