//! Light pipeline demo
//!
//! Drives a [`LightFrameContext`] through a few hundred frames of a scattered
//! light field with an orbiting camera. The renderer, shadow atlas and octree
//! are in-memory stand-ins that only count what the pipeline hands them.
//!
//! Run with `RUST_LOG=debug cargo run -p light_demo [config.toml]`.

use std::collections::HashMap;

use light_engine::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FRAME_COUNT: u64 = 240;
const STATIC_LIGHTS: u64 = 400;
const FLICKERING_LIGHTS: u64 = 24;
const FIELD_SIZE: f32 = 120.0;
const ATLAS_SLOTS: usize = 96;
const SHADOW_REFRESH_FRAMES: u64 = 4;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Renderer stand-in with a fixed light array
struct CountingRenderer {
    capacity: usize,
    accepted: usize,
    updates: usize,
    shadow_passes: usize,
}

impl CountingRenderer {
    fn new(capacity: usize) -> Self {
        Self { capacity, accepted: 0, updates: 0, shadow_passes: 0 }
    }

    fn begin_view(&mut self) {
        self.accepted = 0;
        self.updates = 0;
    }
}

impl LightBackend for CountingRenderer {
    fn accept_light(&mut self, _record: &LightRecord) -> Option<SlotId> {
        if self.accepted >= self.capacity {
            return None;
        }
        self.accepted += 1;
        Some(SlotId(self.accepted as u32 - 1))
    }

    fn update_accepted_light(&mut self, _slot: SlotId, _record: &LightRecord) {
        self.updates += 1;
    }

    fn submit_shadow_passes(&mut self, passes: Vec<ShadowFrustumDescriptor>) {
        self.shadow_passes += passes.len();
    }
}

/// Shadow atlas that keeps a side's map for a few frames before refreshing it
struct ShadowAtlas {
    slots: usize,
    entries: HashMap<(EntityId, u8), (PoolSlot, u64)>,
}

impl ShadowAtlas {
    fn new(slots: usize) -> Self {
        Self { slots, entries: HashMap::new() }
    }
}

impl ShadowPoolAllocator for ShadowAtlas {
    fn reserve(&mut self, request: &ShadowPoolRequest) -> PoolReservation {
        let key = (request.owner, request.side);
        if let Some((slot, rendered)) = self.entries.get_mut(&key) {
            if request.frame_id.saturating_sub(*rendered) < SHADOW_REFRESH_FRAMES {
                return PoolReservation::Cached(*slot);
            }
            *rendered = request.frame_id;
            return PoolReservation::NeedsUpdate(*slot);
        }

        let slot = if self.entries.len() >= self.slots {
            // Reuse the oldest side's slot if it was not rendered this frame
            let oldest = self
                .entries
                .iter()
                .filter(|(_, (_, rendered))| *rendered < request.frame_id)
                .min_by_key(|(_, (_, rendered))| *rendered)
                .map(|(key, (slot, _))| (*key, *slot));
            let Some((oldest, slot)) = oldest else {
                return PoolReservation::Exhausted;
            };
            self.entries.remove(&oldest);
            slot
        } else {
            PoolSlot(self.entries.len() as u32)
        };
        self.entries.insert(key, (slot, request.frame_id));
        PoolReservation::NeedsUpdate(slot)
    }

    fn release(&mut self, request: &ShadowPoolRequest, slot: PoolSlot) {
        let key = (request.owner, request.side);
        if self.entries.get(&key).is_some_and(|(reserved, _)| *reserved == slot) {
            self.entries.remove(&key);
        }
    }
}

/// Octree stand-in
#[derive(Default)]
struct SectorCounter {
    registered: usize,
    dirty: usize,
}

impl LightSectorRegistry for SectorCounter {
    fn register_light_in_sector(&mut self, _record: &LightRecord) {
        self.registered += 1;
    }

    fn sun_is_needed(&self) -> bool {
        true
    }

    fn mark_caster_dirty(&mut self, _caster: EntityId) {
        self.dirty += 1;
    }
}

fn load_config() -> Result<LightSystemConfig, DemoError> {
    match std::env::args().nth(1) {
        Some(path) => Ok(LightSystemConfig::load_from_file(path)?),
        None => Ok(LightSystemConfig::default()),
    }
}

fn scatter_lights(lights: &mut LightFrameContext, rng: &mut StdRng) {
    let sun = LightProperties::sun(Vec3::new(300.0, 1000.0, 200.0), Vec3::new(1.0, 0.95, 0.85)).with_cast_shadows(true);
    lights.register_static_light(StaticLight::new(EntityId(0), sun, f32::MAX));

    for id in 1..=STATIC_LIGHTS {
        let origin = Vec3::new(
            rng.gen_range(-FIELD_SIZE..FIELD_SIZE),
            rng.gen_range(0.5..8.0),
            rng.gen_range(-FIELD_SIZE..FIELD_SIZE),
        );
        let color = Vec3::new(rng.gen_range(0.2..1.5), rng.gen_range(0.2..1.5), rng.gen_range(0.2..1.5));
        let radius = rng.gen_range(2.0..15.0);

        let properties = match id % 10 {
            0 => {
                let direction = Vec3::new(rng.gen_range(-1.0..1.0), -1.0, rng.gen_range(-1.0..1.0));
                let texture = ProjectorTexture { id, replicate_to_all_sides: false };
                LightProperties::projector(origin, direction, color, radius, rng.gen_range(15.0..60.0), texture)
            }
            1 => LightProperties::area(origin, Mat3::identity(), color, radius, 2.0, 1.0),
            _ => LightProperties::point(origin, color, radius),
        };
        let properties = properties.with_cast_shadows(rng.gen_bool(0.2));
        lights.register_static_light(StaticLight::new(EntityId(id), properties, rng.gen_range(40.0..150.0)));
    }
}

fn main() -> Result<(), DemoError> {
    env_logger::init();

    let config = load_config()?;
    config.validate()?;
    let max_lights = config.lighting.max_lights_per_frame;
    let mut lights = LightFrameContext::new(config);
    let mut renderer = CountingRenderer::new(max_lights);
    let mut atlas = ShadowAtlas::new(ATLAS_SLOTS);
    let mut octree = SectorCounter::default();
    let mut rng = StdRng::seed_from_u64(7);

    scatter_lights(&mut lights, &mut rng);
    log::info!("Scattered {} static lights", lights.static_lights().len());

    for caster in 0..4 {
        let center = Vec3::new(caster as f32 * 6.0 - 9.0, 1.0, -12.0);
        let shadow = PerObjectShadow {
            caster: EntityId(10_000 + caster),
            caster_bounds: AABB::from_center_extents(center, Vec3::new(1.0, 1.0, 2.0)),
            const_bias: 0.001,
            slope_bias: 2.0,
            jitter: 0.5,
            bbox_scale: Vec3::repeat(1.1),
            texture_size: 512,
        };
        lights.add_per_object_shadow(shadow, &mut octree);
    }

    let mut total_passes = 0;
    for frame in 1..=FRAME_COUNT {
        lights.begin_frame(frame);

        let angle = frame as f32 * 0.02;
        let mut camera = Camera::perspective(Vec3::new(angle.cos() * 40.0, 6.0, angle.sin() * 40.0), 60.0, 16.0 / 9.0, 0.1, 200.0)
            .with_viewport(1920, 1080);
        camera.set_target(Vec3::new(0.0, 2.0, 0.0));
        let pass = RenderPassInfo::general(frame, camera.clone());

        let discovered = lights.find_potential_light_sources(&pass, &octree);

        // Muzzle flashes: short-lived dynamic lights that skip some frames
        for flash in 0..FLICKERING_LIGHTS {
            if rng.gen_bool(0.3) {
                continue;
            }
            let origin = Vec3::new(rng.gen_range(-30.0..30.0), 1.5, rng.gen_range(-30.0..30.0));
            let light = LightProperties::point(origin, Vec3::new(1.0, 0.6, 0.2), rng.gen_range(1.0..4.0));
            lights.submit_light(light, EntityId(20_000 + flash), rng.gen_range(0.7..1.0), &pass, &octree);
        }

        renderer.begin_view();
        let stats = lights.prepare_view(&pass, &mut renderer, &mut octree);
        let passes = lights.schedule_shadows(&pass, &mut atlas, &mut renderer);
        total_passes += passes.len();
        lights.submit_shadow_passes(passes, &mut renderer);

        // Portal view every few frames
        if frame % 16 == 0 {
            lights.begin_recursive_pass();
            let portal = RenderPassInfo::recursive(frame, camera, 1);
            renderer.begin_view();
            let portal_stats = lights.prepare_view(&portal, &mut renderer, &mut octree);
            let applied = lights.end_recursive_pass();
            log::debug!("Portal view accepted {} lights, {} queued changes applied", portal_stats.accepted, applied);
        }

        if frame % 30 == 0 {
            let shadow_stats = lights.shadows().last_stats();
            log::info!(
                "Frame {frame}: {discovered} discovered, {} live, {} real, {} culled, {} expired, {} over limit, \
                 {} slot refreshes, {} shadow passes ({} cached sides, {} truncated lights)",
                lights.registry().len(),
                stats.real_lights,
                stats.culled,
                stats.expired,
                stats.over_limit,
                renderer.updates,
                shadow_stats.light_passes + shadow_stats.per_object_passes,
                shadow_stats.cached_sides,
                shadow_stats.truncated_lights
            );
        }
    }

    let bbox = AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(2.0));
    let combination = lights.affecting_lights(&bbox);
    log::info!(
        "Done: {} shadow passes scheduled, {} handed to the renderer, {} sector registrations, {} dirty casters, \
         {} static lights in the combination",
        total_passes,
        renderer.shadow_passes,
        octree.registered,
        octree.dirty,
        lights.combination(combination).map_or(0, <[EntityId]>::len)
    );
    Ok(())
}
