//! Whole-frame runs of the light pipeline against in-memory collaborators

use approx::assert_relative_eq;

use super::fakes::{FakeBackend, FakeSectors, ScriptedAllocator};
use crate::core::{LightSystemConfig, LightingConfig};
use crate::foundation::math::{Vec3, Vec4};
use crate::render::lighting::{
    EntityId, LightFlags, LightFrameContext, LightProperties, RenderPassInfo, ScissorRect, ShadowState, StaticLight,
    SubmitOutcome,
};
use crate::render::primitives::Camera;
use crate::scene::AABB;

fn camera() -> Camera {
    let mut camera = Camera::perspective(Vec3::zeros(), 60.0, 16.0 / 9.0, 0.1, 100.0).with_viewport(1280, 720);
    camera.set_target(Vec3::new(0.0, 0.0, -1.0));
    camera
}

fn point_at(distance: f32, radius: f32) -> LightProperties {
    LightProperties::point(Vec3::new(0.0, 0.0, -distance), Vec3::repeat(1.0), radius)
}

fn scissor_of(lights: &LightFrameContext, owner: u64) -> Option<ScissorRect> {
    lights
        .lights()
        .find(|(_, record)| record.owner == EntityId(owner))
        .map(|(_, record)| record.scissor)
}

#[test]
fn test_three_light_scenario() {
    let mut lights = LightFrameContext::default();
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    for (owner, distance) in [(1, 50.0), (2, 5.0), (3, 200.0)] {
        let outcome = lights.submit_light(point_at(distance, 10.0), EntityId(owner), 1.0, &pass, &sectors);
        assert!(matches!(outcome, SubmitOutcome::Inserted(_)));
    }

    let stats = lights.prepare_view(&pass, &mut backend, &mut sectors);

    assert_eq!(stats.culled, 1);
    assert_eq!(lights.registry().len(), 2);
    assert!(scissor_of(&lights, 3).is_none());

    assert_eq!(scissor_of(&lights, 2), Some(ScissorRect::full(1280, 720)));

    let distant = scissor_of(&lights, 1).unwrap();
    assert!(distant.area() < ScissorRect::full(1280, 720).area());
    assert!(distant.width > 0 && distant.height > 0);
    assert!(distant.fits(1280, 720));
}

#[test]
fn test_lights_expire_when_not_resubmitted() {
    let mut lights = LightFrameContext::default();
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();

    for frame in 1..=5 {
        lights.begin_frame(frame);
        let pass = RenderPassInfo::general(frame, camera());
        lights.submit_light(point_at(20.0, 5.0), EntityId(1), 1.0, &pass, &sectors);
        if frame == 1 {
            lights.submit_light(point_at(30.0, 5.0), EntityId(2), 1.0, &pass, &sectors);
        }
        let stats = lights.prepare_view(&pass, &mut backend, &mut sectors);
        assert_eq!(stats.expired, usize::from(frame == 4));
    }

    let owners: Vec<EntityId> = lights.lights().map(|(_, record)| record.owner).collect();
    assert_eq!(owners, vec![EntityId(1)]);
}

#[test]
fn test_per_frame_cap_and_fake_lights() {
    let config = LightSystemConfig::new().with_lighting(LightingConfig::new().with_max_lights_per_frame(3));
    let mut lights = LightFrameContext::new(config);
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    for owner in 1..=5 {
        lights.submit_light(point_at(10.0 + owner as f32, 2.0), EntityId(owner), 1.0, &pass, &sectors);
    }
    lights.submit_light(point_at(12.0, 2.0).with_flags(LightFlags::FAKE), EntityId(9), 1.0, &pass, &sectors);

    let stats = lights.prepare_view(&pass, &mut backend, &mut sectors);

    assert_eq!(stats.real_lights, 3);
    assert_eq!(stats.over_limit, 2);
    assert_eq!(lights.registry().len(), 4);
    assert_eq!(backend.accepted, vec![EntityId(1), EntityId(2), EntityId(3)]);

    let (_, last) = lights.lights().last().unwrap();
    assert_eq!(last.owner, EntityId(9));
    assert!(last.backend_slot.is_none());
}

#[test]
fn test_lazy_acceptance_without_consistent_order() {
    let config = LightSystemConfig::new().with_lighting(LightingConfig::new().with_consistent_sort_order(false));
    let mut lights = LightFrameContext::new(config);
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    let sun = LightProperties::sun(Vec3::new(0.0, 1000.0, 0.0), Vec3::repeat(1.0));
    lights.submit_light(sun, EntityId(100), 1.0, &pass, &sectors);
    lights.submit_light(point_at(20.0, 5.0), EntityId(1), 1.0, &pass, &sectors);
    lights.submit_light(point_at(20.0, 5.0).with_flags(LightFlags::FAKE), EntityId(2), 1.0, &pass, &sectors);

    let stats = lights.prepare_view(&pass, &mut backend, &mut sectors);
    assert_eq!(stats.accepted, 1);
    assert_eq!(backend.accepted, vec![EntityId(100)]);

    let point = lights.registry().key_for_owner(EntityId(1)).unwrap();
    let fake = lights.registry().key_for_owner(EntityId(2)).unwrap();
    let slot = lights.request_light_slot(point, &mut backend);
    assert!(slot.is_some());
    assert_eq!(lights.request_light_slot(point, &mut backend), slot);
    assert!(lights.request_light_slot(fake, &mut backend).is_none());
    assert_eq!(backend.accepted.len(), 2);
}

#[test]
fn test_sector_registration_skips_small_lights() {
    let mut lights = LightFrameContext::default();
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    lights.submit_light(point_at(20.0, 5.0), EntityId(1), 1.0, &pass, &sectors);
    lights.submit_light(point_at(20.0, 0.25), EntityId(2), 1.0, &pass, &sectors);

    let stats = lights.prepare_view(&pass, &mut backend, &mut sectors);

    assert_eq!(stats.sector_registrations, 1);
    assert_eq!(sectors.registered, vec![EntityId(1)]);
}

#[test]
fn test_recursive_pass_freezes_structure() {
    let mut lights = LightFrameContext::default();
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());
    for owner in 1..=3 {
        lights.submit_light(point_at(10.0 * owner as f32, 3.0), EntityId(owner), 1.0, &pass, &sectors);
    }
    lights.prepare_view(&pass, &mut backend, &mut sectors);
    let before = lights.snapshot();

    lights.begin_recursive_pass();
    let portal = RenderPassInfo::recursive(1, camera(), 1);
    assert_eq!(lights.retire_owner(EntityId(2)), SubmitOutcome::Deferred);
    let disabled = point_at(10.0, 3.0).with_flags(LightFlags::DISABLED);
    assert_eq!(lights.submit_light(disabled, EntityId(1), 1.0, &portal, &sectors), SubmitOutcome::Deferred);

    let mut portal_backend = FakeBackend::default();
    let mut portal_sectors = FakeSectors::default();
    let stats = lights.prepare_view(&portal, &mut portal_backend, &mut portal_sectors);

    assert_eq!(stats.accepted, 3);
    assert_eq!(portal_sectors.registered.len(), 3);
    assert_eq!(lights.snapshot(), before);

    assert_eq!(lights.end_recursive_pass(), 2);
    let owners: Vec<EntityId> = lights.lights().map(|(_, record)| record.owner).collect();
    assert_eq!(owners, vec![EntityId(3)]);
    assert_ne!(lights.snapshot().generation, before.generation);
}

#[test]
fn test_light_disabled_during_recursive_pass_stays_gone() {
    let mut lights = LightFrameContext::default();
    let sectors = FakeSectors::default();
    lights.begin_frame(1);

    lights.begin_recursive_pass();
    let portal = RenderPassInfo::recursive(1, camera(), 1);
    assert_eq!(lights.submit_light(point_at(10.0, 3.0), EntityId(7), 1.0, &portal, &sectors), SubmitOutcome::Deferred);
    let disabled = point_at(10.0, 3.0).with_flags(LightFlags::DISABLED);
    assert_eq!(lights.submit_light(disabled, EntityId(7), 1.0, &portal, &sectors), SubmitOutcome::Removed);
    lights.end_recursive_pass();

    assert!(lights.registry().key_for_owner(EntityId(7)).is_none());
    assert_eq!(lights.lights().count(), 0);
}

#[test]
fn test_sun_submission_rules() {
    let mut lights = LightFrameContext::default();
    let sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    let dark = LightProperties::sun(Vec3::new(0.0, 1000.0, 0.0), Vec3::zeros());
    assert_eq!(lights.submit_light(dark, EntityId(1), 1.0, &pass, &sectors), SubmitOutcome::Refused);

    let mut config = LightSystemConfig::new();
    config.lighting.sun_enabled = false;
    lights.set_config(config);
    let sun = LightProperties::sun(Vec3::new(0.0, 1000.0, 0.0), Vec3::repeat(1.0));
    assert_eq!(lights.submit_light(sun.clone(), EntityId(1), 1.0, &pass, &sectors), SubmitOutcome::Refused);

    lights.set_config(LightSystemConfig::new());
    assert!(matches!(lights.submit_light(sun, EntityId(1), 1.0, &pass, &sectors), SubmitOutcome::Inserted(_)));
}

#[test]
fn test_area_visibility_gate() {
    let mut config = LightSystemConfig::new();
    config.lighting.frame_id_vis_test = true;
    let mut lights = LightFrameContext::new(config);
    let mut sectors = FakeSectors::default();
    sectors.hidden_owners.insert(EntityId(2));
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    assert!(matches!(
        lights.submit_light(point_at(10.0, 2.0), EntityId(1), 1.0, &pass, &sectors),
        SubmitOutcome::Inserted(_)
    ));
    assert_eq!(lights.submit_light(point_at(10.0, 2.0), EntityId(2), 1.0, &pass, &sectors), SubmitOutcome::Refused);

    let overlay = point_at(10.0, 2.0).with_flags(LightFlags::POST_RENDERER);
    assert!(matches!(lights.submit_light(overlay, EntityId(2), 1.0, &pass, &sectors), SubmitOutcome::Inserted(_)));

    let sun = LightProperties::sun(Vec3::new(0.0, 1000.0, 0.0), Vec3::repeat(1.0));
    assert_eq!(lights.submit_light(sun.clone(), EntityId(3), 1.0, &pass, &sectors), SubmitOutcome::Refused);
    sectors.sun_needed = true;
    assert!(matches!(lights.submit_light(sun, EntityId(3), 1.0, &pass, &sectors), SubmitOutcome::Inserted(_)));
}

#[test]
fn test_static_lights_fade_and_lose_shadows_with_distance() {
    let mut lights = LightFrameContext::default();
    let sectors = FakeSectors::default();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    let near = point_at(25.0, 5.0).with_cast_shadows(true);
    let far = point_at(90.0, 5.0).with_cast_shadows(true);
    let behind = LightProperties::point(Vec3::new(0.0, 0.0, 40.0), Vec3::repeat(1.0), 5.0);
    lights.register_static_light(StaticLight::new(EntityId(1), near, 100.0));
    lights.register_static_light(StaticLight::new(EntityId(2), far, 100.0));
    lights.register_static_light(StaticLight::new(EntityId(3), behind, 100.0));
    lights.register_static_light(StaticLight::new(EntityId(4), point_at(70.0, 5.0), 50.0));

    assert_eq!(lights.find_potential_light_sources(&pass, &sectors), 2);

    let record = |owner| {
        let key = lights.registry().key_for_owner(EntityId(owner)).unwrap();
        lights.registry().get(key).unwrap().clone()
    };
    let near = record(1);
    assert!(near.flags().contains(LightFlags::CAST_SHADOWS));
    assert_relative_eq!(near.properties.color, Vec4::new(1.0, 1.0, 1.0, 1.0));

    // 85 of 100: 10% past the fade start, multiplier 1 - 0.1 / 0.25
    let far = record(2);
    assert!(!far.flags().contains(LightFlags::CAST_SHADOWS));
    assert_relative_eq!(far.properties.color, Vec4::new(0.6, 0.6, 0.6, 1.0), epsilon = 1e-4);
}

#[test]
fn test_unregistering_static_light_shrinks_combinations() {
    let mut lights = LightFrameContext::default();
    for id in 1..=3 {
        lights.register_static_light(StaticLight::new(EntityId(id), point_at(10.0 * id as f32, 5.0), 100.0));
    }
    let sun = LightProperties::sun(Vec3::new(0.0, 1000.0, 0.0), Vec3::repeat(1.0));
    lights.register_static_light(StaticLight::new(EntityId(10), sun, f32::MAX));

    let bbox = AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0));
    let handle = lights.affecting_lights(&bbox);
    assert_eq!(lights.affecting_lights(&bbox), handle);
    assert_eq!(lights.combination(handle).unwrap(), &[EntityId(1), EntityId(2), EntityId(3)]);

    assert!(lights.unregister_static_light(EntityId(2)).is_some());
    assert_eq!(lights.combination(handle).unwrap(), &[EntityId(1), EntityId(3)]);
    assert!(lights.unregister_static_light(EntityId(2)).is_none());
}

#[test]
fn test_shadow_frame_end_to_end() {
    let mut lights = LightFrameContext::default();
    let mut backend = FakeBackend::default();
    let mut sectors = FakeSectors::default();
    let mut allocator = ScriptedAllocator::always_update();
    lights.begin_frame(1);
    let pass = RenderPassInfo::general(1, camera());

    lights.submit_light(point_at(20.0, 5.0).with_cast_shadows(true), EntityId(1), 1.0, &pass, &sectors);
    lights.submit_light(point_at(30.0, 5.0), EntityId(2), 1.0, &pass, &sectors);
    lights.prepare_view(&pass, &mut backend, &mut sectors);

    let passes = lights.schedule_shadows(&pass, &mut allocator, &mut backend);
    assert_eq!(passes.len(), 6);
    assert!(passes.iter().all(|pass| pass.owner == EntityId(1)));
    assert_eq!(backend.updated.len(), 2);

    lights.submit_shadow_passes(passes, &mut backend);
    assert_eq!(backend.submitted_passes, 6);

    let states: Vec<(EntityId, ShadowState)> =
        lights.lights().map(|(_, record)| (record.owner, record.shadow_state)).collect();
    assert_eq!(states, vec![(EntityId(1), ShadowState::Submitted), (EntityId(2), ShadowState::NotScheduled)]);
}

#[test]
fn test_no_shadow_pass_clears_cast_shadows_on_merge() {
    let mut lights = LightFrameContext::default();
    let sectors = FakeSectors::default();
    lights.begin_frame(1);
    let shadowed = RenderPassInfo::general(1, camera());
    let unshadowed = RenderPassInfo::general(1, camera()).with_shadows(false);

    let caster = point_at(20.0, 5.0).with_cast_shadows(true);
    lights.submit_light(caster.clone(), EntityId(1), 1.0, &shadowed, &sectors);
    lights.submit_light(caster, EntityId(1), 1.0, &unshadowed, &sectors);

    let (_, record) = lights.lights().next().unwrap();
    assert!(!record.flags().contains(LightFlags::CAST_SHADOWS));
}
