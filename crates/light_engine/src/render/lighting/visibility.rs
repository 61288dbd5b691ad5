//! Light visibility tests
//!
//! Stateless predicates against a view frustum. Callers build the frustum once
//! per view with [`Camera::frustum`] and reuse it for every light.

use crate::foundation::math::Vec3;
use crate::render::lighting::light::{LightFlags, LightProperties};
use crate::render::primitives::Camera;
use crate::scene::{Frustum, Sphere, OBB};

/// Near plane of synthetic projector cameras
pub const PROJECTOR_NEAR_PLANE: f32 = 0.1;

/// Sphere against the view
pub fn sphere_visible(view: &Frustum, origin: Vec3, radius: f32) -> bool {
    view.intersects_sphere(&Sphere::new(origin, radius))
}

/// Oriented box placed at `origin` against the view
pub fn obb_visible(view: &Frustum, origin: Vec3, obb: &OBB) -> bool {
    view.intersects_obb(origin, obb)
}

/// Projector pyramid against the view
pub fn projector_cone_visible(view: &Frustum, light_camera: &Camera) -> bool {
    view.intersects_frustum(&light_camera.frustum())
}

/// Camera looking through a projector's cone, if the light has one
pub fn projector_camera(light: &LightProperties) -> Option<Camera> {
    if !light.has_projector_cone() {
        return None;
    }
    Some(Camera::projector(
        light.origin,
        light.projection_direction(),
        light.frustum_half_angle * 2.0,
        PROJECTOR_NEAR_PLANE,
        light.radius.max(PROJECTOR_NEAR_PLANE * 2.0),
    ))
}

/// Bounding volume test for one light
///
/// Probes and area lights use their oriented box, everything else its sphere.
/// Post-renderer lights are always visible; sun and directional lights are not
/// bounded by their radius and always pass.
pub fn light_volume_visible(view: &Frustum, light: &LightProperties) -> bool {
    if light.flags.contains(LightFlags::POST_RENDERER) || light.is_global() {
        return true;
    }
    match light.bounding_obb() {
        Some(obb) => obb_visible(view, light.origin, &obb),
        None => sphere_visible(view, light.origin, light.radius),
    }
}

/// Full visibility test: bounding volume, then the projector cone
pub fn light_visible(view: &Frustum, light: &LightProperties) -> bool {
    if !light_volume_visible(view, light) {
        return false;
    }
    if light.flags.contains(LightFlags::POST_RENDERER) {
        return true;
    }
    projector_camera(light).map_or(true, |camera| projector_cone_visible(view, &camera))
}
