//! Light volume projection
//!
//! Bounds a light's contribution on screen with a pixel rectangle. The light
//! sphere is bounded through its view-space tangent planes; textured
//! projectors additionally project their pyramid and keep the tighter of the
//! two bounds when the pyramid projects reliably.

use crate::foundation::math::{utils, Mat4, Vec2, Vec3};
use crate::render::lighting::light::{LightProperties, ScissorRect};
use crate::render::primitives::Camera;

/// Smallest clip-space w used before the perspective divide
const MIN_CLIP_W: f32 = 1e-14;

/// Index of the first pyramid vertex in the vertex list
const PYRAMID_START: usize = 4;

/// Per-view projector of light volumes into scissor rectangles
///
/// Holds the view's matrices so a whole light list can be processed without
/// rebuilding them.
#[derive(Debug, Clone)]
pub struct LightVolumeProjector {
    camera_position: Vec3,
    view: Mat4,
    projection: Mat4,
    viewport_width: u32,
    viewport_height: u32,
}

impl LightVolumeProjector {
    /// Capture the matrices and viewport of a camera
    pub fn new(camera: &Camera) -> Self {
        Self {
            camera_position: camera.position,
            view: camera.get_render_view_matrix(),
            projection: camera.get_projection_matrix(),
            viewport_width: camera.viewport_width,
            viewport_height: camera.viewport_height,
        }
    }

    /// Rectangle covering the viewport
    pub fn full_viewport(&self) -> ScissorRect {
        ScissorRect::full(self.viewport_width, self.viewport_height)
    }

    /// Compute the scissor rectangle of a light known to be on screen
    pub fn scissor(&self, light: &LightProperties) -> ScissorRect {
        debug_assert!(light.is_finite(), "light origin and radius must be finite");

        let radius = light.effective_radius();
        let projective = light.is_projective();
        let inside = (light.origin - self.camera_position).magnitude() <= radius;

        if inside && !projective {
            return self.full_viewport();
        }

        let mut vertices = [Vec3::zeros(); PYRAMID_START + 5];
        let mut count = PYRAMID_START;
        let center = self.to_view(light.origin);

        if !inside {
            vertices[..PYRAMID_START].copy_from_slice(&sphere_tangent_points(&center, radius));
        }
        if projective {
            for (slot, point) in vertices[PYRAMID_START..].iter_mut().zip(pyramid_points(light, radius)) {
                *slot = self.to_view(point);
            }
            count = vertices.len();
        }

        let (mut sphere_min, mut sphere_max, start) = if inside {
            (Vec2::zeros(), Vec2::repeat(1.0), PYRAMID_START)
        } else {
            (Vec2::repeat(1.0), Vec2::zeros(), 0)
        };
        let mut pyramid_min = Vec2::repeat(1.0);
        let mut pyramid_max = Vec2::zeros();
        let mut pyramid_min_depth = f32::MAX;

        for (index, vertex) in vertices.iter().enumerate().take(count).skip(start) {
            let (window, depth) = self.project(vertex);
            if projective && index >= PYRAMID_START {
                pyramid_min = pyramid_min.inf(&window);
                pyramid_max = pyramid_max.sup(&window);
                pyramid_min_depth = pyramid_min_depth.min(depth);
            } else {
                sphere_min = sphere_min.inf(&window);
                sphere_max = sphere_max.sup(&window);
            }
        }

        let (min, max) = if projective {
            // A pyramid crossing the near plane does not project reliably
            if pyramid_min_depth < 0.0 {
                pyramid_min = sphere_min;
                pyramid_max = sphere_max;
            }
            clamp_into(&pyramid_min, &pyramid_max, &sphere_min, &sphere_max)
        } else {
            (sphere_min, sphere_max)
        };

        self.to_pixels(&min, &max)
    }

    fn to_view(&self, point: Vec3) -> Vec3 {
        (self.view * point.push(1.0)).xyz()
    }

    /// Project a view-space point to normalized window coordinates and NDC depth
    fn project(&self, point: &Vec3) -> (Vec2, f32) {
        let clip = self.projection * point.push(1.0);
        let w = clip.w.max(MIN_CLIP_W);
        let ndc = clip.xyz() / w;
        let window = Vec2::new(
            (1.0 + ndc.x.clamp(-1.0, 1.0)) * 0.5,
            (1.0 + ndc.y.clamp(-1.0, 1.0)) * 0.5,
        );
        (window, ndc.z)
    }

    fn to_pixels(&self, min: &Vec2, max: &Vec2) -> ScissorRect {
        let width = self.viewport_width as f32;
        let height = self.viewport_height as f32;

        let x = ((min.x * width).floor().max(0.0) as u32).min(self.viewport_width);
        let y = ((min.y * height).floor().max(0.0) as u32).min(self.viewport_height);
        let w = ((max.x - min.x).max(0.0) * width).ceil() as u32;
        let h = ((max.y - min.y).max(0.0) * height).ceil() as u32;

        ScissorRect {
            x,
            y,
            width: w.min(self.viewport_width - x),
            height: h.min(self.viewport_height - y),
        }
    }
}

/// Points where the left, right, top and bottom tangent planes touch the sphere
///
/// `center` is in view space; the planes pass through the eye.
fn sphere_tangent_points(center: &Vec3, radius: f32) -> [Vec3; 4] {
    let r = radius;
    let (lx, ly, lz) = (center.x, center.y, center.z);

    let tangent = |l: f32, sign: f32| -> (f32, f32) {
        let denominator = l * l + lz * lz;
        let discriminant = (r * r * l * l - denominator * (r * r - lz * lz)).max(0.0).sqrt();
        let n = if is_zero(denominator) { 1.0 } else { (r * l + sign * discriminant) / denominator };
        let nz = if is_zero(lz) { 1.0 } else { (r - n * l) / lz };
        (n, nz)
    };
    let normalized = |v: Vec3| v.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::z);

    let (nx, nz) = tangent(lx, 1.0);
    let left = normalized(Vec3::new(nx, 0.0, nz));
    let (nx, nz) = tangent(lx, -1.0);
    let right = normalized(Vec3::new(nx, 0.0, nz));
    let (ny, nz) = tangent(ly, -1.0);
    let bottom = normalized(Vec3::new(0.0, ny, nz));
    let (ny, nz) = tangent(ly, 1.0);
    let top = normalized(Vec3::new(0.0, ny, nz));

    [center - left * r, center - right * r, center - top * r, center - bottom * r]
}

/// Apex and the four base corners of a projector's pyramid, in world space
fn pyramid_points(light: &LightProperties, radius: f32) -> [Vec3; 5] {
    let front = light.projection_direction() * radius;
    let up = -light.orientation.column(1).into_owned();
    let right = light.orientation.column(2).into_owned();

    let cone_radius = radius * utils::deg_to_rad(light.frustum_half_angle).tan();
    let base = (cone_radius * cone_radius * 2.0).sqrt();

    let diagonal_a = up + right;
    let inv_length = 1.0 / diagonal_a.magnitude().max(f32::EPSILON);
    let diagonal_a = diagonal_a * inv_length;
    let diagonal_b = (up - right) * inv_length;

    let origin = light.origin;
    [
        origin,
        origin + front + diagonal_a * base,
        origin + front + diagonal_b * base,
        origin + front - diagonal_a * base,
        origin + front - diagonal_b * base,
    ]
}

/// Clamp the inner bounds into the outer bounds, one edge at a time
fn clamp_into(inner_min: &Vec2, inner_max: &Vec2, outer_min: &Vec2, outer_max: &Vec2) -> (Vec2, Vec2) {
    let clamp = |value: f32, low: f32, high: f32| value.max(low).min(high);
    let min = Vec2::new(
        clamp(inner_min.x, outer_min.x, outer_max.x),
        clamp(inner_min.y, outer_min.y, outer_max.y),
    );
    let max = Vec2::new(
        clamp(inner_max.x, min.x, outer_max.x),
        clamp(inner_max.y, min.y, outer_max.y),
    );
    (min, max)
}

fn is_zero(value: f32) -> bool {
    value.abs() < 1e-12
}
