//! # 3D Camera System
//!
//! Camera service used by light culling, scissor projection and shadow pass
//! construction. Matrix math follows the engine's P × X × V chain: a
//! right-handed Y-up view matrix (V), the Vulkan axis flip (X) and a projection
//! with depth mapped to [0, 1] (P).
//!
//! ## Design Principles
//! - **Library-agnostic**: No graphics API types in camera math
//! - **Immutable operation**: Queries never modify camera state
//! - **One convention**: Every consumer projects through the same matrices

use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3, Vec4};
use crate::scene::{Frustum, Sphere};

/// Projection model of a camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection driven by the camera's field of view
    Perspective,
    /// Orthographic projection with a square cross-section
    Orthographic {
        /// Half the width and height of the view volume in world units
        half_extent: f32,
    },
}

/// 3D Camera for perspective and orthographic projections
///
/// # Coordinate System
/// Uses a right-handed Y-up coordinate system in view space. The Vulkan
/// coordinate transformation converts to Y-down, Z-forward clip space, so
/// normalized window coordinates grow rightward and downward.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians (perspective projection)
    pub fov: f32,

    /// Aspect ratio (width / height) for projection calculations
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,

    /// Projection model
    pub projection: Projection,

    /// Viewport width in pixels
    pub viewport_width: u32,

    /// Viewport height in pixels
    pub viewport_height: u32,

    /// Multiplier applied to view distances (1.0 = no zoom)
    pub zoom_factor: f32,
}

impl Camera {
    /// Create a new perspective camera with standard Y-up orientation
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `aspect` - Aspect ratio (width / height) of the viewport
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    ///
    /// # Example
    /// ```rust
    /// use light_engine::foundation::math::Vec3;
    /// use light_engine::render::primitives::Camera;
    ///
    /// let camera = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), 75.0, 16.0 / 9.0, 0.1, 100.0)
    ///     .with_viewport(1920, 1080);
    /// assert_eq!(camera.viewport_width, 1920);
    /// ```
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
            projection: Projection::Perspective,
            viewport_width: 1280,
            viewport_height: 720,
            zoom_factor: 1.0,
        }
    }

    /// Create an orthographic camera looking from `position` towards `target`
    pub fn orthographic(position: Vec3, target: Vec3, half_extent: f32, near: f32, far: f32) -> Self {
        let forward = target - position;
        Self {
            position,
            target,
            up: utils::stable_up(&forward),
            fov: 0.0,
            aspect: 1.0,
            near,
            far,
            projection: Projection::Orthographic { half_extent },
            viewport_width: 1,
            viewport_height: 1,
            zoom_factor: 1.0,
        }
    }

    /// Create the camera a projector light would see through
    ///
    /// Looks from `origin` along `direction` with a square aspect ratio.
    pub fn projector(origin: Vec3, direction: Vec3, fov_degrees: f32, near: f32, far: f32) -> Self {
        let mut camera = Self::perspective(origin, fov_degrees, 1.0, near, far);
        camera.target = origin + direction;
        camera.up = utils::stable_up(&direction);
        camera.viewport_width = 1;
        camera.viewport_height = 1;
        camera
    }

    /// Set the viewport size in pixels and match the aspect ratio to it
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.set_viewport(width, height);
        self
    }

    /// Set the view distance multiplier
    pub fn with_zoom_factor(mut self, zoom_factor: f32) -> Self {
        self.zoom_factor = zoom_factor;
        self
    }

    /// Update camera target (look-at point)
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        log::trace!("Camera target updated to: {:?}", target);
    }

    /// Resize the viewport and update the aspect ratio
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
        if height > 0 {
            self.set_aspect_ratio(width as f32 / height as f32);
        }
    }

    /// Update camera aspect ratio for viewport changes
    ///
    /// Only logs changes larger than 0.01 to reduce noise during resizes.
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if (self.aspect - aspect).abs() > 0.01 {
            log::debug!("Camera aspect ratio changed: {:.3} -> {:.3}", self.aspect, aspect);
        }
        self.aspect = aspect;
    }

    /// Normalized viewing direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Generate view matrix for world-to-camera space transformation
    pub fn get_view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// View matrix followed by the Vulkan axis flip (X × V)
    ///
    /// Points in front of the camera have positive z in this space, which is
    /// the space [`Camera::get_projection_matrix`] expects.
    pub fn get_render_view_matrix(&self) -> Mat4 {
        Mat4::vulkan_coordinate_transform() * self.get_view_matrix()
    }

    /// Generate the projection matrix for the camera's projection model
    pub fn get_projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective => Mat4::perspective(self.fov, self.aspect, self.near, self.far),
            Projection::Orthographic { half_extent } => {
                Mat4::orthographic(half_extent, half_extent, self.near, self.far)
            }
        }
    }

    /// Generate combined view-projection matrix (P × X × V)
    pub fn get_view_projection_matrix(&self) -> Mat4 {
        self.get_projection_matrix() * self.get_render_view_matrix()
    }

    /// Frustum of this camera in world space
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.get_view_projection_matrix())
    }

    /// Check whether a world-space point lies inside the view volume
    pub fn is_point_visible(&self, point: Vec3) -> bool {
        self.frustum().contains_point(point)
    }

    /// Check whether a sphere touches the view volume
    pub fn is_sphere_visible(&self, sphere: &Sphere) -> bool {
        self.frustum().intersects_sphere(sphere)
    }

    /// Project a world-space point to clip space
    pub fn project_to_clip(&self, point: Vec3) -> Vec4 {
        self.get_view_projection_matrix() * point.push(1.0)
    }
}

impl Default for Camera {
    /// Perspective camera above and behind the origin, looking at it
    ///
    /// 45 degree field of view, 1280x720 viewport, near 0.1 and far 1000.
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 3.0, 3.0), 45.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn forward_camera() -> Camera {
        let mut camera = Camera::perspective(Vec3::zeros(), 90.0, 1.0, 0.1, 100.0).with_viewport(800, 800);
        camera.set_target(Vec3::new(0.0, 0.0, -1.0));
        camera
    }

    #[test]
    fn test_render_view_puts_forward_on_positive_z() {
        let camera = forward_camera();
        let ahead = camera.get_render_view_matrix() * Vec4::new(0.0, 0.0, -10.0, 1.0);
        assert_relative_eq!(ahead.z, 10.0, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_y_points_down() {
        let camera = forward_camera();
        let above = camera.project_to_clip(Vec3::new(0.0, 5.0, -10.0));
        assert!(above.y / above.w < 0.0);
    }

    #[test]
    fn test_visibility_queries() {
        let camera = forward_camera();
        assert!(camera.is_point_visible(Vec3::new(0.0, 0.0, -50.0)));
        assert!(!camera.is_point_visible(Vec3::new(0.0, 0.0, 50.0)));
        assert!(camera.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 0.0, -50.0), 1.0)));
        assert!(!camera.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 0.0, -200.0), 10.0)));
    }

    #[test]
    fn test_projector_looks_along_direction() {
        let projector = Camera::projector(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -1.0, 0.0), 60.0, 0.1, 20.0);
        assert!(projector.is_point_visible(Vec3::new(0.0, 0.0, 0.0)));
        assert!(!projector.is_point_visible(Vec3::new(0.0, 20.0, 0.0)));
    }

    #[test]
    fn test_orthographic_box() {
        let ortho = Camera::orthographic(Vec3::new(0.0, 50.0, 0.0), Vec3::zeros(), 8.0, 0.0, 100.0);
        assert!(ortho.is_point_visible(Vec3::new(7.0, 0.0, 7.0)));
        assert!(!ortho.is_point_visible(Vec3::new(9.0, 0.0, 0.0)));
    }
}
