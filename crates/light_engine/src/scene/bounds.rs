//! Bounding volumes and view frustums
//!
//! Plain geometry used by the visibility tests: boxes, spheres, oriented
//! boxes, planes and six-plane frustums extracted from view-projection
//! matrices.

use crate::foundation::math::{Mat3, Mat4, Vec3, Vec4};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Full edge lengths of the box
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Radius of the sphere through the box corners
    pub fn radius(&self) -> f32 {
        self.extents().magnitude()
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Squared distance from a point to the box (0 when inside)
    pub fn distance_sq_to_point(&self, point: Vec3) -> f32 {
        let clamped = Vec3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        );
        (point - clamped).magnitude_squared()
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center in world space
    pub center: Vec3,
    /// Radius in world units
    pub radius: f32,
}

impl Sphere {
    /// Create a new sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Axis-aligned box enclosing the sphere
    pub fn bounding_box(&self) -> AABB {
        AABB::from_center_extents(self.center, Vec3::repeat(self.radius))
    }
}

/// Oriented bounding box, positioned relative to a reference point
///
/// `center` is the offset of the box center from the reference point in world
/// orientation, so the same box can be tested at any light origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OBB {
    /// Box axes as matrix columns (orthonormal)
    pub axes: Mat3,
    /// Half extents along each axis
    pub half_extents: Vec3,
    /// Offset of the box center from the reference point
    pub center: Vec3,
}

impl OBB {
    /// Build an oriented box from a local AABB and a rotation
    pub fn from_aabb(rotation: &Mat3, local: &AABB) -> Self {
        Self {
            axes: *rotation,
            half_extents: local.extents(),
            center: rotation * local.center(),
        }
    }

    /// Radius of the box projected onto `normal`
    pub fn projected_radius(&self, normal: &Vec3) -> f32 {
        (0..3)
            .map(|axis| normal.dot(&self.axes.column(axis)).abs() * self.half_extents[axis])
            .sum()
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized, pointing into the half space it keeps)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Build a normalized plane from `ax + by + cz + d` coefficients
    fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}

/// Frustum for visibility culling
///
/// Planes face inward: a point is inside when its distance to every plane is
/// non-negative.
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, top, bottom, near, far)
    pub planes: [Plane; 6],
    /// Corner points, far face first then near face, `None` for a singular matrix
    corners: Option<[Vec3; 8]>,
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    ///
    /// Uses the Gribb-Hartmann method for clip volumes with `-w <= x, y <= w`
    /// and `0 <= z <= w`.
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { vp_matrix.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let planes = [
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r2),
            Plane::from_coefficients(r3 - r2),
        ];

        Self {
            planes,
            corners: Self::unproject_corners(vp_matrix),
        }
    }

    fn unproject_corners(vp_matrix: &Mat4) -> Option<[Vec3; 8]> {
        let inverse = vp_matrix.try_inverse()?;
        let ring = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let mut corners = [Vec3::zeros(); 8];

        for (face, depth) in [1.0_f32, 0.0].into_iter().enumerate() {
            for (i, (x, y)) in ring.iter().enumerate() {
                let world = inverse * Vec4::new(*x, *y, depth, 1.0);
                if world.w.abs() <= f32::EPSILON {
                    return None;
                }
                corners[face * 4 + i] = world.xyz() / world.w;
            }
        }
        Some(corners)
    }

    /// Corner points (far face 0..4, near face 4..8) if the matrix was invertible
    pub fn corners(&self) -> Option<&[Vec3; 8]> {
        self.corners.as_ref()
    }

    /// Check if a point is inside the frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if a sphere is inside or intersects the frustum
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Check if an oriented box placed at `position` is inside or intersects the frustum
    pub fn intersects_obb(&self, position: Vec3, obb: &OBB) -> bool {
        let center = position + obb.center;
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(center) >= -obb.projected_radius(&plane.normal))
    }

    /// Check if the segment `p0..p1` passes through the frustum (Cyrus-Beck clipping)
    pub fn intersects_segment(&self, p0: Vec3, p1: Vec3) -> bool {
        let delta = p1 - p0;
        if delta.magnitude_squared() <= f32::EPSILON * f32::EPSILON {
            return self.contains_point(p0);
        }

        let mut t_enter = 0.0_f32;
        let mut t_leave = 1.0_f32;

        for plane in &self.planes {
            let numerator = plane.distance_to_point(p0);
            let denominator = -plane.normal.dot(&delta);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return false;
                }
                continue;
            }

            let t = numerator / denominator;
            if denominator < 0.0 {
                t_enter = t_enter.max(t);
                if t_enter > t_leave {
                    return false;
                }
            } else {
                t_leave = t_leave.min(t);
                if t_leave < t_enter {
                    return false;
                }
            }
        }
        true
    }

    /// Conservative frustum-frustum overlap test
    ///
    /// Tests corner inclusion both ways, then the twelve edges of each frustum
    /// against the other. Returns true when corners are unavailable.
    pub fn intersects_frustum(&self, other: &Frustum) -> bool {
        let (Some(ours), Some(theirs)) = (self.corners(), other.corners()) else {
            return true;
        };

        if theirs.iter().any(|p| self.contains_point(*p))
            || ours.iter().any(|p| other.contains_point(*p))
        {
            return true;
        }

        let edges_hit = |corners: &[Vec3; 8], target: &Frustum| {
            (0..4).any(|i| {
                let next = (i + 1) % 4;
                target.intersects_segment(corners[i], corners[next])
                    || target.intersects_segment(corners[i + 4], corners[next + 4])
                    || target.intersects_segment(corners[i], corners[i + 4])
            })
        };

        edges_hit(theirs, self) || edges_hit(ours, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{utils, Mat4Ext};
    use approx::assert_relative_eq;

    fn looking_down_negative_z() -> Frustum {
        let view = Mat4::look_at(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 1.0, 0.0));
        let proj = Mat4::perspective(utils::deg_to_rad(90.0), 1.0, 0.1, 100.0);
        Frustum::from_matrix(&(proj * Mat4::vulkan_coordinate_transform() * view))
    }

    #[test]
    fn test_sphere_visibility() {
        let frustum = looking_down_negative_z();

        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -50.0), 1.0)));
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 50.0), 1.0)));
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -200.0), 10.0)));
        // Straddles the far plane
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -105.0), 10.0)));
    }

    #[test]
    fn test_corners_lie_on_near_and_far_planes() {
        let frustum = looking_down_negative_z();
        let corners = frustum.corners().expect("perspective matrix is invertible");

        for far in &corners[0..4] {
            assert_relative_eq!(far.z, -100.0, epsilon = 1e-2);
        }
        for near in &corners[4..8] {
            assert_relative_eq!(near.z, -0.1, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_obb_uses_rotation() {
        let frustum = looking_down_negative_z();
        // Thin slab behind the camera, stretched forward by a 90 degree rotation
        let local = AABB::new(Vec3::new(0.0, -0.5, -0.5), Vec3::new(20.0, 0.5, 0.5));
        let unrotated = OBB::from_aabb(&Mat3::identity(), &local);
        let rotation = Mat3::from_columns(&[
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
        ]);
        let rotated = OBB::from_aabb(&rotation, &local);

        let origin = Vec3::new(0.0, 0.0, 5.0);
        assert!(!frustum.intersects_obb(origin, &unrotated));
        assert!(frustum.intersects_obb(origin, &rotated));
        assert!(!frustum.intersects_obb(Vec3::new(0.0, 0.0, 30.0), &rotated));
    }

    #[test]
    fn test_segment_crossing_frustum() {
        let frustum = looking_down_negative_z();
        // Both ends outside (left and right), middle inside
        assert!(frustum.intersects_segment(Vec3::new(-500.0, 0.0, -50.0), Vec3::new(500.0, 0.0, -50.0)));
        // Entirely behind the camera
        assert!(!frustum.intersects_segment(Vec3::new(-5.0, 0.0, 5.0), Vec3::new(5.0, 0.0, 5.0)));
    }

    #[test]
    fn test_frustum_intersection() {
        let camera = looking_down_negative_z();

        let facing = {
            let view = Mat4::look_at(Vec3::new(0.0, 0.0, -150.0), Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0));
            let proj = Mat4::perspective(utils::deg_to_rad(30.0), 1.0, 0.1, 200.0);
            Frustum::from_matrix(&(proj * Mat4::vulkan_coordinate_transform() * view))
        };
        assert!(camera.intersects_frustum(&facing));

        let behind = {
            let view = Mat4::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, 20.0), Vec3::new(0.0, 1.0, 0.0));
            let proj = Mat4::perspective(utils::deg_to_rad(30.0), 1.0, 0.1, 50.0);
            Frustum::from_matrix(&(proj * Mat4::vulkan_coordinate_transform() * view))
        };
        assert!(!camera.intersects_frustum(&behind));
    }

    #[test]
    fn test_aabb_distance() {
        let aabb = AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0));
        assert_eq!(aabb.distance_sq_to_point(Vec3::new(0.5, 0.0, 0.0)), 0.0);
        assert_relative_eq!(aabb.distance_sq_to_point(Vec3::new(4.0, 0.0, 0.0)), 9.0);
        assert_relative_eq!(aabb.radius(), 3.0_f32.sqrt());
    }
}
