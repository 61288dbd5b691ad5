//! Dynamic light records
//!
//! [`LightProperties`] is what an owner submits each frame. [`LightRecord`] is
//! the registry's copy of it, plus the state the pipeline attaches across
//! frames: the backend slot, the scissor rectangle and the shadow state. Owner
//! submissions only ever replace the properties; the attached state lives in
//! separate fields that the update path does not touch.

use bitflags::bitflags;

use crate::foundation::math::{Mat3, Vec3, Vec4};
use crate::render::api::SlotId;
use crate::render::lighting::shadows::ShadowState;
use crate::scene::{AABB, OBB};

/// Largest projector half-angle in degrees
pub const MAX_PROJECTOR_HALF_ANGLE: f32 = 87.5;

/// Fraction of the view distance over which a light fades out
pub const FADE_RANGE: f32 = 0.25;

bitflags! {
    /// Behaviour flags of a light
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct LightFlags: u32 {
        /// The scene's sun
        const SUN = 1 << 0;
        /// Parallel rays, no distance attenuation
        const DIRECTIONAL = 1 << 1;
        /// Wants shadow maps
        const CAST_SHADOWS = 1 << 2;
        /// Rectangular area light
        const AREA_LIGHT = 1 << 3;
        /// Projects a texture through a pyramid
        const PROJECTOR = 1 << 4;
        /// Environment probe with box extents
        const DEFERRED_CUBEMAP = 1 << 5;
        /// Kept in the list but never lights anything
        const FAKE = 1 << 6;
        /// Only lights its own area
        const THIS_AREA_ONLY = 1 << 7;
        /// Follows the sun
        const ATTACH_TO_SUN = 1 << 8;
        /// Owner asks for removal
        const DISABLED = 1 << 9;
        /// Rendered in overlay space after the 3D scene
        const POST_RENDERER = 1 << 10;
    }
}

/// Opaque, stable identity of the entity that owns a light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

slotmap::new_key_type! {
    /// Registry handle of a live light record
    pub struct LightKey;
}

/// Texture bound to a projector light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectorTexture {
    /// Backend texture id
    pub id: u64,
    /// The texture covers all six cube sides
    pub replicate_to_all_sides: bool,
}

/// Properties an owner submits for its light
#[derive(Debug, Clone, PartialEq)]
pub struct LightProperties {
    /// Light position in world space
    pub origin: Vec3,
    /// Influence radius in world units
    pub radius: f32,
    /// Linear HDR color, alpha carries probe fade
    pub color: Vec4,
    /// Specular contribution multiplier
    pub specular_multiplier: f32,
    /// Behaviour flags
    pub flags: LightFlags,
    /// Projector half-angle in degrees
    pub frustum_half_angle: f32,
    /// Area light width
    pub area_width: f32,
    /// Area light height
    pub area_height: f32,
    /// Half size of a cubemap probe box
    pub probe_extents: Vec3,
    /// Light orientation; column 0 is the projection direction
    pub orientation: Mat3,
    /// Texture bound to a projector
    pub projector_texture: Option<ProjectorTexture>,
}

impl LightProperties {
    /// Create a point light
    pub fn point(origin: Vec3, color: Vec3, radius: f32) -> Self {
        Self {
            origin,
            radius,
            color: color.push(1.0),
            specular_multiplier: 1.0,
            flags: LightFlags::empty(),
            frustum_half_angle: 45.0,
            area_width: 0.0,
            area_height: 0.0,
            probe_extents: Vec3::zeros(),
            orientation: Mat3::identity(),
            projector_texture: None,
        }
    }

    /// Create the sun, placed far away along `origin`
    pub fn sun(origin: Vec3, color: Vec3) -> Self {
        let mut light = Self::point(origin, color, f32::MAX.sqrt());
        light.flags = LightFlags::SUN | LightFlags::DIRECTIONAL;
        light
    }

    /// Create a textured projector looking along `direction`
    pub fn projector(
        origin: Vec3,
        direction: Vec3,
        color: Vec3,
        radius: f32,
        half_angle_degrees: f32,
        texture: ProjectorTexture,
    ) -> Self {
        let mut light = Self::point(origin, color, radius);
        light.flags = LightFlags::PROJECTOR;
        light.frustum_half_angle = half_angle_degrees;
        light.orientation = orientation_from_direction(&direction);
        light.projector_texture = Some(texture);
        light
    }

    /// Create a rectangular area light facing along the orientation's first column
    pub fn area(origin: Vec3, orientation: Mat3, color: Vec3, radius: f32, width: f32, height: f32) -> Self {
        let mut light = Self::point(origin, color, radius);
        light.flags = LightFlags::AREA_LIGHT;
        light.orientation = orientation;
        light.area_width = width;
        light.area_height = height;
        light
    }

    /// Create a deferred cubemap probe with box extents
    pub fn cubemap_probe(origin: Vec3, orientation: Mat3, color: Vec3, extents: Vec3) -> Self {
        let mut light = Self::point(origin, color, extents.magnitude());
        light.flags = LightFlags::DEFERRED_CUBEMAP;
        light.orientation = orientation;
        light.probe_extents = extents;
        light
    }

    /// Add flags
    pub fn with_flags(mut self, flags: LightFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Enable or disable shadow casting
    pub fn with_cast_shadows(mut self, enabled: bool) -> Self {
        self.flags.set(LightFlags::CAST_SHADOWS, enabled);
        self
    }

    /// Clamp values into their valid ranges
    pub fn sanitized(mut self) -> Self {
        self.radius = self.radius.max(0.0);
        self.frustum_half_angle = self.frustum_half_angle.clamp(0.0, MAX_PROJECTOR_HALF_ANGLE);
        self
    }

    /// Origin and radius are finite
    pub fn is_finite(&self) -> bool {
        self.origin.iter().all(|v| v.is_finite()) && self.radius.is_finite()
    }

    /// Sun or directional light
    pub fn is_global(&self) -> bool {
        self.flags.intersects(LightFlags::SUN | LightFlags::DIRECTIONAL)
    }

    /// Projector whose texture differs per direction
    pub fn is_projective(&self) -> bool {
        self.flags.contains(LightFlags::PROJECTOR)
            && self
                .projector_texture
                .is_some_and(|texture| !texture.replicate_to_all_sides)
    }

    /// Projector whose cone is narrow enough to test as a frustum
    pub fn has_projector_cone(&self) -> bool {
        self.flags.contains(LightFlags::PROJECTOR)
            && self.frustum_half_angle < 90.0
            && self.projector_texture.is_some()
    }

    /// Direction a projector points in
    pub fn projection_direction(&self) -> Vec3 {
        self.orientation.column(0).normalize()
    }

    /// Radius of the sphere bounding the light's whole volume
    pub fn effective_radius(&self) -> f32 {
        if self.flags.contains(LightFlags::AREA_LIGHT) {
            self.radius + self.area_width.max(self.area_height)
        } else if self.flags.contains(LightFlags::DEFERRED_CUBEMAP) {
            self.probe_extents.magnitude()
        } else {
            self.radius
        }
    }

    /// Oriented volume for area lights and probes, relative to the origin
    pub fn bounding_obb(&self) -> Option<OBB> {
        if self.flags.contains(LightFlags::DEFERRED_CUBEMAP) {
            let local = AABB::new(-self.probe_extents, self.probe_extents);
            Some(OBB::from_aabb(&self.orientation, &local))
        } else if self.flags.contains(LightFlags::AREA_LIGHT) {
            let r = self.radius;
            let local = AABB::new(
                Vec3::new(-0.1, -(r + self.area_width), -(r + self.area_height)),
                Vec3::new(r, r + self.area_width, r + self.area_height),
            );
            Some(OBB::from_aabb(&self.orientation, &local))
        } else {
            None
        }
    }
}

/// Build an orthonormal basis whose first column is `direction`
pub fn orientation_from_direction(direction: &Vec3) -> Mat3 {
    let forward = direction.normalize();
    let up = crate::foundation::math::utils::stable_up(&forward);
    let side = forward.cross(&up).normalize();
    let up = side.cross(&forward);
    Mat3::from_columns(&[forward, up, side])
}

/// Screen-space rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl ScissorRect {
    /// Rectangle covering the whole viewport
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    /// Covered pixels
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Lies within a viewport of the given size
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x.saturating_add(self.width) <= width && self.y.saturating_add(self.height) <= height
    }
}

/// Distance fade multiplier
///
/// `fade_factor` is 1 at full brightness. The light keeps full brightness down
/// to `1 - FADE_RANGE` and reaches zero there.
pub fn fade_multiplier(fade_factor: f32) -> f32 {
    let over = ((1.0 - fade_factor) / FADE_RANGE).max(0.0);
    (1.0 - over).clamp(0.0, 1.0)
}

/// Apply a fade to a submitted color
///
/// Cubemap probes blend by alpha; every other light dims its RGB.
pub fn faded_color(color: &Vec4, flags: LightFlags, fade: f32) -> Vec4 {
    if flags.contains(LightFlags::DEFERRED_CUBEMAP) {
        Vec4::new(color.x, color.y, color.z, fade)
    } else {
        Vec4::new(color.x * fade, color.y * fade, color.z * fade, color.w)
    }
}

/// A dynamic light instance for the current frame
#[derive(Debug, Clone)]
pub struct LightRecord {
    /// Owning entity
    pub owner: EntityId,
    /// Submitted properties (color already faded)
    pub properties: LightProperties,
    /// Main frame of the last submission
    pub last_update_frame: u64,
    /// Screen rectangle for the current view
    pub scissor: ScissorRect,
    /// Backend slot, `None` until accepted
    pub backend_slot: Option<SlotId>,
    /// Shadow casting withheld for this frame by the shadow mask limit
    pub shadows_suppressed: bool,
    /// Shadow scheduling state for this frame
    pub shadow_state: ShadowState,
}

impl LightRecord {
    /// Create a record for a first submission
    pub fn new(owner: EntityId, properties: LightProperties, frame_id: u64) -> Self {
        Self {
            owner,
            properties,
            last_update_frame: frame_id,
            scissor: ScissorRect::default(),
            backend_slot: None,
            shadows_suppressed: false,
            shadow_state: ShadowState::NotScheduled,
        }
    }

    /// Replace the submitted properties, keeping backend, scissor and shadow state
    pub fn update(&mut self, properties: LightProperties, frame_id: u64) {
        self.properties = properties;
        self.last_update_frame = frame_id;
    }

    /// Behaviour flags
    pub fn flags(&self) -> LightFlags {
        self.properties.flags
    }

    /// The scene's sun
    pub fn is_sun(&self) -> bool {
        self.properties.flags.contains(LightFlags::SUN)
    }

    /// Wants shadows and is not held back by the mask limit this frame
    pub fn casts_shadows(&self) -> bool {
        self.properties.flags.contains(LightFlags::CAST_SHADOWS) && !self.shadows_suppressed
    }

    /// Rough amount of light reaching `bbox`, used to rank lights per object
    pub fn light_amount(&self, bbox: &AABB) -> f32 {
        let props = &self.properties;
        let attenuation = if props.flags.contains(LightFlags::DIRECTIONAL) {
            1.0
        } else if props.radius > 0.0 {
            let distance = bbox.distance_sq_to_point(props.origin).sqrt();
            (1.0 - distance / props.radius).max(0.0)
        } else {
            0.0
        };
        let amount = (props.color.x + props.color.y + props.color.z) * 0.233 + props.specular_multiplier * 0.1;
        amount * attenuation
    }
}
