//! Collaborator traits for the light pipeline
//!
//! The light pipeline does not own GPU resources, spatial partitioning or
//! shadow atlas memory. It reaches those through the traits in this module,
//! which a renderer, an octree/portal system and a shadow map allocator
//! implement.

use crate::render::lighting::{EntityId, LightFlags, LightProperties, LightRecord, ShadowFrustumDescriptor};

/// Stable light slot assigned by the renderer backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

/// Slot in the external shadow map pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolSlot(pub u32);

/// Answer of the shadow pool allocator for one shadow side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolReservation {
    /// The side has a slot and must be re-rendered this frame
    NeedsUpdate(PoolSlot),
    /// The side's cached contents are still valid; no render pass needed
    Cached(PoolSlot),
    /// The pool has no room for this side
    Exhausted,
}

/// Reservation request for one side (cascade or cube face) of a light's shadow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowPoolRequest {
    /// Owner of the shadow-casting light
    pub owner: EntityId,
    /// Cascade or cube side index
    pub side: u8,
    /// Number of sides the light needs in total
    pub side_count: u8,
    /// Requested texture size in texels
    pub texture_size: u32,
    /// Frame the request is made in
    pub frame_id: u64,
}

/// Renderer backend that rasterizes lights
///
/// Receives the final per-view light list. A light that is accepted gets a
/// stable slot for the rest of the view; a rejected light is simply not drawn.
pub trait LightBackend {
    /// Try to place a light in the backend's light array
    fn accept_light(&mut self, record: &LightRecord) -> Option<SlotId>;

    /// Refresh the backend's copy of an accepted light (flags, shadow state)
    fn update_accepted_light(&mut self, slot: SlotId, record: &LightRecord);

    /// Lights the backend ignores for lighting purposes
    ///
    /// Fake lights stay in the registry but are never given a slot.
    fn is_fake_light(&self, record: &LightRecord) -> bool {
        record.properties.flags.contains(LightFlags::FAKE)
    }

    /// Take ownership of this frame's shadow passes
    ///
    /// Once handed over the light pipeline never touches the descriptors again.
    fn submit_shadow_passes(&mut self, passes: Vec<ShadowFrustumDescriptor>);
}

/// External shadow map pool
pub trait ShadowPoolAllocator {
    /// Reserve (or look up) a pool slot for one shadow side
    fn reserve(&mut self, request: &ShadowPoolRequest) -> PoolReservation;

    /// Give back a side reserved with `NeedsUpdate` that will not be rendered
    ///
    /// Called when the light's remaining sides do not fit. The side's map was
    /// never drawn, so a later `reserve` must not answer `Cached` for it.
    fn release(&mut self, request: &ShadowPoolRequest, slot: PoolSlot);
}

/// Spatial index (octree sectors and portal areas) that stores per-sector light lists
pub trait LightSectorRegistry {
    /// Add a light to the sectors it touches for the current view
    fn register_light_in_sector(&mut self, record: &LightRecord);

    /// Whether the owner's area is visible within `max_recursion` portal hops
    fn is_owner_area_visible(&self, owner: EntityId, max_recursion: u32, light: &LightProperties) -> bool {
        let _ = (owner, max_recursion, light);
        true
    }

    /// Whether the sun must be kept even when no outdoor area is visible
    fn sun_is_needed(&self) -> bool {
        false
    }

    /// Force the sector holding `caster` to recompile its object lists
    fn mark_caster_dirty(&mut self, caster: EntityId);
}
