//! In-memory collaborators for light pipeline tests

use std::collections::{HashMap, HashSet};

use crate::render::api::{
    LightBackend, LightSectorRegistry, PoolReservation, PoolSlot, ShadowPoolAllocator, ShadowPoolRequest, SlotId,
};
use crate::render::lighting::{EntityId, LightProperties, LightRecord, ShadowFrustumDescriptor};

/// Backend with a fixed number of light slots
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub capacity: Option<usize>,
    pub accepted: Vec<EntityId>,
    pub updated: Vec<(SlotId, EntityId)>,
    pub submitted_passes: usize,
}

impl FakeBackend {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: Some(capacity), ..Self::default() }
    }
}

impl LightBackend for FakeBackend {
    fn accept_light(&mut self, record: &LightRecord) -> Option<SlotId> {
        if self.capacity.is_some_and(|capacity| self.accepted.len() >= capacity) {
            return None;
        }
        self.accepted.push(record.owner);
        Some(SlotId(self.accepted.len() as u32 - 1))
    }

    fn update_accepted_light(&mut self, slot: SlotId, record: &LightRecord) {
        self.updated.push((slot, record.owner));
    }

    fn submit_shadow_passes(&mut self, passes: Vec<ShadowFrustumDescriptor>) {
        self.submitted_passes += passes.len();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Update,
    Cached,
    Exhausted,
}

/// Pool allocator with a fixed answer, optionally cached for some owners
#[derive(Debug)]
pub struct ScriptedAllocator {
    script: Script,
    cached_owners: HashSet<EntityId>,
    next_slot: u32,
    pub requests: usize,
    pub released: Vec<(EntityId, u8)>,
}

impl ScriptedAllocator {
    fn new(script: Script) -> Self {
        Self { script, cached_owners: HashSet::new(), next_slot: 0, requests: 0, released: Vec::new() }
    }

    pub fn always_update() -> Self {
        Self::new(Script::Update)
    }

    pub fn always_cached() -> Self {
        Self::new(Script::Cached)
    }

    pub fn exhausted() -> Self {
        Self::new(Script::Exhausted)
    }

    pub fn cached_for(owners: &[EntityId]) -> Self {
        let mut allocator = Self::new(Script::Update);
        allocator.cached_owners = owners.iter().copied().collect();
        allocator
    }
}

impl ShadowPoolAllocator for ScriptedAllocator {
    fn reserve(&mut self, request: &ShadowPoolRequest) -> PoolReservation {
        self.requests += 1;
        let slot = PoolSlot(self.next_slot);
        self.next_slot += 1;
        if self.cached_owners.contains(&request.owner) {
            return PoolReservation::Cached(slot);
        }
        match self.script {
            Script::Update => PoolReservation::NeedsUpdate(slot),
            Script::Cached => PoolReservation::Cached(slot),
            Script::Exhausted => PoolReservation::Exhausted,
        }
    }

    fn release(&mut self, request: &ShadowPoolRequest, _slot: PoolSlot) {
        self.released.push((request.owner, request.side));
    }
}

/// Pool that remembers when each side was last rendered and reuses it while fresh
#[derive(Debug, Default)]
pub struct CachingAllocator {
    pub refresh_frames: u64,
    pub sides: HashMap<(EntityId, u8), (PoolSlot, u64)>,
    next_slot: u32,
}

impl CachingAllocator {
    pub fn new(refresh_frames: u64) -> Self {
        Self { refresh_frames, sides: HashMap::new(), next_slot: 0 }
    }
}

impl ShadowPoolAllocator for CachingAllocator {
    fn reserve(&mut self, request: &ShadowPoolRequest) -> PoolReservation {
        let key = (request.owner, request.side);
        if let Some((slot, rendered)) = self.sides.get_mut(&key) {
            if request.frame_id.saturating_sub(*rendered) < self.refresh_frames {
                return PoolReservation::Cached(*slot);
            }
            *rendered = request.frame_id;
            return PoolReservation::NeedsUpdate(*slot);
        }
        let slot = PoolSlot(self.next_slot);
        self.next_slot += 1;
        self.sides.insert(key, (slot, request.frame_id));
        PoolReservation::NeedsUpdate(slot)
    }

    fn release(&mut self, request: &ShadowPoolRequest, _slot: PoolSlot) {
        self.sides.remove(&(request.owner, request.side));
    }
}

/// Spatial index that records what the pipeline told it
#[derive(Debug, Default)]
pub struct FakeSectors {
    pub registered: Vec<EntityId>,
    pub dirty_casters: Vec<EntityId>,
    pub hidden_owners: HashSet<EntityId>,
    pub sun_needed: bool,
}

impl LightSectorRegistry for FakeSectors {
    fn register_light_in_sector(&mut self, record: &LightRecord) {
        self.registered.push(record.owner);
    }

    fn is_owner_area_visible(&self, owner: EntityId, max_recursion: u32, _light: &LightProperties) -> bool {
        !self.hidden_owners.contains(&owner) && max_recursion > 0
    }

    fn sun_is_needed(&self) -> bool {
        self.sun_needed
    }

    fn mark_caster_dirty(&mut self, caster: EntityId) {
        self.dirty_casters.push(caster);
    }
}
