//! Dynamic light registry
//!
//! Owns the per-frame list of active lights. Owners resubmit their light every
//! frame; a resubmission updates the existing record in place so the state the
//! pipeline attached to it (backend slot, scissor, shadows) survives. Records
//! that stop being refreshed expire after a two frame grace period.
//!
//! Records live in a slot map. `order` holds the priority order consumed by
//! culling and shadow scheduling; the first `real_light_count` entries are the
//! lights the backend may light with, fake lights follow them.

use std::cmp::Ordering;
use std::collections::HashMap;

use slotmap::SlotMap;

use crate::foundation::logging::RateLimiter;
use crate::render::lighting::light::{
    fade_multiplier, faded_color, EntityId, LightFlags, LightKey, LightProperties, LightRecord,
};

/// Frames a record survives without being resubmitted
pub const STALE_FRAME_LIMIT: u64 = 2;

/// Per-call inputs of [`DynamicLightRegistry::submit`]
#[derive(Debug, Clone, Copy)]
pub struct SubmitContext {
    /// Current main frame
    pub frame_id: u64,
    /// Dynamic lights master switch
    pub dynamic_lights_enabled: bool,
    /// Registry capacity
    pub max_lights: usize,
    /// The current pass renders shadow maps
    pub render_shadows: bool,
}

/// Result of a light submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new record was created
    Inserted(LightKey),
    /// The owner's existing record was updated in place
    Merged(LightKey),
    /// The owner's record was removed (disabled light or lights switched off)
    Removed,
    /// The change is queued until the registry thaws
    Deferred,
    /// The submission was dropped
    Refused,
}

/// Registry generation together with the light order it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightSnapshot {
    /// Generation the keys were read at
    pub generation: u64,
    /// Lights in priority order
    pub keys: Vec<LightKey>,
}

#[derive(Debug, Clone)]
enum PendingChange {
    Insert(EntityId, LightProperties, u64),
    Retire(EntityId),
}

/// Authoritative per-frame list of dynamic lights
#[derive(Debug)]
pub struct DynamicLightRegistry {
    lights: SlotMap<LightKey, LightRecord>,
    order: Vec<LightKey>,
    by_owner: HashMap<EntityId, LightKey>,
    real_light_count: usize,
    generation: u64,
    frozen_depth: u32,
    pending: Vec<PendingChange>,
    capacity_warning: RateLimiter,
}

impl DynamicLightRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            lights: SlotMap::with_key(),
            order: Vec::new(),
            by_owner: HashMap::new(),
            real_light_count: 0,
            generation: 0,
            frozen_depth: 0,
            pending: Vec::new(),
            capacity_warning: RateLimiter::default(),
        }
    }

    /// Submit an owner's light for this frame
    ///
    /// `fade_factor` is 1 for full brightness and fades the light out between
    /// 1 and 0.75. Disabled lights remove the owner's record.
    pub fn submit(
        &mut self,
        properties: LightProperties,
        owner: EntityId,
        fade_factor: f32,
        ctx: &SubmitContext,
    ) -> SubmitOutcome {
        debug_assert!(properties.is_finite(), "light origin and radius must be finite");

        if properties.flags.contains(LightFlags::DISABLED) || !ctx.dynamic_lights_enabled {
            return self.retire(owner);
        }

        let existing = self.by_owner.get(&owner).copied();
        let queued = self.queued_insert(owner);
        let count = self.lights.len() + self.queued_insert_count();
        if count > ctx.max_lights {
            return SubmitOutcome::Refused;
        }
        if count == ctx.max_lights && existing.is_none() && queued.is_none() {
            if self.capacity_warning.allow(ctx.frame_id) {
                log::warn!("Dynamic light registry at capacity ({} lights), new lights are dropped", ctx.max_lights);
            }
            return SubmitOutcome::Refused;
        }

        let mut properties = properties.sanitized();
        properties.color = faded_color(&properties.color, properties.flags, fade_multiplier(fade_factor));

        if let Some(key) = existing {
            if let Some(record) = self.lights.get_mut(key) {
                if !ctx.render_shadows {
                    properties.flags.remove(LightFlags::CAST_SHADOWS);
                }
                record.update(properties, ctx.frame_id);
                log::trace!("Merged light of {:?}", owner);
                return SubmitOutcome::Merged(key);
            }
        }

        if self.is_frozen() {
            let change = PendingChange::Insert(owner, properties, ctx.frame_id);
            match queued {
                Some(index) => self.pending[index] = change,
                None => self.pending.push(change),
            }
            return SubmitOutcome::Deferred;
        }

        let key = self.insert(owner, properties, ctx.frame_id);
        log::trace!("Inserted light of {:?}", owner);
        SubmitOutcome::Inserted(key)
    }

    fn insert(&mut self, owner: EntityId, properties: LightProperties, frame_id: u64) -> LightKey {
        let key = self.lights.insert(LightRecord::new(owner, properties, frame_id));
        self.order.push(key);
        self.by_owner.insert(owner, key);
        self.generation += 1;
        key
    }

    /// Remove the owner's light
    ///
    /// While frozen, a queued insert of the owner is dropped and a live record
    /// is retired on thaw.
    pub fn retire(&mut self, owner: EntityId) -> SubmitOutcome {
        if self.is_frozen() {
            self.pending
                .retain(|change| !matches!(change, PendingChange::Insert(queued, ..) if *queued == owner));
            if !self.by_owner.contains_key(&owner) {
                return SubmitOutcome::Removed;
            }
            self.pending.push(PendingChange::Retire(owner));
            return SubmitOutcome::Deferred;
        }
        if let Some(key) = self.by_owner.get(&owner).copied() {
            self.remove_keys(&[key]);
        }
        SubmitOutcome::Removed
    }

    fn queued_insert(&self, owner: EntityId) -> Option<usize> {
        self.pending
            .iter()
            .position(|change| matches!(change, PendingChange::Insert(queued, ..) if *queued == owner))
    }

    fn queued_insert_count(&self) -> usize {
        self.pending
            .iter()
            .filter(|change| matches!(change, PendingChange::Insert(..)))
            .count()
    }

    /// Drop records that were not refreshed for more than two frames or that are disabled
    ///
    /// Returns the number of removed records. Does nothing while frozen.
    pub fn age_and_expire(&mut self, frame_id: u64) -> usize {
        if self.is_frozen() {
            return 0;
        }
        let expired: Vec<LightKey> = self
            .iter()
            .filter(|(_, record)| {
                frame_id.saturating_sub(record.last_update_frame) > STALE_FRAME_LIMIT
                    || record.flags().contains(LightFlags::DISABLED)
            })
            .map(|(key, _)| key)
            .collect();

        for key in &expired {
            if let Some(record) = self.lights.get(*key) {
                log::trace!("Expired light of {:?} (last update {})", record.owner, record.last_update_frame);
            }
        }
        self.remove_keys(&expired);
        expired.len()
    }

    /// Sort lights for shadow priority: sun first, then shadow casters, then by owner
    pub fn sort_by_priority(&mut self) {
        let lights = &self.lights;
        let before = self.order.clone();
        self.order.sort_by(|a, b| match (lights.get(*a), lights.get(*b)) {
            (Some(a), Some(b)) => shadow_priority(a, b),
            _ => Ordering::Equal,
        });
        if self.order != before {
            self.generation += 1;
        }
    }

    /// Remove every record the predicate rejects, keeping the order of the rest
    ///
    /// Returns the removed owners. Does nothing while frozen.
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<EntityId>
    where
        F: FnMut(LightKey, &LightRecord) -> bool,
    {
        if self.is_frozen() {
            return Vec::new();
        }
        let removed: Vec<LightKey> = self
            .iter()
            .filter(|(key, record)| !keep(*key, *record))
            .map(|(key, _)| key)
            .collect();
        let owners = removed
            .iter()
            .filter_map(|key| self.lights.get(*key).map(|record| record.owner))
            .collect();
        self.remove_keys(&removed);
        owners
    }

    /// Move fake lights behind the real ones and drop real lights past `max_real`
    ///
    /// Sets and returns the real light count. Relative order is kept within
    /// both groups.
    pub fn partition_real_lights<F>(&mut self, max_real: usize, mut is_fake: F) -> (usize, usize)
    where
        F: FnMut(&LightRecord) -> bool,
    {
        let (mut real, fake): (Vec<LightKey>, Vec<LightKey>) = self
            .order
            .iter()
            .copied()
            .partition(|key| self.lights.get(*key).map_or(false, |record| !is_fake(record)));

        let dropped = real.split_off(real.len().min(max_real));
        let dropped_count = dropped.len();

        let reordered: Vec<LightKey> = real.iter().chain(fake.iter()).copied().collect();
        if reordered != self.order {
            self.order = reordered;
            self.generation += 1;
        }
        self.remove_keys(&dropped);
        self.real_light_count = real.len();
        (self.real_light_count, dropped_count)
    }

    fn remove_keys(&mut self, keys: &[LightKey]) {
        if keys.is_empty() {
            return;
        }
        for key in keys {
            if let Some(record) = self.lights.remove(*key) {
                if self.by_owner.get(&record.owner) == Some(key) {
                    self.by_owner.remove(&record.owner);
                }
            }
        }
        self.order.retain(|key| self.lights.contains_key(*key));
        self.real_light_count = self.real_light_count.min(self.order.len());
        self.generation += 1;
    }

    /// Enter a recursive pass; structural changes are queued until the last thaw
    pub fn freeze(&mut self) {
        self.frozen_depth += 1;
    }

    /// Leave a recursive pass, applying queued changes when the outermost pass ends
    ///
    /// Returns the number of changes applied.
    pub fn thaw(&mut self) -> usize {
        if self.frozen_depth == 0 {
            log::warn!("Light registry thawed without a matching freeze");
            return 0;
        }
        self.frozen_depth -= 1;
        if self.is_frozen() {
            return 0;
        }

        let pending = std::mem::take(&mut self.pending);
        let applied = pending.len();
        for change in pending {
            match change {
                PendingChange::Insert(owner, properties, frame_id) => {
                    if let Some(key) = self.by_owner.get(&owner).copied() {
                        if let Some(record) = self.lights.get_mut(key) {
                            record.update(properties, frame_id);
                        }
                    } else {
                        self.insert(owner, properties, frame_id);
                    }
                }
                PendingChange::Retire(owner) => {
                    self.retire(owner);
                }
            }
        }
        applied
    }

    /// Inside a recursive pass
    pub fn is_frozen(&self) -> bool {
        self.frozen_depth > 0
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// No live records
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Number of leading lights in `order` the backend may light with
    pub fn real_light_count(&self) -> usize {
        self.real_light_count
    }

    /// Structural change counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current order with its generation
    pub fn snapshot(&self) -> LightSnapshot {
        LightSnapshot {
            generation: self.generation,
            keys: self.order.clone(),
        }
    }

    /// Keys in priority order
    pub fn keys(&self) -> &[LightKey] {
        &self.order
    }

    /// Record by key
    pub fn get(&self, key: LightKey) -> Option<&LightRecord> {
        self.lights.get(key)
    }

    /// Mutable record by key
    pub fn get_mut(&mut self, key: LightKey) -> Option<&mut LightRecord> {
        self.lights.get_mut(key)
    }

    /// The owner's record key
    pub fn key_for_owner(&self, owner: EntityId) -> Option<LightKey> {
        self.by_owner.get(&owner).copied()
    }

    /// Records in priority order
    pub fn iter(&self) -> impl Iterator<Item = (LightKey, &LightRecord)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.lights.get(*key).map(|record| (*key, record)))
    }

    /// Real lights in priority order
    pub fn real_lights(&self) -> impl Iterator<Item = (LightKey, &LightRecord)> + '_ {
        self.iter().take(self.real_light_count)
    }
}

impl Default for DynamicLightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Priority ordering used for shadow scheduling
pub fn shadow_priority(a: &LightRecord, b: &LightRecord) -> Ordering {
    let rank = |record: &LightRecord| {
        (
            !record.flags().contains(LightFlags::SUN),
            !record.flags().contains(LightFlags::CAST_SHADOWS),
        )
    };
    rank(a).cmp(&rank(b)).then_with(|| a.owner.cmp(&b.owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec3, Vec4};
    use approx::assert_relative_eq;

    fn ctx(frame_id: u64) -> SubmitContext {
        SubmitContext {
            frame_id,
            dynamic_lights_enabled: true,
            max_lights: 8,
            render_shadows: true,
        }
    }

    fn point(radius: f32) -> LightProperties {
        LightProperties::point(Vec3::zeros(), Vec3::repeat(1.0), radius)
    }

    #[test]
    fn test_resubmit_merges_in_place() {
        let mut registry = DynamicLightRegistry::new();
        let first = registry.submit(point(5.0), EntityId(1), 1.0, &ctx(1));
        let SubmitOutcome::Inserted(key) = first else {
            panic!("expected insert, got {first:?}");
        };
        registry.get_mut(key).unwrap().backend_slot = Some(crate::render::api::SlotId(4));

        let second = registry.submit(point(9.0), EntityId(1), 1.0, &ctx(2));

        assert_eq!(second, SubmitOutcome::Merged(key));
        assert_eq!(registry.len(), 1);
        let record = registry.get(key).unwrap();
        assert_relative_eq!(record.properties.radius, 9.0);
        assert_eq!(record.last_update_frame, 2);
        assert_eq!(record.backend_slot, Some(crate::render::api::SlotId(4)));
    }

    #[test]
    fn test_merge_clears_shadows_when_pass_has_none() {
        let mut registry = DynamicLightRegistry::new();
        let light = point(5.0).with_cast_shadows(true);
        registry.submit(light.clone(), EntityId(1), 1.0, &ctx(1));

        let no_shadows = SubmitContext { render_shadows: false, ..ctx(2) };
        let SubmitOutcome::Merged(key) = registry.submit(light, EntityId(1), 1.0, &no_shadows) else {
            panic!("expected merge");
        };
        assert!(!registry.get(key).unwrap().flags().contains(LightFlags::CAST_SHADOWS));
    }

    #[test]
    fn test_disabled_submission_removes_owner() {
        let mut registry = DynamicLightRegistry::new();
        registry.submit(point(5.0), EntityId(1), 1.0, &ctx(1));
        registry.submit(point(5.0), EntityId(2), 1.0, &ctx(1));

        let outcome = registry.submit(point(5.0).with_flags(LightFlags::DISABLED), EntityId(1), 1.0, &ctx(2));

        assert_eq!(outcome, SubmitOutcome::Removed);
        assert_eq!(registry.len(), 1);
        assert!(registry.key_for_owner(EntityId(1)).is_none());
    }

    #[test]
    fn test_lights_switched_off_remove_owner() {
        let mut registry = DynamicLightRegistry::new();
        registry.submit(point(5.0), EntityId(1), 1.0, &ctx(1));
        let off = SubmitContext { dynamic_lights_enabled: false, ..ctx(2) };
        assert_eq!(registry.submit(point(5.0), EntityId(1), 1.0, &off), SubmitOutcome::Removed);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_capacity_allows_merges_only() {
        let mut registry = DynamicLightRegistry::new();
        let small = SubmitContext { max_lights: 2, ..ctx(1) };
        registry.submit(point(1.0), EntityId(1), 1.0, &small);
        registry.submit(point(1.0), EntityId(2), 1.0, &small);

        assert_eq!(registry.submit(point(1.0), EntityId(3), 1.0, &small), SubmitOutcome::Refused);
        assert!(matches!(registry.submit(point(2.0), EntityId(2), 1.0, &small), SubmitOutcome::Merged(_)));

        let smaller = SubmitContext { max_lights: 1, ..ctx(1) };
        assert_eq!(registry.submit(point(2.0), EntityId(2), 1.0, &smaller), SubmitOutcome::Refused);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_fade_is_applied_on_insert_and_merge() {
        let mut registry = DynamicLightRegistry::new();
        let SubmitOutcome::Inserted(key) = registry.submit(point(1.0), EntityId(1), 0.875, &ctx(1)) else {
            panic!("expected insert");
        };
        assert_relative_eq!(registry.get(key).unwrap().properties.color, Vec4::new(0.5, 0.5, 0.5, 1.0));

        registry.submit(point(1.0), EntityId(1), 0.7, &ctx(2));
        assert_relative_eq!(registry.get(key).unwrap().properties.color, Vec4::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_expiry_after_two_frames() {
        let mut registry = DynamicLightRegistry::new();
        registry.submit(point(1.0), EntityId(1), 1.0, &ctx(10));
        registry.submit(point(1.0), EntityId(2), 1.0, &ctx(11));

        assert_eq!(registry.age_and_expire(12), 0);
        assert_eq!(registry.age_and_expire(13), 1);
        assert!(registry.key_for_owner(EntityId(1)).is_none());
        assert!(registry.key_for_owner(EntityId(2)).is_some());
    }

    #[test]
    fn test_priority_sort() {
        let mut registry = DynamicLightRegistry::new();
        let owners = [7_u64, 3, 9, 1, 5, 8, 2, 6];
        for (i, owner) in owners.iter().enumerate() {
            let mut light = point(1.0).with_cast_shadows(i % 3 == 0);
            if *owner == 9 {
                light = light.with_flags(LightFlags::SUN);
            }
            registry.submit(light, EntityId(*owner), 1.0, &ctx(1));
        }

        registry.sort_by_priority();
        let sorted: Vec<&LightRecord> = registry.iter().map(|(_, record)| record).collect();

        assert!(sorted[0].is_sun());
        assert!(sorted[1..].iter().all(|record| !record.is_sun()));

        let rest = &sorted[1..];
        let first_plain = rest
            .iter()
            .position(|record| !record.flags().contains(LightFlags::CAST_SHADOWS))
            .unwrap();
        assert!(rest[..first_plain].iter().all(|record| record.flags().contains(LightFlags::CAST_SHADOWS)));
        assert!(rest[first_plain..]
            .iter()
            .all(|record| !record.flags().contains(LightFlags::CAST_SHADOWS)));
        for pair in sorted.windows(2) {
            assert_ne!(shadow_priority(pair[0], pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn test_partition_moves_fake_lights_back_and_caps_real_ones() {
        let mut registry = DynamicLightRegistry::new();
        for owner in 1..=5 {
            let mut light = point(1.0);
            if owner % 2 == 0 {
                light = light.with_flags(LightFlags::FAKE);
            }
            registry.submit(light, EntityId(owner), 1.0, &ctx(1));
        }

        let (real, dropped) = registry.partition_real_lights(2, |record| record.flags().contains(LightFlags::FAKE));

        assert_eq!((real, dropped), (2, 1));
        let owners: Vec<u64> = registry.iter().map(|(_, record)| record.owner.0).collect();
        assert_eq!(owners, vec![1, 3, 2, 4]);
        assert_eq!(registry.real_light_count(), 2);
    }

    #[test]
    fn test_disabling_a_queued_light_drops_it() {
        let mut registry = DynamicLightRegistry::new();
        registry.freeze();

        assert_eq!(registry.submit(point(1.0), EntityId(7), 1.0, &ctx(1)), SubmitOutcome::Deferred);
        assert_eq!(registry.submit(point(2.0), EntityId(7), 1.0, &ctx(1)), SubmitOutcome::Deferred);
        let disabled = point(1.0).with_flags(LightFlags::DISABLED);
        assert_eq!(registry.submit(disabled, EntityId(7), 1.0, &ctx(1)), SubmitOutcome::Removed);

        assert_eq!(registry.thaw(), 0);
        assert!(registry.key_for_owner(EntityId(7)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_queued_inserts_count_against_capacity() {
        let mut registry = DynamicLightRegistry::new();
        let small = SubmitContext { max_lights: 2, ..ctx(1) };
        registry.submit(point(1.0), EntityId(1), 1.0, &small);

        registry.freeze();
        assert_eq!(registry.submit(point(1.0), EntityId(2), 1.0, &small), SubmitOutcome::Deferred);
        assert_eq!(registry.submit(point(1.0), EntityId(3), 1.0, &small), SubmitOutcome::Refused);
        assert_eq!(registry.submit(point(3.0), EntityId(2), 1.0, &small), SubmitOutcome::Deferred);
        assert!(matches!(registry.submit(point(2.0), EntityId(1), 1.0, &small), SubmitOutcome::Merged(_)));

        assert_eq!(registry.thaw(), 1);
        assert_eq!(registry.len(), 2);
        assert!(registry.key_for_owner(EntityId(3)).is_none());
        let queued = registry.key_for_owner(EntityId(2)).unwrap();
        assert_relative_eq!(registry.get(queued).unwrap().properties.radius, 3.0);
    }

    #[test]
    fn test_frozen_registry_defers_structural_changes() {
        let mut registry = DynamicLightRegistry::new();
        registry.submit(point(1.0), EntityId(1), 1.0, &ctx(1));
        let before = registry.snapshot();

        registry.freeze();
        assert_eq!(registry.retire(EntityId(1)), SubmitOutcome::Deferred);
        assert_eq!(registry.submit(point(1.0), EntityId(2), 1.0, &ctx(1)), SubmitOutcome::Deferred);
        assert_eq!(registry.age_and_expire(100), 0);
        assert_eq!(registry.snapshot(), before);

        assert_eq!(registry.thaw(), 2);
        assert!(registry.key_for_owner(EntityId(1)).is_none());
        assert!(registry.key_for_owner(EntityId(2)).is_some());
        assert!(registry.generation() > before.generation);
    }
}
