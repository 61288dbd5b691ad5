//! Static lights and the affecting-lights cache
//!
//! [`StaticLightSet`] holds the long-lived light entities placed in a level.
//! [`AffectingLightsCache`] memoizes the list of non-sun static lights an
//! object may be lit by, so object code can hold on to a combination handle
//! across frames instead of rebuilding the list.
//!
//! The cache compares against the global candidate list and does not scope
//! queries by the object's box. It only tells "has the static set changed"
//! apart. Matching is order-sensitive.

use crate::render::lighting::light::{EntityId, LightFlags, LightProperties};
use crate::scene::{Sphere, AABB};

/// A light entity placed in the level
#[derive(Debug, Clone)]
pub struct StaticLight {
    /// Entity identity, also the owner id of its dynamic record
    pub id: EntityId,
    /// Light properties submitted each frame the light is visible
    pub properties: LightProperties,
    /// Distance beyond which the light is not submitted
    pub max_view_distance: f32,
    /// The entity may cast shadows
    pub shadow_caster: bool,
}

impl StaticLight {
    /// Create a light entity; shadow capability follows the `CAST_SHADOWS` flag
    pub fn new(id: EntityId, properties: LightProperties, max_view_distance: f32) -> Self {
        let shadow_caster = properties.flags.contains(LightFlags::CAST_SHADOWS);
        Self {
            id,
            properties: properties.sanitized(),
            max_view_distance,
            shadow_caster,
        }
    }

    /// World-space box of the light's influence
    pub fn bounds(&self) -> AABB {
        Sphere::new(self.properties.origin, self.properties.effective_radius()).bounding_box()
    }

    /// Refresh the cast-shadow flag for the current view distance
    ///
    /// The sun keeps its flag. Other lights stop casting past
    /// `max_view_distance * cast_ratio` or when the pass renders no shadows.
    pub fn update_cast_shadow_flag(&mut self, distance: f32, cast_ratio: f32, render_shadows: bool) {
        if self.properties.flags.contains(LightFlags::SUN) {
            return;
        }
        if distance > self.max_view_distance * cast_ratio || !render_shadows {
            self.properties.flags.remove(LightFlags::CAST_SHADOWS);
        } else if self.shadow_caster {
            self.properties.flags.insert(LightFlags::CAST_SHADOWS);
        }
    }
}

/// Level light entities in registration order
#[derive(Debug, Clone, Default)]
pub struct StaticLightSet {
    lights: Vec<StaticLight>,
    sun: Option<EntityId>,
}

impl StaticLightSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a light, or replace the properties of an already registered id
    pub fn register(&mut self, light: StaticLight) {
        if light.properties.flags.contains(LightFlags::SUN) {
            self.sun = Some(light.id);
        } else if self.sun == Some(light.id) {
            self.sun = None;
        }

        match self.lights.iter_mut().find(|existing| existing.id == light.id) {
            Some(existing) => *existing = light,
            None => self.lights.push(light),
        }
    }

    /// Remove a light; clears the sun if it was the sun
    pub fn unregister(&mut self, id: EntityId) -> Option<StaticLight> {
        if self.sun == Some(id) {
            self.sun = None;
        }
        let index = self.lights.iter().position(|light| light.id == id)?;
        Some(self.lights.remove(index))
    }

    /// The current sun
    pub fn sun(&self) -> Option<&StaticLight> {
        let id = self.sun?;
        self.get(id)
    }

    /// Light by id
    pub fn get(&self, id: EntityId) -> Option<&StaticLight> {
        self.lights.iter().find(|light| light.id == id)
    }

    /// Lights in registration order
    pub fn iter(&self) -> impl Iterator<Item = &StaticLight> {
        self.lights.iter()
    }

    /// Mutable lights in registration order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StaticLight> {
        self.lights.iter_mut()
    }

    /// Ids of every non-sun light, in registration order
    pub fn candidate_ids(&self) -> Vec<EntityId> {
        self.lights
            .iter()
            .filter(|light| !light.properties.flags.contains(LightFlags::SUN))
            .map(|light| light.id)
            .collect()
    }

    /// Number of registered lights
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// No lights registered
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

/// Stable handle to a cached light combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CombinationHandle(pub usize);

/// Memoized static-light combinations
#[derive(Debug, Clone, Default)]
pub struct AffectingLightsCache {
    combinations: Vec<Vec<EntityId>>,
}

impl AffectingLightsCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Combination of static lights that may affect `bbox`
    ///
    /// Returns the existing handle when an identical list is cached.
    pub fn query(&mut self, bbox: &AABB, lights: &StaticLightSet) -> CombinationHandle {
        let candidates = lights.candidate_ids();

        if let Some(index) = self.combinations.iter().position(|cached| *cached == candidates) {
            return CombinationHandle(index);
        }

        log::trace!(
            "New affecting light combination of {} lights (query box center {:?})",
            candidates.len(),
            bbox.center()
        );
        self.combinations.push(candidates);
        CombinationHandle(self.combinations.len() - 1)
    }

    /// Lights of a cached combination
    pub fn combination(&self, handle: CombinationHandle) -> Option<&[EntityId]> {
        self.combinations.get(handle.0).map(Vec::as_slice)
    }

    /// Remove a deleted light from every cached combination
    pub fn invalidate(&mut self, light: EntityId) {
        for combination in &mut self.combinations {
            combination.retain(|id| *id != light);
        }
    }

    /// Number of cached combinations
    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    /// Nothing cached
    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn light(id: u64) -> StaticLight {
        StaticLight::new(EntityId(id), LightProperties::point(Vec3::new(id as f32, 0.0, 0.0), Vec3::repeat(1.0), 5.0), 100.0)
    }

    fn scene() -> StaticLightSet {
        let mut set = StaticLightSet::new();
        set.register(light(1));
        set.register(StaticLight::new(EntityId(2), LightProperties::sun(Vec3::new(0.0, 1e4, 0.0), Vec3::repeat(1.0)), f32::MAX));
        set.register(light(3));
        set
    }

    fn bbox() -> AABB {
        AABB::from_center_extents(Vec3::zeros(), Vec3::repeat(1.0))
    }

    #[test]
    fn test_query_excludes_sun_and_is_stable() {
        let set = scene();
        let mut cache = AffectingLightsCache::new();

        let first = cache.query(&bbox(), &set);
        let second = cache.query(&AABB::from_center_extents(Vec3::repeat(50.0), Vec3::repeat(2.0)), &set);

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.combination(first).unwrap(), &[EntityId(1), EntityId(3)]);
    }

    #[test]
    fn test_changed_set_creates_new_combination() {
        let mut set = scene();
        let mut cache = AffectingLightsCache::new();
        let before = cache.query(&bbox(), &set);

        set.register(light(4));
        let after = cache.query(&bbox(), &set);

        assert_ne!(before, after);
        assert_eq!(cache.combination(after).unwrap().len(), 3);
    }

    #[test]
    fn test_match_is_order_sensitive() {
        let mut cache = AffectingLightsCache::new();
        let mut forward = StaticLightSet::new();
        forward.register(light(1));
        forward.register(light(3));
        let mut reversed = StaticLightSet::new();
        reversed.register(light(3));
        reversed.register(light(1));

        let a = cache.query(&bbox(), &forward);
        let b = cache.query(&bbox(), &reversed);
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalidate_shrinks_every_combination() {
        let mut set = scene();
        let mut cache = AffectingLightsCache::new();
        let small = cache.query(&bbox(), &set);
        set.register(light(4));
        let large = cache.query(&bbox(), &set);

        cache.invalidate(EntityId(3));

        assert_eq!(cache.len(), 2);
        for handle in [small, large] {
            assert!(!cache.combination(handle).unwrap().contains(&EntityId(3)));
        }
    }

    #[test]
    fn test_unregister_sun_clears_it() {
        let mut set = scene();
        assert_eq!(set.sun().map(|sun| sun.id), Some(EntityId(2)));
        set.unregister(EntityId(2));
        assert!(set.sun().is_none());
    }

    #[test]
    fn test_cast_shadow_flag_follows_distance() {
        let mut caster = StaticLight::new(
            EntityId(9),
            LightProperties::point(Vec3::zeros(), Vec3::repeat(1.0), 5.0).with_cast_shadows(true),
            100.0,
        );
        caster.update_cast_shadow_flag(60.0, 0.5, true);
        assert!(!caster.properties.flags.contains(LightFlags::CAST_SHADOWS));

        caster.update_cast_shadow_flag(40.0, 0.5, true);
        assert!(caster.properties.flags.contains(LightFlags::CAST_SHADOWS));

        caster.update_cast_shadow_flag(40.0, 0.5, false);
        assert!(!caster.properties.flags.contains(LightFlags::CAST_SHADOWS));
    }
}
