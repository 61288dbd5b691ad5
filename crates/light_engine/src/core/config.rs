//! # Light System Configuration
//!
//! The read-only config surface the light pipeline polls once per frame.
//! Values are grouped the same way the pipeline is: registry/culling knobs in
//! [`LightingConfig`], shadow budget knobs in [`ShadowConfig`].
//!
//! Every struct uses `#[serde(default)]` so a config file only needs to name
//! the values it overrides:
//!
//! ```toml
//! [lighting]
//! max_lights_per_frame = 16
//!
//! [shadows]
//! shadows_masks_limit = 2
//! ```

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError, ConfigFormat};

/// Upper bound on sun cascades a shadow frustum set can hold
pub const MAX_SUN_CASCADES: u8 = 8;

/// # Lighting Configuration
///
/// Controls the dynamic light registry and the per-view light list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Master switch for dynamic lights; when off every submission removes the owner's light
    pub dynamic_lights_enabled: bool,
    /// Registry capacity
    pub max_dynamic_lights: usize,
    /// Maximum number of real lights handed to the renderer backend per view
    pub max_lights_per_frame: usize,
    /// Accept lights into backend slots eagerly, in priority order
    pub consistent_sort_order: bool,
    /// Gate submissions on the spatial index's area visibility
    pub frame_id_vis_test: bool,
    /// Portal recursion depth for the area visibility test
    pub vis_test_recursion_depth: u32,
    /// Allow the sun to be submitted
    pub sun_enabled: bool,
    /// Lights smaller than this are not registered in spatial sectors
    pub min_sector_radius: f32,
}

impl LightingConfig {
    /// Create a lighting configuration with engine defaults
    pub fn new() -> Self {
        Self {
            dynamic_lights_enabled: true,
            max_dynamic_lights: 512,
            max_lights_per_frame: 32,
            consistent_sort_order: true,
            frame_id_vis_test: false,
            vis_test_recursion_depth: 3,
            sun_enabled: true,
            min_sector_radius: 0.5,
        }
    }

    /// Set registry capacity
    pub fn with_max_dynamic_lights(mut self, count: usize) -> Self {
        self.max_dynamic_lights = count;
        self
    }

    /// Set the per-view light limit
    pub fn with_max_lights_per_frame(mut self, count: usize) -> Self {
        self.max_lights_per_frame = count;
        self
    }

    /// Enable or disable eager slot acceptance
    pub fn with_consistent_sort_order(mut self, enabled: bool) -> Self {
        self.consistent_sort_order = enabled;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lights_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "max_lights_per_frame must be at least 1".to_string(),
            ));
        }
        if !self.min_sector_radius.is_finite() || self.min_sector_radius < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_sector_radius must be a finite non-negative value, got {}",
                self.min_sector_radius
            )));
        }
        Ok(())
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Shadow Configuration
///
/// Budgets and defaults for shadow pass scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Master switch for shadow maps
    pub shadows_enabled: bool,
    /// When > 0, only the first `4 * limit` lights may cast shadows
    pub shadows_masks_limit: u32,
    /// Ceiling on light shadow passes emitted per frame
    pub shadow_pool_slots: usize,
    /// Allow per-object shadow overrides
    pub per_object_shadows_enabled: bool,
    /// Ceiling on per-object shadow passes emitted per frame
    pub max_per_object_shadows: usize,
    /// Multiplier applied to per-object texture sizes
    pub per_object_resolution_scale: f32,
    /// Largest texture the backend can allocate for a shadow map
    pub max_texture_size: u32,
    /// Texture size requested for light shadow maps
    pub default_texture_size: u32,
    /// Number of sun cascades
    pub sun_cascade_count: u8,
    /// Half extent of the first sun cascade in world units
    pub sun_cascade_base_extent: f32,
    /// Local lights stop casting shadows beyond this fraction of their view distance
    pub cast_view_dist_ratio_lights: f32,
}

impl ShadowConfig {
    /// Create a shadow configuration with engine defaults
    pub fn new() -> Self {
        Self {
            shadows_enabled: true,
            shadows_masks_limit: 0,
            shadow_pool_slots: 32,
            per_object_shadows_enabled: true,
            max_per_object_shadows: 8,
            per_object_resolution_scale: 1.0,
            max_texture_size: 4096,
            default_texture_size: 1024,
            sun_cascade_count: 4,
            sun_cascade_base_extent: 8.0,
            cast_view_dist_ratio_lights: 0.5,
        }
    }

    /// Set the shadow mask limit (0 = unlimited)
    pub fn with_masks_limit(mut self, limit: u32) -> Self {
        self.shadows_masks_limit = limit;
        self
    }

    /// Set the shadow pool ceiling
    pub fn with_pool_slots(mut self, slots: usize) -> Self {
        self.shadow_pool_slots = slots;
        self
    }

    /// Set the per-object shadow ceiling
    pub fn with_max_per_object_shadows(mut self, count: usize) -> Self {
        self.max_per_object_shadows = count;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shadows_enabled && self.shadow_pool_slots == 0 {
            return Err(ConfigError::Invalid(
                "shadow_pool_slots must be at least 1 when shadows are enabled".to_string(),
            ));
        }
        if self.sun_cascade_count == 0 || self.sun_cascade_count > MAX_SUN_CASCADES {
            return Err(ConfigError::Invalid(format!(
                "sun_cascade_count must be in 1..={MAX_SUN_CASCADES}, got {}",
                self.sun_cascade_count
            )));
        }
        for (name, value) in [
            ("per_object_resolution_scale", self.per_object_resolution_scale),
            ("sun_cascade_base_extent", self.sun_cascade_base_extent),
            ("cast_view_dist_ratio_lights", self.cast_view_dist_ratio_lights),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite positive value, got {value}"
                )));
            }
        }
        if self.max_texture_size < 64 {
            return Err(ConfigError::Invalid(format!(
                "max_texture_size must be at least 64, got {}",
                self.max_texture_size
            )));
        }
        Ok(())
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Light System Configuration
///
/// Top-level configuration owned by a [`crate::render::lighting::LightFrameContext`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSystemConfig {
    /// Registry and culling settings
    pub lighting: LightingConfig,
    /// Shadow scheduling settings
    pub shadows: ShadowConfig,
}

impl LightSystemConfig {
    /// Create a configuration with engine defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lighting section
    pub fn with_lighting(mut self, lighting: LightingConfig) -> Self {
        self.lighting = lighting;
        self
    }

    /// Replace the shadow section
    pub fn with_shadows(mut self, shadows: ShadowConfig) -> Self {
        self.shadows = shadows;
        self
    }
}

impl Config for LightSystemConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.lighting.validate()?;
        self.shadows.validate()
    }
}
