//! # Core Engine Module
//!
//! Shared configuration for the light pipeline.
//!
//! ## Organization
//!
//! - **Config**: Polled per-frame configuration for the light registry and shadow scheduler
//! - **Foundation**: Low-level utilities (math, logging), re-exported for convenience

pub mod config;

pub use crate::foundation;

pub use config::{
    Config,
    ConfigError,
    ConfigFormat,
    LightSystemConfig,
    LightingConfig,
    ShadowConfig,
};
