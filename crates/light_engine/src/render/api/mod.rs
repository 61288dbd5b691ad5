//! Public rendering API
//!
//! Contracts between the light pipeline and the systems around it: the
//! renderer backend, the shadow map pool and the spatial index.

pub mod light_backend;

pub use light_backend::{
    LightBackend, LightSectorRegistry, PoolReservation, PoolSlot, ShadowPoolAllocator,
    ShadowPoolRequest, SlotId,
};
