//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
pub fn init() {
    env_logger::init();
}

/// Frame-based rate limiter for diagnostics that would otherwise fire every frame
///
/// A message is allowed on frames where `frame_id & (period - 1) == period - 1`,
/// and at most once per allowed frame. `period` must be a power of two.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    mask: u64,
    last_emitted: Option<u64>,
}

impl RateLimiter {
    /// Period used for capacity warnings in the light pipeline
    pub const CAPACITY_WARNING_PERIOD: u64 = 8;

    /// Create a limiter that lets one message through every `period` frames
    pub fn new(period: u64) -> Self {
        debug_assert!(period.is_power_of_two(), "rate limiter period must be a power of two");
        Self {
            mask: period.max(1) - 1,
            last_emitted: None,
        }
    }

    /// Returns true if a diagnostic may be emitted on `frame_id`, and records it
    pub fn allow(&mut self, frame_id: u64) -> bool {
        if frame_id & self.mask != self.mask {
            return false;
        }
        if self.last_emitted == Some(frame_id) {
            return false;
        }
        self.last_emitted = Some(frame_id);
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::CAPACITY_WARNING_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_fires_once_every_eight_frames() {
        let mut limiter = RateLimiter::default();
        let fired: Vec<u64> = (0..32).filter(|&frame| limiter.allow(frame)).collect();
        assert_eq!(fired, vec![7, 15, 23, 31]);
    }

    #[test]
    fn test_rate_limiter_fires_once_per_frame() {
        let mut limiter = RateLimiter::default();
        assert!(limiter.allow(7));
        assert!(!limiter.allow(7));
        assert!(limiter.allow(15));
    }
}
