/// Pulse width to distance conversion and the proximity band filter.
///
/// Readings outside the band are not failures — most cycles see nothing in
/// range — so the result is a two-way [`Reading`], not a `Result`.
use crate::capture::EchoPulse;
use crate::defaults::{MAX_RANGE_CM, MIN_RANGE_CM, SPEED_OF_SOUND_CM_PER_US};

/// Valid proximity band. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConfig {
    pub min_cm: f32,
    pub max_cm: f32,
}

impl RangeConfig {
    pub const fn new() -> Self {
        Self {
            min_cm: MIN_RANGE_CM,
            max_cm: MAX_RANGE_CM,
        }
    }

    #[inline]
    pub fn contains(&self, distance_cm: f32) -> bool {
        distance_cm > self.min_cm && distance_cm < self.max_cm
    }
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated distance, stamped with the rising edge of its echo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub timestamp_us: u32,
    pub distance_cm: f32,
}

/// Outcome of converting one echo pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    InRange(Measurement),
    OutOfRange { distance_cm: f32 },
}

/// Round-trip echo width to one-way distance.
#[inline]
pub fn distance_cm(width_us: u32) -> f32 {
    width_us as f32 * SPEED_OF_SOUND_CM_PER_US / 2.0
}

/// Convert a completed pulse and apply the band filter.
pub fn measure(pulse: &EchoPulse, config: &RangeConfig) -> Reading {
    let distance_cm = distance_cm(pulse.width_us());
    if config.contains(distance_cm) {
        Reading::InRange(Measurement {
            timestamp_us: pulse.rising_us,
            distance_cm,
        })
    } else {
        Reading::OutOfRange { distance_cm }
    }
}
