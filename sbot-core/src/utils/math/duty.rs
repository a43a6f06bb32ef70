//! Duty-cycle mapping for PWM motor speed control.
//!
//! Speeds are expressed as a percentage of full power. A [`DutyRange`] maps that
//! percentage linearly onto a 16-bit duty scale between a minimum (the lowest
//! duty at which the motor still turns) and a maximum. Drivers write the result
//! as a fraction of [`DUTY_MAX`], so the scale does not depend on the resolution
//! of the PWM channel.
//!
//! # Example
//! ```rust
//! use sbot_core::utils::math::duty::{duty_cycle, DutyRange};
//! assert_eq!(duty_cycle(100.0, 15_000, 65_535), 65_535);
//! assert_eq!(duty_cycle(0.0, 15_000, 65_535), 0);
//! let range = DutyRange::new(0, 1000);
//! assert_eq!(range.duty_for(50.0), 500);
//! ```
use serde::{Deserialize, Serialize};

/// Full scale of the duty range.
pub const DUTY_MAX: u16 = u16::MAX;

/// Speed percentage that maps onto the top of a duty range.
pub const FULL_SPEED: f32 = 100.0;

/// Inclusive 16-bit duty range a motor is driven within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutyRange {
    /// Duty applied at the smallest non-zero speed.
    pub min: u16,
    /// Duty applied at full speed.
    pub max: u16,
}

impl DutyRange {
    pub const fn new(
        min: u16,
        max: u16,
    ) -> Self {
        Self { min, max }
    }

    /// `true` when `min <= max`.
    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    /// Duty for a percentage speed, see [`duty_cycle`].
    pub fn duty_for(
        &self,
        speed: f32,
    ) -> u16 {
        duty_cycle(speed, self.min, self.max)
    }
}

impl Default for DutyRange {
    /// Lowest duty that reliably turns a small geared DC motor, up to full scale.
    fn default() -> Self {
        Self::new(15_000, DUTY_MAX)
    }
}

/// Map a percentage speed onto `[min_duty, max_duty]`.
///
/// Speeds outside `(0, 100]` (NaN included) yield `0`, i.e. the motor is switched
/// off rather than the call failing. Inside the range the duty is interpolated
/// linearly and truncated to whole duty units.
pub fn duty_cycle(
    speed: f32,
    min_duty: u16,
    max_duty: u16,
) -> u16 {
    if !in_speed_range(speed) {
        return 0;
    }
    let span = f32::from(max_duty.saturating_sub(min_duty));
    min_duty.saturating_add((span * (speed / FULL_SPEED)) as u16)
}

/// `true` if `speed` lies in `(0, 100]`.
pub fn in_speed_range(speed: f32) -> bool {
    speed > 0.0 && speed <= FULL_SPEED
}
