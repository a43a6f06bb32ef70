//! Vehicle configuration.
//!
//! Pin numbers, duty range, motor polarities and ranger settings for one robot.
//! Every field has a default matching the stock SteamBot wiring and can be
//! overridden, e.g. from a JSON file:
//!
//! ```rust
//! use sbot_core::utils::config::VehicleConfig;
//! let cfg: VehicleConfig =
//!     serde_json::from_str(r#"{"right":"normal","pins":{"trigger":16}}"#).unwrap();
//! assert_eq!(cfg.pins.trigger, 16);
//! assert_eq!(cfg.pins.left_pwm, 4);
//! ```

use serde::{Deserialize, Serialize};

use crate::utils::{
    controllers::{drive::Polarity, motor::MotorConfig},
    math::duty::DutyRange,
    sensors::ultrasonic::RangerConfig,
};

/// GPIO numbers for each line role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMap {
    pub left_pwm: u8,
    pub left_dir: u8,
    pub right_pwm: u8,
    pub right_dir: u8,
    pub trigger: u8,
    pub echo: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            left_pwm: 4,
            left_dir: 2,
            right_pwm: 5,
            right_dir: 0,
            trigger: 12,
            echo: 14,
        }
    }
}

impl PinMap {
    /// `(role, pin)` pairs in a fixed order.
    pub fn roles(&self) -> [(&'static str, u8); 6] {
        [
            ("left_pwm", self.left_pwm),
            ("left_dir", self.left_dir),
            ("right_pwm", self.right_pwm),
            ("right_dir", self.right_dir),
            ("trigger", self.trigger),
            ("echo", self.echo),
        ]
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Two roles were assigned the same pin.
    SharedPin {
        pin: u8,
        first: &'static str,
        second: &'static str,
    },
    InvalidDutyRange { min: u16, max: u16 },
    InvalidThreshold,
    /// A zero ranging timeout fails every measurement.
    InvalidTimeout,
}

/// Full robot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub pins: PinMap,
    pub duty: DutyRange,
    pub left: Polarity,
    pub right: Polarity,
    pub ranger: RangerConfig,
}

impl Default for VehicleConfig {
    /// Stock SteamBot: right motor mounted mirror-image.
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            duty: DutyRange::default(),
            left: Polarity::Normal,
            right: Polarity::Mirrored,
            ranger: RangerConfig::default(),
        }
    }
}

impl VehicleConfig {
    /// Check that no line is shared and the numeric parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let roles = self.pins.roles();
        for (i, &(first, pin)) in roles.iter().enumerate() {
            if let Some(&(second, _)) = roles[i + 1..].iter().find(|&&(_, p)| p == pin) {
                return Err(ConfigError::SharedPin { pin, first, second });
            }
        }
        if !self.duty.is_ordered() {
            return Err(ConfigError::InvalidDutyRange {
                min: self.duty.min,
                max: self.duty.max,
            });
        }
        if !(self.ranger.threshold_cm.is_finite() && self.ranger.threshold_cm >= 0.0) {
            return Err(ConfigError::InvalidThreshold);
        }
        if self.ranger.timeout_us == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn left_motor(&self) -> MotorConfig {
        MotorConfig::new("left", self.duty)
    }

    pub fn right_motor(&self) -> MotorConfig {
        MotorConfig::new("right", self.duty)
    }
}
