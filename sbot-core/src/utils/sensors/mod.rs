//! Sensor capabilities for the SteamBot.
//!
//! Each sensor implements only the capabilities it actually has; there is no base
//! sensor with placeholder readings.
//!
//! - `ultrasonic`: trigger/echo ranging (HC-SR04 and compatibles)

pub mod ultrasonic;

/// Common sensor identity.
pub trait Sensor {
    type Error: core::fmt::Debug;

    fn name(&self) -> &str;
}

/// Sensors producing a continuous raw reading.
pub trait RawValueReadable: Sensor {
    type Value;

    fn raw_value(&mut self) -> Result<Self::Value, Self::Error>;
}

/// Sensors with a threshold condition.
pub trait TrippedCheckable: Sensor {
    /// `true` when the sensor's threshold condition is met.
    fn tripped(&mut self) -> Result<bool, Self::Error>;
}

/// Free-running microsecond time source used for pulse timing.
pub trait MicrosClock {
    fn now_us(&mut self) -> u64;
}

/// [`MicrosClock`] over the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl MicrosClock for EmbassyClock {
    #[inline]
    fn now_us(&mut self) -> u64 {
        embassy_time::Instant::now().as_micros()
    }
}
