//! Ultrasonic ranging over a trigger/echo line pair (HC-SR04 style).
//!
//! A measurement fires a short trigger pulse, then times the echo line: it goes high
//! when the burst leaves the transducer and low when the reflection returns. The
//! pulse width is the round-trip time of flight.
//!
//! Both edge waits are bounded by [`RangerConfig::timeout_us`], so a disconnected
//! or stuck echo line yields [`RangerError::RangingTimeout`] instead of blocking
//! the caller forever.

use embedded_hal::{
    delay::DelayNs,
    digital::{self, InputPin, OutputPin},
};
use serde::{Deserialize, Serialize};

use super::{MicrosClock, RawValueReadable, Sensor, TrippedCheckable};

/// Speed of sound in dry air at ~20 °C, in cm/µs.
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;

/// Trigger low time before the pulse.
const TRIGGER_SETTLE_US: u32 = 2;
/// Trigger high time; the HC-SR04 datasheet asks for at least 10 µs.
const TRIGGER_PULSE_US: u32 = 10;
/// Echo wait bound, a little over the ~25 ms echo of a 4 m target.
pub const DEFAULT_TIMEOUT_US: u64 = 30_000;

/// Echo edge a measurement was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    /// Start of the echo pulse.
    Rising,
    /// End of the echo pulse.
    Falling,
}

impl EchoEdge {
    /// Echo level that completes the wait.
    fn level(self) -> bool {
        matches!(self, EchoEdge::Rising)
    }
}

/// Errors that can occur while ranging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangerError {
    Trigger(digital::ErrorKind),
    Echo(digital::ErrorKind),
    /// The echo line did not reach the expected edge within the timeout.
    RangingTimeout { edge: EchoEdge },
}

impl RangerError {
    fn trigger<E: digital::Error>(e: E) -> Self {
        RangerError::Trigger(e.kind())
    }

    fn echo<E: digital::Error>(e: E) -> Self {
        RangerError::Echo(e.kind())
    }
}

/// Ranger command variants.
///
/// Serialized as JSON with tag `"rc"`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "rc", rename_all = "snake_case")]
pub enum RangerCommand {
    /// Measure the distance in centimeters.
    Distance,
    /// Evaluate the threshold condition.
    Tripped,
}

/// Ranger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangerConfig {
    #[serde(skip)]
    pub name: &'static str,
    /// Trip threshold in centimeters.
    pub threshold_cm: f32,
    /// Tripped below the threshold (object near) when `true`, above it when `false`.
    pub low_active: bool,
    /// Bound on each echo edge wait.
    pub timeout_us: u64,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            name: "Ultrasonic",
            threshold_cm: 10.0,
            low_active: true,
            timeout_us: DEFAULT_TIMEOUT_US,
        }
    }
}

/// Convert a round-trip echo time into a one-way distance.
pub fn echo_to_distance_cm(elapsed_us: u64) -> f32 {
    elapsed_us as f32 * SPEED_OF_SOUND_CM_PER_US / 2.0
}

/// Threshold predicate shared by every ranging reading.
pub fn is_tripped(
    distance_cm: f32,
    threshold_cm: f32,
    low_active: bool,
) -> bool {
    (low_active && distance_cm < threshold_cm) || (!low_active && distance_cm > threshold_cm)
}

/// Trigger/echo ultrasonic ranger.
pub struct UltrasonicRanger<TRIG, ECHO, D, C> {
    config: RangerConfig,
    trigger: TRIG,
    echo: ECHO,
    delay: D,
    clock: C,
}

impl<TRIG, ECHO, D, C> UltrasonicRanger<TRIG, ECHO, D, C>
where
    TRIG: OutputPin,
    ECHO: InputPin,
    D: DelayNs,
    C: MicrosClock,
{
    pub fn new(
        config: RangerConfig,
        trigger: TRIG,
        echo: ECHO,
        delay: D,
        clock: C,
    ) -> Self {
        Self {
            config,
            trigger,
            echo,
            delay,
            clock,
        }
    }

    pub fn config(&self) -> &RangerConfig {
        &self.config
    }

    /// Measure the distance to the nearest obstacle in centimeters.
    ///
    /// Blocks for the duration of the echo, at most twice the configured timeout.
    pub fn distance(&mut self) -> Result<f32, RangerError> {
        self.fire()?;
        let since = self.clock.now_us();
        let start = self.wait_for(EchoEdge::Rising, since)?;
        let end = self.wait_for(EchoEdge::Falling, start)?;

        let elapsed_us = end.saturating_sub(start);
        let distance = echo_to_distance_cm(elapsed_us);
        tracing::debug!(
            sensor = self.config.name,
            elapsed_us,
            distance,
            "echo received"
        );
        Ok(distance)
    }

    /// Give the lines back.
    pub fn release(self) -> (TRIG, ECHO, D, C) {
        (self.trigger, self.echo, self.delay, self.clock)
    }

    /// Send the burst command to the transducer.
    fn fire(&mut self) -> Result<(), RangerError> {
        self.trigger.set_low().map_err(RangerError::trigger)?;
        self.delay.delay_us(TRIGGER_SETTLE_US);
        self.trigger.set_high().map_err(RangerError::trigger)?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(RangerError::trigger)
    }

    /// Poll the echo line until `edge`, returning the time it was observed.
    fn wait_for(
        &mut self,
        edge: EchoEdge,
        since: u64,
    ) -> Result<u64, RangerError> {
        loop {
            let now = self.clock.now_us();
            if self.echo.is_high().map_err(RangerError::echo)? == edge.level() {
                return Ok(now);
            }
            if now.saturating_sub(since) >= self.config.timeout_us {
                tracing::error!(
                    sensor = self.config.name,
                    ?edge,
                    timeout_us = self.config.timeout_us,
                    "no echo"
                );
                return Err(RangerError::RangingTimeout { edge });
            }
        }
    }
}

impl<TRIG, ECHO, D, C> Sensor for UltrasonicRanger<TRIG, ECHO, D, C> {
    type Error = RangerError;

    fn name(&self) -> &str {
        self.config.name
    }
}

impl<TRIG, ECHO, D, C> RawValueReadable for UltrasonicRanger<TRIG, ECHO, D, C>
where
    TRIG: OutputPin,
    ECHO: InputPin,
    D: DelayNs,
    C: MicrosClock,
{
    type Value = f32;

    /// Distance in centimeters.
    fn raw_value(&mut self) -> Result<f32, RangerError> {
        self.distance()
    }
}

impl<TRIG, ECHO, D, C> TrippedCheckable for UltrasonicRanger<TRIG, ECHO, D, C>
where
    TRIG: OutputPin,
    ECHO: InputPin,
    D: DelayNs,
    C: MicrosClock,
{
    fn tripped(&mut self) -> Result<bool, RangerError> {
        let distance = self.raw_value()?;
        let tripped = is_tripped(distance, self.config.threshold_cm, self.config.low_active);
        if tripped {
            tracing::info!("UltrasonicSensor {}: sensor tripped", self.config.name);
        }
        Ok(tripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_from_round_trip() {
        assert!((echo_to_distance_cm(1000) - 17.15).abs() < 1e-3);
        assert_eq!(echo_to_distance_cm(0), 0.0);
    }

    #[test]
    fn low_active_trips_when_near() {
        assert!(is_tripped(8.0, 10.0, true));
        assert!(!is_tripped(12.0, 10.0, true));
        assert!(!is_tripped(10.0, 10.0, true));
    }

    #[test]
    fn high_active_trips_when_far() {
        assert!(is_tripped(12.0, 10.0, false));
        assert!(!is_tripped(8.0, 10.0, false));
        assert!(!is_tripped(10.0, 10.0, false));
    }

    #[test]
    fn config_defaults() {
        let cfg = RangerConfig::default();
        assert_eq!(cfg.threshold_cm, 10.0);
        assert!(cfg.low_active);
        assert_eq!(cfg.timeout_us, DEFAULT_TIMEOUT_US);
    }
}
