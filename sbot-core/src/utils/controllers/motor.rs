//! DC motor drivers for the SteamBot.
//!
//! A [`Motor`] drives one brushed DC motor through an H-bridge (L293/L298 style):
//! one PWM enable line carries the speed, one or two direction lines carry the
//! polarity. A [`Fan`] is the degenerate case with a PWM line only.
//!
//! Speeds are percentages; see [`crate::utils::math::duty`] for the mapping onto
//! duty units. Duties are written as a fraction of [`DUTY_MAX`], leaving the
//! rescaling to the channel's own resolution. Out-of-range speeds switch the motor
//! off instead of failing.

use core::convert::Infallible;

use embedded_hal::{
    digital::{self, OutputPin},
    pwm::{self, SetDutyCycle},
};
use serde::Serialize;

use crate::utils::math::duty::{in_speed_range, DutyRange, DUTY_MAX};

/// Speed used when a command does not carry one.
pub const DEFAULT_SPEED: f32 = 100.0;

/// Errors raised while writing motor lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorError {
    /// A direction line rejected a level change.
    Pin(digital::ErrorKind),
    /// The enable line rejected a duty write.
    Pwm(pwm::ErrorKind),
    /// The configured duty range has `min > max`.
    InvalidDutyRange { min: u16, max: u16 },
}

impl MotorError {
    fn pin<E: digital::Error>(e: E) -> Self {
        MotorError::Pin(e.kind())
    }

    fn pwm<E: pwm::Error>(e: E) -> Self {
        MotorError::Pwm(e.kind())
    }
}

/// Direction a motor was last driven in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    #[default]
    Stopped,
}

/// Last commanded state of a motor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotorState {
    /// Applied speed in percent; `0` when stopped or when the request was out of range.
    pub speed: f32,
    pub direction: Direction,
}

/// Static configuration of one motor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorConfig {
    pub name: &'static str,
    pub duty: DutyRange,
}

impl MotorConfig {
    pub const fn new(
        name: &'static str,
        duty: DutyRange,
    ) -> Self {
        Self { name, duty }
    }

    /// Full-range configuration for fans, which spin up from any duty.
    pub const fn fan(name: &'static str) -> Self {
        Self::new(name, DutyRange::new(0, DUTY_MAX))
    }

    fn check_duty(&self) -> Result<(), MotorError> {
        if self.duty.is_ordered() {
            Ok(())
        } else {
            Err(MotorError::InvalidDutyRange {
                min: self.duty.min,
                max: self.duty.max,
            })
        }
    }
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self::new("DCMotor", DutyRange::default())
    }
}

/// Vehicle-facing motor primitives.
///
/// The drive controller is written against this trait so that each side can be any
/// motor implementation (or a test double).
pub trait MotorDriver {
    /// Spin forward at a percentage speed.
    fn forward(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError>;

    /// Spin backward at a percentage speed.
    fn backward(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError>;

    /// Remove power and release both direction lines.
    fn stop(&mut self) -> Result<(), MotorError>;

    /// Last commanded state.
    fn state(&self) -> MotorState;
}

/// Placeholder for the missing backward line of a single-direction-pin motor.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPin;

impl digital::ErrorType for NoPin {
    type Error = Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Bidirectional DC motor behind an H-bridge.
///
/// With two direction lines the bridge inputs are driven in antiphase. With a single
/// direction line (`backward` is `None`) its level alone selects the direction,
/// which is how the SteamBot motor shield is wired.
pub struct Motor<EN, FWD, BWD = NoPin> {
    config: MotorConfig,
    enable: EN,
    forward: FWD,
    backward: Option<BWD>,
    state: MotorState,
}

impl<EN, FWD> Motor<EN, FWD, NoPin>
where
    EN: SetDutyCycle,
    FWD: OutputPin,
{
    /// Create a motor whose direction is carried by a single line.
    pub fn single_pin(
        config: MotorConfig,
        enable: EN,
        direction: FWD,
    ) -> Result<Self, MotorError> {
        Self::new(config, enable, direction, None)
    }
}

impl<EN, FWD, BWD> Motor<EN, FWD, BWD>
where
    EN: SetDutyCycle,
    FWD: OutputPin,
    BWD: OutputPin,
{
    /// Create a motor over its enable line and direction line(s).
    ///
    /// Fails if the configured duty range is inverted. No line is written until
    /// the first command.
    pub fn new(
        config: MotorConfig,
        enable: EN,
        forward: FWD,
        backward: Option<BWD>,
    ) -> Result<Self, MotorError> {
        config.check_duty()?;

        Ok(Self {
            config,
            enable,
            forward,
            backward,
            state: MotorState::default(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    /// Give the lines back, e.g. to reconfigure them.
    pub fn release(self) -> (EN, FWD, Option<BWD>) {
        (self.enable, self.forward, self.backward)
    }

    fn write_duty(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        self.enable
            .set_duty_cycle_fraction(self.config.duty.duty_for(speed), DUTY_MAX)
            .map_err(MotorError::pwm)
    }

    fn drive(
        &mut self,
        direction: Direction,
        speed: f32,
    ) -> Result<(), MotorError> {
        let forward_level = matches!(direction, Direction::Forward);
        self.forward
            .set_state(forward_level.into())
            .map_err(MotorError::pin)?;
        if let Some(backward) = self.backward.as_mut() {
            backward
                .set_state((!forward_level).into())
                .map_err(MotorError::pin)?;
        }
        // speed stays 0 until the duty write succeeds
        self.state = MotorState {
            speed: 0.0,
            direction,
        };

        let applied = if in_speed_range(speed) {
            speed
        } else {
            tracing::warn!(
                motor = self.config.name,
                speed,
                "speed outside 0..=100, motor switched off"
            );
            0.0
        };
        self.write_duty(applied)?;
        self.state.speed = applied;
        Ok(())
    }
}

impl<EN, FWD, BWD> MotorDriver for Motor<EN, FWD, BWD>
where
    EN: SetDutyCycle,
    FWD: OutputPin,
    BWD: OutputPin,
{
    fn forward(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        tracing::info!("Moving {} forward at speed {}", self.config.name, speed);
        self.drive(Direction::Forward, speed)
    }

    fn backward(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        tracing::info!("Moving {} backward at speed {}", self.config.name, speed);
        self.drive(Direction::Backward, speed)
    }

    fn stop(&mut self) -> Result<(), MotorError> {
        tracing::info!("Stopping {}", self.config.name);
        self.enable.set_duty_cycle_fully_off().map_err(MotorError::pwm)?;
        self.forward.set_low().map_err(MotorError::pin)?;
        if let Some(backward) = self.backward.as_mut() {
            backward.set_low().map_err(MotorError::pin)?;
        }
        self.state = MotorState::default();
        Ok(())
    }

    fn state(&self) -> MotorState {
        self.state
    }
}

/// Single-line PWM motor such as a 3-wire cooling fan with a built-in driver.
pub struct Fan<EN> {
    config: MotorConfig,
    enable: EN,
    speed: f32,
}

impl<EN> Fan<EN>
where
    EN: SetDutyCycle,
{
    pub fn new(
        config: MotorConfig,
        enable: EN,
    ) -> Result<Self, MotorError> {
        config.check_duty()?;
        Ok(Self {
            config,
            enable,
            speed: 0.0,
        })
    }

    /// Run at a percentage speed; out-of-range speeds switch the fan off.
    pub fn run(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        tracing::info!("Running fan {} at speed {}", self.config.name, speed);
        let applied = if in_speed_range(speed) {
            speed
        } else {
            tracing::warn!(
                fan = self.config.name,
                speed,
                "speed outside 0..=100, fan switched off"
            );
            0.0
        };
        self.enable
            .set_duty_cycle_fraction(self.config.duty.duty_for(applied), DUTY_MAX)
            .map_err(MotorError::pwm)?;
        self.speed = applied;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), MotorError> {
        tracing::info!("Stopping fan {}", self.config.name);
        self.run(0.0)
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }
}
