//! Module Exports
//!
//! This file exports key modules used in the motion control system.
//!
//! - `motor`: H-bridge DC motor and fan drivers.
//! - `drive`: two-wheel differential drive built on the motor drivers.

pub mod drive;
/// Module for PWM motor drivers.
pub mod motor;

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use serde::{Deserialize, Serialize};

use crate::utils::sensors::{
    ultrasonic::{RangerCommand, RangerError},
    RawValueReadable, Sensor, TrippedCheckable,
};
pub use drive::{DriveCommand, DriveController, Motion, Polarity};
pub use motor::{Direction, Fan, Motor, MotorConfig, MotorDriver, MotorError, MotorState, NoPin};

/// Channel used to receive system commands (`SystemCommand` messages).
pub static COMMAND_CHANNEL: Channel<CriticalSectionRawMutex, SystemCommand, 16> = Channel::new();

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "ct", rename_all = "snake_case")] // ct = command type
pub enum SystemCommand {
    D(DriveCommand),
    R(RangerCommand),
}

impl SystemCommand {
    /// Decode a JSON command such as `{"ct":"d","dc":"forward","s":80}`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Reading returned by a ranger command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reading", content = "value", rename_all = "snake_case")]
pub enum Reading {
    DistanceCm(f32),
    Tripped(bool),
}

/// Errors surfaced by [`SystemController::execute_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    Motor(MotorError),
    Ranger(RangerError),
    /// A ranger command arrived but no ranger is fitted.
    RangerNotFitted,
}

impl From<MotorError> for SystemError {
    fn from(e: MotorError) -> Self {
        SystemError::Motor(e)
    }
}

impl From<RangerError> for SystemError {
    fn from(e: RangerError) -> Self {
        SystemError::Ranger(e)
    }
}

/// Owns the drive and the (optional) ranger and executes commands against them.
pub struct SystemController<L, R, S> {
    pub drive: DriveController<L, R>,
    pub ranger: Option<S>,
}

impl<L, R, S> SystemController<L, R, S>
where
    L: MotorDriver,
    R: MotorDriver,
    S: Sensor<Error = RangerError> + RawValueReadable<Value = f32> + TrippedCheckable,
{
    pub fn new(
        drive: DriveController<L, R>,
        ranger: Option<S>,
    ) -> Self {
        SystemController { drive, ranger }
    }

    /// Execute one command to completion.
    ///
    /// Returns a reading for ranger commands or `None` for drive commands.
    pub fn execute_command(
        &mut self,
        command: SystemCommand,
    ) -> Result<Option<Reading>, SystemError> {
        match command {
            SystemCommand::D(dc) => {
                self.drive.apply(dc)?;
                Ok(None)
            }
            SystemCommand::R(rc) => {
                let ranger = self.ranger.as_mut().ok_or(SystemError::RangerNotFitted)?;
                let reading = match rc {
                    RangerCommand::Distance => Reading::DistanceCm(ranger.raw_value()?),
                    RangerCommand::Tripped => Reading::Tripped(ranger.tripped()?),
                };
                Ok(Some(reading))
            }
        }
    }

    /// Execute commands from [`COMMAND_CHANNEL`] forever, one at a time.
    pub async fn command_ch(&mut self) -> ! {
        loop {
            let command = COMMAND_CHANNEL.receiver().receive().await;
            tracing::info!("Received Command: {:?}", command);
            match self.execute_command(command) {
                Ok(Some(reading)) => tracing::info!(?reading, "Sensor Data Read"),
                Ok(None) => tracing::info!(motion = ?self.drive.motion(), "Command executed successfully"),
                Err(SystemError::Motor(e)) => {
                    tracing::error!(?e, "drive command failed, stopping");
                    if let Err(e) = self.drive.stop() {
                        tracing::error!(?e, "emergency stop failed");
                    }
                }
                Err(e) => tracing::error!(?e, "command failed"),
            }
        }
    }
}
