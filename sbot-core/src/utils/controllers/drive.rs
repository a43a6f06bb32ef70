//! Differential drive for the SteamBot.
//!
//! Two motors, one per side. The motors are mounted mirror-image, so the same
//! "forward" intent needs opposite electrical polarity on one of them; each side's
//! [`Polarity`] is resolved once, when the controller is built, into the pair of
//! motor primitives that push and pull the vehicle.
//!
//! Turns are pivot turns: the inner wheel is stopped and the outer one driven.

use serde::{Deserialize, Serialize};

use super::motor::{MotorDriver, MotorError, MotorState, DEFAULT_SPEED};

/// Mounting orientation of a drive motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Motor "forward" moves the vehicle forward.
    #[default]
    Normal,
    /// Motor "backward" moves the vehicle forward.
    Mirrored,
}

impl From<bool> for Polarity {
    /// `true` is a flipped (mirrored) motor.
    fn from(flip: bool) -> Self {
        if flip {
            Polarity::Mirrored
        } else {
            Polarity::Normal
        }
    }
}

/// Vehicle motion implied by the last command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    #[default]
    Stopped,
    Forward,
    Backward,
    Left,
    Right,
}

/// Drive command variants.
///
/// Serialized as JSON with tag `"dc"`; `s` is the speed in percent and defaults to
/// full speed when absent.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "dc", rename_all = "snake_case")]
pub enum DriveCommand {
    Forward {
        #[serde(default)]
        s: Option<f32>,
    },
    Backward {
        #[serde(default)]
        s: Option<f32>,
    },
    Left {
        #[serde(default)]
        s: Option<f32>,
    },
    Right {
        #[serde(default)]
        s: Option<f32>,
    },
    Stop,
}

impl DriveCommand {
    /// Resolve a directional action token.
    ///
    /// `None` means stop. Unrecognised tokens also stop the vehicle.
    pub fn from_action(
        action: Option<&str>,
        speed: Option<f32>,
    ) -> Self {
        match action.map(str::trim) {
            None | Some("") | Some("stop") => DriveCommand::Stop,
            Some("forward") => DriveCommand::Forward { s: speed },
            Some("backward") => DriveCommand::Backward { s: speed },
            Some("left") => DriveCommand::Left { s: speed },
            Some("right") => DriveCommand::Right { s: speed },
            Some(other) => {
                tracing::warn!(action = other, "unknown drive action, stopping");
                DriveCommand::Stop
            }
        }
    }

    /// Motion this command puts the vehicle in.
    pub fn motion(&self) -> Motion {
        match self {
            DriveCommand::Forward { .. } => Motion::Forward,
            DriveCommand::Backward { .. } => Motion::Backward,
            DriveCommand::Left { .. } => Motion::Left,
            DriveCommand::Right { .. } => Motion::Right,
            DriveCommand::Stop => Motion::Stopped,
        }
    }
}

type DriveFn<M> = fn(&mut M, f32) -> Result<(), MotorError>;

/// One side of the vehicle with its polarity already applied.
struct Side<M> {
    motor: M,
    polarity: Polarity,
    push: DriveFn<M>,
    pull: DriveFn<M>,
}

impl<M: MotorDriver> Side<M> {
    fn new(
        motor: M,
        polarity: Polarity,
    ) -> Self {
        let forward: DriveFn<M> = M::forward;
        let backward: DriveFn<M> = M::backward;
        let (push, pull) = match polarity {
            Polarity::Normal => (forward, backward),
            Polarity::Mirrored => (backward, forward),
        };
        Self {
            motor,
            polarity,
            push,
            pull,
        }
    }

    fn push(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        (self.push)(&mut self.motor, speed)
    }

    fn pull(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        (self.pull)(&mut self.motor, speed)
    }
}

/// Two-wheel differential drive.
///
/// The left motor is always written before the right one, except in [`right`],
/// which stops the right motor before driving the left. The two writes are not
/// atomic.
///
/// [`right`]: DriveController::right
pub struct DriveController<L, R> {
    left: Side<L>,
    right: Side<R>,
    motion: Motion,
}

impl<L, R> DriveController<L, R>
where
    L: MotorDriver,
    R: MotorDriver,
{
    /// Build a controller over two motors and their mounting polarities.
    pub fn new(
        left: L,
        left_polarity: Polarity,
        right: R,
        right_polarity: Polarity,
    ) -> Self {
        Self {
            left: Side::new(left, left_polarity),
            right: Side::new(right, right_polarity),
            motion: Motion::Stopped,
        }
    }

    /// Drive both wheels so the vehicle moves forward.
    pub fn forward(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        self.left.push(speed)?;
        self.right.push(speed)?;
        self.motion = Motion::Forward;
        Ok(())
    }

    /// Drive both wheels so the vehicle moves backward.
    pub fn backward(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        self.left.pull(speed)?;
        self.right.pull(speed)?;
        self.motion = Motion::Backward;
        Ok(())
    }

    /// Pivot left: stop the left wheel, push with the right.
    pub fn left(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        self.left.motor.stop()?;
        self.right.push(speed)?;
        self.motion = Motion::Left;
        Ok(())
    }

    /// Pivot right: stop the right wheel, push with the left.
    pub fn right(
        &mut self,
        speed: f32,
    ) -> Result<(), MotorError> {
        self.right.motor.stop()?;
        self.left.push(speed)?;
        self.motion = Motion::Right;
        Ok(())
    }

    /// Stop both wheels.
    pub fn stop(&mut self) -> Result<(), MotorError> {
        self.left.motor.stop()?;
        self.right.motor.stop()?;
        self.motion = Motion::Stopped;
        Ok(())
    }

    /// Execute a [`DriveCommand`], defaulting the speed to full.
    pub fn apply(
        &mut self,
        command: DriveCommand,
    ) -> Result<(), MotorError> {
        match command {
            DriveCommand::Forward { s } => self.forward(s.unwrap_or(DEFAULT_SPEED)),
            DriveCommand::Backward { s } => self.backward(s.unwrap_or(DEFAULT_SPEED)),
            DriveCommand::Left { s } => self.left(s.unwrap_or(DEFAULT_SPEED)),
            DriveCommand::Right { s } => self.right(s.unwrap_or(DEFAULT_SPEED)),
            DriveCommand::Stop => self.stop(),
        }
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    pub fn polarities(&self) -> (Polarity, Polarity) {
        (self.left.polarity, self.right.polarity)
    }

    pub fn left_motor(&self) -> &L {
        &self.left.motor
    }

    pub fn right_motor(&self) -> &R {
        &self.right.motor
    }

    /// Last commanded state of `(left, right)`.
    pub fn motor_states(&self) -> (MotorState, MotorState) {
        (self.left.motor.state(), self.right.motor.state())
    }

    /// Take the motors back out of the controller.
    pub fn release(self) -> (L, R) {
        (self.left.motor, self.right.motor)
    }
}
