use std::{
    convert::Infallible,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use clap::Parser;
use embassy_executor::Executor;
use embassy_futures::yield_now;
use embedded_hal::{
    digital::{self, InputPin, OutputPin},
    pwm::{self, SetDutyCycle},
};
use embedded_hal_mock::eh1::delay::NoopDelay;
use sbot_core::{
    mk_static,
    utils::{
        config::{ConfigError, VehicleConfig},
        controllers::{
            DriveCommand, DriveController, Motor, MotorError, SystemCommand, SystemController,
            COMMAND_CHANNEL,
        },
        math::duty::DUTY_MAX,
        sensors::{
            ultrasonic::{RangerCommand, UltrasonicRanger, SPEED_OF_SOUND_CM_PER_US},
            MicrosClock,
        },
    },
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// JSON vehicle configuration; defaults to the stock SteamBot wiring
    #[clap(long)]
    config: Option<PathBuf>,
    /// speed in percent for drive actions
    #[clap(long)]
    speed: Option<f32>,
    /// override the left motor mounting (true = mirrored)
    #[clap(long)]
    left_flip: Option<bool>,
    /// override the right motor mounting (true = mirrored)
    #[clap(long)]
    right_flip: Option<bool>,
    /// distance of the simulated obstacle in front of the ranger
    #[clap(long, default_value_t = 25.0)]
    distance_cm: f32,
    /// actions: forward, backward, left, right, stop, distance, tripped, or a JSON command
    #[clap(default_value = "stop")]
    actions: Vec<String>,
}

/// Errors that can occur while bringing the mock bot up.
#[derive(Debug)]
enum SetupError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(ConfigError),
    Motor(MotorError),
}

impl From<std::io::Error> for SetupError {
    fn from(e: std::io::Error) -> Self {
        SetupError::Io(e)
    }
}

impl From<serde_json::Error> for SetupError {
    fn from(e: serde_json::Error) -> Self {
        SetupError::Json(e)
    }
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::Config(e)
    }
}

impl From<MotorError> for SetupError {
    fn from(e: MotorError) -> Self {
        SetupError::Motor(e)
    }
}

/// Output line that logs every level change.
struct ConsolePin {
    role: &'static str,
    pin: u8,
}

impl digital::ErrorType for ConsolePin {
    type Error = Infallible;
}

impl OutputPin for ConsolePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        info!(role = self.role, pin = self.pin, "LOW");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        info!(role = self.role, pin = self.pin, "HIGH");
        Ok(())
    }
}

/// PWM line that logs every duty write.
struct ConsolePwm {
    role: &'static str,
    pin: u8,
}

impl pwm::ErrorType for ConsolePwm {
    type Error = Infallible;
}

impl SetDutyCycle for ConsolePwm {
    fn max_duty_cycle(&self) -> u16 {
        DUTY_MAX
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        info!(role = self.role, pin = self.pin, duty, "PWM");
        Ok(())
    }
}

/// Simulated time, advanced one microsecond per read.
#[derive(Clone, Default)]
struct SimClock(Arc<AtomicU64>);

impl MicrosClock for SimClock {
    fn now_us(&mut self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Echo line reflecting an obstacle at a fixed distance.
///
/// The first poll of a measurement arms it; the pulse starts after a short
/// transducer latency and lasts the round trip.
struct SimEcho {
    clock: SimClock,
    round_trip_us: u64,
    armed_at: Option<u64>,
}

const ECHO_LATENCY_US: u64 = 200;

impl SimEcho {
    fn new(
        clock: SimClock,
        distance_cm: f32,
    ) -> Self {
        let round_trip_us = (distance_cm.max(0.0) * 2.0 / SPEED_OF_SOUND_CM_PER_US) as u64;
        Self {
            clock,
            round_trip_us,
            armed_at: None,
        }
    }
}

impl digital::ErrorType for SimEcho {
    type Error = Infallible;
}

impl InputPin for SimEcho {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let now = self.clock.0.load(Ordering::Relaxed);
        let rise = *self.armed_at.get_or_insert(now) + ECHO_LATENCY_US;
        if now >= rise + self.round_trip_us {
            self.armed_at = None;
            return Ok(false);
        }
        Ok(now >= rise)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

type BotMotor = Motor<ConsolePwm, ConsolePin>;
type BotRanger = UltrasonicRanger<ConsolePin, SimEcho, NoopDelay, SimClock>;
type Bot = SystemController<BotMotor, BotMotor, BotRanger>;

fn load_config(opts: &Opts) -> Result<VehicleConfig, SetupError> {
    let mut config = match &opts.config {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => VehicleConfig::default(),
    };
    if let Some(flip) = opts.left_flip {
        config.left = flip.into();
    }
    if let Some(flip) = opts.right_flip {
        config.right = flip.into();
    }
    config.validate()?;
    Ok(config)
}

fn build_bot(
    config: &VehicleConfig,
    distance_cm: f32,
) -> Result<Bot, SetupError> {
    let pins = config.pins;
    let left = Motor::single_pin(
        config.left_motor(),
        ConsolePwm {
            role: "left_pwm",
            pin: pins.left_pwm,
        },
        ConsolePin {
            role: "left_dir",
            pin: pins.left_dir,
        },
    )?;
    let right = Motor::single_pin(
        config.right_motor(),
        ConsolePwm {
            role: "right_pwm",
            pin: pins.right_pwm,
        },
        ConsolePin {
            role: "right_dir",
            pin: pins.right_dir,
        },
    )?;
    let drive = DriveController::new(left, config.left, right, config.right);

    let clock = SimClock::default();
    let ranger = UltrasonicRanger::new(
        config.ranger,
        ConsolePin {
            role: "trigger",
            pin: pins.trigger,
        },
        SimEcho::new(clock.clone(), distance_cm),
        NoopDelay::new(),
        clock,
    );

    Ok(SystemController::new(drive, Some(ranger)))
}

/// Translate a command-line action into a system command.
fn parse_action(
    action: &str,
    speed: Option<f32>,
) -> Option<SystemCommand> {
    match action {
        "distance" => Some(SystemCommand::R(RangerCommand::Distance)),
        "tripped" => Some(SystemCommand::R(RangerCommand::Tripped)),
        json if json.starts_with('{') => match SystemCommand::from_json(json.as_bytes()) {
            Ok(cmd) => Some(cmd),
            Err(error) => {
                warn!(?error, action, "skipping malformed JSON command");
                None
            }
        },
        token => Some(SystemCommand::D(DriveCommand::from_action(Some(token), speed))),
    }
}

#[embassy_executor::task]
async fn control_task(mut bot: Bot) -> ! {
    bot.command_ch().await
}

#[embassy_executor::task]
async fn main_task(commands: Vec<SystemCommand>) {
    for cmd in commands {
        COMMAND_CHANNEL.send(cmd).await;
    }
    // the control task runs each command to completion once it is dequeued
    while !COMMAND_CHANNEL.is_empty() {
        yield_now().await;
    }
    yield_now().await;
    info!("All commands executed");
    std::process::exit(0);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let opts: Opts = Opts::parse();
    let bot = match load_config(&opts).and_then(|cfg| build_bot(&cfg, opts.distance_cm)) {
        Ok(bot) => bot,
        Err(e) => {
            error!(?e, "failed to set up the mock bot");
            std::process::exit(2);
        }
    };
    let commands: Vec<SystemCommand> = opts
        .actions
        .iter()
        .filter_map(|a| parse_action(a, opts.speed))
        .collect();
    info!(count = commands.len(), "Queued commands");

    let executor = mk_static!(Executor, Executor::new());
    executor.run(|spawner| {
        if let Err(e) = spawner.spawn(control_task(bot)) {
            error!(?e, "failed to spawn control task");
            std::process::exit(1);
        }
        if let Err(e) = spawner.spawn(main_task(commands)) {
            error!(?e, "failed to spawn main task");
            std::process::exit(1);
        }
    });
}
