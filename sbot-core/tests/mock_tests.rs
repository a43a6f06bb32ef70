use core::{cell::RefCell, convert::Infallible};
use std::rc::Rc;

use embedded_hal::{
    delay::DelayNs,
    digital::{self, ErrorKind},
    pwm::{self, SetDutyCycle},
};
use embedded_hal_mock::eh1::digital::{
    Mock as PinMock, State as PinState, Transaction as PinTrans,
};
use sbot_core::utils::{
    controllers::{
        Direction, DriveCommand, DriveController, Fan, Motion, Motor, MotorConfig, MotorDriver,
        MotorError, MotorState, Polarity, Reading, SystemCommand, SystemController, SystemError,
    },
    math::duty::{duty_cycle, DutyRange, DUTY_MAX},
    sensors::{
        ultrasonic::{EchoEdge, RangerCommand, RangerConfig, RangerError, UltrasonicRanger},
        EmbassyClock, MicrosClock, RawValueReadable, TrippedCheckable,
    },
};

/// PWM channel that records every duty written to it.
#[derive(Clone)]
struct PwmProbe {
    max: u16,
    writes: Rc<RefCell<Vec<u16>>>,
}

impl PwmProbe {
    fn new(max: u16) -> Self {
        Self {
            max,
            writes: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn writes(&self) -> Vec<u16> {
        self.writes.borrow().clone()
    }
}

impl pwm::ErrorType for PwmProbe {
    type Error = Infallible;
}

impl SetDutyCycle for PwmProbe {
    fn max_duty_cycle(&self) -> u16 {
        self.max
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.writes.borrow_mut().push(duty);
        Ok(())
    }
}

/// PWM channel that rejects every duty write.
struct BrokenPwm;

impl pwm::ErrorType for BrokenPwm {
    type Error = pwm::ErrorKind;
}

impl SetDutyCycle for BrokenPwm {
    fn max_duty_cycle(&self) -> u16 {
        DUTY_MAX
    }

    fn set_duty_cycle(
        &mut self,
        _duty: u16,
    ) -> Result<(), Self::Error> {
        Err(pwm::ErrorKind::Other)
    }
}

/// Output line that rejects every write.
struct BrokenPin;

impl digital::ErrorType for BrokenPin {
    type Error = ErrorKind;
}

impl digital::OutputPin for BrokenPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Err(ErrorKind::Other)
    }
}

/// Clock advancing a fixed step on every read.
struct StepClock {
    now: u64,
    step: u64,
}

impl StepClock {
    fn new(step: u64) -> Self {
        Self { now: 0, step }
    }
}

impl MicrosClock for StepClock {
    fn now_us(&mut self) -> u64 {
        let t = self.now;
        self.now += self.step;
        t
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(
        &mut self,
        _ns: u32,
    ) {
    }
}

type SteamMotor = Motor<PwmProbe, PinMock>;
type TestRanger = UltrasonicRanger<PinMock, PinMock, NoDelay, StepClock>;

/// Expected clock step for every ranger test.
const STEP_US: u64 = 100;

fn set(state: PinState) -> PinTrans {
    PinTrans::set(state)
}

/// Single-direction-pin motor with the stock duty range.
fn motor(
    name: &'static str,
    dir_expectations: &[PinTrans],
) -> (SteamMotor, PwmProbe, PinMock) {
    let pwm = PwmProbe::new(DUTY_MAX);
    let dir = PinMock::new(dir_expectations);
    let m = Motor::single_pin(MotorConfig::new(name, DutyRange::default()), pwm.clone(), dir.clone())
        .unwrap();
    (m, pwm, dir)
}

fn duty(speed: f32) -> u16 {
    let range = DutyRange::default();
    duty_cycle(speed, range.min, range.max)
}

/// Trigger expectations for one measurement.
fn trigger_pulse() -> Vec<PinTrans> {
    vec![set(PinState::Low), set(PinState::High), set(PinState::Low)]
}

/// Echo expectations for a pulse lasting `(highs + 1) * STEP_US`.
fn echo_pulse(highs: usize) -> Vec<PinTrans> {
    let mut t = vec![PinTrans::get(PinState::Low), PinTrans::get(PinState::High)];
    t.extend((0..highs).map(|_| PinTrans::get(PinState::High)));
    t.push(PinTrans::get(PinState::Low));
    t
}

fn ranger(
    config: RangerConfig,
    trigger: &[PinTrans],
    echo: &[PinTrans],
) -> (TestRanger, PinMock, PinMock) {
    let trig = PinMock::new(trigger);
    let echo = PinMock::new(echo);
    let r = UltrasonicRanger::new(
        config,
        trig.clone(),
        echo.clone(),
        NoDelay,
        StepClock::new(STEP_US),
    );
    (r, trig, echo)
}

#[test]
fn forward_sets_direction_then_duty() {
    let (mut m, pwm, mut dir) = motor("left", &[set(PinState::High)]);
    m.forward(50.0).unwrap();
    assert_eq!(pwm.writes(), vec![duty(50.0)]);
    assert_eq!(
        m.state(),
        MotorState {
            speed: 50.0,
            direction: Direction::Forward
        }
    );
    dir.done();
}

#[test]
fn two_line_motor_drives_bridge_in_antiphase() {
    let pwm = PwmProbe::new(DUTY_MAX);
    let mut fwd = PinMock::new(&[set(PinState::High), set(PinState::Low), set(PinState::Low)]);
    let mut bwd = PinMock::new(&[set(PinState::Low), set(PinState::High), set(PinState::Low)]);
    let mut m = Motor::new(
        MotorConfig::default(),
        pwm.clone(),
        fwd.clone(),
        Some(bwd.clone()),
    )
    .unwrap();

    m.forward(100.0).unwrap();
    m.backward(100.0).unwrap();
    m.stop().unwrap();

    assert_eq!(pwm.writes(), vec![DUTY_MAX, DUTY_MAX, 0]);
    assert_eq!(m.state(), MotorState::default());
    fwd.done();
    bwd.done();
}

#[test]
fn out_of_range_speed_keeps_direction_but_no_power() {
    let (mut m, pwm, mut dir) = motor("left", &[set(PinState::High), set(PinState::Low)]);
    m.forward(150.0).unwrap();
    m.backward(-20.0).unwrap();
    assert_eq!(pwm.writes(), vec![0, 0]);
    assert_eq!(
        m.state(),
        MotorState {
            speed: 0.0,
            direction: Direction::Backward
        }
    );
    dir.done();
}

#[test]
fn stock_duty_range_rescales_onto_twelve_bit_channel() {
    let pwm = PwmProbe::new(4095);
    let mut dir = PinMock::new(&[set(PinState::High), set(PinState::High), set(PinState::Low)]);
    let mut m = Motor::single_pin(MotorConfig::default(), pwm.clone(), dir.clone()).unwrap();

    m.forward(100.0).unwrap();
    // 40267 * 4095 / 65535
    m.forward(50.0).unwrap();
    m.stop().unwrap();

    assert_eq!(pwm.writes(), vec![4095, 2516, 0]);
    dir.done();
}

#[test]
fn inverted_duty_range_is_rejected() {
    let mut dir = PinMock::new(&[]);
    let config = MotorConfig::new("left", DutyRange::new(40_000, 20_000));
    let res = Motor::single_pin(config, PwmProbe::new(DUTY_MAX), dir.clone());
    assert!(matches!(
        res,
        Err(MotorError::InvalidDutyRange {
            min: 40_000,
            max: 20_000
        })
    ));
    dir.done();
}

#[test]
fn failed_duty_write_still_reports_new_direction() {
    let dir = PinMock::new(&[set(PinState::High)]);
    let mut m = Motor::single_pin(MotorConfig::default(), BrokenPwm, dir).unwrap();

    assert_eq!(m.forward(50.0), Err(MotorError::Pwm(pwm::ErrorKind::Other)));
    assert_eq!(
        m.state(),
        MotorState {
            speed: 0.0,
            direction: Direction::Forward
        }
    );

    let (_, mut dir, bwd) = m.release();
    assert!(bwd.is_none());
    dir.done();
}

#[test]
fn pin_failure_is_reported() {
    let mut m =
        Motor::single_pin(MotorConfig::default(), PwmProbe::new(DUTY_MAX), BrokenPin).unwrap();
    assert_eq!(m.forward(50.0), Err(MotorError::Pin(ErrorKind::Other)));
    assert_eq!(m.state(), MotorState::default());
}

#[test]
fn mirrored_forward_drives_right_motor_backward() {
    let (left, lpwm, mut ldir) = motor("left", &[set(PinState::High)]);
    let (right, rpwm, mut rdir) = motor("right", &[set(PinState::Low)]);
    let mut drive = DriveController::new(left, false.into(), right, true.into());

    drive.forward(80.0).unwrap();

    let (l, r) = drive.motor_states();
    assert_eq!(l.direction, Direction::Forward);
    assert_eq!(r.direction, Direction::Backward);
    assert_eq!(lpwm.writes(), vec![duty(80.0)]);
    assert_eq!(rpwm.writes(), vec![duty(80.0)]);
    ldir.done();
    rdir.done();
}

#[test]
fn forward_twice_is_idempotent() {
    let (left, lpwm, mut ldir) = motor("left", &[set(PinState::High), set(PinState::High)]);
    let (right, rpwm, mut rdir) = motor("right", &[set(PinState::Low), set(PinState::Low)]);
    let mut drive = DriveController::new(left, Polarity::Normal, right, Polarity::Mirrored);

    drive.forward(50.0).unwrap();
    let once = drive.motor_states();
    drive.forward(50.0).unwrap();

    assert_eq!(drive.motor_states(), once);
    assert_eq!(lpwm.writes(), vec![duty(50.0); 2]);
    assert_eq!(rpwm.writes(), vec![duty(50.0); 2]);
    ldir.done();
    rdir.done();
}

#[test]
fn left_turn_stops_left_and_pushes_right() {
    // stop drives the direction line low; the mirrored right side pushes with "backward"
    let (left, lpwm, mut ldir) = motor("left", &[set(PinState::Low)]);
    let (right, rpwm, mut rdir) = motor("right", &[set(PinState::Low)]);
    let mut drive = DriveController::new(left, Polarity::Normal, right, Polarity::Mirrored);

    drive.left(60.0).unwrap();

    assert_eq!(lpwm.writes(), vec![0]);
    assert_eq!(rpwm.writes(), vec![duty(60.0)]);
    assert_eq!(
        drive.motor_states(),
        (
            MotorState::default(),
            MotorState {
                speed: 60.0,
                direction: Direction::Backward
            }
        )
    );
    assert_eq!(drive.motion(), Motion::Left);
    ldir.done();
    rdir.done();
}

#[test]
fn stop_reports_both_motors_stopped() {
    let (left, lpwm, mut ldir) = motor("left", &[set(PinState::Low)]);
    let (right, rpwm, mut rdir) = motor("right", &[set(PinState::Low)]);
    let mut drive = DriveController::new(left, false.into(), right, true.into());

    drive.stop().unwrap();

    for state in [drive.motor_states().0, drive.motor_states().1] {
        assert_eq!(state.speed, 0.0);
        assert_eq!(state.direction, Direction::Stopped);
    }
    assert_eq!(lpwm.writes(), vec![0]);
    assert_eq!(rpwm.writes(), vec![0]);
    ldir.done();
    rdir.done();
}

#[test]
fn fan_runs_full_range() {
    let pwm = PwmProbe::new(DUTY_MAX);
    let mut fan = Fan::new(MotorConfig::fan("cooling"), pwm.clone()).unwrap();
    fan.run(50.0).unwrap();
    fan.run(120.0).unwrap();
    assert_eq!(fan.speed(), 0.0);
    fan.run(100.0).unwrap();
    fan.stop().unwrap();
    assert_eq!(pwm.writes(), vec![32_767, 0, DUTY_MAX, 0]);
}

#[test]
fn distance_from_thousand_microsecond_echo() {
    let (mut r, _, _) = ranger(RangerConfig::default(), &trigger_pulse(), &echo_pulse(9));
    let d = r.distance().unwrap();
    assert!((d - 17.15).abs() < 1e-3, "got {d}");

    let (mut trig, mut echo, _, mut clock) = r.release();
    // one read after the trigger, one per echo poll
    assert_eq!(clock.now_us(), 13 * STEP_US);
    trig.done();
    echo.done();
}

#[test]
fn low_active_ranger_trips_when_near() {
    // 500 us round trip ~ 8.6 cm
    let (mut r, mut trig, mut echo) = ranger(RangerConfig::default(), &trigger_pulse(), &echo_pulse(4));
    assert!(r.tripped().unwrap());
    trig.done();
    echo.done();

    // 700 us round trip ~ 12.0 cm
    let (mut r, mut trig, mut echo) = ranger(RangerConfig::default(), &trigger_pulse(), &echo_pulse(6));
    assert!(!r.tripped().unwrap());
    trig.done();
    echo.done();
}

#[test]
fn high_active_ranger_trips_when_far() {
    let config = RangerConfig {
        low_active: false,
        ..RangerConfig::default()
    };
    let (mut r, mut trig, mut echo) = ranger(config, &trigger_pulse(), &echo_pulse(6));
    assert!(r.tripped().unwrap());
    trig.done();
    echo.done();
}

#[test]
fn silent_echo_times_out_on_rising_edge() {
    let config = RangerConfig {
        timeout_us: 5 * STEP_US,
        ..RangerConfig::default()
    };
    let silent = vec![PinTrans::get(PinState::Low); 5];
    let (mut r, mut trig, mut echo) = ranger(config, &trigger_pulse(), &silent);
    assert_eq!(
        r.raw_value(),
        Err(RangerError::RangingTimeout {
            edge: EchoEdge::Rising
        })
    );
    trig.done();
    echo.done();
}

#[test]
fn stuck_high_echo_times_out_on_falling_edge() {
    let config = RangerConfig {
        timeout_us: 5 * STEP_US,
        ..RangerConfig::default()
    };
    let stuck = vec![PinTrans::get(PinState::High); 6];
    let (mut r, mut trig, mut echo) = ranger(config, &trigger_pulse(), &stuck);
    assert_eq!(
        r.tripped(),
        Err(RangerError::RangingTimeout {
            edge: EchoEdge::Falling
        })
    );
    trig.done();
    echo.done();
}

#[test]
fn embassy_clock_is_monotonic() {
    let mut clock = EmbassyClock;
    let first = clock.now_us();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = clock.now_us();
    assert!(second >= first + 1_000, "{first} -> {second}");
}

#[test]
fn system_controller_executes_drive_and_ranger_commands() {
    let (left, _, mut ldir) = motor("left", &[set(PinState::High)]);
    let (right, _, mut rdir) = motor("right", &[set(PinState::Low)]);
    let drive = DriveController::new(left, Polarity::Normal, right, Polarity::Mirrored);
    let (r, mut trig, mut echo) = ranger(RangerConfig::default(), &trigger_pulse(), &echo_pulse(9));
    let mut sys = SystemController::new(drive, Some(r));

    let forward = SystemCommand::from_json(br#"{"ct":"d","dc":"forward","s":80}"#).unwrap();
    assert_eq!(forward, SystemCommand::D(DriveCommand::Forward { s: Some(80.0) }));
    assert_eq!(sys.execute_command(forward), Ok(None));
    assert_eq!(sys.drive.motion(), Motion::Forward);

    let measure = SystemCommand::from_json(br#"{"ct":"r","rc":"distance"}"#).unwrap();
    match sys.execute_command(measure) {
        Ok(Some(Reading::DistanceCm(d))) => assert!((d - 17.15).abs() < 1e-3),
        other => panic!("unexpected {other:?}"),
    }

    ldir.done();
    rdir.done();
    trig.done();
    echo.done();
}

#[test]
fn ranger_command_without_ranger_is_rejected() {
    let (left, _, mut ldir) = motor("left", &[]);
    let (right, _, mut rdir) = motor("right", &[]);
    let drive = DriveController::new(left, Polarity::Normal, right, Polarity::Mirrored);
    let mut sys: SystemController<_, _, TestRanger> = SystemController::new(drive, None);

    assert_eq!(
        sys.execute_command(SystemCommand::R(RangerCommand::Tripped)),
        Err(SystemError::RangerNotFitted)
    );
    ldir.done();
    rdir.done();
}

#[test]
fn malformed_commands_are_rejected() {
    assert!(SystemCommand::from_json(br#"{"ct":"d","dc":"sideways"}"#).is_err());
    assert!(SystemCommand::from_json(b"forward").is_err());
    assert_eq!(
        SystemCommand::from_json(br#"{"ct":"d","dc":"stop"}"#).unwrap(),
        SystemCommand::D(DriveCommand::Stop)
    );
}
