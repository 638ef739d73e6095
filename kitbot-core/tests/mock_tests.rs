use core::cell::RefCell;
use core::convert::Infallible;

use embassy_sync::{blocking_mutex::raw::NoopRawMutex, channel::Channel};
use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTrans};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use embedded_hal_mock::eh1::MockError;
use kitbot_core::utils::config::{DriveConfig, WheelChannels};
use kitbot_core::utils::controllers::{
    CommandLines, CountSource, DriveArbitrator, DriveBehavior, DriveController, DriveError,
    DriveIo, InputMode, LineId, ManualInput, ModeSwitch, ModeTarget, Pca9685Wheels,
    PulseCounter, WheelSink,
};
use kitbot_core::utils::{decode_command, DriveCommand};
use kitbot_core::utils::math::kinematics::{DriveVector, WheelOutputs};

/// Default I2C address for the PWM motor controller.
pub const PWM_ADDRESS: u8 = 0x55;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}

fn get(high: bool) -> PinTrans {
    PinTrans::get(if high { State::High } else { State::Low })
}

fn set(high: bool) -> PinTrans {
    PinTrans::set(if high { State::High } else { State::Low })
}

/// Wheel sink that records every applied output, or rejects them all.
#[derive(Default)]
struct Wheels {
    applied: Vec<WheelOutputs>,
    unplugged: bool,
}

impl WheelSink for Wheels {
    type Error = &'static str;

    fn apply(
        &mut self,
        outputs: WheelOutputs,
    ) -> Result<(), &'static str> {
        if self.unplugged {
            return Err("motor controller not responding");
        }
        self.applied.push(outputs);
        Ok(())
    }
}

#[derive(Default)]
struct Counter {
    pending: u32,
    resets: u32,
}

impl PulseCounter for Counter {
    type Error = Infallible;

    fn count(&mut self) -> Result<u32, Infallible> {
        Ok(self.pending)
    }

    fn reset(&mut self) -> Result<(), Infallible> {
        self.pending = 0;
        self.resets += 1;
        Ok(())
    }
}

struct Stick(DriveVector);

impl ManualInput for Stick {
    type Error = Infallible;

    fn read_vector(&mut self) -> Result<DriveVector, Infallible> {
        Ok(self.0)
    }
}

type Arbitrator = DriveArbitrator<PinMock, PinMock, CountSource<Counter>, Wheels, Stick>;

/// Expected transcript per line, in the order move, turn, direction, shoot,
/// enable, indicator.
#[derive(Default)]
struct Lines {
    move_line: Vec<PinTrans>,
    turn: Vec<PinTrans>,
    direction: Vec<PinTrans>,
    shoot: Vec<PinTrans>,
    enable: Vec<PinTrans>,
    indicator: Vec<PinTrans>,
}

/// Handles on the pin mocks for checking the transcript afterwards.
struct Probes([PinMock; 6]);

impl Probes {
    fn done(&mut self) {
        for pin in self.0.iter_mut() {
            pin.done();
        }
    }
}

fn rig(
    lines: Lines,
    pulses: u32,
    stick: DriveVector,
    wheels: Wheels,
) -> (Arbitrator, Probes) {
    rig_with(&DriveConfig::default(), lines, pulses, stick, wheels)
}

fn rig_with(
    config: &DriveConfig,
    lines: Lines,
    pulses: u32,
    stick: DriveVector,
    wheels: Wheels,
) -> (Arbitrator, Probes) {
    let pins = [
        PinMock::new(&lines.move_line),
        PinMock::new(&lines.turn),
        PinMock::new(&lines.direction),
        PinMock::new(&lines.shoot),
        PinMock::new(&lines.enable),
        PinMock::new(&lines.indicator),
    ];
    let probes = Probes(pins.clone());
    let [move_line, turn, direction, shoot, enable, indicator] = pins;

    let arb = DriveArbitrator::new(
        config,
        DriveIo {
            lines: CommandLines {
                move_line,
                turn,
                direction,
                shoot,
            },
            enable,
            indicator,
            pulses: CountSource(Counter {
                pending: pulses,
                resets: 0,
            }),
            wheels,
            manual: Stick(stick),
        },
    );
    (arb, probes)
}

/// Automatic-mode transcript for a cycle with `move` asserted.
fn moving(
    turn: bool,
    direction: bool,
    shoot: bool,
) -> Lines {
    Lines {
        move_line: vec![get(true)],
        turn: vec![get(turn)],
        direction: vec![get(direction)],
        shoot: vec![get(shoot)],
        enable: vec![set(true)],
        indicator: vec![set(shoot)],
    }
}

fn close(
    a: f32,
    b: f32,
) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn manual_mode_passes_joystick_through() {
    let (mut arb, mut probes) = rig(
        Lines::default(),
        0,
        DriveVector::new(0.6, 0.3),
        Wheels::default(),
    );
    arb.tick().unwrap();

    let w = arb.wheels().applied[0];
    assert!(close(w.front_left, 0.9) && close(w.back_left, 0.9));
    assert!(close(w.front_right, 0.3) && close(w.back_right, 0.3));
    assert_eq!(arb.pulses().0.resets, 0);
    probes.done();
}

#[test]
fn manual_mode_clamps_out_of_range_joystick() {
    let (mut arb, mut probes) = rig(
        Lines::default(),
        0,
        DriveVector {
            forward: 2.5,
            rotate: 0.0,
        },
        Wheels::default(),
    );
    arb.tick().unwrap();
    assert_eq!(arb.wheels().applied[0].as_array(), [1.0; 4]);
    probes.done();
}

#[test]
fn automatic_forward_scales_base_speed() {
    let (mut arb, mut probes) = rig(
        moving(false, true, false),
        0,
        DriveVector::STOP,
        Wheels::default(),
    );
    arb.set_mode(InputMode::Automatic).unwrap();
    arb.tick().unwrap();

    let v = arb.last_vector().unwrap();
    assert!(close(v.forward, 0.85 * 0.35));
    assert_eq!(v.rotate, 0.0);
    assert_eq!(arb.pulses().0.resets, 1);
    probes.done();
}

#[test]
fn automatic_backward_at_full_pulse_rate() {
    let (mut arb, mut probes) = rig(
        moving(false, false, true),
        100,
        DriveVector::STOP,
        Wheels::default(),
    );
    arb.set_mode(InputMode::Automatic).unwrap();
    arb.tick().unwrap();

    let v = arb.last_vector().unwrap();
    assert!(close(v.forward, -0.85));
    assert_eq!(v.rotate, 0.0);
    let w = arb.wheels().applied[0];
    assert!(close(w.left(), -0.85) && close(w.right(), -0.85));
    probes.done();
}

#[test]
fn automatic_turns_follow_direction_line() {
    for (direction, sign) in [(true, 1.0f32), (false, -1.0f32)] {
        let (mut arb, mut probes) = rig(
            moving(true, direction, false),
            50,
            DriveVector::STOP,
            Wheels::default(),
        );
        arb.set_mode(InputMode::Automatic).unwrap();
        arb.tick().unwrap();

        let v = arb.last_vector().unwrap();
        let scalar = 0.35 * 0.5 + 1.0 * 0.5;
        assert_eq!(v.forward, 0.0);
        assert!(close(v.rotate, sign * 0.85 * scalar));
        probes.done();
    }
}

#[test]
fn automatic_without_move_issues_no_wheel_command() {
    let sentinel = WheelOutputs {
        front_left: 0.42,
        front_right: -0.42,
        back_left: 0.42,
        back_right: -0.42,
    };
    // turn and direction must not be sampled at all
    let lines = Lines {
        move_line: vec![get(false)],
        shoot: vec![get(true)],
        enable: vec![set(true)],
        indicator: vec![set(true)],
        ..Lines::default()
    };
    let (mut arb, mut probes) = rig(
        lines,
        30,
        DriveVector::STOP,
        Wheels {
            applied: vec![sentinel],
            ..Wheels::default()
        },
    );
    arb.set_mode(InputMode::Automatic).unwrap();
    arb.tick().unwrap();

    assert_eq!(arb.wheels().applied, vec![sentinel]);
    assert_eq!(arb.last_vector(), None);
    probes.done();
}

#[test]
fn indicator_follows_shoot_every_automatic_cycle() {
    let lines = Lines {
        move_line: vec![get(false), get(true)],
        turn: vec![get(false)],
        direction: vec![get(true)],
        shoot: vec![get(true), get(false)],
        enable: vec![set(true)],
        indicator: vec![set(true), set(false)],
    };
    let (mut arb, mut probes) = rig(lines, 0, DriveVector::STOP, Wheels::default());
    arb.set_mode(InputMode::Automatic).unwrap();
    arb.tick().unwrap();
    arb.tick().unwrap();
    assert_eq!(arb.wheels().applied.len(), 1);
    probes.done();
}

#[test]
fn suspension_stops_base_in_automatic_mode() {
    let (mut arb, mut probes) = rig(
        moving(false, true, false),
        80,
        DriveVector::STOP,
        Wheels::default(),
    );
    arb.set_mode(InputMode::Automatic).unwrap();
    arb.tick().unwrap();
    assert!(!arb.last_vector().unwrap().is_stop());

    arb.on_suspend().unwrap();
    assert_eq!(arb.wheels().applied.last(), Some(&WheelOutputs::STOP));
    assert_eq!(arb.last_vector(), Some(DriveVector::STOP));
    assert_eq!(arb.pulses().0.resets, 2);
    probes.done();
}

#[test]
fn termination_stops_base_in_manual_mode() {
    let (mut arb, mut probes) = rig(
        Lines::default(),
        0,
        DriveVector::new(-0.7, 0.2),
        Wheels::default(),
    );
    arb.tick().unwrap();
    arb.on_terminate().unwrap();

    let applied = &arb.wheels().applied;
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[1], WheelOutputs::STOP);
    assert_eq!(arb.pulses().0.resets, 1);
    probes.done();
}

#[test]
fn mode_switch_drives_enable_line_idempotently() {
    let lines = Lines {
        enable: vec![set(true), set(true), set(false)],
        ..Lines::default()
    };
    let (mut arb, mut probes) = rig(lines, 0, DriveVector::STOP, Wheels::default());

    let auto = ModeSwitch::enable_automatic(true);
    auto.run(&mut arb).unwrap();
    auto.run(&mut arb).unwrap();
    assert_eq!(arb.mode(), InputMode::Automatic);

    ModeSwitch::new(InputMode::Manual).run(&mut arb).unwrap();
    assert_eq!(arb.mode(), InputMode::Manual);
    assert!(arb.wheels().applied.is_empty());
    probes.done();
}

#[test]
fn failed_line_read_aborts_cycle() {
    let lines = Lines {
        move_line: vec![PinTrans::get(State::High)
            .with_error(MockError::Io(std::io::ErrorKind::NotConnected))],
        enable: vec![set(true)],
        ..Lines::default()
    };
    let (mut arb, mut probes) = rig(lines, 10, DriveVector::STOP, Wheels::default());
    arb.set_mode(InputMode::Automatic).unwrap();

    let err = arb.tick().unwrap_err();
    assert!(matches!(err, DriveError::Line(LineId::Move, _)));
    assert!(arb.wheels().applied.is_empty());
    assert_eq!(arb.pulses().0.pending, 10);
    probes.done();
}

#[test]
fn controller_mode_command_stops_then_hands_over() {
    let lines = Lines {
        move_line: vec![get(false)],
        shoot: vec![get(false)],
        enable: vec![set(true)],
        indicator: vec![set(false)],
        ..Lines::default()
    };
    let (arb, mut probes) = rig(lines, 5, DriveVector::new(0.5, 0.0), Wheels::default());
    let channel: Channel<NoopRawMutex, _, 4> = Channel::new();
    let mut ctrl = DriveController::new(arb);

    let command = decode_command(br#"{"dc":"mode","auto":true}"#).unwrap();
    channel.try_send(command).unwrap();
    ctrl.step(&channel);

    let arb = ctrl.behavior();
    assert_eq!(arb.mode(), InputMode::Automatic);
    // suspension stop is the only wheel command; the automatic cycle idles
    assert_eq!(arb.wheels().applied, vec![WheelOutputs::STOP]);
    assert_eq!(arb.pulses().0.pending, 0);
    assert_eq!(ctrl.cycles(), 1);
    probes.done();
}

#[test]
fn inverted_speed_bounds_are_reordered() {
    let mut config = DriveConfig::default();
    config.speed.min_fraction = 0.9;
    config.speed.max_fraction = 0.2;
    let (mut arb, mut probes) = rig_with(
        &config,
        moving(false, true, false),
        0,
        DriveVector::STOP,
        Wheels::default(),
    );
    arb.set_mode(InputMode::Automatic).unwrap();
    arb.tick().unwrap();

    // no pulses selects the lower bound
    let v = arb.last_vector().unwrap();
    assert!(close(v.forward, 0.85 * 0.2));
    probes.done();
}

#[test]
fn mode_command_applies_even_when_stop_fails() {
    let lines = Lines {
        enable: vec![set(true)],
        ..Lines::default()
    };
    let (arb, mut probes) = rig(
        lines,
        12,
        DriveVector::STOP,
        Wheels {
            unplugged: true,
            ..Wheels::default()
        },
    );
    let mut ctrl = DriveController::new(arb);

    let err = ctrl.execute(DriveCommand::Mode { auto: true }).unwrap_err();
    assert_eq!(err, DriveError::Wheels);

    let arb = ctrl.behavior();
    assert_eq!(arb.mode(), InputMode::Automatic);
    assert!(arb.wheels().applied.is_empty());
    assert_eq!(arb.pulses().0.resets, 1);
    probes.done();
}

#[test]
fn pca9685_configure() {
    // Expected transactions for enabling PWM and setting prescale (includes sleep handling)
    let expectations = [
        write(PWM_ADDRESS, vec![0x00, 0x01]),
        write(PWM_ADDRESS, vec![0x00, 0x11]),
        write(PWM_ADDRESS, vec![0xFE, 100]),
        write(PWM_ADDRESS, vec![0x00, 0x01]),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut wheels = Pca9685Wheels::new(&i2c_bus, &WheelChannels::default()).unwrap();
    wheels.configure().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn pca9685_apply_stop() {
    // One auto-increment enable, then a phase and an enable write per wheel
    let expectations = [
        write(PWM_ADDRESS, vec![0x00, 0x31]),
        write(PWM_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x0A, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x0E, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x12, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x16, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x1A, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x1E, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x22, 0x00, 0x00, 0x00, 0x00]),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut wheels = Pca9685Wheels::new(&i2c_bus, &WheelChannels::default()).unwrap();
    wheels.apply(WheelOutputs::STOP).unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn pca9685_apply_full_scale_both_directions() {
    let expectations = [
        write(PWM_ADDRESS, vec![0x00, 0x31]),
        // front-left forward
        write(PWM_ADDRESS, vec![0x06, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x0A, 0x00, 0x00, 0xFF, 0x0F]),
        // front-right reverse
        write(PWM_ADDRESS, vec![0x0E, 0x00, 0x00, 0xFF, 0x0F]),
        write(PWM_ADDRESS, vec![0x12, 0x00, 0x00, 0xFF, 0x0F]),
        write(PWM_ADDRESS, vec![0x16, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x1A, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x1E, 0x00, 0x00, 0x00, 0x00]),
        write(PWM_ADDRESS, vec![0x22, 0x00, 0x00, 0x00, 0x00]),
    ];

    let mock = I2cMock::new(&expectations);
    let i2c_bus = RefCell::new(mock);
    let mut wheels = Pca9685Wheels::new(&i2c_bus, &WheelChannels::default()).unwrap();
    wheels
        .apply(WheelOutputs {
            front_left: 1.0,
            front_right: -1.0,
            back_left: 0.0,
            back_right: 0.0,
        })
        .unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn pca9685_rejects_unknown_channel() {
    let mock = I2cMock::new(&[]);
    let i2c_bus = RefCell::new(mock);
    let channels = WheelChannels {
        back_right: (6, 16),
        ..WheelChannels::default()
    };
    assert!(Pca9685Wheels::new(&i2c_bus, &channels).is_err());
    i2c_bus.borrow_mut().done();
}
