//! Drive arbitration between the co-processor and the joystick.
//!
//! Each control cycle the arbitrator reads the current `InputMode` and either
//! decodes the four command lines into a drive vector, scaled by the speed
//! scalar, or passes the joystick vector through. It is the only writer of
//! wheel outputs.
//!
//! When `move` is deasserted in automatic mode no wheel command is issued,
//! so the base keeps its last command. Suspension and termination always
//! write an explicit stop.

use embedded_hal::digital::{Error as _, InputPin, OutputPin, PinState};
use serde::{Deserialize, Serialize};

use crate::utils::{
    self,
    config::DriveConfig,
    controllers::{
        mode::{InputMode, ModeTarget},
        motors::WheelSink,
        speed::{Calibration, PulseSource, SpanCalibration, SpeedScalarEstimator},
        DriveBehavior, DriveError,
    },
    math::kinematics::DriveVector,
};

/// Logical digital lines shared with the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineId {
    Move,
    Turn,
    Direction,
    Shoot,
    Enable,
    Indicator,
}

/// Analog joystick used in manual mode.
pub trait ManualInput {
    type Error: core::fmt::Debug;

    fn read_vector(&mut self) -> Result<DriveVector, Self::Error>;
}

/// Discrete motion requested by the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    /// `move` deasserted: no command this cycle.
    Stop,
    Forward,
    Backward,
    TurnClockwise,
    TurnCounterClockwise,
}

impl Motion {
    /// Decode a line sample. `turn` and `direction` only matter while `move` is set.
    pub fn from_lines(
        move_line: bool,
        turn: bool,
        direction: bool,
    ) -> Self {
        match (move_line, turn, direction) {
            (false, _, _) => Motion::Stop,
            (true, false, true) => Motion::Forward,
            (true, false, false) => Motion::Backward,
            (true, true, true) => Motion::TurnClockwise,
            (true, true, false) => Motion::TurnCounterClockwise,
        }
    }

    /// Drive vector for this motion at `magnitude`, `None` for `Stop`.
    pub fn vector(
        self,
        magnitude: f32,
    ) -> Option<DriveVector> {
        match self {
            Motion::Stop => None,
            Motion::Forward => Some(DriveVector::new(magnitude, 0.0)),
            Motion::Backward => Some(DriveVector::new(-magnitude, 0.0)),
            Motion::TurnClockwise => Some(DriveVector::new(0.0, magnitude)),
            Motion::TurnCounterClockwise => Some(DriveVector::new(0.0, -magnitude)),
        }
    }
}

/// The four input lines driven by the co-processor.
pub struct CommandLines<IN> {
    pub move_line: IN,
    pub turn: IN,
    pub direction: IN,
    pub shoot: IN,
}

fn read_line<IN: InputPin>(
    pin: &mut IN,
    id: LineId,
) -> Result<bool, DriveError> {
    pin.is_high().map_err(|e| {
        tracing::error!(line = ?id, "Line read failed: {:?}", e);
        DriveError::Line(id, e.kind())
    })
}

fn write_line<OUT: OutputPin>(
    pin: &mut OUT,
    id: LineId,
    high: bool,
) -> Result<(), DriveError> {
    pin.set_state(PinState::from(high)).map_err(|e| {
        tracing::error!(line = ?id, "Line write failed: {:?}", e);
        DriveError::Line(id, e.kind())
    })
}

impl<IN: InputPin> CommandLines<IN> {
    /// Sample `move`, then `turn` and `direction` only if `move` is asserted.
    pub fn read_motion(&mut self) -> Result<Motion, DriveError> {
        if !read_line(&mut self.move_line, LineId::Move)? {
            return Ok(Motion::Stop);
        }
        let turn = read_line(&mut self.turn, LineId::Turn)?;
        let direction = read_line(&mut self.direction, LineId::Direction)?;
        Ok(Motion::from_lines(true, turn, direction))
    }

    pub fn read_shoot(&mut self) -> Result<bool, DriveError> {
        read_line(&mut self.shoot, LineId::Shoot)
    }
}

/// Collaborators handed to the arbitrator at construction.
pub struct DriveIo<IN, OUT, P, W, J> {
    pub lines: CommandLines<IN>,
    /// Tells the co-processor it owns the base.
    pub enable: OUT,
    /// Mirrors the shoot line.
    pub indicator: OUT,
    pub pulses: P,
    pub wheels: W,
    pub manual: J,
}

/// Per-cycle arbiter between automatic and manual drive.
pub struct DriveArbitrator<IN, OUT, P, W, J, C = SpanCalibration> {
    lines: CommandLines<IN>,
    enable: OUT,
    indicator: OUT,
    estimator: SpeedScalarEstimator<P, C>,
    kinematics: utils::ak,
    wheels: W,
    manual: J,
    mode: InputMode,
    base_speed: f32,
    last_vector: Option<DriveVector>,
}

impl<IN, OUT, P, W, J> DriveArbitrator<IN, OUT, P, W, J, SpanCalibration>
where
    IN: InputPin,
    OUT: OutputPin,
    P: PulseSource,
    W: WheelSink,
    J: ManualInput,
{
    /// Build an arbitrator in manual mode. No hardware is touched.
    pub fn new(
        config: &DriveConfig,
        io: DriveIo<IN, OUT, P, W, J>,
    ) -> Self {
        let config = config.validated();
        Self::with_calibration(&config, io, SpanCalibration::new(&config.speed))
    }
}

impl<IN, OUT, P, W, J, C> DriveArbitrator<IN, OUT, P, W, J, C>
where
    IN: InputPin,
    OUT: OutputPin,
    P: PulseSource,
    W: WheelSink,
    J: ManualInput,
    C: Calibration,
{
    /// Like `new` with a custom calibration. The config is validated first.
    pub fn with_calibration(
        config: &DriveConfig,
        io: DriveIo<IN, OUT, P, W, J>,
        calibration: C,
    ) -> Self {
        let config = config.validated();
        Self {
            lines: io.lines,
            enable: io.enable,
            indicator: io.indicator,
            estimator: SpeedScalarEstimator::with_calibration(io.pulses, calibration, &config.speed),
            kinematics: utils::ak::new(),
            wheels: io.wheels,
            manual: io.manual,
            mode: InputMode::default(),
            base_speed: config.base_speed,
            last_vector: None,
        }
    }

    /// Run one control cycle.
    pub fn tick(&mut self) -> Result<(), DriveError> {
        match self.mode {
            InputMode::Automatic => {
                let motion = self.lines.read_motion()?;
                if motion == Motion::Stop {
                    // Keep the accumulator from carrying idle pulses into the next move.
                    self.estimator.reset()?;
                } else {
                    let scalar = self.estimator.sample()?;
                    if let Some(vector) = motion.vector(self.base_speed * scalar) {
                        tracing::debug!(?motion, scalar, "automatic drive");
                        self.drive(vector)?;
                    }
                }

                let shoot = self.lines.read_shoot()?;
                write_line(&mut self.indicator, LineId::Indicator, shoot)?;
            }
            InputMode::Manual => {
                let vector = self.manual.read_vector().map_err(|e| {
                    tracing::error!("Manual input read failed: {:?}", e);
                    DriveError::Manual
                })?;
                self.drive(DriveVector::new(vector.forward, vector.rotate))?;
            }
        }
        Ok(())
    }

    /// Map `vector` through the arcade kinematics and write the wheels.
    pub fn drive(
        &mut self,
        vector: DriveVector,
    ) -> Result<(), DriveError> {
        let outputs = self.kinematics.compute_wheel_outputs(vector);
        self.wheels.apply(outputs).map_err(|e| {
            tracing::error!(?outputs, "Wheel write failed: {:?}", e);
            DriveError::Wheels
        })?;
        self.last_vector = Some(vector);
        Ok(())
    }

    /// Explicit zero command followed by a pulse accumulator reset.
    ///
    /// The reset is attempted even if the wheel write fails; the first error wins.
    pub fn stop(&mut self) -> Result<(), DriveError> {
        let stopped = self.drive(DriveVector::STOP);
        let reset = self.estimator.reset();
        stopped.and(reset)
    }

    pub fn base_speed(&self) -> f32 {
        self.base_speed
    }

    /// Last vector written to the wheels, if any.
    pub fn last_vector(&self) -> Option<DriveVector> {
        self.last_vector
    }

    pub fn wheels(&self) -> &W {
        &self.wheels
    }

    pub fn pulses(&self) -> &P {
        self.estimator.source()
    }
}

impl<IN, OUT, P, W, J, C> ModeTarget for DriveArbitrator<IN, OUT, P, W, J, C>
where
    IN: InputPin,
    OUT: OutputPin,
    P: PulseSource,
    W: WheelSink,
    J: ManualInput,
    C: Calibration,
{
    fn mode(&self) -> InputMode {
        self.mode
    }

    fn set_mode(
        &mut self,
        mode: InputMode,
    ) -> Result<(), DriveError> {
        self.mode = mode;
        write_line(&mut self.enable, LineId::Enable, mode.is_automatic())
    }
}

impl<IN, OUT, P, W, J, C> DriveBehavior for DriveArbitrator<IN, OUT, P, W, J, C>
where
    IN: InputPin,
    OUT: OutputPin,
    P: PulseSource,
    W: WheelSink,
    J: ManualInput,
    C: Calibration,
{
    fn tick(&mut self) -> Result<(), DriveError> {
        DriveArbitrator::tick(self)
    }

    fn on_suspend(&mut self) -> Result<(), DriveError> {
        tracing::info!(mode = ?self.mode, "drive suspended, stopping base");
        self.stop()
    }

    fn on_terminate(&mut self) -> Result<(), DriveError> {
        tracing::info!(mode = ?self.mode, "drive terminated, stopping base");
        self.stop()
    }
}
