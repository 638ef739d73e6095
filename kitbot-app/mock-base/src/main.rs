use clap::Parser;
use core::convert::Infallible;
use embassy_executor::{Executor, Spawner};
use embassy_sync::{blocking_mutex::raw::NoopRawMutex, channel::Channel};
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use kitbot_core::utils::config::DriveConfig;
use kitbot_core::utils::controllers::{
    CommandLines, CountSource, DriveArbitrator, DriveIo, ManualInput, Motion, PulseCounter,
    WheelSink,
};
use kitbot_core::utils::math::kinematics::{DriveVector, WheelOutputs};
use kitbot_core::utils::{ak, decode_command, DriveCommand, DriveController};
use static_cell::StaticCell;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{error, info};

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// JSON drive configuration; defaults are used when omitted
    #[clap(long)]
    config: Option<PathBuf>,
    /// override the automatic-mode base speed
    #[clap(long)]
    base_speed: Option<f32>,
    /// control cycles to run before halting (0 runs forever)
    #[clap(long, default_value_t = 500)]
    cycles: u64,
    /// hand the base to the co-processor at startup
    #[clap(long)]
    auto: bool,
}

type CommandChannel = Channel<NoopRawMutex, DriveCommand, 8>;

/// Input line driven by the simulated co-processor.
#[derive(Clone, Default)]
struct SimLine(Arc<AtomicBool>);

impl ErrorType for SimLine {
    type Error = Infallible;
}

impl InputPin for SimLine {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.load(Ordering::Relaxed))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.0.load(Ordering::Relaxed))
    }
}

/// Output line that logs transitions.
struct SimOutput {
    name: &'static str,
    state: bool,
}

impl SimOutput {
    fn new(name: &'static str) -> Self {
        Self { name, state: false }
    }

    fn drive(
        &mut self,
        high: bool,
    ) {
        if self.state != high {
            info!(line = self.name, high, "output changed");
        }
        self.state = high;
    }
}

impl ErrorType for SimOutput {
    type Error = Infallible;
}

impl OutputPin for SimOutput {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

/// Pulse counter fed by the simulated co-processor.
struct SimCounter(Arc<AtomicU32>);

impl PulseCounter for SimCounter {
    type Error = Infallible;

    fn count(&mut self) -> Result<u32, Infallible> {
        Ok(self.0.load(Ordering::Relaxed))
    }

    fn reset(&mut self) -> Result<(), Infallible> {
        self.0.store(0, Ordering::Relaxed);
        Ok(())
    }
}

/// Wheel sink that logs each command as the body motion it produces.
struct LogWheels;

impl WheelSink for LogWheels {
    type Error = Infallible;

    fn apply(
        &mut self,
        outputs: WheelOutputs,
    ) -> Result<(), Infallible> {
        let body = ak::new().compute_drive_vector(outputs);
        info!(
            left = outputs.left(),
            right = outputs.right(),
            forward = body.forward,
            rotate = body.rotate,
            "wheels"
        );
        Ok(())
    }
}

/// Joystick slowly sweeping through forward and rotate.
struct SweepStick {
    phase: f32,
}

impl ManualInput for SweepStick {
    type Error = Infallible;

    fn read_vector(&mut self) -> Result<DriveVector, Infallible> {
        self.phase += 0.05;
        Ok(DriveVector::new(
            0.6 * self.phase.sin(),
            0.3 * (self.phase * 0.5).cos(),
        ))
    }
}

/// Co-processor side of the lines: cycles through each motion code.
struct AuxSim {
    move_line: SimLine,
    turn: SimLine,
    direction: SimLine,
    shoot: SimLine,
    pulses: Arc<AtomicU32>,
}

impl AuxSim {
    const SCRIPT: [Motion; 5] = [
        Motion::Forward,
        Motion::TurnClockwise,
        Motion::Stop,
        Motion::Backward,
        Motion::TurnCounterClockwise,
    ];

    fn present(
        &self,
        motion: Motion,
        step: u32,
    ) {
        let (m, t, d) = match motion {
            Motion::Stop => (false, false, false),
            Motion::Forward => (true, false, true),
            Motion::Backward => (true, false, false),
            Motion::TurnClockwise => (true, true, true),
            Motion::TurnCounterClockwise => (true, true, false),
        };
        self.move_line.0.store(m, Ordering::Relaxed);
        self.turn.0.store(t, Ordering::Relaxed);
        self.direction.0.store(d, Ordering::Relaxed);
        self.shoot.0.store(step % 3 == 0, Ordering::Relaxed);
    }
}

type SimArbitrator =
    DriveArbitrator<SimLine, SimOutput, CountSource<SimCounter>, LogWheels, SweepStick>;

#[embassy_executor::task]
async fn drive_task(
    mut ctrl: DriveController<SimArbitrator>,
    commands: &'static CommandChannel,
    period: Duration,
) -> ! {
    ctrl.run(commands, period).await
}

#[embassy_executor::task]
async fn aux_task(
    aux: AuxSim,
    period: Duration,
) -> ! {
    // Each motion is held for 50 cycles, pulses ramp within it.
    let mut ticker = Ticker::every(period);
    let mut cycle: u32 = 0;
    loop {
        let step = cycle / 50;
        aux.present(AuxSim::SCRIPT[step as usize % AuxSim::SCRIPT.len()], step);
        aux.pulses.fetch_add((cycle % 50) * 2, Ordering::Relaxed);
        cycle = cycle.wrapping_add(1);
        ticker.next().await;
    }
}

fn send(
    commands: &CommandChannel,
    json: &[u8],
) {
    if let Some(cmd) = decode_command(json) {
        if commands.try_send(cmd).is_err() {
            error!(?cmd, "command channel full");
        }
    }
}

#[embassy_executor::task]
async fn operator_task(
    commands: &'static CommandChannel,
    auto: bool,
    cycles: u64,
    period: Duration,
) {
    if auto {
        send(commands, br#"{"dc":"mode","auto":true}"#);
    }
    if cycles == 0 {
        return;
    }

    let half = cycles as u32 / 2;
    Timer::after(period * half).await;
    info!("operator toggling input mode");
    let toggle: &[u8] = if auto {
        br#"{"dc":"mode","auto":false}"#
    } else {
        br#"{"dc":"mode","auto":true}"#
    };
    send(commands, toggle);

    Timer::after(period * (cycles as u32 - half)).await;
    send(commands, br#"{"dc":"halt"}"#);
    Timer::after(period * 2).await;
    info!("simulation finished");
    std::process::exit(0);
}

fn load_config(opts: &Opts) -> Result<DriveConfig, String> {
    let mut config = match &opts.config {
        Some(path) => {
            let raw = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
            serde_json::from_slice::<DriveConfig>(&raw)
                .map_err(|e| format!("{}: {}", path.display(), e))?
        }
        None => DriveConfig::default(),
    };
    if let Some(speed) = opts.base_speed {
        config.base_speed = speed;
    }
    Ok(config.validated())
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
) {
    let config = match load_config(&opts) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(?config, "drive configuration");

    let lines = CommandLines {
        move_line: SimLine::default(),
        turn: SimLine::default(),
        direction: SimLine::default(),
        shoot: SimLine::default(),
    };
    let pulses = Arc::new(AtomicU32::new(0));
    let aux = AuxSim {
        move_line: lines.move_line.clone(),
        turn: lines.turn.clone(),
        direction: lines.direction.clone(),
        shoot: lines.shoot.clone(),
        pulses: pulses.clone(),
    };

    let arbitrator = DriveArbitrator::new(
        &config,
        DriveIo {
            lines,
            enable: SimOutput::new("enable"),
            indicator: SimOutput::new("indicator"),
            pulses: CountSource(SimCounter(pulses)),
            wheels: LogWheels,
            manual: SweepStick { phase: 0.0 },
        },
    );

    static COMMANDS: StaticCell<CommandChannel> = StaticCell::new();
    let commands: &'static CommandChannel = COMMANDS.init(Channel::new());

    let period = config.cycle_period();
    spawner.spawn(aux_task(aux, period)).unwrap();
    spawner
        .spawn(drive_task(DriveController::new(arbitrator), commands, period))
        .unwrap();
    spawner
        .spawn(operator_task(commands, opts.auto, opts.cycles, period))
        .unwrap();
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();
    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts)).unwrap();
    });
}
