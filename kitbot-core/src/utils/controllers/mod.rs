//! Module Exports
//!
//! - `arbitrator`: per-cycle choice between co-processor lines and joystick
//! - `mode`: input mode and the one-shot mode switch
//! - `motors`: wheel sink seam and the PCA9685 H-bridge backend
//! - `speed`: pulse-driven speed scalar estimation
//!
//! `DriveController` is the cooperative scheduler: it owns the drive
//! behavior, applies external commands between cycles and ticks it at the
//! control-loop rate.

pub mod arbitrator;
pub mod mode;
pub mod motors;
pub mod speed;

use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel};
use embassy_time::{Duration, Ticker};
use embedded_hal::digital::ErrorKind;

pub use arbitrator::{CommandLines, DriveArbitrator, DriveIo, LineId, ManualInput, Motion};
pub use mode::{InputMode, ModeSwitch, ModeTarget};
pub use motors::{Pca9685Wheels, WheelSink};
pub use speed::{CountSource, PulseCounter, PulseRate, RateSource, SpeedScalarEstimator};

use crate::utils::connection::commands::DriveCommand;

/// Which collaborator failed during a drive operation.
///
/// The collaborator's own error is logged where it is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveError {
    /// Reading or writing a digital line failed.
    Line(LineId, ErrorKind),
    /// The pulse source could not be read or reset.
    Pulse,
    /// The wheel sink rejected an output.
    Wheels,
    /// The joystick could not be read.
    Manual,
}

/// A periodic drive behavior with suspension and termination hooks.
pub trait DriveBehavior: ModeTarget {
    /// One control cycle.
    fn tick(&mut self) -> Result<(), DriveError>;

    /// Control is taken away by another action; must leave the base stopped.
    fn on_suspend(&mut self) -> Result<(), DriveError>;

    /// The behavior ends; must leave the base stopped.
    fn on_terminate(&mut self) -> Result<(), DriveError>;
}

/// Cooperative scheduler owning the single drive behavior.
pub struct DriveController<B> {
    behavior: B,
    active: bool,
    cycles: u64,
}

impl<B: DriveBehavior> DriveController<B> {
    pub fn new(behavior: B) -> Self {
        DriveController {
            behavior,
            active: true,
            cycles: 0,
        }
    }

    /// Apply an external command synchronously, before the next tick.
    pub fn execute(
        &mut self,
        command: DriveCommand,
    ) -> Result<(), DriveError> {
        match command {
            DriveCommand::Mode { auto } => {
                // Switching modes interrupts the running behavior. The mode
                // is applied even if the stop fails; the first error wins.
                let suspended = if self.active {
                    self.behavior.on_suspend()
                } else {
                    Ok(())
                };
                let switched = ModeSwitch::enable_automatic(auto).run(&mut self.behavior);
                suspended.and(switched)?;
            }
            DriveCommand::Halt => {
                if self.active {
                    self.active = false;
                    self.behavior.on_terminate()?;
                }
            }
            DriveCommand::Resume => {
                if !self.active {
                    tracing::info!("drive resumed");
                    self.active = true;
                }
            }
        }
        Ok(())
    }

    /// Drain pending commands, then run one cycle if active.
    ///
    /// Failures are logged; the next cycle starts from scratch.
    pub fn step<M: RawMutex, const N: usize>(
        &mut self,
        commands: &Channel<M, DriveCommand, N>,
    ) {
        while let Ok(command) = commands.try_receive() {
            tracing::info!(?command, "Received drive command");
            if let Err(e) = self.execute(command) {
                tracing::error!(?command, "Drive command failed: {:?}", e);
            }
        }

        if self.active {
            if let Err(e) = self.behavior.tick() {
                tracing::error!(cycle = self.cycles, "Drive cycle failed: {:?}", e);
            }
            self.cycles += 1;
        }
    }

    /// Run the control loop at a fixed `period`.
    pub async fn run<M: RawMutex, const N: usize>(
        &mut self,
        commands: &Channel<M, DriveCommand, N>,
        period: Duration,
    ) -> ! {
        let mut ticker = Ticker::every(period);
        loop {
            self.step(commands);
            ticker.next().await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Cycles ticked so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }
}
