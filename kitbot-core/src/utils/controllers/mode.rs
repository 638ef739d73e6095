//! Input-source selection.
//!
//! `ModeSwitch` is the one-shot action that hands the base to the
//! co-processor or back to the joystick. It is not part of the periodic loop.

use serde::{Deserialize, Serialize};

use crate::utils::controllers::DriveError;

/// Which input source governs the drive base.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Discrete command lines from the co-processor.
    Automatic,
    /// Analog joystick pass-through.
    #[default]
    Manual,
}

impl InputMode {
    pub fn from_auto(auto: bool) -> Self {
        if auto {
            InputMode::Automatic
        } else {
            InputMode::Manual
        }
    }

    pub fn is_automatic(self) -> bool {
        self == InputMode::Automatic
    }
}

/// Anything whose input mode can be switched.
pub trait ModeTarget {
    fn mode(&self) -> InputMode;

    /// Apply `mode` immediately and mirror it on the enable output.
    fn set_mode(
        &mut self,
        mode: InputMode,
    ) -> Result<(), DriveError>;
}

/// One-shot action selecting the input mode.
///
/// Running it twice has the same effect as running it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSwitch {
    mode: InputMode,
}

impl ModeSwitch {
    pub fn new(mode: InputMode) -> Self {
        Self { mode }
    }

    /// `true` hands the base to the co-processor, `false` to the joystick.
    pub fn enable_automatic(enable: bool) -> Self {
        Self::new(InputMode::from_auto(enable))
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn run<T: ModeTarget>(
        &self,
        target: &mut T,
    ) -> Result<(), DriveError> {
        let previous = target.mode();
        target.set_mode(self.mode)?;
        if previous != self.mode {
            tracing::info!(from = ?previous, to = ?self.mode, "input mode switched");
        }
        Ok(())
    }
}
