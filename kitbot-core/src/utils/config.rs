//! Tunable drive constants and the physical wiring of every logical line.
//!
//! Nothing in the control logic refers to a pin number or PWM channel
//! directly; the board binding lives here and is injected at construction.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

/// Bounds and calibration of the pulse-driven speed scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Creep speed the scalar never drops below.
    pub min_fraction: f32,
    /// Full-scale scalar.
    pub max_fraction: f32,
    /// Pulses per control cycle the co-processor emits at full speed.
    pub max_pulses_per_cycle: f32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            min_fraction: 0.35,
            max_fraction: 1.0,
            max_pulses_per_cycle: 100.0,
        }
    }
}

/// Digital I/O numbers of the lines shared with the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineMap {
    #[serde(rename = "move")]
    pub move_line: u8,
    pub turn: u8,
    pub direction: u8,
    pub shoot: u8,
    /// Pulse input feeding the speed counter.
    pub counter: u8,
    /// Output telling the co-processor it owns the base.
    pub enable: u8,
    /// Output mirroring the shoot line, e.g. a flashlight.
    pub indicator: u8,
}

impl Default for LineMap {
    fn default() -> Self {
        Self {
            move_line: 0,
            turn: 1,
            direction: 2,
            shoot: 3,
            counter: 4,
            enable: 5,
            indicator: 6,
        }
    }
}

/// PCA9685 `(phase, enable)` channel pair for each wheel's H-bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelChannels {
    /// 7-bit I2C address of the PWM expander.
    pub address: u8,
    pub front_left: (u8, u8),
    pub front_right: (u8, u8),
    pub back_left: (u8, u8),
    pub back_right: (u8, u8),
}

impl Default for WheelChannels {
    fn default() -> Self {
        Self {
            address: 0x55,
            front_left: (0, 1),
            front_right: (2, 3),
            back_left: (4, 5),
            back_right: (6, 7),
        }
    }
}

impl WheelChannels {
    /// Channel pairs ordered front-left, front-right, back-left, back-right.
    pub fn as_array(&self) -> [(u8, u8); 4] {
        [
            self.front_left,
            self.front_right,
            self.back_left,
            self.back_right,
        ]
    }
}

/// Complete configuration of the drive base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Automatic-mode magnitude before speed scaling.
    pub base_speed: f32,
    /// Control-loop period in milliseconds.
    pub cycle_period_ms: u64,
    pub speed: SpeedConfig,
    pub lines: LineMap,
    pub wheels: WheelChannels,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            base_speed: 0.85,
            cycle_period_ms: 20,
            speed: SpeedConfig::default(),
            lines: LineMap::default(),
            wheels: WheelChannels::default(),
        }
    }
}

impl DriveConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    /// Normalize inconsistent values, logging each correction.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if !self.base_speed.is_finite() {
            tracing::warn!(base_speed = ?self.base_speed, "base speed not finite, using default");
            self.base_speed = defaults.base_speed;
        } else if !(0.0..=1.0).contains(&self.base_speed) {
            tracing::warn!(base_speed = ?self.base_speed, "base speed outside [0, 1], clamping");
            self.base_speed = self.base_speed.clamp(0.0, 1.0);
        }

        let speed = &mut self.speed;
        if !speed.min_fraction.is_finite() || !speed.max_fraction.is_finite() {
            tracing::warn!(?speed, "speed fractions not finite, using defaults");
            speed.min_fraction = defaults.speed.min_fraction;
            speed.max_fraction = defaults.speed.max_fraction;
        }
        if speed.min_fraction > speed.max_fraction {
            tracing::warn!(?speed, "min fraction above max fraction, swapping");
            core::mem::swap(&mut speed.min_fraction, &mut speed.max_fraction);
        }
        if !(speed.max_pulses_per_cycle.is_finite() && speed.max_pulses_per_cycle > 0.0) {
            tracing::warn!(?speed, "max pulses per cycle must be positive, using default");
            speed.max_pulses_per_cycle = defaults.speed.max_pulses_per_cycle;
        }

        if self.cycle_period_ms == 0 {
            tracing::warn!("zero cycle period, using default");
            self.cycle_period_ms = defaults.cycle_period_ms;
        }

        self
    }
}
