//! Speed scalar estimation from the co-processor's pulse train.
//!
//! The co-processor encodes the desired automatic speed as a pulse density on
//! a single line. Each control cycle the accumulated pulses are converted into
//! a multiplier, clamped into `[min_fraction, max_fraction]`, and the
//! accumulator is cleared so the next sample only sees new pulses.
//!
//! Two hardware entry points exist: a counter (`PulseCounter`) and a
//! frequency meter (`PulseRate`). Both are normalized to pulses per control
//! cycle by `CountSource` and `RateSource`, and the `Calibration` that turns
//! that figure into a raw fraction is swappable.

use core::fmt::Debug;

use crate::utils::{config::SpeedConfig, controllers::DriveError};

/// Edge counter on the pulse line.
pub trait PulseCounter {
    type Error: Debug;

    /// Pulses seen since the last reset.
    fn count(&mut self) -> Result<u32, Self::Error>;

    fn reset(&mut self) -> Result<(), Self::Error>;
}

/// Frequency measurement on the pulse line.
pub trait PulseRate {
    type Error: Debug;

    /// Pulse frequency (Hz) observed since the last reset.
    fn rate_hz(&mut self) -> Result<f32, Self::Error>;

    fn reset(&mut self) -> Result<(), Self::Error>;
}

/// Common entry point the estimator samples.
pub trait PulseSource {
    type Error: Debug;

    fn pulses_per_cycle(&mut self) -> Result<f32, Self::Error>;

    fn reset(&mut self) -> Result<(), Self::Error>;
}

/// Count-based pulse source. One read covers exactly one cycle.
#[derive(Debug)]
pub struct CountSource<C>(pub C);

impl<C: PulseCounter> PulseSource for CountSource<C> {
    type Error = C::Error;

    fn pulses_per_cycle(&mut self) -> Result<f32, Self::Error> {
        self.0.count().map(|n| n as f32)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.0.reset()
    }
}

/// Rate-based pulse source, scaled by the control-loop period.
#[derive(Debug)]
pub struct RateSource<R> {
    pub rate: R,
    cycle_period_s: f32,
}

impl<R> RateSource<R> {
    pub fn new(
        rate: R,
        cycle_period_ms: u64,
    ) -> Self {
        Self {
            rate,
            cycle_period_s: cycle_period_ms as f32 / 1000.0,
        }
    }
}

impl<R: PulseRate> PulseSource for RateSource<R> {
    type Error = R::Error;

    fn pulses_per_cycle(&mut self) -> Result<f32, Self::Error> {
        self.rate.rate_hz().map(|hz| hz * self.cycle_period_s)
    }

    fn reset(&mut self) -> Result<(), Self::Error> {
        self.rate.reset()
    }
}

/// Linear transform from pulses per cycle to an unclamped speed fraction.
pub trait Calibration {
    fn raw_fraction(
        &self,
        pulses_per_cycle: f32,
    ) -> f32;
}

/// Interpolates `min_fraction..=max_fraction` across `0..=max_pulses_per_cycle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpanCalibration {
    min_fraction: f32,
    max_fraction: f32,
    max_pulses_per_cycle: f32,
}

impl SpanCalibration {
    pub fn new(config: &SpeedConfig) -> Self {
        Self {
            min_fraction: config.min_fraction,
            max_fraction: config.max_fraction,
            max_pulses_per_cycle: config.max_pulses_per_cycle,
        }
    }
}

impl Calibration for SpanCalibration {
    fn raw_fraction(
        &self,
        pulses_per_cycle: f32,
    ) -> f32 {
        // Exact at both endpoints.
        let t = pulses_per_cycle / self.max_pulses_per_cycle;
        self.min_fraction * (1.0 - t) + self.max_fraction * t
    }
}

/// `pulses / max_pulses_per_cycle + min_fraction`, saturating before the
/// pulse maximum whenever the fraction range is narrower than one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetCalibration {
    offset: f32,
    max_pulses_per_cycle: f32,
}

impl OffsetCalibration {
    pub fn new(config: &SpeedConfig) -> Self {
        Self {
            offset: config.min_fraction,
            max_pulses_per_cycle: config.max_pulses_per_cycle,
        }
    }
}

impl Calibration for OffsetCalibration {
    fn raw_fraction(
        &self,
        pulses_per_cycle: f32,
    ) -> f32 {
        pulses_per_cycle / self.max_pulses_per_cycle + self.offset
    }
}

/// Converts the pulse measurement into a bounded speed multiplier.
pub struct SpeedScalarEstimator<P, C = SpanCalibration> {
    source: P,
    calibration: C,
    min_fraction: f32,
    max_fraction: f32,
}

impl<P: PulseSource> SpeedScalarEstimator<P, SpanCalibration> {
    pub fn new(
        source: P,
        config: &SpeedConfig,
    ) -> Self {
        Self::with_calibration(source, SpanCalibration::new(config), config)
    }
}

impl<P, C> SpeedScalarEstimator<P, C>
where
    P: PulseSource,
    C: Calibration,
{
    pub fn with_calibration(
        source: P,
        calibration: C,
        config: &SpeedConfig,
    ) -> Self {
        // Inverted bounds are reordered; NaN bounds are ignored by min/max.
        let (lo, hi) = (config.min_fraction, config.max_fraction);
        Self {
            source,
            calibration,
            min_fraction: lo.min(hi),
            max_fraction: lo.max(hi),
        }
    }

    /// Read and consume the accumulated pulses, returning the clamped scalar.
    ///
    /// Call at most once per control cycle; a second call in the same cycle
    /// sees an empty accumulator and returns `min_fraction`.
    pub fn sample(&mut self) -> Result<f32, DriveError> {
        let pulses = self.source.pulses_per_cycle().map_err(|e| {
            tracing::error!("Pulse source read failed: {:?}", e);
            DriveError::Pulse
        })?;
        self.reset()?;

        let scalar = self.clamp(self.calibration.raw_fraction(pulses));
        tracing::debug!(pulses, scalar, "speed scalar sampled");
        Ok(scalar)
    }

    /// Discard pulses without producing a scalar.
    pub fn reset(&mut self) -> Result<(), DriveError> {
        self.source.reset().map_err(|e| {
            tracing::error!("Pulse source reset failed: {:?}", e);
            DriveError::Pulse
        })
    }

    fn clamp(
        &self,
        raw: f32,
    ) -> f32 {
        if raw.is_nan() {
            self.min_fraction
        } else {
            raw.max(self.min_fraction).min(self.max_fraction)
        }
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.min_fraction, self.max_fraction)
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut P {
        &mut self.source
    }
}
