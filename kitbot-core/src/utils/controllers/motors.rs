//! Wheel actuation.
//!
//! `WheelSink` is the seam the arbitrator writes through. `Pca9685Wheels`
//! is the on-robot backend: four DC-motor H-bridges driven by a PCA9685 PWM
//! expander on a shared I2C bus, one `(phase, enable)` channel pair per wheel.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use pwm_pca9685::{Address as PwmAddress, Channel, Error as PwmError, Pca9685};

use crate::utils::{config::WheelChannels, math::kinematics::WheelOutputs};

/// Full-scale PCA9685 duty count.
const MAX_DUTY: u16 = 4095;

/// Prescaler for a ~60 Hz PWM frame.
const PWM_PRESCALE: u8 = 100;

/// Receiver of per-cycle wheel outputs.
pub trait WheelSink {
    type Error: core::fmt::Debug;

    fn apply(
        &mut self,
        outputs: WheelOutputs,
    ) -> Result<(), Self::Error>;
}

/// Errors raised by the PCA9685 wheel backend.
#[derive(Debug)]
pub enum MotorError<E: core::fmt::Debug> {
    PwmError(PwmError<E>),
    /// A configured channel index is not in `0..16`.
    InvalidChannel(u8),
}

fn channel(index: u8) -> Option<Channel> {
    Some(match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    })
}

/// PCA9685-backed H-bridge driver for the four wheels.
pub struct Pca9685Wheels<'a, I2C: 'static> {
    pub pwm: Pca9685<RefCellDevice<'a, I2C>>,
    channels: [(Channel, Channel); 4],
}

impl<'a, I2C, E> Pca9685Wheels<'a, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: core::fmt::Debug,
{
    /// Bind the expander at the configured address. No bus traffic is issued.
    pub fn new(
        i2c_bus: &'a RefCell<I2C>,
        wheels: &WheelChannels,
    ) -> Result<Self, MotorError<E>> {
        let mut channels = [(Channel::C0, Channel::C0); 4];
        for (slot, &(phase, enable)) in channels.iter_mut().zip(wheels.as_array().iter()) {
            *slot = (
                channel(phase).ok_or(MotorError::InvalidChannel(phase))?,
                channel(enable).ok_or(MotorError::InvalidChannel(enable))?,
            );
        }

        let pwm = Pca9685::new(RefCellDevice::new(i2c_bus), PwmAddress::from(wheels.address))
            .map_err(MotorError::PwmError)?;

        Ok(Self { pwm, channels })
    }

    /// Enable the PWM outputs and set the frame rate.
    pub fn configure(&mut self) -> Result<(), MotorError<E>> {
        self.pwm.enable().map_err(MotorError::PwmError)?;
        tracing::info!("PWM enabled");
        self.pwm
            .set_prescale(PWM_PRESCALE)
            .map_err(MotorError::PwmError)?;
        tracing::info!("PWM prescale set to 60Hz");
        Ok(())
    }

    /// Drive each wheel: phase channel selects direction, enable channel
    /// carries `|speed| * MAX_DUTY`.
    pub fn apply_wheel_speeds(
        &mut self,
        wheel_speeds: [f32; 4],
    ) -> Result<(), MotorError<E>> {
        for (i, &(phase_channel, enable_channel)) in self.channels.iter().enumerate() {
            let speed = libm::fminf(libm::fabsf(wheel_speeds[i]), 1.0);
            let forward = wheel_speeds[i] >= 0.0;
            let duty = libm::roundf(speed * MAX_DUTY as f32) as u16;

            self.pwm
                .set_channel_on_off(phase_channel, 0, if forward { 0 } else { MAX_DUTY })
                .map_err(MotorError::PwmError)?;
            self.pwm
                .set_channel_on_off(enable_channel, 0, duty)
                .map_err(MotorError::PwmError)?;
        }
        Ok(())
    }
}

impl<I2C, E> WheelSink for Pca9685Wheels<'_, I2C>
where
    I2C: I2c<Error = E> + 'static,
    E: core::fmt::Debug,
{
    type Error = MotorError<E>;

    fn apply(
        &mut self,
        outputs: WheelOutputs,
    ) -> Result<(), Self::Error> {
        self.apply_wheel_speeds(outputs.as_array())
    }
}
