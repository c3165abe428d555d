//! Hardware driver seam.
//!
//! The control core never talks to pins directly; it drives these traits.
//! `pi` implements them for the robot's Raspberry Pi hardware, `mock`
//! provides inspectable stand-ins for development and tests.

pub mod mock;
pub mod pi;

use std::time::Duration;
use thiserror::Error;

use crate::core::leds::FrameBuffer;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("gpio error: {0}")]
    Gpio(String),

    #[error("i2c error: {0}")]
    I2c(String),

    #[error("sensor timed out after {0:?}")]
    Timeout(Duration),

    #[error("driver unavailable: {0}")]
    Unavailable(String),
}

/// Wheel output. `drive` is called once per motion tick with speeds in
/// `[-1.0, 1.0]`; implementations are expected not to block.
pub trait MotionDriver: Send {
    fn drive(&mut self, left: f32, right: f32) -> Result<(), DriverError>;
}

/// Underlighting output. `render` is called once per LED tick.
pub trait LedDriver: Send {
    fn render(&mut self, frame: &FrameBuffer) -> Result<(), DriverError>;
}

/// Proximity input. Returns the measured distance in meters.
pub trait DistanceSensor: Send {
    fn read_distance(&mut self) -> Result<f32, DriverError>;
}
