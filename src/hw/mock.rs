//! Mock drivers for development without the robot and for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{DistanceSensor, DriverError, LedDriver, MotionDriver};
use crate::core::leds::{FrameBuffer, NUM_UNDERLIGHTS};
use crate::core::Rgb;

/// Records the last commanded wheel speeds behind a shared handle.
pub struct MockMotionDriver {
    speeds: Arc<Mutex<(f32, f32)>>,
}

impl MockMotionDriver {
    /// Returns the driver and a handle to observe what it was last told.
    pub fn new() -> (Self, Arc<Mutex<(f32, f32)>>) {
        let speeds = Arc::new(Mutex::new((0.0, 0.0)));
        (
            Self {
                speeds: Arc::clone(&speeds),
            },
            speeds,
        )
    }
}

impl MotionDriver for MockMotionDriver {
    fn drive(&mut self, left: f32, right: f32) -> Result<(), DriverError> {
        debug!("Mock motors: left {:.2}, right {:.2}", left, right);
        *self
            .speeds
            .lock()
            .map_err(|e| DriverError::Unavailable(e.to_string()))? = (left, right);
        Ok(())
    }
}

/// Records the last rendered frame behind a shared handle.
pub struct MockLedDriver {
    frame: Arc<Mutex<FrameBuffer>>,
}

impl MockLedDriver {
    pub fn new() -> (Self, Arc<Mutex<FrameBuffer>>) {
        let frame = Arc::new(Mutex::new([Rgb::default(); NUM_UNDERLIGHTS]));
        (
            Self {
                frame: Arc::clone(&frame),
            },
            frame,
        )
    }
}

impl LedDriver for MockLedDriver {
    fn render(&mut self, frame: &FrameBuffer) -> Result<(), DriverError> {
        *self
            .frame
            .lock()
            .map_err(|e| DriverError::Unavailable(e.to_string()))? = *frame;
        Ok(())
    }
}

/// Always reports the same distance. Used when running in mock mode.
pub struct FixedDistanceSensor {
    meters: f32,
}

impl FixedDistanceSensor {
    pub fn new(meters: f32) -> Self {
        Self { meters }
    }
}

impl DistanceSensor for FixedDistanceSensor {
    fn read_distance(&mut self) -> Result<f32, DriverError> {
        Ok(self.meters)
    }
}

/// Plays back a scripted sequence of readings, then repeats the last one.
/// Test-only convenience for exercising band transitions and failures.
pub struct ScriptedDistanceSensor {
    script: VecDeque<Result<f32, DriverError>>,
    last: Result<f32, DriverError>,
}

impl ScriptedDistanceSensor {
    pub fn new(script: Vec<Result<f32, DriverError>>) -> Self {
        Self {
            script: script.into(),
            last: Ok(4.0),
        }
    }
}

impl DistanceSensor for ScriptedDistanceSensor {
    fn read_distance(&mut self) -> Result<f32, DriverError> {
        if let Some(next) = self.script.pop_front() {
            self.last = clone_reading(&next);
            return next;
        }
        clone_reading(&self.last)
    }
}

fn clone_reading(reading: &Result<f32, DriverError>) -> Result<f32, DriverError> {
    match reading {
        Ok(m) => Ok(*m),
        Err(e) => Err(DriverError::Unavailable(e.to_string())),
    }
}
