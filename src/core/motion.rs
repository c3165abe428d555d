//! Motion executor: held directions in, ramped wheel speeds out.
//!
//! Owns the target and actual wheel speeds. Input adapters never touch
//! speeds directly; the control manager calls `set_target`/`clear_target`
//! and the engine's motion tick calls `tick`, which is the sole path by
//! which speed changes reach the hardware driver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::action::{Band, Direction};
use super::error::ControlError;

/// How held directions are mixed into wheel targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SteeringMode {
    /// Pivot turns at full differential.
    Tank,
    /// Blended forward/turn mix with reduced turning sensitivity.
    Arcade,
}

/// Configuration values consumed by the motion executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Scale applied to the normalized wheel mix, in `(0.0, 1.0]`.
    pub max_speed: f32,
    /// Maximum change of each actual wheel speed per tick.
    pub ramp_step: f32,
    /// Analog magnitudes below this are treated as zero.
    pub deadzone: f32,
    pub steering: SteeringMode,
    /// Turn authority in arcade mode.
    pub turn_gain: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            max_speed: 0.8,
            ramp_step: 0.08,
            deadzone: 0.15,
            steering: SteeringMode::Arcade,
            turn_gain: 0.7,
        }
    }
}

impl MotionSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        if !(0.0..=1.0).contains(&self.max_speed) || self.max_speed == 0.0 {
            return Err(ControlError::ConfigError(format!(
                "max_speed must be in (0.0, 1.0], got {}",
                self.max_speed
            )));
        }
        if !(self.ramp_step > 0.0 && self.ramp_step <= 2.0) {
            return Err(ControlError::ConfigError(format!(
                "ramp_step must be in (0.0, 2.0], got {}",
                self.ramp_step
            )));
        }
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(ControlError::ConfigError(format!(
                "deadzone must be in [0.0, 1.0), got {}",
                self.deadzone
            )));
        }
        Ok(())
    }
}

/// Owns target and actual wheel speeds, all in `[-1.0, 1.0]`.
#[derive(Debug)]
pub struct MotionExecutor {
    settings: MotionSettings,
    held: HashMap<Direction, f32>,
    target_left: f32,
    target_right: f32,
    actual_left: f32,
    actual_right: f32,
}

impl MotionExecutor {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            held: HashMap::new(),
            target_left: 0.0,
            target_right: 0.0,
            actual_left: 0.0,
            actual_right: 0.0,
        }
    }

    /// Registers a held direction and recomputes the wheel targets.
    ///
    /// `magnitude` is an optional analog value in `[0.0, 1.0]`; digital
    /// inputs pass `None` and get full scale. Values inside the deadzone
    /// release the direction instead.
    pub fn set_target(
        &mut self,
        direction: Direction,
        magnitude: Option<f32>,
    ) -> Result<(), ControlError> {
        let magnitude = magnitude.unwrap_or(1.0);
        if !magnitude.is_finite() || !(0.0..=1.0).contains(&magnitude) {
            return Err(ControlError::InvalidAction(format!(
                "magnitude {} for {} is outside [0.0, 1.0]",
                magnitude, direction
            )));
        }

        if magnitude < self.settings.deadzone {
            self.held.remove(&direction);
        } else {
            self.held.insert(direction, magnitude);
        }
        self.recompute_targets();
        debug!(
            "Motion target set: {} at {:.2} -> targets ({:.2}, {:.2})",
            direction, magnitude, self.target_left, self.target_right
        );
        Ok(())
    }

    /// Releases one held direction, or all of them when `None`.
    pub fn clear_target(&mut self, direction: Option<Direction>) {
        match direction {
            Some(d) => {
                self.held.remove(&d);
            }
            None => self.held.clear(),
        }
        self.recompute_targets();
    }

    /// Soft stop: zero targets and drop held directions. The actuals ramp
    /// down over the following ticks.
    pub fn stop_targets(&mut self) {
        self.held.clear();
        self.target_left = 0.0;
        self.target_right = 0.0;
    }

    /// Hard stop: targets and actuals to zero immediately. The next tick
    /// reports `(0.0, 0.0)` to the driver.
    pub fn emergency_stop(&mut self) {
        self.held.clear();
        self.target_left = 0.0;
        self.target_right = 0.0;
        self.actual_left = 0.0;
        self.actual_right = 0.0;
        warn!("Motion executor hard-stopped");
    }

    /// Advances the actual speeds one ramp step toward the targets and
    /// returns what must be sent to the hardware this tick.
    ///
    /// When the distance band is `Critical` and the commanded target is
    /// forward motion, output is forced to zero without mutating the stored
    /// targets: motion resumes (ramping from zero) as soon as the band
    /// improves or the direction reverses.
    pub fn tick(&mut self, band: Band) -> (f32, f32) {
        if band == Band::Critical && self.target_left + self.target_right > 0.0 {
            if self.actual_left != 0.0 || self.actual_right != 0.0 {
                debug!("Forward motion clamped by critical distance band");
            }
            self.actual_left = 0.0;
            self.actual_right = 0.0;
            return (0.0, 0.0);
        }

        self.actual_left = ramp(self.actual_left, self.target_left, self.settings.ramp_step);
        self.actual_right = ramp(self.actual_right, self.target_right, self.settings.ramp_step);
        (self.actual_left, self.actual_right)
    }

    pub fn targets(&self) -> (f32, f32) {
        (self.target_left, self.target_right)
    }

    pub fn actuals(&self) -> (f32, f32) {
        (self.actual_left, self.actual_right)
    }

    /// Mixes the currently held directions into wheel targets.
    fn recompute_targets(&mut self) {
        let mag = |d: Direction| self.held.get(&d).copied().unwrap_or(0.0);
        let forward = mag(Direction::Forward) - mag(Direction::Backward);
        let turn = mag(Direction::Right) - mag(Direction::Left);

        let (left, right) = match self.settings.steering {
            SteeringMode::Tank => (forward + turn, forward - turn),
            SteeringMode::Arcade => (
                forward + turn * self.settings.turn_gain,
                forward - turn * self.settings.turn_gain,
            ),
        };

        self.target_left = left.clamp(-1.0, 1.0) * self.settings.max_speed;
        self.target_right = right.clamp(-1.0, 1.0) * self.settings.max_speed;
    }
}

/// One bounded step of `actual` toward `target`, never overshooting.
fn ramp(actual: f32, target: f32, step: f32) -> f32 {
    let delta = target - actual;
    if delta.abs() <= step {
        target
    } else {
        actual + step.copysign(delta)
    }
}
