//! Distance monitor: proximity sampling and band classification.
//!
//! Runs on its own cadence in a spawned task and publishes the latest
//! reading through a watch channel, so the motion and LED tick loops can
//! read it without ever blocking the sampler.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::action::Band;
use super::error::ControlError;
use crate::hw::DistanceSensor;

/// Latest classified sensor value. No history is kept beyond this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceReading {
    pub meters: f32,
    pub band: Band,
}

/// What the sampling task publishes: the reading plus sensor health.
///
/// `band` always reflects the last successful classification. Consumers
/// that gate motion must use `clamp_band`, which fails toward `Critical`
/// once the sensor has been silent for too many consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceUpdate {
    pub reading: DistanceReading,
    pub sensor_ok: bool,
    pub degraded: bool,
}

impl DistanceUpdate {
    /// Optimistic value published before the first sample arrives.
    pub fn assume_safe(meters: f32) -> Self {
        Self {
            reading: DistanceReading {
                meters,
                band: Band::Safe,
            },
            sensor_ok: true,
            degraded: false,
        }
    }

    /// Band to use for the forward-motion safety clamp.
    pub fn clamp_band(&self) -> Band {
        if self.degraded {
            Band::Critical
        } else {
            self.reading.band
        }
    }
}

/// Configuration values consumed by the distance monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistanceSettings {
    /// Band thresholds in meters, ordered critical < warning < caution.
    pub critical_m: f32,
    pub warning_m: f32,
    pub caution_m: f32,
    /// Consecutive read failures before the clamp assumes `Critical`.
    pub max_failures: u32,
    pub sample_hz: u32,
}

impl Default for DistanceSettings {
    fn default() -> Self {
        Self {
            critical_m: 0.2,
            warning_m: 0.4,
            caution_m: 0.8,
            max_failures: 3,
            sample_hz: 8,
        }
    }
}

impl DistanceSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        if !(self.critical_m > 0.0 && self.critical_m < self.warning_m && self.warning_m < self.caution_m)
        {
            return Err(ControlError::ConfigError(format!(
                "distance thresholds must satisfy 0 < critical < warning < caution, got {}/{}/{}",
                self.critical_m, self.warning_m, self.caution_m
            )));
        }
        if self.max_failures == 0 || self.sample_hz == 0 {
            return Err(ControlError::ConfigError(
                "max_failures and sample_hz must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Ordered threshold lookup. A value exactly on a boundary lands in the
    /// safer (larger-distance) band so readings hovering on a threshold do
    /// not oscillate into the more dangerous one.
    pub fn classify(&self, meters: f32) -> Band {
        if meters < self.critical_m {
            Band::Critical
        } else if meters < self.warning_m {
            Band::Warning
        } else if meters < self.caution_m {
            Band::Caution
        } else {
            Band::Safe
        }
    }
}

/// Owns the sensor and the failure-counting policy.
pub struct DistanceMonitor {
    sensor: Box<dyn DistanceSensor>,
    settings: DistanceSettings,
    last: DistanceReading,
    failures: u32,
}

impl DistanceMonitor {
    pub fn new(sensor: Box<dyn DistanceSensor>, settings: DistanceSettings) -> Self {
        Self {
            sensor,
            last: DistanceReading {
                meters: settings.caution_m * 2.0,
                band: Band::Safe,
            },
            settings,
            failures: 0,
        }
    }

    /// Takes one sample. On failure the previous reading is kept and the
    /// degradation counter advances; success resets it.
    pub fn sample(&mut self) -> DistanceUpdate {
        match self.sensor.read_distance() {
            Ok(meters) if meters.is_finite() && meters >= 0.0 => {
                self.failures = 0;
                self.last = DistanceReading {
                    meters,
                    band: self.settings.classify(meters),
                };
                debug!("Distance {:.2} m -> {:?}", meters, self.last.band);
                DistanceUpdate {
                    reading: self.last,
                    sensor_ok: true,
                    degraded: false,
                }
            }
            Ok(meters) => self.record_failure(format!("nonsensical reading {meters}")),
            Err(e) => self.record_failure(e.to_string()),
        }
    }

    fn record_failure(&mut self, reason: String) -> DistanceUpdate {
        self.failures = self.failures.saturating_add(1);
        let degraded = self.failures >= self.settings.max_failures;
        if degraded {
            error!(
                "Distance sensor unavailable for {} consecutive samples, clamping as critical: {}",
                self.failures, reason
            );
        } else {
            warn!("Distance sensor read failed, holding last band: {}", reason);
        }
        DistanceUpdate {
            reading: self.last,
            sensor_ok: false,
            degraded,
        }
    }

    /// Spawns the sampling task and returns the latest-value receiver read
    /// by the tick loops.
    pub fn spawn(mut self, cancel: CancellationToken) -> watch::Receiver<DistanceUpdate> {
        let (tx, rx) = watch::channel(DistanceUpdate::assume_safe(self.last.meters));
        let period = Duration::from_millis(1000 / u64::from(self.settings.sample_hz));
        tokio::spawn(async move {
            info!(
                "Distance monitor sampling every {:?} ({} Hz)",
                period, self.settings.sample_hz
            );
            let mut timer = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Distance monitor stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        let update = self.sample();
                        if tx.send(update).is_err() {
                            debug!("All distance readers dropped, stopping sampler");
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::mock::ScriptedDistanceSensor;
    use crate::hw::DriverError;

    fn settings() -> DistanceSettings {
        DistanceSettings::default()
    }

    #[test]
    fn classification_uses_ordered_thresholds() {
        let s = settings();
        assert_eq!(s.classify(0.05), Band::Critical);
        assert_eq!(s.classify(0.3), Band::Warning);
        assert_eq!(s.classify(0.6), Band::Caution);
        assert_eq!(s.classify(2.0), Band::Safe);
    }

    #[test]
    fn boundary_values_round_to_the_safer_band() {
        let s = settings();
        assert_eq!(s.classify(0.2), Band::Warning);
        assert_eq!(s.classify(0.4), Band::Caution);
        assert_eq!(s.classify(0.8), Band::Safe);
    }

    #[test]
    fn failures_hold_last_band_until_the_limit() {
        let sensor = ScriptedDistanceSensor::new(vec![
            Ok(0.3),
            Err(DriverError::Unavailable("no echo".into())),
            Err(DriverError::Unavailable("no echo".into())),
            Err(DriverError::Unavailable("no echo".into())),
        ]);
        let mut monitor = DistanceMonitor::new(Box::new(sensor), settings());

        assert_eq!(monitor.sample().reading.band, Band::Warning);

        let first_miss = monitor.sample();
        assert!(!first_miss.sensor_ok);
        assert!(!first_miss.degraded);
        assert_eq!(first_miss.clamp_band(), Band::Warning);

        monitor.sample();
        let third_miss = monitor.sample();
        assert!(third_miss.degraded);
        assert_eq!(third_miss.clamp_band(), Band::Critical);
        // The reported band still holds the last-known value.
        assert_eq!(third_miss.reading.band, Band::Warning);
    }

    #[test]
    fn recovery_resets_the_failure_count() {
        let sensor = ScriptedDistanceSensor::new(vec![
            Err(DriverError::Unavailable("no echo".into())),
            Err(DriverError::Unavailable("no echo".into())),
            Ok(1.5),
            Err(DriverError::Unavailable("no echo".into())),
        ]);
        let mut monitor = DistanceMonitor::new(Box::new(sensor), settings());

        monitor.sample();
        monitor.sample();
        let recovered = monitor.sample();
        assert!(recovered.sensor_ok);
        assert_eq!(recovered.reading.band, Band::Safe);

        // One fresh miss is not enough to degrade again.
        assert!(!monitor.sample().degraded);
    }

    #[test]
    fn nonsensical_readings_count_as_failures() {
        let sensor = ScriptedDistanceSensor::new(vec![Ok(f32::NAN)]);
        let mut monitor = DistanceMonitor::new(Box::new(sensor), settings());
        assert!(!monitor.sample().sensor_ok);
    }
}
