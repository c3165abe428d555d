//! Core engine with statum state machine for the control lifecycle.
//!
//! The engine task is the single owner of the control manager and with it
//! of all mode, motion and LED state. Input adapters reach it only through
//! the submit channel, so arbitration decisions are atomic with respect to
//! concurrent callers; the motion and LED ticks run on their own interval
//! timers inside the same task, decoupled from input arrival.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Configured ──► Active ──► Deactivating ──► Deactivated
//!                                    │                ▲
//!                                    └── cancellation ┘
//! ```
//!
//! # Architecture
//!
//! ```text
//! ActionSender ─[SubmitRequest]─► CoreEngine ─► MotionDriver / LedDriver
//!                                     ▲ │
//!               DistanceMonitor ──────┘ └──► watch<CoreStatus>
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::action::{Action, Band, Effect, Mode, Overlay, Source};
use super::distance::DistanceUpdate;
use super::error::ControlError;
use super::manager::ControlManager;
use crate::hw::{LedDriver, MotionDriver};

/// Tick cadences of the two periodic loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub motion_hz: u32,
    pub led_hz: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            motion_hz: 20,
            led_hz: 20,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.motion_hz == 0 || self.motion_hz > 200 || self.led_hz == 0 || self.led_hz > 200 {
            return Err(ControlError::ConfigError(format!(
                "tick rates must be in [1, 200] Hz, got motion {} / led {}",
                self.motion_hz, self.led_hz
            )));
        }
        Ok(())
    }
}

/// Snapshot of the externally visible core state, published through a
/// watch channel so status consumers never touch the engine's state.
#[derive(Debug, Clone, Serialize)]
pub struct CoreStatus {
    pub mode: Mode,
    pub active_source: Option<Source>,
    pub distance: DistanceUpdate,
    pub active_effect: Effect,
    pub speeds: (f32, f32),
    pub last_accepted: Option<DateTime<Local>>,
}

/// One submitted action plus the channel its verdict goes back on.
#[derive(Debug)]
pub struct SubmitRequest {
    pub action: Action,
    pub reply: oneshot::Sender<Result<Mode, ControlError>>,
}

/// Cloneable submission endpoint handed to input adapters.
#[derive(Clone)]
pub struct ActionSender {
    tx: mpsc::Sender<SubmitRequest>,
}

impl ActionSender {
    /// Submits an action and waits for the engine's verdict.
    pub async fn submit(&self, action: Action) -> Result<Mode, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SubmitRequest {
                action,
                reply: reply_tx,
            })
            .await
            .map_err(|e| ControlError::ChannelError(format!("engine task gone: {e}")))?;
        reply_rx
            .await
            .map_err(|e| ControlError::ChannelError(format!("engine dropped the reply: {e}")))?
    }
}

/// States for the core engine lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum EngineState {
    Initializing, // Setting up engine structure
    Configured,   // Settings validated, drivers attached
    Active,       // Processing submissions and ticks in the main loop
    Deactivating, // Shutting down gracefully
    Deactivated,  // Fully stopped, motors commanded to zero
}

/// Single-owner engine wrapping the control manager and both actuator
/// drivers, with compile-time lifecycle safety via statum.
#[machine]
pub struct CoreEngine<S: EngineState> {
    manager: ControlManager,
    settings: EngineSettings,
    action_rx: mpsc::Receiver<SubmitRequest>,
    status_tx: watch::Sender<CoreStatus>,
    distance_rx: watch::Receiver<DistanceUpdate>,
    motion_driver: Box<dyn MotionDriver>,
    led_driver: Box<dyn LedDriver>,
    // Whether the current LED overlay was pushed by the distance policy
    // (and may therefore be popped by it).
    distance_overlay: bool,
}

impl CoreEngine<Initializing> {
    pub fn create(
        manager: ControlManager,
        settings: EngineSettings,
        action_rx: mpsc::Receiver<SubmitRequest>,
        status_tx: watch::Sender<CoreStatus>,
        distance_rx: watch::Receiver<DistanceUpdate>,
        motion_driver: Box<dyn MotionDriver>,
        led_driver: Box<dyn LedDriver>,
    ) -> Self {
        info!("Initializing core engine");
        Self::new(
            manager,
            settings,
            action_rx,
            status_tx,
            distance_rx,
            motion_driver,
            led_driver,
            false, // distance_overlay
        )
    }

    /// Validates the tick settings and transitions to Configured.
    pub fn configure(self) -> Result<CoreEngine<Configured>, ControlError> {
        self.settings.validate()?;
        info!(
            "Core engine configured: motion {} Hz, led {} Hz",
            self.settings.motion_hz, self.settings.led_hz
        );
        Ok(self.transition())
    }
}

impl CoreEngine<Configured> {
    pub fn activate(self) -> CoreEngine<Active> {
        info!("Activating core engine");
        self.transition()
    }
}

impl CoreEngine<Active> {
    /// Main loop: submissions, motion ticks and LED ticks, until the
    /// cancellation token fires or every submitter is gone.
    pub async fn run_until_shutdown(
        mut self,
        cancel: CancellationToken,
    ) -> Result<CoreEngine<Deactivating>, ControlError> {
        let mut motion_timer = interval(Duration::from_millis(
            1000 / u64::from(self.settings.motion_hz),
        ));
        let mut led_timer = interval(Duration::from_millis(1000 / u64::from(self.settings.led_hz)));

        info!("Core engine entering main loop");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received by core engine");
                    break;
                }

                request = self.action_rx.recv() => {
                    match request {
                        Some(request) => self.handle_submit(request),
                        None => {
                            info!("All submitters closed, core engine stopping");
                            break;
                        }
                    }
                }

                _ = motion_timer.tick() => self.motion_tick(),

                _ = led_timer.tick() => self.led_tick(),
            }
        }

        info!("Transitioning to Deactivating state");
        Ok(self.transition())
    }

    fn handle_submit(&mut self, request: SubmitRequest) {
        let result = self.manager.decide(&request.action);
        match &result {
            Ok(mode) => debug!(
                "Accepted {:?} from {}: mode {}",
                request.action.kind, request.action.source, mode
            ),
            Err(e) => warn!(
                "Rejected {:?} from {}: {}",
                request.action.kind, request.action.source, e
            ),
        }
        self.publish_status();
        if request.reply.send(result).is_err() {
            warn!("Submitter went away before the verdict was delivered");
        }
    }

    fn motion_tick(&mut self) {
        let update = *self.distance_rx.borrow();
        let (left, right) = self.manager.motion_mut().tick(update.clamp_band());
        if let Err(e) = self.motion_driver.drive(left, right) {
            error!("Motor driver write failed: {}", e);
        }
        self.publish_status();
    }

    fn led_tick(&mut self) {
        // The warning overlay tracks the last-known band, not the degraded
        // clamp: a silent sensor stops the wheels, not the light show.
        let band = self.distance_rx.borrow().reading.band;
        if matches!(band, Band::Critical | Band::Warning) {
            self.manager
                .leds_mut()
                .push_overlay(Overlay::DistanceWarning(band));
            self.distance_overlay = true;
        } else if self.distance_overlay {
            self.manager.leds_mut().pop_overlay();
            self.distance_overlay = false;
        }

        let frame = self.manager.leds_mut().tick();
        if let Err(e) = self.led_driver.render(&frame) {
            error!("LED driver write failed: {}", e);
        }
    }

    fn publish_status(&self) {
        let status = snapshot(&self.manager, &self.distance_rx);
        if self.status_tx.send(status).is_err() {
            debug!("No status subscribers");
        }
    }
}

impl CoreEngine<Deactivating> {
    /// Final tick: command zero motion and a dark frame, then transition
    /// to Deactivated. Wheels are never left in a nonzero state.
    pub fn shutdown(mut self) -> CoreEngine<Deactivated> {
        info!("Shutting down core engine");
        self.manager.motion_mut().emergency_stop();
        let (left, right) = self.manager.motion_mut().tick(Band::Safe);
        if let Err(e) = self.motion_driver.drive(left, right) {
            error!("Final motor zeroing failed: {}", e);
        }

        self.manager.leds_mut().force_off();
        let frame = self.manager.leds_mut().tick();
        if let Err(e) = self.led_driver.render(&frame) {
            error!("Final LED clear failed: {}", e);
        }

        info!("Core engine shut down, motors at zero");
        self.transition()
    }
}

fn snapshot(
    manager: &ControlManager,
    distance_rx: &watch::Receiver<DistanceUpdate>,
) -> CoreStatus {
    let mode = manager.mode();
    CoreStatus {
        mode,
        active_source: mode.active_source(),
        distance: *distance_rx.borrow(),
        active_effect: manager.leds().active_effect(),
        speeds: manager.motion().actuals(),
        last_accepted: manager.last_accepted(),
    }
}

/// Handle owning the spawned engine task.
///
/// Hands out [`ActionSender`]s to adapters and status receivers to
/// observers; `shutdown` cancels the engine and waits for the final
/// zero-motion tick to complete.
pub struct CoreHandle {
    action_tx: mpsc::Sender<SubmitRequest>,
    status_rx: watch::Receiver<CoreStatus>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<Result<(), ControlError>>>,
}

impl CoreHandle {
    pub fn spawn(
        manager: ControlManager,
        settings: EngineSettings,
        distance_rx: watch::Receiver<DistanceUpdate>,
        motion_driver: Box<dyn MotionDriver>,
        led_driver: Box<dyn LedDriver>,
        cancel: CancellationToken,
    ) -> Result<Self, ControlError> {
        let (action_tx, action_rx) = mpsc::channel(100);
        let (status_tx, status_rx) = watch::channel(snapshot(&manager, &distance_rx));

        let engine = CoreEngine::create(
            manager,
            settings,
            action_rx,
            status_tx,
            distance_rx,
            motion_driver,
            led_driver,
        )
        .configure()?;
        let active = engine.activate();

        let token = cancel.clone();
        let task_handle = tokio::spawn(async move {
            match active.run_until_shutdown(token).await {
                Ok(deactivating) => {
                    let _ = deactivating.shutdown();
                    Ok(())
                }
                Err(e) => {
                    error!("Core engine terminated with error: {}", e);
                    Err(e)
                }
            }
        });

        info!("Core engine task spawned");
        Ok(Self {
            action_tx,
            status_rx,
            cancel,
            task_handle: Some(task_handle),
        })
    }

    /// Submission endpoint for an input adapter.
    pub fn submitter(&self) -> ActionSender {
        ActionSender {
            tx: self.action_tx.clone(),
        }
    }

    /// Current status snapshot, readable without mutating core state.
    pub fn status(&self) -> CoreStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CoreStatus> {
        self.status_rx.clone()
    }

    /// Cancels the engine and waits for the final zero-motion tick.
    pub async fn shutdown(&mut self) -> Result<(), ControlError> {
        debug!("Sending shutdown signal to core engine");
        self.cancel.cancel();

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => {
                    debug!("Core engine task completed");
                    result
                }
                Err(e) => {
                    error!("Core engine task panicked: {}", e);
                    Err(ControlError::TaskError(format!(
                        "engine task panicked: {e}"
                    )))
                }
            }
        } else {
            debug!("Core engine already shut down");
            Ok(())
        }
    }
}
