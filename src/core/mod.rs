//! Robot control core: arbitration, motion ramping, lighting, safety.
//!
//! All mutable state lives inside the [`engine::CoreEngine`] task. The
//! submodules are plain synchronous state machines the engine drives from
//! its select loop; adapters only ever see [`engine::ActionSender`] and the
//! status watch channel.

pub mod action;
pub mod distance;
pub mod engine;
pub mod error;
pub mod leds;
pub mod manager;
pub mod motion;

pub use action::{Action, ActionKind, Band, Direction, Effect, Mode, Overlay, PadButton, Rgb, Source};
pub use distance::{DistanceMonitor, DistanceReading, DistanceSettings, DistanceUpdate};
pub use engine::{ActionSender, CoreHandle, CoreStatus, EngineSettings, SubmitRequest};
pub use error::ControlError;
pub use manager::ControlManager;
pub use motion::{MotionExecutor, MotionSettings, SteeringMode};

pub use leds::{FrameBuffer, LedEngine, LedSettings, NUM_UNDERLIGHTS};
