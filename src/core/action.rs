use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the adapter that produced an action.
///
/// The core trusts this tag; every adapter stamps its own identity and the
/// arbitration policy in the control manager keys off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Gamepad,
    Web,
    Voice,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Gamepad => write!(f, "gamepad"),
            Source::Web => write!(f, "web"),
            Source::Voice => write!(f, "voice"),
        }
    }
}

/// Motion directions understood by the motion executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// Pad buttons that claim motion ownership while held.
///
/// These carry no actuator dispatch of their own; they exist so an adapter
/// can hold ownership with a dead-man style button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadButton {
    Cross,
    Circle,
    Square,
    Triangle,
}

/// Lighting effects owned by the LED engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Off,
    Solid(Rgb),
    KnightRider,
    Party,
}

/// Transient rendering that supersedes the active effect without
/// discarding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    DistanceWarning(Band),
}

/// Discretised proximity band, ordered from most to least dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    Critical,
    Warning,
    Caution,
    Safe,
}

/// One RGB triple of the LED frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// What an action asks the core to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Begin moving in a direction. `magnitude` is an optional analog value
    /// in `[0.0, 1.0]`; digital inputs omit it and get full scale.
    MoveStart {
        direction: Direction,
        magnitude: Option<f32>,
    },
    /// Release a held direction, or all held motion when `None`.
    MoveStop { direction: Option<Direction> },
    /// Soft stop: zero the motion targets but keep ownership.
    Stop,
    /// Forced-safe transition: zero everything, clear ownership, LEDs off.
    EmergencyStop,
    ButtonPress { button: PadButton },
    ButtonRelease { button: PadButton },
    SetEffect { effect: Effect },
    /// Push an overlay, or pop the current one when `None`.
    SetOverlay { overlay: Option<Overlay> },
}

/// Normalized command event from an input adapter.
///
/// Immutable once created; the control manager only reads it.
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub source: Source,
    pub timestamp: DateTime<Local>,
}

impl Action {
    pub fn new(kind: ActionKind, source: Source) -> Self {
        Self {
            kind,
            source,
            timestamp: Local::now(),
        }
    }
}

/// Authoritative robot mode.
///
/// Holding the source inside the `Manual` variant makes the single-holder
/// invariant structural: there is no way to represent two active sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Idle,
    Manual { source: Source },
}

impl Mode {
    pub fn active_source(&self) -> Option<Source> {
        match self {
            Mode::Idle => None,
            Mode::Manual { source } => Some(*source),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Idle => write!(f, "idle"),
            Mode::Manual { source } => write!(f, "manual({})", source),
        }
    }
}
