//! Input adapters: each turns one outside interface into core actions.
//!
//! Adapters never touch core state directly. They stamp their own
//! [`Source`](crate::core::Source), submit through an
//! [`ActionSender`](crate::core::ActionSender) and treat a rejection as
//! information, not an error: a busy core means another source holds the
//! robot, and the adapter just reports that back on its own channel.

pub mod gamepad;
pub mod voice;
pub mod web;

pub use gamepad::{GamepadAdapter, GamepadSettings};
pub use voice::{VoiceAdapter, VoiceSettings};
pub use web::{WebBridge, WebBridgeSettings};
