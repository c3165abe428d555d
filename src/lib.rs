//! rovercore: real-time control core for a small differential-drive robot.
//!
//! The [`core`] module owns all robot state behind a single engine task;
//! [`adapters`] feed it actions from the gamepad, the web bridge and the
//! voice interface; [`hw`] holds the driver seam with Raspberry Pi and
//! mock implementations; [`config`] is the TOML configuration layer.

pub mod adapters;
pub mod config;
pub mod core;
pub mod hw;
