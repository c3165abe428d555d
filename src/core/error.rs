//! Error definitions for the control core.

use thiserror::Error;

use super::action::Source;

/// Error taxonomy for core decisions and engine plumbing.
///
/// Nothing here is fatal to the process: every rejected action leaves prior
/// state unchanged and the caller decides how to surface the reason.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Another source currently holds motion control. Recoverable; the
    /// caller should back off and retry after the holder releases.
    #[error("motion control is held by {holder}")]
    SourceBusy { holder: Source },

    /// Malformed action payload. Caller bug; logged and dropped.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The proximity sensor stopped answering. Degraded safety input.
    #[error("distance sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// A channel to or from the engine task is closed.
    #[error("core channel error: {0}")]
    ChannelError(String),

    /// The engine task panicked or failed to join.
    #[error("engine task error: {0}")]
    TaskError(String),

    /// Rejected configuration values.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// An input adapter failed to initialize or run.
    #[error("adapter error: {0}")]
    AdapterError(String),
}
