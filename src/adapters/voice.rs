//! Voice adapter: phrase matching over a transcript stream.
//!
//! Speech recognition itself happens elsewhere (or on stdin during
//! development); this adapter consumes finished transcript lines, matches
//! known phrases by substring and submits the resulting actions. Spoken
//! feedback goes back out as plain text on a second channel.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Action, ActionKind, ActionSender, ControlError, Direction, Effect, Source};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub enabled: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self { enabled: false }
    }
}

/// Matches a transcript against the known phrases.
///
/// Safety phrases are checked first so "emergency stop" never degrades
/// into a plain stop, and effect names before directions so "knight
/// rider" is not mistaken for a turn.
pub fn parse_phrase(transcript: &str) -> Option<ActionKind> {
    let text = transcript.to_lowercase();
    let contains = |phrase: &str| text.contains(phrase);

    if contains("emergency") || contains("halt") {
        return Some(ActionKind::EmergencyStop);
    }

    if contains("knight rider") {
        return Some(ActionKind::SetEffect {
            effect: Effect::KnightRider,
        });
    }
    if contains("party") {
        return Some(ActionKind::SetEffect {
            effect: Effect::Party,
        });
    }
    if contains("lights off") || contains("lights out") {
        return Some(ActionKind::SetEffect {
            effect: Effect::Off,
        });
    }

    if contains("stop") {
        return Some(ActionKind::MoveStop { direction: None });
    }
    if contains("pause") || contains("wait") {
        return Some(ActionKind::Stop);
    }

    let direction = if contains("forward") || contains("ahead") {
        Direction::Forward
    } else if contains("backward") || contains("back") || contains("reverse") {
        Direction::Backward
    } else if contains("left") {
        Direction::Left
    } else if contains("right") {
        Direction::Right
    } else {
        return None;
    };
    Some(ActionKind::MoveStart {
        direction,
        magnitude: None,
    })
}

pub struct VoiceAdapter {
    settings: VoiceSettings,
}

impl VoiceAdapter {
    pub fn new(settings: VoiceSettings) -> Self {
        Self { settings }
    }

    /// Consumes transcripts until the channel closes or shutdown.
    pub fn spawn(
        self,
        sender: ActionSender,
        mut transcript_rx: mpsc::Receiver<String>,
        feedback_tx: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Voice adapter listening for transcripts (enabled: {})",
                self.settings.enabled
            );
            loop {
                let transcript = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Voice adapter stopped");
                        break;
                    }
                    line = transcript_rx.recv() => match line {
                        Some(line) => line,
                        None => {
                            info!("Transcript channel closed, voice adapter stopping");
                            break;
                        }
                    },
                };

                let Some(kind) = parse_phrase(&transcript) else {
                    debug!("No phrase matched in: {}", transcript);
                    send_feedback(&feedback_tx, "I did not catch that").await;
                    continue;
                };

                let feedback = match sender.submit(Action::new(kind, Source::Voice)).await {
                    Ok(mode) => {
                        debug!("Voice command accepted, mode {}", mode);
                        "okay".to_string()
                    }
                    Err(ControlError::SourceBusy { holder }) => {
                        format!("the {} is driving right now", holder)
                    }
                    Err(e) => {
                        warn!("Voice command failed: {}", e);
                        "that did not work".to_string()
                    }
                };
                send_feedback(&feedback_tx, &feedback).await;
            }
        })
    }
}

async fn send_feedback(feedback_tx: &mpsc::Sender<String>, text: &str) {
    if feedback_tx.send(text.to_string()).await.is_err() {
        debug!("Feedback consumer gone");
    }
}
