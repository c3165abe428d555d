//! Gamepad adapter built on gilrs.
//!
//! Polls the gilrs event queue on a fixed cadence and translates stick and
//! button events into core actions. The left stick drives motion with
//! analog magnitudes; face buttons switch light effects, East soft-stops
//! and Start/Mode is the emergency stop.

use gilrs::{Axis, Button, Event, EventType, Gilrs};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::{
    Action, ActionKind, ActionSender, ControlError, Direction, Effect, PadButton, Source,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamepadSettings {
    pub enabled: bool,
    /// Stick travel below this is treated as released.
    pub deadzone: f32,
    pub poll_interval_ms: u64,
}

impl Default for GamepadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            deadzone: 0.15,
            poll_interval_ms: 5,
        }
    }
}

/// Per-axis hold tracking so a stick returning to center releases the
/// direction it was holding, and crossing zero releases the opposite one.
#[derive(Debug, Default)]
struct AxisTracker {
    held_positive: bool,
    held_negative: bool,
}

impl AxisTracker {
    /// Maps a new axis value to start/stop actions. `positive` and
    /// `negative` name the directions for the two signs of the axis.
    fn update(
        &mut self,
        value: f32,
        deadzone: f32,
        positive: Direction,
        negative: Direction,
    ) -> Vec<ActionKind> {
        let mut actions = Vec::new();
        if value > deadzone {
            if self.held_negative {
                actions.push(ActionKind::MoveStop {
                    direction: Some(negative),
                });
                self.held_negative = false;
            }
            actions.push(ActionKind::MoveStart {
                direction: positive,
                magnitude: Some(value.abs().min(1.0)),
            });
            self.held_positive = true;
        } else if value < -deadzone {
            if self.held_positive {
                actions.push(ActionKind::MoveStop {
                    direction: Some(positive),
                });
                self.held_positive = false;
            }
            actions.push(ActionKind::MoveStart {
                direction: negative,
                magnitude: Some(value.abs().min(1.0)),
            });
            self.held_negative = true;
        } else {
            if self.held_positive {
                actions.push(ActionKind::MoveStop {
                    direction: Some(positive),
                });
                self.held_positive = false;
            }
            if self.held_negative {
                actions.push(ActionKind::MoveStop {
                    direction: Some(negative),
                });
                self.held_negative = false;
            }
        }
        actions
    }
}

/// Stateless button translation, shared by press and release.
fn map_direction_button(button: Button) -> Option<Direction> {
    match button {
        Button::DPadUp => Some(Direction::Forward),
        Button::DPadDown => Some(Direction::Backward),
        Button::DPadLeft => Some(Direction::Left),
        Button::DPadRight => Some(Direction::Right),
        _ => None,
    }
}

fn map_button_press(button: Button) -> Option<ActionKind> {
    if let Some(direction) = map_direction_button(button) {
        return Some(ActionKind::MoveStart {
            direction,
            magnitude: None,
        });
    }
    match button {
        Button::West => Some(ActionKind::SetEffect {
            effect: Effect::KnightRider,
        }),
        Button::North => Some(ActionKind::SetEffect {
            effect: Effect::Party,
        }),
        Button::East => Some(ActionKind::Stop),
        Button::South => Some(ActionKind::ButtonPress {
            button: PadButton::Cross,
        }),
        Button::Start | Button::Mode => Some(ActionKind::EmergencyStop),
        _ => None,
    }
}

fn map_button_release(button: Button) -> Option<ActionKind> {
    if let Some(direction) = map_direction_button(button) {
        return Some(ActionKind::MoveStop {
            direction: Some(direction),
        });
    }
    match button {
        Button::South => Some(ActionKind::ButtonRelease {
            button: PadButton::Cross,
        }),
        _ => None,
    }
}

/// Owns the gilrs context and the stick state between polls.
pub struct GamepadAdapter {
    gilrs: Gilrs,
    settings: GamepadSettings,
    stick_x: AxisTracker,
    stick_y: AxisTracker,
}

impl GamepadAdapter {
    pub fn create(settings: GamepadSettings) -> Result<Self, ControlError> {
        info!("Initializing gilrs gamepad interface");
        let gilrs = Gilrs::new().map_err(|e| ControlError::AdapterError(e.to_string()))?;

        let connected: Vec<String> = gilrs
            .gamepads()
            .map(|(id, pad)| format!("{} ({})", pad.name(), id))
            .collect();
        if connected.is_empty() {
            warn!("No gamepad connected, adapter will wait for one");
        } else {
            info!("Found gamepads: {}", connected.join(", "));
        }

        Ok(Self {
            gilrs,
            settings,
            stick_x: AxisTracker::default(),
            stick_y: AxisTracker::default(),
        })
    }

    fn map_event(&mut self, event: EventType) -> Vec<ActionKind> {
        match event {
            EventType::AxisChanged(Axis::LeftStickY, value, _) => self.stick_y.update(
                value,
                self.settings.deadzone,
                Direction::Forward,
                Direction::Backward,
            ),
            EventType::AxisChanged(Axis::LeftStickX, value, _) => self.stick_x.update(
                value,
                self.settings.deadzone,
                Direction::Right,
                Direction::Left,
            ),
            EventType::ButtonPressed(button, _) => map_button_press(button).into_iter().collect(),
            EventType::ButtonReleased(button, _) => {
                map_button_release(button).into_iter().collect()
            }
            EventType::Connected => {
                info!("Gamepad connected");
                Vec::new()
            }
            EventType::Disconnected => {
                // A vanished pad must not leave the robot driving.
                warn!("Gamepad disconnected, stopping all held motion");
                vec![ActionKind::MoveStop { direction: None }]
            }
            _ => Vec::new(),
        }
    }

    /// Runs the poll loop as a tokio task until cancelled.
    pub fn spawn(mut self, sender: ActionSender, cancel: CancellationToken) -> JoinHandle<()> {
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);
        tokio::spawn(async move {
            info!("Gamepad adapter polling every {:?}", poll_interval);
            loop {
                if cancel.is_cancelled() {
                    info!("Gamepad adapter stopped");
                    break;
                }

                while let Some(Event { event, .. }) = self.gilrs.next_event() {
                    for kind in self.map_event(event) {
                        submit(&sender, kind).await;
                    }
                }

                sleep(poll_interval).await;
            }
        })
    }
}

async fn submit(sender: &ActionSender, kind: ActionKind) {
    let action = Action::new(kind, Source::Gamepad);
    match sender.submit(action).await {
        Ok(mode) => debug!("Gamepad action accepted, mode {}", mode),
        Err(ControlError::SourceBusy { holder }) => {
            debug!("Gamepad action ignored, {} holds the robot", holder)
        }
        Err(e) => error!("Gamepad action failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stick_forward_starts_with_magnitude() {
        let mut tracker = AxisTracker::default();
        let actions = tracker.update(0.6, 0.15, Direction::Forward, Direction::Backward);
        assert_eq!(
            actions,
            vec![ActionKind::MoveStart {
                direction: Direction::Forward,
                magnitude: Some(0.6),
            }]
        );
    }

    #[test]
    fn stick_return_to_center_releases() {
        let mut tracker = AxisTracker::default();
        tracker.update(0.6, 0.15, Direction::Forward, Direction::Backward);
        let actions = tracker.update(0.05, 0.15, Direction::Forward, Direction::Backward);
        assert_eq!(
            actions,
            vec![ActionKind::MoveStop {
                direction: Some(Direction::Forward),
            }]
        );
    }

    #[test]
    fn stick_crossing_zero_releases_the_opposite_direction() {
        let mut tracker = AxisTracker::default();
        tracker.update(0.6, 0.15, Direction::Forward, Direction::Backward);
        let actions = tracker.update(-0.5, 0.15, Direction::Forward, Direction::Backward);
        assert_eq!(
            actions,
            vec![
                ActionKind::MoveStop {
                    direction: Some(Direction::Forward),
                },
                ActionKind::MoveStart {
                    direction: Direction::Backward,
                    magnitude: Some(0.5),
                },
            ]
        );
    }

    #[test]
    fn values_inside_the_deadzone_produce_nothing_when_idle() {
        let mut tracker = AxisTracker::default();
        assert!(tracker
            .update(0.1, 0.15, Direction::Forward, Direction::Backward)
            .is_empty());
    }

    #[test]
    fn dpad_maps_to_full_scale_motion() {
        assert_eq!(
            map_button_press(Button::DPadUp),
            Some(ActionKind::MoveStart {
                direction: Direction::Forward,
                magnitude: None,
            })
        );
        assert_eq!(
            map_button_release(Button::DPadUp),
            Some(ActionKind::MoveStop {
                direction: Some(Direction::Forward),
            })
        );
    }

    #[test]
    fn face_buttons_map_to_effects_and_stops() {
        assert_eq!(
            map_button_press(Button::West),
            Some(ActionKind::SetEffect {
                effect: Effect::KnightRider,
            })
        );
        assert_eq!(
            map_button_press(Button::North),
            Some(ActionKind::SetEffect {
                effect: Effect::Party,
            })
        );
        assert_eq!(map_button_press(Button::East), Some(ActionKind::Stop));
        assert_eq!(map_button_press(Button::Start), Some(ActionKind::EmergencyStop));
        assert_eq!(map_button_press(Button::LeftTrigger), None);
    }
}
