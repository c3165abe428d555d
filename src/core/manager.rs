//! Control manager: the mode state machine and arbitration policy.
//!
//! All mutation of the mode, the motion targets and the LED state funnels
//! through [`ControlManager::decide`], which the engine task calls from a
//! single owner context. Decisions are synchronous: by the time `decide`
//! returns, the target state has been updated; the physical tick loops pick
//! it up on their own cadence and the manager never waits on hardware.

use chrono::{DateTime, Local};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::action::{Action, ActionKind, Direction, Mode, PadButton, Source};
use super::error::ControlError;
use super::leds::LedEngine;
use super::motion::MotionExecutor;

/// An outstanding claim a source has on motion ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Hold {
    Move(Direction),
    Button(PadButton),
}

pub struct ControlManager {
    mode: Mode,
    holds: HashSet<Hold>,
    last_action_time: HashMap<Source, DateTime<Local>>,
    motion: MotionExecutor,
    leds: LedEngine,
}

impl ControlManager {
    pub fn new(motion: MotionExecutor, leds: LedEngine) -> Self {
        info!("Control manager initialized");
        Self {
            mode: Mode::Idle,
            holds: HashSet::new(),
            last_action_time: HashMap::new(),
            motion,
            leds,
        }
    }

    /// Decides whether to accept an action and dispatches it.
    ///
    /// Rejections are immediate and final for this call; nothing is queued
    /// across sources and a rejected action leaves all state untouched.
    /// Returns the mode in force after an accepted action.
    pub fn decide(&mut self, action: &Action) -> Result<Mode, ControlError> {
        match &action.kind {
            ActionKind::EmergencyStop => {
                warn!("Emergency stop from {}", action.source);
                self.holds.clear();
                self.motion.emergency_stop();
                self.leds.force_off();
                self.mode = Mode::Idle;
            }

            ActionKind::MoveStart {
                direction,
                magnitude,
            } => {
                self.ensure_claimable(action.source)?;
                self.motion.set_target(*direction, *magnitude)?;
                self.holds.insert(Hold::Move(*direction));
                if self.mode == Mode::Idle {
                    info!("{} claims motion control", action.source);
                }
                self.mode = Mode::Manual {
                    source: action.source,
                };
            }

            ActionKind::ButtonPress { button } => {
                self.ensure_claimable(action.source)?;
                self.holds.insert(Hold::Button(*button));
                self.mode = Mode::Manual {
                    source: action.source,
                };
                debug!("{} holds button {:?}", action.source, button);
            }

            ActionKind::MoveStop { direction } => {
                if self.is_holder_or_idle(action.source) {
                    match direction {
                        Some(d) => {
                            self.holds.remove(&Hold::Move(*d));
                            self.motion.clear_target(Some(*d));
                        }
                        None => {
                            self.holds.retain(|h| !matches!(h, Hold::Move(_)));
                            self.motion.clear_target(None);
                        }
                    }
                    self.release_if_done();
                } else {
                    // Idempotent no-op: a stray release from a bystander
                    // must not disturb the holder's motion.
                    debug!("Ignoring release from inactive source {}", action.source);
                }
            }

            ActionKind::ButtonRelease { button } => {
                if self.is_holder_or_idle(action.source) {
                    self.holds.remove(&Hold::Button(*button));
                    self.release_if_done();
                } else {
                    debug!("Ignoring release from inactive source {}", action.source);
                }
            }

            ActionKind::Stop => match self.mode {
                Mode::Idle => debug!("Soft stop while idle, nothing to do"),
                Mode::Manual { source } if source == action.source => {
                    info!("Soft stop from {}", action.source);
                    self.motion.stop_targets();
                }
                Mode::Manual { source: holder } => {
                    return Err(ControlError::SourceBusy { holder });
                }
            },

            // LED ownership is independent of motion ownership: any source
            // may change lighting at any time.
            ActionKind::SetEffect { effect } => {
                self.leds.set_effect(*effect);
            }

            ActionKind::SetOverlay { overlay } => match overlay {
                Some(o) => self.leds.push_overlay(*o),
                None => self.leds.pop_overlay(),
            },
        }

        self.last_action_time.insert(action.source, action.timestamp);
        Ok(self.mode)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn motion(&self) -> &MotionExecutor {
        &self.motion
    }

    pub fn motion_mut(&mut self) -> &mut MotionExecutor {
        &mut self.motion
    }

    pub fn leds(&self) -> &LedEngine {
        &self.leds
    }

    pub fn leds_mut(&mut self) -> &mut LedEngine {
        &mut self.leds
    }

    /// Timestamp of the most recently accepted action across all sources.
    pub fn last_accepted(&self) -> Option<DateTime<Local>> {
        self.last_action_time.values().max().copied()
    }

    fn ensure_claimable(&self, source: Source) -> Result<(), ControlError> {
        match self.mode {
            Mode::Idle => Ok(()),
            Mode::Manual { source: holder } if holder == source => Ok(()),
            Mode::Manual { source: holder } => Err(ControlError::SourceBusy { holder }),
        }
    }

    fn is_holder_or_idle(&self, source: Source) -> bool {
        match self.mode {
            Mode::Idle => true,
            Mode::Manual { source: holder } => holder == source,
        }
    }

    fn release_if_done(&mut self) {
        if self.holds.is_empty() {
            if let Mode::Manual { source } = self.mode {
                info!("{} released motion control", source);
            }
            self.mode = Mode::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Band, Effect};
    use crate::core::leds::LedSettings;
    use crate::core::motion::MotionSettings;

    fn manager() -> ControlManager {
        ControlManager::new(
            MotionExecutor::new(MotionSettings::default()),
            LedEngine::new(&LedSettings::default(), 20),
        )
    }

    fn act(kind: ActionKind, source: Source) -> Action {
        Action::new(kind, source)
    }

    fn move_start(direction: Direction, source: Source) -> Action {
        act(
            ActionKind::MoveStart {
                direction,
                magnitude: None,
            },
            source,
        )
    }

    fn move_stop(direction: Option<Direction>, source: Source) -> Action {
        act(ActionKind::MoveStop { direction }, source)
    }

    #[test]
    fn first_claim_wins_and_release_frees_ownership() {
        let mut m = manager();

        let mode = m.decide(&move_start(Direction::Forward, Source::Web)).unwrap();
        assert_eq!(mode, Mode::Manual { source: Source::Web });

        // A competing source is rejected and the holder's targets survive.
        let targets_before = m.motion().targets();
        let err = m
            .decide(&move_start(Direction::Backward, Source::Gamepad))
            .unwrap_err();
        assert!(matches!(err, ControlError::SourceBusy { holder: Source::Web }));
        assert_eq!(m.motion().targets(), targets_before);

        // Full release, then the other source may claim.
        let mode = m.decide(&move_stop(None, Source::Web)).unwrap();
        assert_eq!(mode, Mode::Idle);
        let mode = m
            .decide(&move_start(Direction::Backward, Source::Gamepad))
            .unwrap();
        assert_eq!(mode, Mode::Manual { source: Source::Gamepad });
    }

    #[test]
    fn ownership_persists_until_all_holds_released() {
        let mut m = manager();
        m.decide(&move_start(Direction::Forward, Source::Gamepad)).unwrap();
        m.decide(&move_start(Direction::Left, Source::Gamepad)).unwrap();

        let mode = m
            .decide(&move_stop(Some(Direction::Forward), Source::Gamepad))
            .unwrap();
        assert_eq!(mode, Mode::Manual { source: Source::Gamepad });

        let mode = m
            .decide(&move_stop(Some(Direction::Left), Source::Gamepad))
            .unwrap();
        assert_eq!(mode, Mode::Idle);
    }

    #[test]
    fn emergency_stop_from_any_source_resets_everything() {
        let mut m = manager();
        m.decide(&move_start(Direction::Forward, Source::Gamepad)).unwrap();
        m.decide(&act(ActionKind::SetEffect { effect: Effect::Party }, Source::Web))
            .unwrap();
        for _ in 0..20 {
            m.motion_mut().tick(Band::Safe);
        }
        assert!(m.motion().actuals().0 > 0.0);

        let mode = m
            .decide(&act(ActionKind::EmergencyStop, Source::Voice))
            .unwrap();
        assert_eq!(mode, Mode::Idle);
        assert_eq!(m.motion().actuals(), (0.0, 0.0));
        assert_eq!(m.motion().targets(), (0.0, 0.0));
        assert_eq!(m.leds().active_effect(), Effect::Off);

        // Ownership was cleared, not transferred: the old holder may reclaim.
        let mode = m.decide(&move_start(Direction::Forward, Source::Gamepad)).unwrap();
        assert_eq!(mode, Mode::Manual { source: Source::Gamepad });
    }

    #[test]
    fn soft_stop_zeroes_targets_but_keeps_ownership() {
        let mut m = manager();
        m.decide(&move_start(Direction::Forward, Source::Web)).unwrap();

        let mode = m.decide(&act(ActionKind::Stop, Source::Web)).unwrap();
        assert_eq!(mode, Mode::Manual { source: Source::Web });
        assert_eq!(m.motion().targets(), (0.0, 0.0));

        // Still owned: another source cannot claim.
        let err = m
            .decide(&move_start(Direction::Forward, Source::Voice))
            .unwrap_err();
        assert!(matches!(err, ControlError::SourceBusy { .. }));
    }

    #[test]
    fn soft_stop_from_bystander_is_rejected() {
        let mut m = manager();
        m.decide(&move_start(Direction::Forward, Source::Web)).unwrap();
        let err = m.decide(&act(ActionKind::Stop, Source::Voice)).unwrap_err();
        assert!(matches!(err, ControlError::SourceBusy { holder: Source::Web }));
        assert!(m.motion().targets().0 > 0.0);
    }

    #[test]
    fn soft_stop_while_idle_is_a_no_op() {
        let mut m = manager();
        assert_eq!(m.decide(&act(ActionKind::Stop, Source::Web)).unwrap(), Mode::Idle);
    }

    #[test]
    fn stray_release_does_not_disturb_the_holder() {
        let mut m = manager();
        m.decide(&move_start(Direction::Forward, Source::Web)).unwrap();
        let targets = m.motion().targets();

        m.decide(&move_stop(None, Source::Voice)).unwrap();
        assert_eq!(m.mode(), Mode::Manual { source: Source::Web });
        assert_eq!(m.motion().targets(), targets);
    }

    #[test]
    fn led_actions_bypass_arbitration() {
        let mut m = manager();
        m.decide(&move_start(Direction::Forward, Source::Gamepad)).unwrap();

        let mode = m
            .decide(&act(ActionKind::SetEffect { effect: Effect::KnightRider }, Source::Web))
            .unwrap();
        assert_eq!(mode, Mode::Manual { source: Source::Gamepad });
        assert_eq!(m.leds().active_effect(), Effect::KnightRider);
    }

    #[test]
    fn setting_the_other_effect_replaces_it_at_phase_zero() {
        let mut m = manager();
        m.decide(&act(ActionKind::SetEffect { effect: Effect::KnightRider }, Source::Web))
            .unwrap();
        for _ in 0..5 {
            m.leds_mut().tick();
        }
        m.decide(&act(ActionKind::SetEffect { effect: Effect::Party }, Source::Web))
            .unwrap();
        assert_eq!(m.leds().active_effect(), Effect::Party);
        assert_eq!(m.leds().phase(), 0);
    }

    #[test]
    fn invalid_magnitude_rejected_without_state_change() {
        let mut m = manager();
        let err = m
            .decide(&act(
                ActionKind::MoveStart {
                    direction: Direction::Forward,
                    magnitude: Some(2.0),
                },
                Source::Web,
            ))
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidAction(_)));
        assert_eq!(m.mode(), Mode::Idle);
        assert_eq!(m.motion().targets(), (0.0, 0.0));
    }

    #[test]
    fn button_holds_claim_ownership_like_motion() {
        let mut m = manager();
        m.decide(&act(
            ActionKind::ButtonPress {
                button: PadButton::Cross,
            },
            Source::Gamepad,
        ))
        .unwrap();
        assert_eq!(m.mode(), Mode::Manual { source: Source::Gamepad });

        let err = m.decide(&move_start(Direction::Forward, Source::Web)).unwrap_err();
        assert!(matches!(err, ControlError::SourceBusy { .. }));

        m.decide(&act(
            ActionKind::ButtonRelease {
                button: PadButton::Cross,
            },
            Source::Gamepad,
        ))
        .unwrap();
        assert_eq!(m.mode(), Mode::Idle);
    }

    #[test]
    fn accepted_actions_update_last_action_time() {
        let mut m = manager();
        assert!(m.last_accepted().is_none());
        m.decide(&move_start(Direction::Forward, Source::Web)).unwrap();
        assert!(m.last_accepted().is_some());
    }
}
