//! LED effect engine: one frame of the active effect per tick.
//!
//! Owns the active effect and its phase counter. A single-slot overlay
//! (distance warning) can supersede the rendering without discarding the
//! user-selected effect; the effect's phase is paused while the overlay is
//! up, not reset.
//!
//! Strip order matches the chassis: rear-left, middle-left, front-left,
//! front-right, middle-right, rear-right.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::action::{Band, Effect, Overlay, Rgb};
use super::error::ControlError;

/// Number of underlights on the strip.
pub const NUM_UNDERLIGHTS: usize = 6;

/// Indices of the forward-facing lights used for distance warnings.
const FRONT_LIGHTS: [usize; 2] = [2, 3];

const BLACK: Rgb = Rgb::new(0, 0, 0);
const RED: Rgb = Rgb::new(255, 0, 0);
const YELLOW: Rgb = Rgb::new(255, 255, 0);
const GREEN: Rgb = Rgb::new(0, 255, 0);

/// Ordered RGB triples handed to the LED driver once per tick.
pub type FrameBuffer = [Rgb; NUM_UNDERLIGHTS];

/// Configuration values consumed by the LED engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedSettings {
    /// Milliseconds between knight-rider position updates.
    pub knight_rider_interval_ms: u64,
    /// Milliseconds between party hue steps.
    pub party_interval_ms: u64,
    /// Colour used by `Effect::Solid` when no explicit colour is given.
    pub solid_color: Rgb,
}

impl Default for LedSettings {
    fn default() -> Self {
        Self {
            knight_rider_interval_ms: 100,
            party_interval_ms: 200,
            solid_color: Rgb::new(0, 0, 255),
        }
    }
}

impl LedSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.knight_rider_interval_ms == 0 || self.party_interval_ms == 0 {
            return Err(ControlError::ConfigError(
                "led effect intervals must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Owns the lighting state; rendered by the engine's LED tick.
#[derive(Debug)]
pub struct LedEngine {
    active: Effect,
    saved: Option<Effect>,
    overlay: Option<Overlay>,
    /// Effect animation step counter. Advances at the active effect's own
    /// cadence, frozen while an overlay is up.
    phase: u32,
    /// Ticks since the last phase advance.
    tick_count: u32,
    knight_rider_divider: u32,
    party_divider: u32,
}

impl LedEngine {
    /// `tick_hz` is the cadence at which `tick` will be called; effect
    /// intervals are converted into per-tick dividers from it.
    pub fn new(settings: &LedSettings, tick_hz: u32) -> Self {
        Self {
            active: Effect::Off,
            saved: None,
            overlay: None,
            phase: 0,
            tick_count: 0,
            knight_rider_divider: divider(settings.knight_rider_interval_ms, tick_hz),
            party_divider: divider(settings.party_interval_ms, tick_hz),
        }
    }

    /// Selects the active effect, restarting its phase.
    ///
    /// Selecting the effect that is already active toggles it off. Only one
    /// animated effect can be active at a time, which the single `active`
    /// slot enforces. During an overlay the saved effect is updated too, so
    /// the pop restores the user's latest choice.
    pub fn set_effect(&mut self, effect: Effect) -> Effect {
        let next = if effect == self.active && effect != Effect::Off {
            Effect::Off
        } else {
            effect
        };
        info!("LED effect set to {:?}", next);
        self.active = next;
        self.phase = 0;
        self.tick_count = 0;
        if self.overlay.is_some() {
            self.saved = Some(next);
        }
        next
    }

    /// Replaces rendering with the overlay. The first push saves the active
    /// effect; repeated pushes only retint the overlay.
    pub fn push_overlay(&mut self, overlay: Overlay) {
        if self.overlay.is_none() {
            self.saved = Some(self.active);
            debug!("Overlay pushed over {:?}", self.active);
        }
        self.overlay = Some(overlay);
    }

    /// Ends the overlay and restores the saved effect exactly once.
    pub fn pop_overlay(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.active = saved;
            debug!("Overlay popped, restored {:?}", saved);
        }
        self.overlay = None;
    }

    /// Total reset used by the emergency stop: effect off, overlay and save
    /// slot discarded.
    pub fn force_off(&mut self) {
        self.active = Effect::Off;
        self.saved = None;
        self.overlay = None;
        self.phase = 0;
        self.tick_count = 0;
    }

    /// Renders exactly one frame: the overlay if one is up, otherwise the
    /// active effect at the current phase, which is then advanced at the
    /// effect's cadence.
    pub fn tick(&mut self) -> FrameBuffer {
        if let Some(overlay) = self.overlay {
            return render_overlay(overlay);
        }

        let frame = self.render_active();
        self.tick_count += 1;
        if self.tick_count >= self.active_divider() {
            self.tick_count = 0;
            self.phase = self.phase.wrapping_add(1);
        }
        frame
    }

    pub fn active_effect(&self) -> Effect {
        self.active
    }

    pub fn overlay_active(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    fn active_divider(&self) -> u32 {
        match self.active {
            Effect::KnightRider => self.knight_rider_divider,
            Effect::Party => self.party_divider,
            Effect::Off | Effect::Solid(_) => 1,
        }
    }

    fn render_active(&self) -> FrameBuffer {
        match self.active {
            Effect::Off => [BLACK; NUM_UNDERLIGHTS],
            Effect::Solid(color) => [color; NUM_UNDERLIGHTS],
            Effect::KnightRider => {
                let mut frame = [BLACK; NUM_UNDERLIGHTS];
                frame[knight_rider_position(self.phase)] = RED;
                frame
            }
            Effect::Party => {
                let mut frame = [BLACK; NUM_UNDERLIGHTS];
                let base = (self.phase as f32 * 12.0) % 360.0;
                for (i, pixel) in frame.iter_mut().enumerate() {
                    let hue = (base + i as f32 * (360.0 / NUM_UNDERLIGHTS as f32)) % 360.0;
                    *pixel = hsv_to_rgb(hue, 1.0, 1.0);
                }
                frame
            }
        }
    }
}

/// Triangle wave over the strip: a single lit pixel sweeping back and forth.
fn knight_rider_position(phase: u32) -> usize {
    let cycle = 2 * (NUM_UNDERLIGHTS - 1);
    let pos = phase as usize % cycle;
    if pos < NUM_UNDERLIGHTS {
        pos
    } else {
        cycle - pos
    }
}

fn render_overlay(overlay: Overlay) -> FrameBuffer {
    let Overlay::DistanceWarning(band) = overlay;
    let color = match band {
        Band::Critical => RED,
        Band::Warning => YELLOW,
        Band::Caution => GREEN,
        Band::Safe => BLACK,
    };
    let mut frame = [BLACK; NUM_UNDERLIGHTS];
    for idx in FRONT_LIGHTS {
        frame[idx] = color;
    }
    frame
}

fn divider(interval_ms: u64, tick_hz: u32) -> u32 {
    let ticks = interval_ms.saturating_mul(tick_hz as u64) / 1000;
    ticks.max(1) as u32
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb {
    let chroma = value * saturation;
    let section = hue / 60.0;
    let x = chroma * (1.0 - (section % 2.0 - 1.0).abs());
    let (r, g, b) = match section as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    Rgb::new(
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dividers of 1 so each tick advances the phase.
    fn engine() -> LedEngine {
        LedEngine::new(
            &LedSettings {
                knight_rider_interval_ms: 50,
                party_interval_ms: 50,
                solid_color: Rgb::new(0, 0, 255),
            },
            20,
        )
    }

    fn lit_index(frame: &FrameBuffer) -> usize {
        frame
            .iter()
            .position(|p| *p != BLACK)
            .expect("no lit pixel in frame")
    }

    #[test]
    fn knight_rider_sweeps_back_and_forth() {
        let mut e = engine();
        e.set_effect(Effect::KnightRider);

        let positions: Vec<usize> = (0..12).map(|_| lit_index(&e.tick())).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5, 4, 3, 2, 1, 0, 1]);
    }

    #[test]
    fn effects_are_mutually_exclusive_and_restart_phase() {
        let mut e = engine();
        e.set_effect(Effect::KnightRider);
        for _ in 0..4 {
            e.tick();
        }
        assert_eq!(e.set_effect(Effect::Party), Effect::Party);
        assert_eq!(e.active_effect(), Effect::Party);
        assert_eq!(e.phase(), 0);
    }

    #[test]
    fn reselecting_active_effect_toggles_off() {
        let mut e = engine();
        e.set_effect(Effect::Party);
        assert_eq!(e.set_effect(Effect::Party), Effect::Off);
    }

    #[test]
    fn overlay_round_trip_pauses_phase() {
        let mut e = engine();
        e.set_effect(Effect::KnightRider);
        for _ in 0..3 {
            e.tick();
        }
        let phase_before = e.phase();

        e.push_overlay(Overlay::DistanceWarning(Band::Warning));
        for _ in 0..5 {
            let frame = e.tick();
            assert_eq!(frame[2], YELLOW);
            assert_eq!(frame[3], YELLOW);
            assert_eq!(frame[0], BLACK);
        }
        assert_eq!(e.phase(), phase_before, "phase must pause under overlay");

        e.pop_overlay();
        assert_eq!(e.active_effect(), Effect::KnightRider);
        // Rendering continues from the paused phase.
        assert_eq!(lit_index(&e.tick()), knight_rider_position(phase_before));
    }

    #[test]
    fn second_push_keeps_first_save_and_retints() {
        let mut e = engine();
        e.set_effect(Effect::KnightRider);
        e.push_overlay(Overlay::DistanceWarning(Band::Warning));
        e.push_overlay(Overlay::DistanceWarning(Band::Critical));
        assert_eq!(e.tick()[2], RED);

        e.pop_overlay();
        assert_eq!(e.active_effect(), Effect::KnightRider);
    }

    #[test]
    fn set_effect_during_overlay_survives_pop() {
        let mut e = engine();
        e.set_effect(Effect::KnightRider);
        e.push_overlay(Overlay::DistanceWarning(Band::Critical));
        e.set_effect(Effect::Party);
        e.pop_overlay();
        assert_eq!(e.active_effect(), Effect::Party);
    }

    #[test]
    fn force_off_clears_overlay_and_save_slot() {
        let mut e = engine();
        e.set_effect(Effect::Party);
        e.push_overlay(Overlay::DistanceWarning(Band::Warning));
        e.force_off();
        assert_eq!(e.active_effect(), Effect::Off);
        assert!(!e.overlay_active());
        assert_eq!(e.tick(), [BLACK; NUM_UNDERLIGHTS]);

        // A later pop must not resurrect the old effect.
        e.pop_overlay();
        assert_eq!(e.active_effect(), Effect::Off);
    }

    #[test]
    fn solid_fills_the_strip() {
        let mut e = engine();
        let blue = Rgb::new(0, 0, 255);
        e.set_effect(Effect::Solid(blue));
        assert_eq!(e.tick(), [blue; NUM_UNDERLIGHTS]);
    }

    #[test]
    fn party_rotates_hue_across_pixels() {
        let mut e = engine();
        e.set_effect(Effect::Party);
        let first = e.tick();
        let second = e.tick();
        // Adjacent pixels differ and the wheel advances between frames.
        assert_ne!(first[0], first[1]);
        assert_ne!(first[0], second[0]);
    }
}
