//! Global clock
//!
//! One tempo drives both pattern surfaces; each surface has its own bar
//! length, so the shared `step_counter` wraps differently per surface
//! (polymeter). Swing shifts trigger timing of odd steps only: the
//! step grid itself never moves.

use serde::{Deserialize, Serialize};

/// Sequencer resolution: sixteenth notes.
pub const STEPS_PER_BEAT: u32 = 4;

/// The two pattern surfaces sharing the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Surface {
    /// Drum surface.
    Baeng,
    /// Synth surface.
    Raembl,
}

/// Tempo state shared by the scheduler and both surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    bpm: f32,
    swing: f32,
    baeng_bar_length: u8,
    raembl_bar_length: u8,
}

impl Clock {
    pub fn new(bpm: f32) -> Self {
        Self {
            bpm: bpm.clamp(20.0, 300.0),
            swing: 0.0,
            baeng_bar_length: 1,
            raembl_bar_length: 1,
        }
    }

    pub fn set_bpm(&mut self, bpm: f32) {
        self.bpm = bpm.clamp(20.0, 300.0);
    }

    #[inline]
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn set_swing(&mut self, swing: f32) {
        self.swing = swing.clamp(0.0, 100.0);
    }

    #[inline]
    pub fn swing(&self) -> f32 {
        self.swing
    }

    pub fn set_bar_length(&mut self, surface: Surface, bars: u8) {
        let bars = bars.clamp(1, 128);
        match surface {
            Surface::Baeng => self.baeng_bar_length = bars,
            Surface::Raembl => self.raembl_bar_length = bars,
        }
    }

    pub fn bar_length(&self, surface: Surface) -> u8 {
        match surface {
            Surface::Baeng => self.baeng_bar_length,
            Surface::Raembl => self.raembl_bar_length,
        }
    }

    /// Step duration in seconds.
    #[inline]
    pub fn step_duration(&self) -> f64 {
        60.0 / self.bpm as f64 / STEPS_PER_BEAT as f64
    }

    /// Step duration in samples at a given rate.
    #[inline]
    pub fn step_duration_samples(&self, sample_rate: f32) -> f64 {
        self.step_duration() * sample_rate as f64
    }

    /// Swing delay for a step, in seconds. Odd steps are delayed by
    /// `(stepDuration / 2) · (swing / 100)`; even steps are untouched.
    #[inline]
    pub fn swing_offset(&self, step_counter: u64) -> f64 {
        if step_counter % 2 == 1 {
            self.step_duration() * 0.5 * self.swing as f64 / 100.0
        } else {
            0.0
        }
    }

    /// Position of a step within the surface's bar:
    /// `stepCounter mod (stepsPerBeat · barLength)`.
    #[inline]
    pub fn step_in_bar(&self, step_counter: u64, surface: Surface) -> u32 {
        let bar_steps = STEPS_PER_BEAT as u64 * self.bar_length(surface) as u64;
        (step_counter % bar_steps) as u32
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(120.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_duration_at_120() {
        let clock = Clock::new(120.0);
        assert!((clock.step_duration() - 0.125).abs() < 1e-12);
    }

    #[test]
    fn swing_delays_odd_steps_only() {
        let mut clock = Clock::new(120.0);
        clock.set_swing(50.0);
        assert_eq!(clock.swing_offset(0), 0.0);
        assert!((clock.swing_offset(1) - 0.125 * 0.5 * 0.5).abs() < 1e-12);
        assert_eq!(clock.swing_offset(2), 0.0);
    }

    #[test]
    fn polymetric_bar_positions() {
        let mut clock = Clock::default();
        clock.set_bar_length(Surface::Baeng, 4);
        clock.set_bar_length(Surface::Raembl, 12);

        // Step 16 wraps on the four-beat surface, not the twelve-beat one.
        assert_eq!(clock.step_in_bar(16, Surface::Baeng), 0);
        assert_eq!(clock.step_in_bar(16, Surface::Raembl), 16);
        assert_eq!(clock.step_in_bar(48, Surface::Raembl), 0);
    }

    #[test]
    fn bpm_clamped() {
        let clock = Clock::new(10.0);
        assert_eq!(clock.bpm(), 20.0);
    }
}
