//! Single FM operator
//!
//! Sine phase accumulator with a phase-modulation input. Frequency
//! comes from the note ratio (or a fixed frequency) plus detune in
//! cents; the keyboard scaling attenuates level above middle C.

use core::f32::consts::TAU;

use br_core::FmOperatorPatch;

/// Phase-modulation depth of a full-scale modulator, in radians.
pub const MOD_INDEX: f32 = TAU;

#[derive(Debug, Clone, Copy, Default)]
pub struct Operator {
    phase: f32,
    increment: f32,
    /// Static level gain: patch level x keyboard scaling.
    pub gain: f32,
    /// Last output for feedback taps.
    pub output: f32,
}

impl Operator {
    /// Configure for a note. `note` is a fractional MIDI note.
    pub fn setup(&mut self, patch: &FmOperatorPatch, note: f32, sample_rate: f32) {
        let freq = if patch.fixed {
            patch.fixed_freq
        } else {
            br_core::note_to_freq(note) * patch.ratio.max(0.01)
        };
        let detuned = freq * 2.0f32.powf(patch.detune / 1200.0);
        self.increment = (detuned / sample_rate).min(0.5);

        // Keyboard level scaling: attenuate per octave above middle C.
        let octaves_up = ((note - 60.0) / 12.0).max(0.0);
        let scaling = (1.0 - patch.key_scaling.clamp(0.0, 1.0) * octaves_up * 0.25).max(0.0);
        self.gain = (patch.level.clamp(0.0, 99.0) / 99.0) * scaling;
    }

    /// Retune without resetting phase (legato slide).
    pub fn retune(&mut self, patch: &FmOperatorPatch, note: f32, sample_rate: f32) {
        let gain = self.gain;
        self.setup(patch, note, sample_rate);
        self.gain = gain;
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.output = 0.0;
    }

    /// Render one sample given the summed modulation input (already in
    /// output units) and the envelope value.
    #[inline]
    pub fn render(&mut self, modulation: f32, envelope: f32) -> f32 {
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.output = (self.phase * TAU + modulation * MOD_INDEX).sin() * self.gain * envelope;
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_tracks_ratio() {
        let patch = FmOperatorPatch {
            ratio: 2.0,
            ..Default::default()
        };
        let mut op = Operator::default();
        op.setup(&patch, 69.0, 48000.0);
        // 880 Hz at 48 kHz.
        assert!((op.increment - 880.0 / 48000.0).abs() < 1e-6);
    }

    #[test]
    fn fixed_mode_ignores_note() {
        let patch = FmOperatorPatch {
            fixed: true,
            fixed_freq: 1000.0,
            ..Default::default()
        };
        let mut a = Operator::default();
        let mut b = Operator::default();
        a.setup(&patch, 40.0, 48000.0);
        b.setup(&patch, 90.0, 48000.0);
        assert_eq!(a.increment, b.increment);
    }

    #[test]
    fn unmodulated_operator_is_a_sine() {
        let patch = FmOperatorPatch::default();
        let mut op = Operator::default();
        op.setup(&patch, 69.0, 48000.0);

        let mut peak = 0.0f32;
        for _ in 0..4800 {
            peak = peak.max(op.render(0.0, 1.0).abs());
        }
        assert!(peak <= 1.0 + 1e-6);
        assert!(peak > 0.95);
    }
}
