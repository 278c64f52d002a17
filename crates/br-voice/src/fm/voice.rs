//! FM voice renderer
//!
//! Evaluates the active algorithm graph top-down each sample (operator
//! 6 first, so every modulator is computed before its targets), sums
//! carriers into a stereo mix via per-operator pan, and applies the
//! optional low-pass gate when the track gate is below 100%. Pitch
//! slides retune all operators without retriggering envelopes.

use br_core::{pan_gains, FmPatch, Sample, StereoSample};
use br_dsp::svf::Svf;

use super::algorithms::{Algorithm, NUM_OPERATORS};
use super::envelope::{OperatorEnvelope, PitchEnvelope};
use super::operator::Operator;
use crate::VoiceKernel;

/// Feedback scale at the maximum patch feedback setting (0..7).
const FEEDBACK_SCALE: f32 = 0.25;

pub struct FmVoice {
    algorithm: &'static Algorithm,
    operators: [Operator; NUM_OPERATORS],
    envelopes: [OperatorEnvelope; NUM_OPERATORS],
    pitch_envelope: PitchEnvelope,
    patch: FmPatch,
    /// Averaged feedback memory (two-sample, tames growl).
    feedback_state: [f32; 2],
    feedback_amount: f32,
    /// (left, right) carrier gains per operator.
    pans: [(f32, f32); NUM_OPERATORS],
    carrier_norm: f32,

    note: f32,
    /// Legato glide: remaining samples and per-sample semitone step.
    glide_remaining: u32,
    glide_step: f32,

    /// Low-pass gate, engaged when gate < 100%.
    lpg: Option<Svf>,
    lpg_env: f32,

    sample_rate: f32,
}

impl FmVoice {
    /// `ad_scale`/`release_scale` come from the RATE macro; velocity is
    /// 0..1.
    pub fn new(
        patch: FmPatch,
        note: f32,
        velocity: f32,
        ad_scale: f32,
        release_scale: f32,
        use_lpg: bool,
        sample_rate: f32,
    ) -> Self {
        let algorithm = Algorithm::get(patch.algorithm);

        let mut operators = [Operator::default(); NUM_OPERATORS];
        let mut pans = [(0.0, 0.0); NUM_OPERATORS];
        let envelopes = core::array::from_fn(|i| {
            let op = &patch.operators[i];
            operators[i].setup(op, note, sample_rate);
            pans[i] = pan_gains(op.pan);
            let velocity_gain = 1.0 - op.velocity_sens * (1.0 - velocity);
            OperatorEnvelope::new(
                &op.rates,
                &op.levels,
                velocity_gain,
                ad_scale,
                release_scale,
                sample_rate,
            )
        });

        let pitch_envelope =
            PitchEnvelope::new(&patch.pitch_env_rates, &patch.pitch_env_levels, sample_rate);

        let lpg = use_lpg.then(|| {
            let mut svf = Svf::new();
            svf.set_cutoff(120.0, 0.707, sample_rate);
            svf
        });

        Self {
            algorithm,
            operators,
            envelopes,
            pitch_envelope,
            feedback_state: [0.0; 2],
            feedback_amount: patch.feedback.clamp(0.0, 7.0) / 7.0 * FEEDBACK_SCALE,
            pans,
            carrier_norm: 1.0 / (algorithm.carrier_count() as f32).sqrt(),
            patch,
            note,
            glide_remaining: 0,
            glide_step: 0.0,
            lpg,
            lpg_env: 0.0,
            sample_rate,
        }
    }

    /// Legato pitch slide: glide to `target_note` over `glide_ms`
    /// without retriggering any envelope.
    pub fn pitch_slide(&mut self, target_note: f32, glide_ms: f32) {
        let samples = (glide_ms.max(1.0) * 0.001 * self.sample_rate) as u32;
        self.glide_remaining = samples.max(1);
        self.glide_step = (target_note - self.note) / self.glide_remaining as f32;
    }

    pub fn note(&self) -> f32 {
        self.note
    }

    fn retune_all(&mut self) {
        for i in 0..NUM_OPERATORS {
            self.operators[i].retune(&self.patch.operators[i], self.note, self.sample_rate);
        }
    }
}

impl VoiceKernel for FmVoice {
    fn render(&mut self) -> StereoSample {
        if self.glide_remaining > 0 {
            self.note += self.glide_step;
            self.glide_remaining -= 1;
            self.retune_all();
        }

        let pitch_offset = self.pitch_envelope.next();
        if pitch_offset.abs() > 1e-3 {
            // Pitch envelope modulates all ratio-tracking operators.
            let bent = self.note + pitch_offset;
            for i in 0..NUM_OPERATORS {
                if !self.patch.operators[i].fixed {
                    self.operators[i].retune(&self.patch.operators[i], bent, self.sample_rate);
                }
            }
        }

        // Top-down evaluation: operator 6 (index 5) renders first, so
        // all modulation sources are fresh when their targets run.
        let mut outputs = [0.0f32; NUM_OPERATORS];
        let mut left = 0.0;
        let mut right = 0.0;
        for i in (0..NUM_OPERATORS).rev() {
            let mut modulation: f32 = self
                .algorithm
                .mods[i]
                .iter()
                .map(|&source| outputs[source])
                .sum();

            if i == self.algorithm.feedback_op {
                modulation +=
                    (self.feedback_state[0] + self.feedback_state[1]) * 0.5 * self.feedback_amount;
            }

            let envelope = self.envelopes[i].next();
            let out = self.operators[i].render(modulation, envelope);
            outputs[i] = out;

            if i == self.algorithm.feedback_op {
                self.feedback_state[1] = self.feedback_state[0];
                self.feedback_state[0] = out;
            }

            if self.algorithm.is_carrier(i) {
                let (gl, gr) = self.pans[i];
                left += out * gl;
                right += out * gr;
            }
        }

        left *= self.carrier_norm;
        right *= self.carrier_norm;

        if let Some(lpg) = self.lpg.as_mut() {
            // The gate filter tracks the loudest carrier envelope.
            let drive = self
                .algorithm
                .carriers
                .iter()
                .enumerate()
                .filter(|(_, &c)| c)
                .map(|(i, _)| self.envelopes[i].value())
                .fold(0.0f32, f32::max);
            self.lpg_env += (drive - self.lpg_env) * 0.01;
            let cutoff = 120.0 + self.lpg_env * 12000.0;
            lpg.set_cutoff(cutoff.min(16000.0), 0.707, self.sample_rate);
            left = lpg.lowpass(left);
            // Single state filter; fold to mono through the gate.
            right = left;
        }

        StereoSample::new(left as Sample, right as Sample)
    }

    fn is_active(&self) -> bool {
        self.algorithm
            .carriers
            .iter()
            .enumerate()
            .any(|(i, &c)| c && !self.envelopes[i].finished())
    }

    fn note_off(&mut self) {
        for envelope in self.envelopes.iter_mut() {
            envelope.note_off();
        }
        self.pitch_envelope.note_off();
    }
}
