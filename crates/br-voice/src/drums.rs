//! Analog-style drum kernels
//!
//! Kick, snare and hat models driven by four macro parameters (0..100)
//! and a velocity. The OUT bus voicing leans 808 (long, boomy, soft
//! attack); the AUX voicing leans 909 (punchy, clicky, fast sweep).
//! Each kernel is an autonomous mono generator that retires itself when
//! its envelope drops below the silence floor.

use core::f32::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use br_core::{MacroParams, OutputBus, StereoSample};
use br_dsp::svf::Svf;

use crate::{VoiceKernel, SILENCE_FLOOR};

/// One-pole exponential decay with a time constant in seconds.
#[derive(Debug, Clone, Copy)]
struct DecayEnv {
    value: f32,
    coeff: f32,
}

impl DecayEnv {
    fn new(time_s: f32, sample_rate: f32) -> Self {
        let samples = (time_s.max(0.001) * sample_rate).max(1.0);
        Self {
            value: 1.0,
            coeff: (-1.0 / samples).exp(),
        }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        self.value *= self.coeff;
        self.value
    }
}

/// Analog kick: sine body with exponential pitch sweep, click
/// transient, tanh drive from TONE.
pub struct KickVoice {
    phase: f32,
    freq: f32,
    base_freq: f32,
    sweep_coeff: f32,
    amp: DecayEnv,
    click: DecayEnv,
    click_gain: f32,
    drive: f32,
    velocity: f32,
    sample_rate: f32,
}

impl KickVoice {
    pub fn new(macros: &MacroParams, bus: OutputBus, velocity: f32, sample_rate: f32) -> Self {
        let pitch = macros.pitch / 100.0;
        let decay = macros.decay / 100.0;
        let sweep = macros.extra / 100.0;
        let tone = macros.tone / 100.0;

        let (base_freq, decay_time, sweep_time, click_gain) = match bus {
            // 808: low fundamental, long tail, gentle click.
            OutputBus::Out => (
                35.0 + pitch * 45.0,
                0.08 + decay * decay * 1.6,
                0.04 + sweep * 0.08,
                0.1 + tone * 0.3,
            ),
            // 909: higher fundamental, snappy, hard click.
            OutputBus::Aux => (
                45.0 + pitch * 55.0,
                0.05 + decay * decay * 0.8,
                0.015 + sweep * 0.04,
                0.3 + tone * 0.7,
            ),
        };

        let sweep_depth = 2.0 + sweep * 6.0;
        let sweep_samples = (sweep_time * sample_rate).max(1.0);

        Self {
            phase: 0.0,
            freq: base_freq * sweep_depth,
            base_freq,
            sweep_coeff: (-1.0 / sweep_samples).exp(),
            amp: DecayEnv::new(decay_time, sample_rate),
            click: DecayEnv::new(0.003, sample_rate),
            click_gain,
            drive: 1.0 + tone * 3.0,
            velocity,
            sample_rate,
        }
    }
}

impl VoiceKernel for KickVoice {
    fn render(&mut self) -> StereoSample {
        // Pitch falls exponentially toward the resting fundamental.
        self.freq = self.base_freq + (self.freq - self.base_freq) * self.sweep_coeff;
        self.phase += self.freq / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let body = (2.0 * PI * self.phase).sin() * self.amp.next();
        let click = self.click.next() * self.click_gain;
        let sample = ((body + click) * self.drive).tanh() * self.velocity;
        StereoSample::mono(sample)
    }

    fn is_active(&self) -> bool {
        self.amp.value > SILENCE_FLOOR
    }
}

/// Analog snare: two detuned body partials plus bandpass noise with its
/// own snappy envelope. SNAP balances noise against body.
pub struct SnareVoice {
    phase1: f32,
    phase2: f32,
    freq1: f32,
    freq2: f32,
    body_env: DecayEnv,
    noise_env: DecayEnv,
    noise_gain: f32,
    body_gain: f32,
    bandpass: Svf,
    rng: ChaCha8Rng,
    velocity: f32,
    sample_rate: f32,
}

impl SnareVoice {
    pub fn new(macros: &MacroParams, bus: OutputBus, velocity: f32, sample_rate: f32) -> Self {
        let pitch = macros.pitch / 100.0;
        let decay = macros.decay / 100.0;
        let snap = macros.extra / 100.0;
        let tone = macros.tone / 100.0;

        let (f1, detune, body_time, noise_time) = match bus {
            OutputBus::Out => (150.0 + pitch * 120.0, 1.78, 0.06 + decay * 0.35, 0.05 + decay * 0.3),
            OutputBus::Aux => (170.0 + pitch * 140.0, 1.47, 0.04 + decay * 0.2, 0.07 + decay * 0.35),
        };

        let mut bandpass = Svf::new();
        bandpass.set_cutoff(1500.0 + tone * 6000.0, 1.5, sample_rate);

        Self {
            phase1: 0.0,
            phase2: 0.0,
            freq1: f1,
            freq2: f1 * detune,
            body_env: DecayEnv::new(body_time, sample_rate),
            noise_env: DecayEnv::new(noise_time, sample_rate),
            noise_gain: 0.3 + snap * 0.7,
            body_gain: 1.0 - snap * 0.5,
            bandpass,
            rng: ChaCha8Rng::seed_from_u64(0x534e_4152),
            velocity,
            sample_rate,
        }
    }
}

impl VoiceKernel for SnareVoice {
    fn render(&mut self) -> StereoSample {
        self.phase1 = (self.phase1 + self.freq1 / self.sample_rate).fract();
        self.phase2 = (self.phase2 + self.freq2 / self.sample_rate).fract();

        let body = ((2.0 * PI * self.phase1).sin() + 0.6 * (2.0 * PI * self.phase2).sin())
            * self.body_env.next()
            * self.body_gain;

        let noise = self.rng.gen::<f32>() * 2.0 - 1.0;
        let filtered = self.bandpass.bandpass(noise);
        let snap = filtered * self.noise_env.next() * self.noise_gain * 2.0;

        StereoSample::mono((body + snap).tanh() * self.velocity)
    }

    fn is_active(&self) -> bool {
        self.body_env.value > SILENCE_FLOOR || self.noise_env.value > SILENCE_FLOOR
    }
}

/// Metallic hat: six square-ish partials through a highpass, with
/// NOISINESS blending white noise over the partial stack.
pub struct HatVoice {
    phases: [f32; 6],
    freqs: [f32; 6],
    amp: DecayEnv,
    highpass: Svf,
    noise_mix: f32,
    rng: ChaCha8Rng,
    velocity: f32,
    sample_rate: f32,
}

/// Classic metallic partial ratios for the 808 cymbal stack.
const HAT_RATIOS: [f32; 6] = [1.0, 1.52, 1.60, 1.80, 2.23, 3.21];

impl HatVoice {
    pub fn new(macros: &MacroParams, bus: OutputBus, velocity: f32, sample_rate: f32) -> Self {
        let pitch = macros.pitch / 100.0;
        let decay = macros.decay / 100.0;
        let noisiness = macros.extra / 100.0;
        let tone = macros.tone / 100.0;

        let (base, decay_time) = match bus {
            OutputBus::Out => (263.0 + pitch * 200.0, 0.03 + decay * decay * 0.9),
            OutputBus::Aux => (290.0 + pitch * 240.0, 0.02 + decay * decay * 0.6),
        };

        let mut freqs = [0.0; 6];
        for (f, r) in freqs.iter_mut().zip(HAT_RATIOS.iter()) {
            *f = base * r;
        }

        let mut highpass = Svf::new();
        highpass.set_cutoff(5000.0 + tone * 6000.0, 1.0, sample_rate);

        Self {
            phases: [0.0; 6],
            freqs,
            amp: DecayEnv::new(decay_time, sample_rate),
            highpass,
            noise_mix: noisiness,
            rng: ChaCha8Rng::seed_from_u64(0x4841_5421),
            velocity,
            sample_rate,
        }
    }
}

impl VoiceKernel for HatVoice {
    fn render(&mut self) -> StereoSample {
        let mut metal = 0.0;
        for (phase, freq) in self.phases.iter_mut().zip(self.freqs.iter()) {
            *phase = (*phase + freq / self.sample_rate).fract();
            metal += if *phase < 0.5 { 1.0 } else { -1.0 };
        }
        metal /= 6.0;

        let noise = self.rng.gen::<f32>() * 2.0 - 1.0;
        let source = metal * (1.0 - self.noise_mix) + noise * self.noise_mix;
        let bright = self.highpass.highpass(source);

        StereoSample::mono(bright * self.amp.next() * self.velocity)
    }

    fn is_active(&self) -> bool {
        self.amp.value > SILENCE_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_all(kernel: &mut dyn VoiceKernel, max: usize) -> Vec<f32> {
        let mut out = Vec::new();
        while kernel.is_active() && out.len() < max {
            out.push(kernel.render().left);
        }
        out
    }

    #[test]
    fn kick_decays_to_silence() {
        let macros = MacroParams::default();
        let mut kick = KickVoice::new(&macros, OutputBus::Out, 1.0, 48000.0);
        let out = render_all(&mut kick, 48000 * 8);
        assert!(!kick.is_active(), "kick should retire within 8 s");
        assert!(out.iter().any(|x| x.abs() > 0.1), "kick should be audible");
    }

    #[test]
    fn kick_pitch_sweeps_downward() {
        let macros = MacroParams {
            extra: 80.0,
            ..Default::default()
        };
        let mut kick = KickVoice::new(&macros, OutputBus::Aux, 1.0, 48000.0);
        let start_freq = kick.freq;
        for _ in 0..4800 {
            kick.render();
        }
        assert!(kick.freq < start_freq);
        assert!(kick.freq >= kick.base_freq * 0.99);
    }

    #[test]
    fn snare_snap_raises_noise_share() {
        let soft = MacroParams {
            extra: 0.0,
            ..Default::default()
        };
        let hard = MacroParams {
            extra: 100.0,
            ..Default::default()
        };
        let a = SnareVoice::new(&soft, OutputBus::Out, 1.0, 48000.0);
        let b = SnareVoice::new(&hard, OutputBus::Out, 1.0, 48000.0);
        assert!(b.noise_gain > a.noise_gain);
        assert!(b.body_gain < a.body_gain);
    }

    #[test]
    fn open_hat_outlives_closed() {
        let closed = MacroParams {
            decay: 10.0,
            ..Default::default()
        };
        let open = MacroParams {
            decay: 90.0,
            ..Default::default()
        };
        let mut a = HatVoice::new(&closed, OutputBus::Out, 1.0, 48000.0);
        let mut b = HatVoice::new(&open, OutputBus::Out, 1.0, 48000.0);
        let short = render_all(&mut a, 48000 * 4).len();
        let long = render_all(&mut b, 48000 * 4).len();
        assert!(long > short * 2, "open {long} vs closed {short}");
    }
}
