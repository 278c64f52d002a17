//! Master bus processor
//!
//! Single-block chain: input trim, drive waveshaper, mid-band crunch,
//! transient shaper, threshold-triggered boom oscillator, bus
//! compressor, damping lowpass, output gain and parallel dry/wet, with
//! the safety limiter at the very end.

use core::f32::consts::TAU;

use br_core::{db_to_linear, BusPatch, Sample};
use br_dsp::biquad::BiquadTDF2;
use br_dsp::dynamics::{Compressor, EnvelopeFollower, Limiter, TransientShaper};
use br_dsp::saturation::{CrunchShaper, DriveShaper};
use br_dsp::{MonoProcessor, Processor, StereoProcessor};

/// Boom trigger threshold on the low-band envelope.
const BOOM_THRESHOLD: f32 = 0.25;

/// Threshold-triggered sub-sine generator.
struct Boom {
    lowpass: BiquadTDF2,
    follower: EnvelopeFollower,
    phase: f32,
    envelope: f32,
    decay_coeff: f32,
    freq: f32,
    amount: f32,
    armed: bool,
    sample_rate: f32,
}

impl Boom {
    fn new(sample_rate: f32) -> Self {
        let mut lowpass = BiquadTDF2::new(sample_rate);
        lowpass.set_lowpass(120.0, 0.707);
        let mut follower = EnvelopeFollower::new(sample_rate);
        follower.set_times(2.0, 60.0);
        Self {
            lowpass,
            follower,
            phase: 0.0,
            envelope: 0.0,
            decay_coeff: 0.999,
            freq: 55.0,
            amount: 0.0,
            armed: true,
            sample_rate,
        }
    }

    fn configure(&mut self, patch: &BusPatch) {
        self.amount = (patch.boom / 100.0).clamp(0.0, 1.0);
        self.freq = patch.boom_freq.clamp(30.0, 90.0);
        let decay_s = 0.05 + (patch.boom_decay / 100.0) * 0.6;
        self.decay_coeff = (-1.0 / (decay_s * self.sample_rate)).exp();
    }

    #[inline]
    fn process(&mut self, mono_in: Sample) -> Sample {
        if self.amount <= 0.0 {
            return 0.0;
        }
        let low = self.lowpass.process_sample(mono_in);
        let env = self.follower.process(low);

        // Retrigger on a rising threshold crossing.
        if env > BOOM_THRESHOLD && self.armed {
            self.envelope = 1.0;
            self.phase = 0.0;
            self.armed = false;
        } else if env < BOOM_THRESHOLD * 0.5 {
            self.armed = true;
        }

        self.phase += self.freq / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.envelope *= self.decay_coeff;
        (self.phase * TAU).sin() * self.envelope * self.amount * 0.7
    }
}

pub struct MasterBus {
    input_trim: f32,
    drive_l: DriveShaper,
    drive_r: DriveShaper,
    crunch_l: CrunchShaper,
    crunch_r: CrunchShaper,
    transient_l: TransientShaper,
    transient_r: TransientShaper,
    boom: Boom,
    compressor: Compressor,
    dampen_l: BiquadTDF2,
    dampen_r: BiquadTDF2,
    dampen_active: bool,
    output_gain: f32,
    dry_wet: f32,
    limiter: Limiter,
}

impl MasterBus {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            input_trim: 1.0,
            drive_l: DriveShaper::new(),
            drive_r: DriveShaper::new(),
            crunch_l: CrunchShaper::new(sample_rate),
            crunch_r: CrunchShaper::new(sample_rate),
            transient_l: TransientShaper::new(sample_rate),
            transient_r: TransientShaper::new(sample_rate),
            boom: Boom::new(sample_rate),
            compressor: Compressor::new(sample_rate),
            dampen_l: BiquadTDF2::new(sample_rate),
            dampen_r: BiquadTDF2::new(sample_rate),
            dampen_active: false,
            output_gain: 1.0,
            dry_wet: 1.0,
            limiter: Limiter::new(sample_rate, -0.3),
        }
    }

    pub fn apply_patch(&mut self, patch: &BusPatch) {
        self.input_trim = db_to_linear(patch.input_trim.clamp(-12.0, 12.0));
        self.drive_l.set_mode(patch.drive_mode);
        self.drive_r.set_mode(patch.drive_mode);
        self.drive_l.set_amount(patch.drive / 100.0);
        self.drive_r.set_amount(patch.drive / 100.0);
        self.crunch_l.set_amount(patch.crunch / 100.0);
        self.crunch_r.set_amount(patch.crunch / 100.0);
        self.transient_l.set_amount(patch.transients);
        self.transient_r.set_amount(patch.transients);
        self.boom.configure(patch);
        self.compressor.set_enabled(patch.compressor_enabled);

        // Dampen sweeps 500 Hz to 30 kHz logarithmically; the top of
        // the range is effectively bypass.
        let t = (patch.dampen / 100.0).clamp(0.0, 1.0);
        let cutoff = 500.0 * (30000.0f32 / 500.0).powf(t);
        self.dampen_active = cutoff < 20000.0;
        if self.dampen_active {
            self.dampen_l.set_lowpass(cutoff, 0.707);
            self.dampen_r.set_lowpass(cutoff, 0.707);
        }

        self.output_gain = db_to_linear(patch.output_gain.clamp(-24.0, 24.0));
        self.dry_wet = (patch.dry_wet).clamp(0.0, 1.0);
    }

    /// Process the chain in place. The safety limiter is a separate
    /// call so the global send returns can join the bus after the
    /// chain but still pass through it.
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let dry_l = *l;
            let dry_r = *r;

            let mut wl = *l * self.input_trim;
            let mut wr = *r * self.input_trim;

            wl = self.drive_l.process_sample(wl);
            wr = self.drive_r.process_sample(wr);
            wl = self.crunch_l.process_sample(wl);
            wr = self.crunch_r.process_sample(wr);
            wl = self.transient_l.process_sample(wl);
            wr = self.transient_r.process_sample(wr);

            let boom = self.boom.process((wl + wr) * 0.5);
            wl += boom;
            wr += boom;

            let (cl, cr) = self.compressor.process_sample(wl, wr);
            wl = cl;
            wr = cr;

            if self.dampen_active {
                wl = self.dampen_l.process_sample(wl);
                wr = self.dampen_r.process_sample(wr);
            }

            wl *= self.output_gain;
            wr *= self.output_gain;

            // Parallel dry/wet mix.
            *l = dry_l + (wl - dry_l) * self.dry_wet;
            *r = dry_r + (wr - dry_r) * self.dry_wet;
        }
    }

    /// Final safety limiter; run after the send returns are mixed in.
    pub fn limit(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.limiter.process_sample(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    pub fn reset(&mut self) {
        self.crunch_l.reset();
        self.crunch_r.reset();
        self.transient_l.reset();
        self.transient_r.reset();
        self.compressor.reset();
        self.dampen_l.reset();
        self.dampen_r.reset();
        self.limiter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_patch_is_nearly_transparent() {
        let mut bus = MasterBus::new(48000.0);
        bus.apply_patch(&BusPatch::default());

        let mut left: Vec<f32> = (0..4800)
            .map(|i| 0.25 * (TAU * 330.0 * i as f32 / 48000.0).sin())
            .collect();
        let mut right = left.clone();
        let reference = left.clone();
        bus.process(&mut left, &mut right);

        let err: f32 = left[960..]
            .iter()
            .zip(&reference[960..])
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / 3840.0;
        assert!(err < 0.02, "neutral chain should pass audio, err {err}");
    }

    #[test]
    fn limiter_caps_hot_output() {
        let mut bus = MasterBus::new(48000.0);
        let mut patch = BusPatch::default();
        patch.output_gain = 24.0;
        bus.apply_patch(&patch);

        let mut left: Vec<f32> = (0..9600)
            .map(|i| 0.8 * (TAU * 100.0 * i as f32 / 48000.0).sin())
            .collect();
        let mut right = left.clone();
        bus.process(&mut left, &mut right);
        bus.limit(&mut left, &mut right);
        assert!(left.iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn boom_fires_on_low_transient() {
        let mut boom = Boom::new(48000.0);
        boom.configure(&BusPatch {
            boom: 100.0,
            boom_freq: 50.0,
            boom_decay: 50.0,
            ..Default::default()
        });

        // A loud low-frequency burst crosses the threshold.
        let mut fired = false;
        for i in 0..9600 {
            let x = if i < 2400 {
                0.9 * (TAU * 60.0 * i as f32 / 48000.0).sin()
            } else {
                0.0
            };
            if boom.process(x).abs() > 0.05 {
                fired = true;
            }
        }
        assert!(fired);
    }
}
