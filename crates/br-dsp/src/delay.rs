//! Tape-style delay
//!
//! Fixed 5-second line with dual wow/flutter modulation of the delay
//! time, saturation in the repeat path (crossfaded on change so a drive
//! tweak never clicks), compensation gain, feedback tapped after the
//! lowpass, and a cascade of non-audible visualisation taps at
//! `i · delay_time`.

use core::f32::consts::PI;

use br_core::{DelayPatch, Sample};

use crate::biquad::BiquadTDF2;
use crate::saturation::TapeSaturator;
use crate::smoothing::OnePole;
use crate::{MonoProcessor, Processor};

/// Longest supported delay in seconds.
pub const MAX_DELAY_SECONDS: f32 = 5.0;

/// Visualisation tap count limit.
pub const MAX_TAPS: usize = 8;

/// Saturation crossfade length in seconds.
const SAT_CROSSFADE_S: f32 = 0.25;

pub struct TapeDelay {
    buffer_l: Vec<Sample>,
    buffer_r: Vec<Sample>,
    write_pos: usize,
    max_samples: usize,

    delay_time: OnePole,
    target_delay: f32,

    wow_phase: f32,
    flutter_phase: f32,
    wow_rate: f32,
    flutter_rate: f32,
    /// Depths in samples.
    wow_depth: f32,
    flutter_depth: f32,

    sat_current: TapeSaturator,
    sat_next: TapeSaturator,
    /// Remaining crossfade samples; 0 when settled.
    sat_fade_remaining: usize,
    sat_fade_total: usize,

    lowpass_l: BiquadTDF2,
    lowpass_r: BiquadTDF2,
    feedback: f32,
    wet: f32,

    taps: usize,
    tap_levels: [f32; MAX_TAPS],

    sample_rate: f32,
}

impl TapeDelay {
    pub fn new(sample_rate: f32) -> Self {
        let max_samples = (MAX_DELAY_SECONDS * sample_rate) as usize;
        let mut delay = Self {
            buffer_l: vec![0.0; max_samples],
            buffer_r: vec![0.0; max_samples],
            write_pos: 0,
            max_samples,
            delay_time: OnePole::from_time(0.375 * sample_rate, 0.05, sample_rate),
            target_delay: 0.375 * sample_rate,
            wow_phase: 0.0,
            flutter_phase: 0.0,
            wow_rate: 0.3,
            flutter_rate: 6.0,
            wow_depth: 0.0,
            flutter_depth: 0.0,
            sat_current: TapeSaturator::new(),
            sat_next: TapeSaturator::new(),
            sat_fade_remaining: 0,
            sat_fade_total: (SAT_CROSSFADE_S * sample_rate) as usize,
            lowpass_l: BiquadTDF2::new(sample_rate),
            lowpass_r: BiquadTDF2::new(sample_rate),
            feedback: 0.35,
            wet: 1.0,
            taps: 3,
            tap_levels: [0.0; MAX_TAPS],
            sample_rate,
        };
        delay.lowpass_l.set_lowpass(6000.0, 0.707);
        delay.lowpass_r.set_lowpass(6000.0, 0.707);
        delay
    }

    /// Apply patch settings. A saturation change starts the shaper
    /// crossfade instead of switching in place.
    pub fn apply_patch(&mut self, patch: &DelayPatch) {
        self.target_delay =
            (patch.time.clamp(0.01, MAX_DELAY_SECONDS) * self.sample_rate).min(self.max_samples as f32 - 8.0);
        self.feedback = (patch.feedback / 100.0).clamp(0.0, 0.95);
        self.wet = (patch.wet / 100.0).clamp(0.0, 1.0);

        let wow = (patch.wow / 100.0).clamp(0.0, 1.0);
        self.wow_rate = 0.1 + wow * 0.4;
        self.wow_depth = wow * 5.0 * 0.001 * self.sample_rate;
        let flutter = (patch.flutter / 100.0).clamp(0.0, 1.0);
        self.flutter_rate = 4.0 + flutter * 4.0;
        self.flutter_depth = flutter * 1.0 * 0.001 * self.sample_rate;

        self.lowpass_l.set_lowpass(patch.filter.clamp(200.0, 18000.0), 0.707);
        self.lowpass_r.set_lowpass(patch.filter.clamp(200.0, 18000.0), 0.707);
        self.taps = (patch.taps as usize).min(MAX_TAPS);

        let mut next = TapeSaturator::new();
        next.set_amount(patch.saturation);
        if self.sat_fade_remaining == 0 {
            self.sat_next = next;
            self.sat_fade_remaining = self.sat_fade_total;
        } else {
            // Coalesce: retarget the in-flight fade.
            self.sat_next = next;
        }
    }

    /// Non-audible tap cascade levels for the display.
    pub fn tap_levels(&self) -> &[f32] {
        &self.tap_levels[..self.taps]
    }

    #[inline]
    fn read(buffer: &[Sample], write_pos: usize, max: usize, delay: f32) -> Sample {
        let pos = write_pos as f32 + max as f32 - delay;
        let i = pos as usize;
        let frac = pos - i as f32;
        let a = buffer[i % max];
        let b = buffer[(i + 1) % max];
        a + (b - a) * frac
    }

    /// Render the wet signal in place.
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        let wow_inc = 2.0 * PI * self.wow_rate / self.sample_rate;
        let flutter_inc = 2.0 * PI * self.flutter_rate / self.sample_rate;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let modulation = self.wow_depth * self.wow_phase.sin()
                + self.flutter_depth * self.flutter_phase.sin();
            let delay = (self.delay_time.next(self.target_delay) + modulation)
                .clamp(1.0, self.max_samples as f32 - 2.0);

            let dl = Self::read(&self.buffer_l, self.write_pos, self.max_samples, delay);
            let dr = Self::read(&self.buffer_r, self.write_pos, self.max_samples, delay);

            let (sl, sr) = if self.sat_fade_remaining > 0 {
                let t = 1.0 - self.sat_fade_remaining as f32 / self.sat_fade_total as f32;
                self.sat_fade_remaining -= 1;
                if self.sat_fade_remaining == 0 {
                    self.sat_current = self.sat_next;
                }
                (
                    self.sat_current.shape(dl) * (1.0 - t) + self.sat_next.shape(dl) * t,
                    self.sat_current.shape(dr) * (1.0 - t) + self.sat_next.shape(dr) * t,
                )
            } else {
                (self.sat_current.shape(dl), self.sat_current.shape(dr))
            };

            let fl = self.lowpass_l.process_sample(sl);
            let fr = self.lowpass_r.process_sample(sr);

            self.buffer_l[self.write_pos] = *l + fl * self.feedback;
            self.buffer_r[self.write_pos] = *r + fr * self.feedback;
            self.write_pos = (self.write_pos + 1) % self.max_samples;

            self.wow_phase = (self.wow_phase + wow_inc) % (2.0 * PI);
            self.flutter_phase = (self.flutter_phase + flutter_inc) % (2.0 * PI);

            *l = fl * self.wet;
            *r = fr * self.wet;
        }

        // Tap cascade, sampled once per block.
        let base = self.delay_time.value();
        for i in 0..self.taps {
            let d = (base * (i + 1) as f32).min(self.max_samples as f32 - 2.0);
            let tl = Self::read(&self.buffer_l, self.write_pos, self.max_samples, d);
            let tr = Self::read(&self.buffer_r, self.write_pos, self.max_samples, d);
            let level = (tl.abs() + tr.abs()) * 0.5;
            self.tap_levels[i] += (level - self.tap_levels[i]) * 0.2;
        }
    }

    pub fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
        self.tap_levels = [0.0; MAX_TAPS];
        self.lowpass_l.reset();
        self.lowpass_r.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_arrives_at_delay_time() {
        let sr = 48000.0;
        let mut delay = TapeDelay::new(sr);
        let patch = DelayPatch {
            time: 0.1,
            feedback: 0.0,
            saturation: 0.0,
            wow: 0.0,
            flutter: 0.0,
            wet: 100.0,
            ..Default::default()
        };
        delay.apply_patch(&patch);
        // Let the time smoother settle before the impulse.
        let mut warm_l = vec![0.0; 48000];
        let mut warm_r = vec![0.0; 48000];
        delay.process(&mut warm_l, &mut warm_r);

        let total = 9600;
        let mut left = vec![0.0f32; total];
        let mut right = vec![0.0f32; total];
        left[0] = 1.0;
        right[0] = 1.0;
        delay.process(&mut left, &mut right);

        let expected = (0.1 * sr) as usize;
        let peak = left
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            (peak as i64 - expected as i64).abs() <= 4,
            "echo at {peak}, expected ~{expected}"
        );
    }

    #[test]
    fn feedback_repeats_decay() {
        let sr = 48000.0;
        let mut delay = TapeDelay::new(sr);
        delay.apply_patch(&DelayPatch {
            time: 0.05,
            feedback: 50.0,
            wow: 0.0,
            flutter: 0.0,
            saturation: 0.0,
            wet: 100.0,
            ..Default::default()
        });
        let mut warm_l = vec![0.0; 24000];
        let mut warm_r = vec![0.0; 24000];
        delay.process(&mut warm_l, &mut warm_r);

        let mut left = vec![0.0f32; 24000];
        let mut right = vec![0.0f32; 24000];
        left[0] = 1.0;
        delay.process(&mut left, &mut right);

        let first = left[2400].abs().max(left[2401].abs());
        let second = left[4800].abs().max(left[4801].abs());
        assert!(first > 0.3);
        assert!(second > 0.05 && second < first);
    }
}
