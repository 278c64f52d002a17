//! Phase-vocoder frame transformer
//!
//! Operates on one half-spectrum per frame: magnitude texture banks with
//! position crossfade, spectral warp, pitch shift, glitch variants,
//! magnitude quantisation and 16-bit phase resynthesis through a sine
//! LUT. Freeze suspends analysis while the synthesis phase accumulators
//! keep running, which is what turns a held frame into a drone instead
//! of a buzz.

use core::f32::consts::PI;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::stft::FrameTransformer;

/// Texture slices in the slab, including the phase slice.
pub const NUM_TEXTURES: usize = 7;

/// Magnitude textures available for the position crossfade.
pub const MAG_TEXTURES: usize = NUM_TEXTURES - 1;

/// Bins forced to zero at the top of the spectrum.
pub const HIGH_FREQUENCY_TRUNCATION: usize = 16;

/// Frames of direct readout before the textures are trusted.
const PRIMING_FRAMES: u32 = 8;

/// Sine LUT length; cos is the sine index + 256.
const LUT_SIZE: usize = 1024;

/// Spectral warp polynomial rows, `[a, b, c, d]` with
/// `g(f) = d + f·(c + f·(b + a·f))`. Every row maps 0→0 and 1→1. The
/// fifth row is duplicated; the row blend clamps with `min(idx + 1, 5)`
/// so the sweep parks on it at full warp.
const WARP_POLY: [[f32; 4]; 6] = [
    [0.0, 0.0, 1.0, 0.0],
    [0.0, -0.6, 1.6, 0.0],
    [0.4, -1.6, 2.2, 0.0],
    [-2.0, 3.0, 0.0, 0.0],
    [3.2, -4.8, 2.6, 0.0],
    [3.2, -4.8, 2.6, 0.0],
];

/// Per-frame control input.
#[derive(Debug, Clone, Copy)]
pub struct VocoderParams {
    /// Texture readout position, 0..1.
    pub position: f32,
    /// Spectral pitch ratio (1.0 = unchanged).
    pub pitch_ratio: f32,
    /// Warp amount, 0..1.
    pub warp: f32,
    /// Quantisation amount; below 0.48 quantises, above 0.52 warps the
    /// normalised magnitude curve, the middle band is neutral.
    pub quantization: f32,
    /// Phase randomisation; inert below 0.05.
    pub phase_randomization: f32,
    /// Texture write feedback, 0..1.
    pub feedback: f32,
    pub glitch: bool,
    pub freeze: bool,
}

impl Default for VocoderParams {
    fn default() -> Self {
        Self {
            position: 0.0,
            pitch_ratio: 1.0,
            warp: 0.0,
            quantization: 0.5,
            phase_randomization: 0.0,
            feedback: 0.0,
            glitch: false,
            freeze: false,
        }
    }
}

/// Magnitude texture slab.
///
/// Layout note: conceptually this is NUM_TEXTURES contiguous slices of
/// `size` f32 words. The final slice never holds magnitudes: its
/// 4·size bytes are reused as the two u16 phase arrays (analysis phase
/// and phase delta), which fit exactly because
/// `size_of::<f32>() == 2 · size_of::<u16>()`. The fields below keep
/// that reuse explicit instead of transmuting.
struct TextureBank {
    /// MAG_TEXTURES slices of `size` magnitudes each.
    magnitudes: Vec<f32>,
    /// Analysis/synthesis phase accumulators, one per bin.
    phase: Vec<u16>,
    /// Last analysis phase delta, two's-complement wrapped.
    phase_delta: Vec<u16>,
    size: usize,
}

const _: () = assert!(core::mem::size_of::<f32>() == 2 * core::mem::size_of::<u16>());

impl TextureBank {
    fn new(size: usize) -> Self {
        Self {
            magnitudes: vec![0.0; MAG_TEXTURES * size],
            phase: vec![0; size],
            phase_delta: vec![0; size],
            size,
        }
    }

    #[inline]
    fn slice(&self, index: usize) -> &[f32] {
        &self.magnitudes[index * self.size..(index + 1) * self.size]
    }

    #[inline]
    fn slice_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.magnitudes[index * self.size..(index + 1) * self.size]
    }
}

/// The frame transformer itself. One instance per spectral voice;
/// everything is allocated at construction.
pub struct PhaseVocoder {
    pub params: VocoderParams,
    /// Half-spectrum bin count (N/2).
    bins: usize,
    /// Bins actually processed (bins - truncation).
    active: usize,
    textures: TextureBank,
    /// Scratch magnitudes for the current frame.
    mags: Vec<f32>,
    /// Resampling scratch shared by warp, pitch shift and glitch.
    scratch: Vec<f32>,
    /// Spectral-hold buffer for glitch variant 0.
    held: Vec<f32>,
    sine_lut: Vec<f32>,
    priming: u32,
    rng: ChaCha8Rng,
}

impl PhaseVocoder {
    /// `bins` is the half-spectrum length (FFT size / 2).
    pub fn new(bins: usize, seed: u64) -> Self {
        assert!(bins > HIGH_FREQUENCY_TRUNCATION * 2, "spectrum too short");
        let active = bins - HIGH_FREQUENCY_TRUNCATION;

        let sine_lut = (0..LUT_SIZE)
            .map(|i| (2.0 * PI * i as f32 / LUT_SIZE as f32).sin())
            .collect();

        Self {
            params: VocoderParams::default(),
            bins,
            active,
            textures: TextureBank::new(active),
            mags: vec![0.0; active],
            scratch: vec![0.0; active],
            held: vec![0.0; active],
            sine_lut,
            priming: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn reset(&mut self) {
        self.textures.magnitudes.fill(0.0);
        self.textures.phase.fill(0);
        self.textures.phase_delta.fill(0);
        self.held.fill(0.0);
        self.priming = 0;
    }

    /// Texture slice pair and crossfade fraction for a position.
    #[inline]
    fn texture_indices(position: f32) -> (usize, usize, f32) {
        let pos = position.clamp(0.0, 1.0) * (MAG_TEXTURES - 1) as f32;
        let t0 = (pos as usize).min(MAG_TEXTURES - 1);
        let t1 = (t0 + 1).min(MAG_TEXTURES - 1);
        (t0, t1, pos - t0 as f32)
    }

    /// Blend the frame's magnitudes into the two textures nearest the
    /// position. Three feedback regimes: slow evolution at high
    /// feedback, attenuated crossfade in the middle, probabilistic
    /// whole-bin replacement below 0.5. The two regimes above 0.5 meet
    /// at gain 0.5 so the sweep has no seam.
    fn store_magnitudes(&mut self, position: f32, feedback: f32) {
        let (t0, t1, frac) = Self::texture_indices(position);
        let weights = [(t0, 1.0 - frac), (t1, frac)];

        if self.priming < PRIMING_FRAMES {
            for &(t, _) in &weights {
                self.textures.slice_mut(t).copy_from_slice(&self.mags);
            }
            return;
        }

        if feedback >= 0.5 {
            let gain = if feedback >= 0.75 {
                (1.0 - feedback) * 2.0
            } else {
                1.0 - (feedback - 0.5) * 2.0
            };
            for &(t, w) in &weights {
                if w <= f32::EPSILON {
                    continue;
                }
                let g = gain * w;
                let slice = self.textures.slice_mut(t);
                for (tex, &mag) in slice.iter_mut().zip(self.mags.iter()) {
                    *tex += (mag - *tex) * g;
                }
            }
        } else {
            // Bernoulli whole-bin replacement; the threshold rises with
            // feedback so high settings keep more of the old texture.
            let threshold = ((2.0 * feedback) * (2.0 * feedback) * 65535.0) as u32;
            for i in 0..self.mags.len() {
                if (self.rng.next_u32() & 0xFFFF) >= threshold {
                    let mag = self.mags[i];
                    for &(t, _) in &weights {
                        self.textures.slice_mut(t)[i] = mag;
                    }
                }
            }
        }
    }

    /// Equal-power crossfade readout of the two textures nearest the
    /// position.
    fn read_magnitudes(&mut self, position: f32) {
        let (t0, t1, frac) = Self::texture_indices(position);
        let w0 = (frac * PI * 0.5).cos();
        let w1 = (frac * PI * 0.5).sin();
        let (a, b) = (self.textures.slice(t0), self.textures.slice(t1));
        for i in 0..self.mags.len() {
            self.mags[i] = a[i] * w0 + b[i] * w1;
        }
    }

    /// Cubic warp of the magnitude axis: interpolate a polynomial row
    /// pair, evaluate g(f) per bin, resample linearly.
    fn warp(&mut self, amount: f32) {
        if amount <= f32::EPSILON {
            return;
        }
        let idx_f = amount.clamp(0.0, 1.0) * 5.0;
        let idx = (idx_f as usize).min(5);
        let next = (idx + 1).min(5);
        let frac = idx_f - idx as f32;

        let mut coeffs = [0.0f32; 4];
        for (c, (lo, hi)) in coeffs
            .iter_mut()
            .zip(WARP_POLY[idx].iter().zip(WARP_POLY[next].iter()))
        {
            *c = lo + (hi - lo) * frac;
        }
        let [a, b, c, d] = coeffs;

        let size = self.active as f32;
        self.scratch.copy_from_slice(&self.mags);
        for i in 0..self.active {
            let f = i as f32 / size;
            let g = d + f * (c + f * (b + a * f));
            self.mags[i] = interp_linear(&self.scratch, g.clamp(0.0, 1.0) * size);
        }
    }

    /// Spectral pitch shift. Expansion reads interpolated source bins at
    /// a stepped index; compression splats each source bin into a
    /// destination pair with fractional weights.
    fn pitch_shift(&mut self, ratio: f32) {
        if (ratio - 1.0).abs() <= 1e-4 {
            return;
        }
        self.scratch.copy_from_slice(&self.mags);

        if ratio > 1.0 {
            let step = 1.0 / ratio;
            for i in 0..self.active {
                self.mags[i] = interp_linear(&self.scratch, i as f32 * step);
            }
        } else {
            self.mags.fill(0.0);
            for i in 0..self.active {
                let pos = i as f32 * ratio;
                let j = pos as usize;
                let frac = pos - j as f32;
                if j < self.active {
                    self.mags[j] += self.scratch[i] * (1.0 - frac);
                }
                if j + 1 < self.active {
                    self.mags[j + 1] += self.scratch[i] * frac;
                }
            }
        }
    }

    fn glitch(&mut self) {
        match self.rng.gen_range(0..4u8) {
            0 => self.glitch_hold(),
            1 => self.glitch_shift(),
            2 => Self::glitch_kill_max(&mut self.mags),
            3 => self.glitch_random_highpass(),
            _ => unreachable!(),
        }
    }

    /// Spectral hold: the held frame grows by 1.01x per pass and roughly
    /// one bin in sixteen is re-sampled from the live spectrum.
    fn glitch_hold(&mut self) {
        for i in 0..self.active {
            if (self.rng.next_u32() & 0xF) == 0 {
                self.held[i] = self.mags[i];
            }
            self.mags[i] = self.held[i];
            self.held[i] *= 1.01;
        }
    }

    /// Spectral shift by 1 + rand(0..7)/4, reading with wrap.
    fn glitch_shift(&mut self) {
        let shift = 1.0 + self.rng.gen_range(0..8u8) as f32 / 4.0;
        self.scratch.copy_from_slice(&self.mags);
        for i in 0..self.active {
            let src = (i as f32 * shift) as usize % self.active;
            self.mags[i] = self.scratch[src];
        }
    }

    /// Zero the max bin, then boost the new max by 8. The second pass
    /// rescans from zero, so the boosted bin is the former runner-up -
    /// the original max stays silent. Kept exactly so.
    fn glitch_kill_max(mags: &mut [f32]) {
        let mut max_val = 0.0f32;
        let mut max_idx = 0usize;
        for (i, &m) in mags.iter().enumerate() {
            if m > max_val {
                max_val = m;
                max_idx = i;
            }
        }
        mags[max_idx] = 0.0;

        let mut max_val = 0.0f32;
        let mut max_idx = 0usize;
        for (i, &m) in mags.iter().enumerate() {
            if m > max_val {
                max_val = m;
                max_idx = i;
            }
        }
        mags[max_idx] *= 8.0;
    }

    /// Random high-pass: roughly one bin in sixteen scaled by i/16
    /// (capped at unity), which silences random low bins.
    fn glitch_random_highpass(&mut self) {
        for i in 0..self.active {
            if (self.rng.next_u32() & 0xF) == 0 {
                self.mags[i] *= (i as f32 / 16.0).min(1.0);
            }
        }
    }

    /// Magnitude quantisation. Below 0.48 the magnitudes snap to a grid
    /// whose step opens up as the amount approaches the centre; above
    /// 0.52 the normalised curve is warped by x' = 4x(1-x)^3. The band
    /// between is neutral.
    fn quantize(&mut self, amount: f32) {
        if amount <= 0.48 {
            let spread = 1.0 - (2.0 * amount) * (2.0 * amount);
            let step = 0.5 * (-108.0 * spread).exp2() / (2 * self.bins) as f32;
            if step > f32::MIN_POSITIVE {
                for m in self.mags.iter_mut() {
                    *m = (*m / step).floor() * step;
                }
            }
        } else if amount >= 0.52 {
            let max = self.mags.iter().cloned().fold(0.0f32, f32::max);
            if max > 0.0 {
                for m in self.mags.iter_mut() {
                    let x = *m / max;
                    *m = 4.0 * x * (1.0 - x).powi(3) * max;
                }
            }
        }
    }
}

impl FrameTransformer for PhaseVocoder {
    fn process(&mut self, real: &mut [f32], imag: &mut [f32]) {
        debug_assert_eq!(real.len(), self.bins);
        let p = self.params;

        // DC never survives analysis or synthesis.
        real[0] = 0.0;
        imag[0] = 0.0;

        if !p.freeze {
            for i in 0..self.active {
                let (re, im) = (real[i], imag[i]);
                self.mags[i] = (re * re + im * im).sqrt();

                let phase = (((im.atan2(re) + PI) / (2.0 * PI) * 65536.0) as u32 & 0xFFFF) as u16;
                self.textures.phase_delta[i] = phase.wrapping_sub(self.textures.phase[i]);
                self.textures.phase[i] = phase;
            }
            self.store_magnitudes(p.position, p.feedback);
        }

        if p.freeze || self.priming >= PRIMING_FRAMES {
            self.read_magnitudes(p.position);
        } else {
            self.priming += 1;
        }

        self.warp(p.warp);
        self.pitch_shift(p.pitch_ratio);
        if p.glitch {
            self.glitch();
        }
        self.quantize(p.quantization);

        // Phase resynthesis: emit the accumulator, then advance it by the
        // analysis delta scaled by the pitch ratio (signed, mod 65536).
        let randomize = p.phase_randomization > 0.05;
        let rand_amount = if randomize {
            let a = ((p.phase_randomization - 0.05) * 1.06).clamp(0.0, 1.0);
            a * a * 32768.0
        } else {
            0.0
        };

        for i in 0..self.active {
            let mut syn = self.textures.phase[i];
            let advance =
                ((self.textures.phase_delta[i] as i16 as f32) * p.pitch_ratio).floor() as i32;
            self.textures.phase[i] = ((syn as i32 + advance) & 0xFFFF) as u16;

            if randomize {
                let offset =
                    ((self.rng.next_u32() & 0xFFFF) as f32 / 65536.0 - 0.5) * 2.0 * rand_amount;
                syn = ((syn as i32 + offset as i32) & 0xFFFF) as u16;
            }

            let idx = (syn >> 6) as usize & (LUT_SIZE - 1);
            imag[i] = self.mags[i] * self.sine_lut[idx];
            real[i] = self.mags[i] * self.sine_lut[(idx + 256) & (LUT_SIZE - 1)];
        }

        for i in self.active..self.bins {
            real[i] = 0.0;
            imag[i] = 0.0;
        }
    }
}

#[inline]
fn interp_linear(data: &[f32], pos: f32) -> f32 {
    let i = pos as usize;
    if i + 1 >= data.len() {
        return *data.last().unwrap_or(&0.0);
    }
    let frac = pos - i as f32;
    data[i] + (data[i + 1] - data[i]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_max_boosts_runner_up() {
        let mut mags = vec![0.1, 0.9, 0.3, 0.6, 0.2];
        PhaseVocoder::glitch_kill_max(&mut mags);
        assert_eq!(mags[1], 0.0);
        assert!((mags[3] - 4.8).abs() < 1e-6);
    }

    #[test]
    fn warp_zero_is_identity() {
        let mut pv = PhaseVocoder::new(512, 1);
        for (i, m) in pv.mags.iter_mut().enumerate() {
            *m = i as f32;
        }
        let before = pv.mags.clone();
        pv.warp(0.0);
        assert_eq!(pv.mags, before);
    }

    #[test]
    fn warp_rows_share_endpoints() {
        for row in WARP_POLY {
            let [a, b, c, d] = row;
            let g1 = d + 1.0 * (c + 1.0 * (b + a));
            assert!(d.abs() < 1e-6, "g(0) != 0");
            assert!((g1 - 1.0).abs() < 1e-6, "g(1) != 1 for {row:?}");
        }
        assert_eq!(WARP_POLY[4], WARP_POLY[5]);
    }

    #[test]
    fn quantize_centre_band_is_neutral() {
        let mut pv = PhaseVocoder::new(512, 1);
        for (i, m) in pv.mags.iter_mut().enumerate() {
            *m = (i % 17) as f32 * 0.01;
        }
        let before = pv.mags.clone();
        pv.quantize(0.5);
        assert_eq!(pv.mags, before);
    }

    #[test]
    fn quantize_high_normalises_by_max() {
        let mut pv = PhaseVocoder::new(512, 1);
        pv.mags.fill(0.0);
        pv.mags[3] = 2.0;
        pv.mags[4] = 0.5;
        pv.quantize(1.0);
        // x = 1 at the max bin maps to zero; the smaller bin survives.
        assert_eq!(pv.mags[3], 0.0);
        assert!(pv.mags[4] > 0.0);
    }

    #[test]
    fn pitch_down_conserves_energy() {
        let mut pv = PhaseVocoder::new(512, 1);
        pv.mags.fill(1.0);
        let sum_before: f32 = pv.mags.iter().sum();
        pv.pitch_shift(0.5);
        let sum_after: f32 = pv.mags.iter().sum();
        // The splat accumulates every source bin somewhere below.
        assert!((sum_after - sum_before).abs() / sum_before < 0.02);
    }

    #[test]
    fn phase_delta_wraps_two_complement() {
        let mut pv = PhaseVocoder::new(512, 1);
        // Pitch ratio 0 pins the accumulator so only the analysis step
        // touches the phase words.
        pv.params.pitch_ratio = 0.0;
        let bins = pv.bins;
        let mut re = vec![0.0f32; bins];
        let mut im = vec![0.0f32; bins];

        // Two frames of a bin rotating backwards through the wrap point.
        re[10] = 1.0;
        im[10] = 0.001;
        pv.process(&mut re.clone(), &mut im.clone());
        re[10] = 1.0;
        im[10] = -0.001;
        pv.process(&mut re, &mut im);
        let delta = pv.textures.phase_delta[10] as i16;
        assert!(delta.abs() < 1024, "delta {delta} should be small, not ~65535");
    }

    #[test]
    fn freeze_keeps_advancing_synthesis_phase() {
        let mut pv = PhaseVocoder::new(512, 1);
        pv.textures.phase_delta[5] = 100;
        pv.textures.phase[5] = 0;
        pv.params.freeze = true;
        pv.params.pitch_ratio = 1.0;

        let mut re = vec![0.0f32; pv.bins];
        let mut im = vec![0.0f32; pv.bins];
        pv.process(&mut re, &mut im);
        assert_eq!(pv.textures.phase[5], 100);
        let mut re2 = vec![0.0f32; pv.bins];
        let mut im2 = vec![0.0f32; pv.bins];
        pv.process(&mut re2, &mut im2);
        assert_eq!(pv.textures.phase[5], 200);
        // Frozen frames never touch the stored delta.
        assert_eq!(pv.textures.phase_delta[5], 100);
    }
}
