//! Saturation and waveshaping
//!
//! - Drive shapers (soft / medium / hard+fold) for the master bus
//! - Crunch: mid-band waveshaping between 400 Hz and 6 kHz
//! - Bit crusher with bit depth and rate reduction
//! - Tape saturator for the delay feedback path

use br_core::{DriveMode, Sample};

use crate::biquad::BiquadTDF2;
use crate::{MonoProcessor, Processor};

/// Soft algebraic clipper: `(π + k)·x / (π + k·|x|)`.
#[inline]
pub fn soft_clip(x: f32, k: f32) -> f32 {
    const PI: f32 = core::f32::consts::PI;
    (PI + k) * x / (PI + k * x.abs())
}

/// One reflection wavefold into [-1, 1].
#[inline]
pub fn fold(x: f32) -> f32 {
    if x > 1.0 {
        2.0 - x
    } else if x < -1.0 {
        -2.0 - x
    } else {
        x
    }
}

/// Static drive waveshaper with selectable curve.
#[derive(Debug, Clone)]
pub struct DriveShaper {
    mode: DriveMode,
    /// 0..1
    amount: f32,
}

impl DriveShaper {
    pub fn new() -> Self {
        Self {
            mode: DriveMode::Soft,
            amount: 0.0,
        }
    }

    pub fn set_mode(&mut self, mode: DriveMode) {
        self.mode = mode;
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn shape(&self, x: Sample) -> Sample {
        if self.amount <= 0.0 {
            return x;
        }
        match self.mode {
            DriveMode::Soft => soft_clip(x, self.amount * 200.0),
            DriveMode::Medium => {
                let k = 1.0 + self.amount * 9.0;
                (x * k).tanh() / k.tanh().max(1e-3)
            }
            DriveMode::Hard => {
                let boosted = x * (1.0 + self.amount * 6.0);
                fold(boosted.clamp(-2.0, 2.0))
            }
        }
    }
}

impl Default for DriveShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for DriveShaper {
    fn reset(&mut self) {}
}

impl MonoProcessor for DriveShaper {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.shape(input)
    }
}

/// Mid-band crunch: isolate 400 Hz – 6 kHz, waveshape it, blend the
/// difference back by amount.
#[derive(Debug, Clone)]
pub struct CrunchShaper {
    highpass: BiquadTDF2,
    lowpass: BiquadTDF2,
    amount: f32,
}

impl CrunchShaper {
    pub fn new(sample_rate: f32) -> Self {
        let mut highpass = BiquadTDF2::new(sample_rate);
        let mut lowpass = BiquadTDF2::new(sample_rate);
        highpass.set_highpass(400.0, 0.707);
        lowpass.set_lowpass(6000.0, 0.707);
        Self {
            highpass,
            lowpass,
            amount: 0.0,
        }
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(0.0, 1.0);
    }
}

impl Processor for CrunchShaper {
    fn reset(&mut self) {
        self.highpass.reset();
        self.lowpass.reset();
    }
}

impl MonoProcessor for CrunchShaper {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        if self.amount <= 0.0 {
            return input;
        }
        let mid = self.lowpass.process_sample(self.highpass.process_sample(input));
        let shaped = (mid * (1.0 + self.amount * 8.0)).tanh();
        input + (shaped - mid) * self.amount
    }
}

/// Bit depth and sample-rate reduction.
#[derive(Debug, Clone)]
pub struct BitCrusher {
    bits: f32,
    /// Rate divisor; 1 = no reduction.
    downsample: u32,
    counter: u32,
    held: Sample,
}

impl BitCrusher {
    pub fn new() -> Self {
        Self {
            bits: 16.0,
            downsample: 1,
            counter: 0,
            held: 0.0,
        }
    }

    /// `amount` 0..1 sweeps 16 bits down to ~2 bits with rising rate
    /// reduction.
    pub fn set_amount(&mut self, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        self.bits = 16.0 - amount * 14.0;
        self.downsample = 1 + (amount * amount * 31.0) as u32;
    }

    pub fn is_active(&self) -> bool {
        self.bits < 15.9 || self.downsample > 1
    }
}

impl Default for BitCrusher {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for BitCrusher {
    fn reset(&mut self) {
        self.counter = 0;
        self.held = 0.0;
    }
}

impl MonoProcessor for BitCrusher {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        if self.counter == 0 {
            let levels = 2.0f32.powf(self.bits - 1.0);
            self.held = (input * levels).round() / levels;
        }
        self.counter = (self.counter + 1) % self.downsample;
        self.held
    }
}

/// Tape-style saturator used in the delay feedback loop. Drive rises
/// with a cubic curve and output is compensated by `1/(1 + k·0.75)`.
#[derive(Debug, Clone, Copy)]
pub struct TapeSaturator {
    k: f32,
    compensation: f32,
}

impl TapeSaturator {
    pub fn new() -> Self {
        let mut s = Self {
            k: 0.0,
            compensation: 1.0,
        };
        s.set_amount(0.0);
        s
    }

    /// `amount` 0..100.
    pub fn set_amount(&mut self, amount: f32) {
        let a = amount.clamp(0.0, 100.0) / 100.0;
        self.k = a * a * a * 20.0;
        self.compensation = 1.0 / (1.0 + self.k * 0.75);
    }

    #[inline]
    pub fn shape(&self, x: Sample) -> Sample {
        if self.k <= 0.0 {
            return x;
        }
        (x * (1.0 + self.k)).tanh() * self.compensation
    }
}

impl Default for TapeSaturator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_clip_bounded_and_monotone() {
        let k = 200.0;
        let mut prev = f32::NEG_INFINITY;
        for i in -100..=100 {
            let x = i as f32 / 25.0;
            let y = soft_clip(x, k);
            assert!(y.abs() <= (core::f32::consts::PI + k) / k + 1e-3);
            assert!(y >= prev);
            prev = y;
        }
    }

    #[test]
    fn drive_zero_is_identity() {
        let shaper = DriveShaper::new();
        assert_eq!(shaper.shape(0.3), 0.3);
    }

    #[test]
    fn hard_mode_folds() {
        let mut shaper = DriveShaper::new();
        shaper.set_mode(DriveMode::Hard);
        shaper.set_amount(1.0);
        let y = shaper.shape(0.9);
        assert!(y.abs() <= 1.0 + 1e-6);
    }

    #[test]
    fn bitcrush_quantizes() {
        let mut crusher = BitCrusher::new();
        crusher.set_amount(1.0);
        let a = crusher.process_sample(0.41);
        let b = crusher.process_sample(0.43);
        // Second sample is held by the rate reduction.
        assert_eq!(a, b);
    }

    #[test]
    fn tape_compensation_keeps_level() {
        let mut sat = TapeSaturator::new();
        sat.set_amount(100.0);
        let y = sat.shape(0.5);
        assert!(y.abs() < 0.5, "compensated output below input, got {y}");
        assert!(y.abs() > 0.01);
    }
}
