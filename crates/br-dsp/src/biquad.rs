//! Biquad filter, Transposed Direct Form II
//!
//! TDF-II keeps quantization noise low and stays stable when
//! coefficients move under modulation.

use core::f32::consts::PI;

use br_core::Sample;

use crate::{MonoProcessor, Processor};

/// Biquad coefficients
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    fn from_rbj(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    pub fn lowpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::from_rbj(
            (1.0 - cos) / 2.0,
            1.0 - cos,
            (1.0 - cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    pub fn highpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::from_rbj(
            (1.0 + cos) / 2.0,
            -(1.0 + cos),
            (1.0 + cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    /// Constant 0 dB peak gain bandpass
    pub fn bandpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::from_rbj(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    pub fn peaking(freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * q);
        Self::from_rbj(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }
}

/// TDF-II biquad
#[derive(Debug, Clone, Default)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
    sample_rate: f32,
}

impl BiquadTDF2 {
    pub fn new(sample_rate: f32) -> Self {
        let mut biquad = Self {
            sample_rate,
            ..Default::default()
        };
        biquad.set_lowpass(20000.0, 0.707);
        biquad
    }

    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn set_lowpass(&mut self, freq: f32, q: f32) {
        self.coeffs = BiquadCoeffs::lowpass(freq, q, self.sample_rate);
    }

    pub fn set_highpass(&mut self, freq: f32, q: f32) {
        self.coeffs = BiquadCoeffs::highpass(freq, q, self.sample_rate);
    }

    pub fn set_bandpass(&mut self, freq: f32, q: f32) {
        self.coeffs = BiquadCoeffs::bandpass(freq, q, self.sample_rate);
    }

    pub fn set_peaking(&mut self, freq: f32, q: f32, gain_db: f32) {
        self.coeffs = BiquadCoeffs::peaking(freq, q, gain_db, self.sample_rate);
    }
}

impl Processor for BiquadTDF2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTDF2 {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let c = self.coeffs;
        let out = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * out + self.z2;
        self.z2 = c.b2 * input - c.a2 * out;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms_at(filter: &mut BiquadTDF2, freq: f32, sample_rate: f32) -> f32 {
        filter.reset();
        let mut sum = 0.0;
        let n = 9600;
        for i in 0..n * 2 {
            let x = (2.0 * PI * freq * i as f32 / sample_rate).sin();
            let y = filter.process_sample(x);
            if i >= n {
                sum += y * y;
            }
        }
        (sum / n as f32).sqrt()
    }

    #[test]
    fn lowpass_passes_low_blocks_high() {
        let sr = 48000.0;
        let mut f = BiquadTDF2::new(sr);
        f.set_lowpass(1000.0, 0.707);
        let low = rms_at(&mut f, 100.0, sr);
        let high = rms_at(&mut f, 10000.0, sr);
        assert!(low > 0.6);
        assert!(high < 0.1);
    }

    #[test]
    fn highpass_mirrors() {
        let sr = 48000.0;
        let mut f = BiquadTDF2::new(sr);
        f.set_highpass(1000.0, 0.707);
        assert!(rms_at(&mut f, 100.0, sr) < 0.1);
        assert!(rms_at(&mut f, 10000.0, sr) > 0.6);
    }
}
