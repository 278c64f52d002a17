//! 2-pole state-variable filter
//!
//! Chamberlin topology producing lowpass, bandpass and highpass
//! simultaneously each tick. The frequency coefficient is clamped to
//! 0.497 to keep the integrator loop stable at high cutoffs.

use br_core::Sample;

/// Simultaneous filter outputs for one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvfOutputs {
    pub lowpass: Sample,
    pub bandpass: Sample,
    pub highpass: Sample,
}

/// State-variable filter
#[derive(Debug, Clone, Default)]
pub struct Svf {
    f: f32,
    damp: f32,
    low: f32,
    band: f32,
}

impl Svf {
    pub fn new() -> Self {
        let mut svf = Self::default();
        svf.set_frequency_q(0.1, 0.707);
        svf
    }

    /// `frequency` is normalized (cutoff / sample rate); `q` the usual
    /// resonance quality.
    pub fn set_frequency_q(&mut self, frequency: f32, q: f32) {
        self.f = (2.0 * (core::f32::consts::PI * frequency).sin()).min(0.497);
        self.damp = (1.0 / q.max(0.5)).min(2.0);
    }

    /// Convenience for Hz input.
    pub fn set_cutoff(&mut self, cutoff_hz: f32, q: f32, sample_rate: f32) {
        self.set_frequency_q(cutoff_hz / sample_rate, q);
    }

    #[inline]
    pub fn process(&mut self, input: Sample) -> SvfOutputs {
        self.low += self.f * self.band;
        let high = input - self.low - self.damp * self.band;
        self.band += self.f * high;

        SvfOutputs {
            lowpass: self.low,
            bandpass: self.band,
            highpass: high,
        }
    }

    #[inline]
    pub fn lowpass(&mut self, input: Sample) -> Sample {
        self.process(input).lowpass
    }

    #[inline]
    pub fn highpass(&mut self, input: Sample) -> Sample {
        self.process(input).highpass
    }

    #[inline]
    pub fn bandpass(&mut self, input: Sample) -> Sample {
        self.process(input).bandpass
    }

    pub fn reset(&mut self) {
        self.low = 0.0;
        self.band = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|x| x * x).sum::<f32>() / buf.len() as f32).sqrt()
    }

    #[test]
    fn lowpass_attenuates_high_frequency() {
        let sr = 48000.0;
        let mut svf = Svf::new();
        svf.set_cutoff(500.0, 0.707, sr);

        let mut low_out = Vec::new();
        let mut high_out = Vec::new();
        for i in 0..4800 {
            let t = i as f32 / sr;
            let low = (2.0 * core::f32::consts::PI * 100.0 * t).sin();
            let high = (2.0 * core::f32::consts::PI * 8000.0 * t).sin();
            let out = svf.process(low + high);
            low_out.push(out.lowpass);
            high_out.push(out.highpass);
        }

        // Low band keeps the 100 Hz component, high band keeps 8 kHz.
        assert!(rms(&low_out[960..]) > 0.5);
        assert!(rms(&high_out[960..]) > 0.5);
    }

    #[test]
    fn coefficient_clamped_for_stability() {
        let mut svf = Svf::new();
        svf.set_frequency_q(0.45, 0.707);
        let mut peak = 0.0f32;
        for i in 0..48000 {
            let out = svf.process(if i == 0 { 1.0 } else { 0.0 });
            peak = peak.max(out.lowpass.abs());
        }
        assert!(peak.is_finite() && peak < 10.0);
    }
}
