//! Sample and slice playback
//!
//! Linear-interpolated pitched playback of pre-decoded mono PCM with a
//! one-pole decay envelope and the macro filter curve: bypass at 50,
//! lowpass sweeping 4 kHz down to 200 Hz below it, highpass sweeping
//! 200 Hz up to 4 kHz above it. SLICE playback restricts the playhead
//! to `[start, end)`: the end bound is exclusive.

use std::sync::Arc;

use br_core::{MacroParams, Sample, StereoSample};
use br_dsp::biquad::BiquadTDF2;
use br_dsp::MonoProcessor;

use crate::{VoiceKernel, SILENCE_FLOOR};

/// Macro filter setting derived from the 0..100 pitch-axis value.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FilterMode {
    Bypass,
    Lowpass(f32),
    Highpass(f32),
}

/// Map the macro filter value: 50 is bypass, below sweeps a lowpass
/// 4 kHz → 200 Hz exponentially, above sweeps a highpass 200 Hz → 4 kHz.
fn filter_mode(value: f32) -> FilterMode {
    let v = value.clamp(0.0, 100.0);
    if (v - 50.0).abs() < 0.5 {
        FilterMode::Bypass
    } else if v < 50.0 {
        let t = (50.0 - v) / 50.0;
        FilterMode::Lowpass(4000.0 * (200.0f32 / 4000.0).powf(t))
    } else {
        let t = (v - 50.0) / 50.0;
        FilterMode::Highpass(200.0 * (4000.0f32 / 200.0).powf(t))
    }
}

/// Sample-playback voice. Slices are ordinary sample playback with a
/// restricted region.
pub struct SamplerVoice {
    pcm: Arc<Vec<Sample>>,
    /// Fractional playhead in frames.
    position: f64,
    /// Exclusive end of the playable region.
    end: usize,
    start: usize,
    ratio: f64,
    envelope: f32,
    env_coeff: f32,
    filter: Option<BiquadTDF2>,
    /// Samples to wait before the first frame (sub-block trigger
    /// alignment for ratchets and flams).
    delay_samples: u32,
    velocity: f32,
    finished: bool,
}

impl SamplerVoice {
    /// `region` bounds playback; pass `(0, pcm.len())` for the whole
    /// sample. Returns `None` when the region is empty: the trigger is
    /// dropped silently.
    pub fn new(
        pcm: Arc<Vec<Sample>>,
        region: (usize, usize),
        macros: &MacroParams,
        velocity: f32,
        delay_samples: u32,
        sample_rate: f32,
    ) -> Option<Self> {
        let (start, end) = region;
        let end = end.min(pcm.len());
        if start >= end {
            return None;
        }

        let semitones = (macros.pitch - 50.0) / 50.0 * 24.0;
        let ratio = 2.0f64.powf(semitones as f64 / 12.0);

        // Decay time constant in seconds.
        let tau = (macros.decay / 100.0 * 0.99).max(0.005);
        let env_coeff = (-1.0 / (tau * sample_rate)).exp();

        let filter = match filter_mode(macros.extra) {
            FilterMode::Bypass => None,
            FilterMode::Lowpass(freq) => {
                let mut f = BiquadTDF2::new(sample_rate);
                f.set_lowpass(freq, 0.707);
                Some(f)
            }
            FilterMode::Highpass(freq) => {
                let mut f = BiquadTDF2::new(sample_rate);
                f.set_highpass(freq, 0.707);
                Some(f)
            }
        };

        Some(Self {
            pcm,
            position: start as f64,
            end,
            start,
            ratio,
            envelope: 1.0,
            env_coeff,
            filter,
            delay_samples,
            velocity,
            finished: false,
        })
    }

    /// Current playhead frame for position reporting.
    pub fn playhead(&self) -> usize {
        self.position as usize
    }

    pub fn region(&self) -> (usize, usize) {
        (self.start, self.end)
    }
}

impl VoiceKernel for SamplerVoice {
    fn render(&mut self) -> StereoSample {
        if self.finished {
            return StereoSample::silence();
        }
        if self.delay_samples > 0 {
            self.delay_samples -= 1;
            return StereoSample::silence();
        }

        let index = self.position as usize;
        if index + 1 >= self.end {
            self.finished = true;
            return StereoSample::silence();
        }

        let frac = (self.position - index as f64) as f32;
        let a = self.pcm[index];
        let b = self.pcm[index + 1];
        let mut sample = (a + (b - a) * frac) * self.envelope * self.velocity;

        if let Some(filter) = self.filter.as_mut() {
            sample = filter.process_sample(sample);
        }

        self.envelope *= self.env_coeff;
        if self.envelope < SILENCE_FLOOR {
            self.finished = true;
        }
        self.position += self.ratio;

        StereoSample::mono(sample)
    }

    fn is_active(&self) -> bool {
        !self.finished
    }

    fn note_off(&mut self) {
        // Shorten the tail instead of cutting: a fast release coefficient
        // takes over from the decay.
        self.env_coeff = self.env_coeff.min(0.9995);
    }
}
