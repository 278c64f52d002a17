//! Shared voice post chain
//!
//! Every engine renders through the same tail: perceptual level curve,
//! optional bit crush, optional drive, equal-power pan, and the release
//! fade machinery (50 ms exponential stop fade, plus short linear fades
//! for voice stealing and cut groups). The engine fans the result out
//! to the direct/clouds crossfade, the reverb and delay sends, and the
//! sidechain tap.

use br_core::{pan_gains, Sample, StereoSample};
use br_dsp::saturation::{BitCrusher, DriveShaper};
use br_dsp::MonoProcessor;

/// Stop fades run to -80 dB.
const STOP_FLOOR: Sample = 1e-4;

/// Fade styles for voice teardown.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FadeKind {
    None,
    /// Exponential stop fade (50 ms to -80 dB).
    Stop { coeff: f32 },
    /// Linear ramp to zero over a fixed sample count.
    Linear { step: f32 },
}

pub struct PostChain {
    level: f32,
    pan_left: f32,
    pan_right: f32,
    crusher: Option<BitCrusher>,
    drive: Option<DriveShaper>,
    fade_gain: f32,
    fade: FadeKind,
    sample_rate: f32,
}

impl PostChain {
    /// `level` and `bit_crush`/`drive` are patch units 0..100, `pan` is
    /// -100..100.
    pub fn new(level: f32, pan: f32, bit_crush: f32, drive: f32, sample_rate: f32) -> Self {
        // Perceptual level: squared curve.
        let normalized = (level / 100.0).clamp(0.0, 1.0);
        let (pan_left, pan_right) = pan_gains(pan / 100.0);

        let crusher = (bit_crush > 0.0).then(|| {
            let mut c = BitCrusher::new();
            c.set_amount(bit_crush / 100.0);
            c
        });
        let drive = (drive > 0.0).then(|| {
            let mut d = DriveShaper::new();
            d.set_amount(drive / 100.0);
            d
        });

        Self {
            level: normalized * normalized,
            pan_left,
            pan_right,
            crusher,
            drive,
            fade_gain: 1.0,
            fade: FadeKind::None,
            sample_rate,
        }
    }

    /// Begin the 50 ms exponential stop fade.
    pub fn start_stop_fade(&mut self) {
        if matches!(self.fade, FadeKind::None) {
            let samples = 0.05 * self.sample_rate;
            // Reach -80 dB across the fade window.
            let coeff = (STOP_FLOOR.ln() / samples).exp();
            self.fade = FadeKind::Stop { coeff };
        }
    }

    /// Begin a linear fade over `ms` (voice stealing: 5 ms, cut group:
    /// 10 ms, generic mono replace: 1 ms).
    pub fn start_linear_fade(&mut self, ms: f32) {
        let samples = (ms.max(0.1) * 0.001 * self.sample_rate).max(1.0);
        self.fade = FadeKind::Linear {
            step: self.fade_gain / samples,
        };
    }

    /// True once a fade has run to silence.
    pub fn faded_out(&self) -> bool {
        self.fade_gain <= STOP_FLOOR
    }

    pub fn is_fading(&self) -> bool {
        !matches!(self.fade, FadeKind::None)
    }

    /// Process one frame through the chain.
    #[inline]
    pub fn process(&mut self, frame: StereoSample) -> StereoSample {
        let mut left = frame.left * self.level;
        let mut right = frame.right * self.level;

        if let Some(crusher) = self.crusher.as_mut() {
            left = crusher.process_sample(left);
            right = crusher.process_sample(right);
        }
        if let Some(drive) = self.drive.as_mut() {
            left = drive.process_sample(left);
            right = drive.process_sample(right);
        }

        match &mut self.fade {
            FadeKind::None => {}
            FadeKind::Stop { coeff } => {
                self.fade_gain = (self.fade_gain * *coeff).max(0.0);
            }
            FadeKind::Linear { step } => {
                self.fade_gain = (self.fade_gain - *step).max(0.0);
            }
        }

        StereoSample::new(
            left * self.pan_left * self.fade_gain,
            right * self.pan_right * self.fade_gain,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_curve_is_squared() {
        let mut chain = PostChain::new(50.0, 0.0, 0.0, 0.0, 48000.0);
        let out = chain.process(StereoSample::mono(1.0));
        // 0.5^2 * center pan (1/sqrt2).
        assert!((out.left - 0.25 * core::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn stop_fade_reaches_floor_in_50ms() {
        let mut chain = PostChain::new(100.0, 0.0, 0.0, 0.0, 48000.0);
        chain.start_stop_fade();
        for _ in 0..2600 {
            chain.process(StereoSample::mono(1.0));
        }
        assert!(chain.faded_out());
    }

    #[test]
    fn linear_fade_5ms() {
        let mut chain = PostChain::new(100.0, 0.0, 0.0, 0.0, 48000.0);
        chain.start_linear_fade(5.0);
        for _ in 0..240 {
            chain.process(StereoSample::mono(1.0));
        }
        assert!(chain.faded_out());
    }

    #[test]
    fn pan_full_left_silences_right() {
        let mut chain = PostChain::new(100.0, -100.0, 0.0, 0.0, 48000.0);
        let out = chain.process(StereoSample::mono(1.0));
        assert!(out.right.abs() < 1e-6);
        assert!(out.left > 0.99);
    }
}
