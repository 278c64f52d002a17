//! Dynamics processors
//!
//! - Envelope follower with independent attack/release
//! - Feed-forward compressor (fixed 2:1 bus character)
//! - Transient shaper driven by a fast/slow follower pair
//! - Safety limiter for the end of the master chain

use br_core::{linear_to_db, Sample};

use crate::{MonoProcessor, Processor, StereoProcessor};

/// Envelope follower
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    sample_rate: f32,
}

impl EnvelopeFollower {
    pub fn new(sample_rate: f32) -> Self {
        let mut follower = Self {
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            sample_rate,
        };
        follower.set_times(10.0, 100.0);
        follower
    }

    /// Attack and release in milliseconds.
    pub fn set_times(&mut self, attack_ms: f32, release_ms: f32) {
        self.attack_coeff = (-1.0 / (attack_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (release_ms.max(0.01) * 0.001 * self.sample_rate)).exp();
    }

    #[inline]
    pub fn process(&mut self, input: Sample) -> f32 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = abs_input + coeff * (self.envelope - abs_input);
        self.envelope
    }

    #[inline]
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Simple feed-forward bus compressor: threshold -20 dB, ratio 2:1,
/// attack 5 ms, release 100 ms.
#[derive(Debug, Clone)]
pub struct Compressor {
    follower: EnvelopeFollower,
    threshold_db: f32,
    ratio: f32,
    enabled: bool,
    gain_reduction_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        let mut follower = EnvelopeFollower::new(sample_rate);
        follower.set_times(5.0, 100.0);
        Self {
            follower,
            threshold_db: -20.0,
            ratio: 2.0,
            enabled: true,
            gain_reduction_db: 0.0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.follower.reset();
        self.gain_reduction_db = 0.0;
    }
}

impl StereoProcessor for Compressor {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        if !self.enabled {
            self.gain_reduction_db = 0.0;
            return (left, right);
        }

        let link = left.abs().max(right.abs());
        let env_db = linear_to_db(self.follower.process(link));

        let over = env_db - self.threshold_db;
        self.gain_reduction_db = if over > 0.0 {
            over * (1.0 - 1.0 / self.ratio)
        } else {
            0.0
        };

        let gain = 10.0f32.powf(-self.gain_reduction_db / 20.0);
        (left * gain, right * gain)
    }
}

/// Transient shaper: gain = (fast / slow)^factor where factor maps the
/// 0..100 control to [-2, 2] (50 is neutral).
#[derive(Debug, Clone)]
pub struct TransientShaper {
    fast: EnvelopeFollower,
    slow: EnvelopeFollower,
    factor: f32,
}

impl TransientShaper {
    pub fn new(sample_rate: f32) -> Self {
        let mut fast = EnvelopeFollower::new(sample_rate);
        let mut slow = EnvelopeFollower::new(sample_rate);
        fast.set_times(1.0, 20.0);
        slow.set_times(40.0, 200.0);
        Self {
            fast,
            slow,
            factor: 0.0,
        }
    }

    /// `amount` 0..100, 50 neutral.
    pub fn set_amount(&mut self, amount: f32) {
        self.factor = 2.0 * (amount.clamp(0.0, 100.0) / 50.0 - 1.0);
    }

    pub fn is_neutral(&self) -> bool {
        self.factor.abs() < 1e-3
    }
}

impl Processor for TransientShaper {
    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
    }
}

impl MonoProcessor for TransientShaper {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let fast = self.fast.process(input).max(1e-6);
        let slow = self.slow.process(input).max(1e-6);
        if self.is_neutral() {
            return input;
        }
        let gain = (fast / slow).powf(self.factor).clamp(0.1, 8.0);
        input * gain
    }
}

/// Brickwall-style safety limiter: hard knee, 1 ms attack, 50 ms
/// release, fixed ceiling.
#[derive(Debug, Clone)]
pub struct Limiter {
    follower: EnvelopeFollower,
    ceiling: f32,
}

impl Limiter {
    pub fn new(sample_rate: f32, ceiling_db: f32) -> Self {
        let mut follower = EnvelopeFollower::new(sample_rate);
        follower.set_times(1.0, 50.0);
        Self {
            follower,
            ceiling: 10.0f32.powf(ceiling_db / 20.0),
        }
    }
}

impl Processor for Limiter {
    fn reset(&mut self) {
        self.follower.reset();
    }
}

impl StereoProcessor for Limiter {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let peak = left.abs().max(right.abs());
        let env = self.follower.process(peak).max(1e-9);
        let gain = if env > self.ceiling {
            self.ceiling / env
        } else {
            1.0
        };
        // Hard backstop for intra-attack overshoot.
        let l = (left * gain).clamp(-1.0, 1.0);
        let r = (right * gain).clamp(-1.0, 1.0);
        (l, r)
    }
}
