//! Parameter smoothing
//!
//! Click-free parameter changes between the control and audio threads:
//! - Atomic targets (set from anywhere, consumed on the render thread)
//! - Exponential or linear ramps with configurable time
//! - Zero allocation on the render path

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use br_core::Sample;

/// Smoothing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingType {
    /// RC-style exponential approach
    #[default]
    Exponential,
    /// Constant-rate ramp
    Linear,
    /// Instant change
    None,
}

/// Lock-free smoothed parameter.
#[derive(Debug)]
pub struct SmoothedParam {
    target: AtomicU32,
    dirty: AtomicBool,
    current: f32,
    coeff: f32,
    smoothing_samples: f32,
    smoothing_type: SmoothingType,
    linear_step: f32,
    linear_remaining: i32,
    min_value: f32,
    max_value: f32,
}

impl SmoothedParam {
    pub fn new(
        initial_value: f32,
        smoothing_time_ms: f32,
        sample_rate: f32,
        smoothing_type: SmoothingType,
    ) -> Self {
        let smoothing_samples = smoothing_time_ms * 0.001 * sample_rate;
        Self {
            target: AtomicU32::new(initial_value.to_bits()),
            dirty: AtomicBool::new(false),
            current: initial_value,
            coeff: Self::coeff_for(smoothing_samples),
            smoothing_samples,
            smoothing_type,
            linear_step: 0.0,
            linear_remaining: 0,
            min_value: f32::NEG_INFINITY,
            max_value: f32::INFINITY,
        }
    }

    pub fn with_range(
        initial_value: f32,
        smoothing_time_ms: f32,
        sample_rate: f32,
        smoothing_type: SmoothingType,
        min: f32,
        max: f32,
    ) -> Self {
        let mut param = Self::new(initial_value, smoothing_time_ms, sample_rate, smoothing_type);
        param.min_value = min;
        param.max_value = max;
        param
    }

    /// Reach ~63% of the remaining distance per time constant.
    fn coeff_for(samples: f32) -> f32 {
        if samples <= 0.0 {
            1.0
        } else {
            1.0 - (-1.0 / samples).exp()
        }
    }

    /// Set a new target (any thread). Clamped to the declared range.
    pub fn set_target(&self, value: f32) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.target.store(clamped.to_bits(), Ordering::Relaxed);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn target(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Jump to a value with no ramp.
    pub fn set_immediate(&mut self, value: f32) {
        let clamped = value.clamp(self.min_value, self.max_value);
        self.target.store(clamped.to_bits(), Ordering::Relaxed);
        self.current = clamped;
        self.linear_remaining = 0;
        self.dirty.store(false, Ordering::Relaxed);
    }

    /// Advance one sample toward the target.
    #[inline]
    pub fn next(&mut self) -> Sample {
        let target = self.target();

        match self.smoothing_type {
            SmoothingType::None => {
                self.current = target;
            }
            SmoothingType::Exponential => {
                self.current += (target - self.current) * self.coeff;
                if (target - self.current).abs() < 1e-6 {
                    self.current = target;
                }
            }
            SmoothingType::Linear => {
                if self.dirty.swap(false, Ordering::Acquire) {
                    let samples = self.smoothing_samples.max(1.0);
                    self.linear_step = (target - self.current) / samples;
                    self.linear_remaining = samples as i32;
                }
                if self.linear_remaining > 0 {
                    self.current += self.linear_step;
                    self.linear_remaining -= 1;
                    if self.linear_remaining == 0 {
                        self.current = target;
                    }
                }
            }
        }
        self.current
    }

    /// Multiply a buffer by the evolving value.
    pub fn apply_gain(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample *= self.next();
        }
    }

    pub fn is_smoothing(&self) -> bool {
        (self.target() - self.current).abs() > 1e-6
    }
}

/// Plain one-pole smoother for audio-thread-internal state (the clouds
/// freeze envelope, ducking gains). No atomics; the owner is the only
/// writer.
#[derive(Debug, Clone, Copy)]
pub struct OnePole {
    state: f32,
    coeff: f32,
}

impl OnePole {
    pub fn new(initial: f32, coeff: f32) -> Self {
        Self {
            state: initial,
            coeff,
        }
    }

    /// Build from a time constant in seconds.
    pub fn from_time(initial: f32, time_s: f32, sample_rate: f32) -> Self {
        let samples = (time_s * sample_rate).max(1.0);
        Self::new(initial, 1.0 - (-1.0 / samples).exp())
    }

    #[inline]
    pub fn next(&mut self, target: f32) -> f32 {
        self.state += (target - self.state) * self.coeff;
        self.state
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.state
    }

    pub fn snap(&mut self, value: f32) {
        self.state = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_converges() {
        let mut p = SmoothedParam::new(0.0, 1.0, 48000.0, SmoothingType::Exponential);
        p.set_target(1.0);
        for _ in 0..48000 {
            p.next();
        }
        assert!((p.current() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn linear_hits_target_exactly() {
        let mut p = SmoothedParam::new(0.0, 1.0, 48000.0, SmoothingType::Linear);
        p.set_target(0.5);
        let samples = 48 + 1;
        for _ in 0..samples {
            p.next();
        }
        assert_eq!(p.current(), 0.5);
    }

    #[test]
    fn range_clamps_target() {
        let p = SmoothedParam::with_range(0.5, 1.0, 48000.0, SmoothingType::None, 0.0, 1.0);
        p.set_target(4.0);
        assert_eq!(p.target(), 1.0);
    }

    #[test]
    fn one_pole_freeze_coefficient() {
        // The clouds freeze envelope uses coefficient 0.0005; make sure
        // it crawls rather than jumps.
        let mut lp = OnePole::new(0.0, 0.0005);
        lp.next(1.0);
        assert!(lp.value() < 0.001);
        for _ in 0..20000 {
            lp.next(1.0);
        }
        assert!(lp.value() > 0.99);
    }
}
