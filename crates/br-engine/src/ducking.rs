//! Sidechain ducking
//!
//! Voices flagged as duck sources feed an envelope follower; the
//! resulting gain `1 - depth · env` (floored at zero) rides the
//! reverb, delay and clouds return buses with independent depths.

use br_core::Sample;
use br_dsp::dynamics::EnvelopeFollower;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuckDepths {
    pub reverb: f32,
    pub delay: f32,
    pub clouds: f32,
}

impl Default for DuckDepths {
    fn default() -> Self {
        Self {
            reverb: 0.0,
            delay: 0.0,
            clouds: 0.0,
        }
    }
}

pub struct Ducker {
    follower: EnvelopeFollower,
    depths: DuckDepths,
    /// Last computed per-bus gains.
    gains: (f32, f32, f32),
}

impl Ducker {
    pub fn new(sample_rate: f32) -> Self {
        let mut follower = EnvelopeFollower::new(sample_rate);
        follower.set_times(5.0, 180.0);
        Self {
            follower,
            depths: DuckDepths::default(),
            gains: (1.0, 1.0, 1.0),
        }
    }

    pub fn set_depths(&mut self, depths: DuckDepths) {
        self.depths = DuckDepths {
            reverb: depths.reverb.clamp(0.0, 1.0),
            delay: depths.delay.clamp(0.0, 1.0),
            clouds: depths.clouds.clamp(0.0, 1.0),
        };
    }

    pub fn set_release_ms(&mut self, release_ms: f32) {
        self.follower.set_times(5.0, release_ms.clamp(20.0, 1000.0));
    }

    /// Feed one block of the summed sidechain signal and compute the
    /// per-bus gains.
    pub fn analyze(&mut self, sidechain: &[Sample]) {
        let mut env = 0.0;
        for &x in sidechain {
            env = self.follower.process(x);
        }
        self.gains = (
            (1.0 - self.depths.reverb * env).max(0.0),
            (1.0 - self.depths.delay * env).max(0.0),
            (1.0 - self.depths.clouds * env).max(0.0),
        );
    }

    pub fn reverb_gain(&self) -> f32 {
        self.gains.0
    }

    pub fn delay_gain(&self) -> f32 {
        self.gains.1
    }

    pub fn clouds_gain(&self) -> f32 {
        self.gains.2
    }

    /// Apply a gain to a return bus.
    pub fn apply(gain: f32, left: &mut [Sample], right: &mut [Sample]) {
        if gain >= 1.0 {
            return;
        }
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l *= gain;
            *r *= gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_sidechain_ducks_returns() {
        let mut ducker = Ducker::new(48000.0);
        ducker.set_depths(DuckDepths {
            reverb: 0.8,
            delay: 0.5,
            clouds: 0.0,
        });

        let loud = vec![0.9f32; 4800];
        ducker.analyze(&loud);

        assert!(ducker.reverb_gain() < 0.5);
        assert!(ducker.delay_gain() < 0.7);
        assert_eq!(ducker.clouds_gain(), 1.0);
    }

    #[test]
    fn gain_floors_at_zero() {
        let mut ducker = Ducker::new(48000.0);
        ducker.set_depths(DuckDepths {
            reverb: 1.0,
            delay: 0.0,
            clouds: 0.0,
        });
        let very_loud = vec![2.0f32; 9600];
        ducker.analyze(&very_loud);
        assert!(ducker.reverb_gain() >= 0.0);
    }

    #[test]
    fn silence_recovers() {
        let mut ducker = Ducker::new(48000.0);
        ducker.set_depths(DuckDepths {
            reverb: 1.0,
            delay: 1.0,
            clouds: 1.0,
        });
        ducker.analyze(&vec![0.9f32; 4800]);
        assert!(ducker.reverb_gain() < 0.3);

        for _ in 0..20 {
            ducker.analyze(&vec![0.0f32; 4800]);
        }
        assert!(ducker.reverb_gain() > 0.9);
    }
}
