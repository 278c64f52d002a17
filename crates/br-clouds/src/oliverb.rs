//! Oliverb: modulated-allpass shimmer reverb
//!
//! A cross-coupled two-branch tank with LFO-modulated allpass reads,
//! one-pole low/high damping, and a dual-tap pitch shifter in the wet
//! loop for shimmer. Freeze turns the input off and opens the loop to
//! unity decay so the tank rings indefinitely.

use core::f32::consts::TAU;

use br_core::{CloudsParams, Sample};

use crate::soft_limit;

/// Shimmer pitch-shift window in samples.
const SHIMMER_WINDOW: f32 = 2048.0;

/// Base branch delays before size scaling.
const BRANCH_DELAYS: [usize; 2] = [2819, 3343];
const AP_DELAYS: [usize; 2] = [113, 241];

struct ModDelay {
    buffer: Vec<Sample>,
    write: usize,
}

impl ModDelay {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length],
            write: 0,
        }
    }

    #[inline]
    fn read_at(&self, delay: f32) -> Sample {
        let max = self.buffer.len() as f32;
        let delay = delay.clamp(1.0, max - 2.0);
        let pos = self.write as f32 + max - delay;
        let i = pos as usize;
        let frac = pos - i as f32;
        let a = self.buffer[i % self.buffer.len()];
        let b = self.buffer[(i + 1) % self.buffer.len()];
        a + (b - a) * frac
    }

    #[inline]
    fn write(&mut self, value: Sample) {
        self.buffer[self.write] = value;
        self.write = (self.write + 1) % self.buffer.len();
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Dual-tap doppler pitch shifter for the shimmer path.
struct PitchShifter {
    line: ModDelay,
    phase: f32,
    ratio: f32,
}

impl PitchShifter {
    fn new() -> Self {
        Self {
            line: ModDelay::new(SHIMMER_WINDOW as usize * 2),
            phase: 0.0,
            ratio: 1.0,
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        self.line.write(input);
        // Tap positions sweep at (1 - ratio); two taps half a window
        // apart crossfaded triangularly hide the jumps.
        self.phase += (1.0 - self.ratio) / SHIMMER_WINDOW;
        self.phase -= self.phase.floor();

        let d0 = self.phase * SHIMMER_WINDOW + 1.0;
        let d1 = ((self.phase + 0.5) - (self.phase + 0.5).floor()) * SHIMMER_WINDOW + 1.0;
        let w0 = 1.0 - (2.0 * self.phase - 1.0).abs();
        let w1 = 1.0 - w0;
        self.line.read_at(d0) * w0 + self.line.read_at(d1) * w1
    }
}

pub struct Oliverb {
    branches: [ModDelay; 2],
    allpass: [ModDelay; 2],
    lp_state: [f32; 2],
    hp_state: [f32; 2],
    shimmer: PitchShifter,
    lfo_phase: f32,
    frozen: bool,
    sample_rate: f32,
}

impl Oliverb {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            branches: [
                ModDelay::new(BRANCH_DELAYS[0]),
                ModDelay::new(BRANCH_DELAYS[1]),
            ],
            allpass: [ModDelay::new(AP_DELAYS[0] * 4), ModDelay::new(AP_DELAYS[1] * 4)],
            lp_state: [0.0; 2],
            hp_state: [0.0; 2],
            shimmer: PitchShifter::new(),
            lfo_phase: 0.0,
            frozen: false,
            sample_rate,
        }
    }

    pub fn set_freeze(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Render one block; input is the host-combined signal, output is
    /// the wet tank (overwrites).
    pub fn process(
        &mut self,
        params: &CloudsParams,
        in_l: &[Sample],
        in_r: &[Sample],
        out_l: &mut [Sample],
        out_r: &mut [Sample],
    ) {
        let diffusion = 0.3 + 0.5 * params.spread;
        let size_scale = 0.05 + 0.94 * params.size;
        let mod_rate_hz = params.feedback * 3.0;
        let mod_amount = params.reverb * 300.0;
        let ratio = (params.pitch_semitones() / 2.0 / 12.0).exp2();
        self.shimmer.ratio = ratio;

        let pitch_semitones = params.pitch_semitones().abs();
        let (input_gain, decay, lp, hp) = if self.frozen {
            (0.0, 1.0, 1.0, 0.0)
        } else {
            let decay = (params.density * 1.3 + 0.15 * pitch_semitones / 24.0).min(1.0);
            // Texture below centre closes the lowpass, above centre
            // opens the highpass.
            let lp = if params.texture < 0.5 {
                params.texture * 2.0
            } else {
                1.0
            };
            let hp = if params.texture > 0.5 {
                (params.texture - 0.5) * 2.0
            } else {
                0.0
            };
            (params.input_gain * 0.5, decay, lp, hp)
        };

        let lfo_inc = TAU * mod_rate_hz / self.sample_rate;

        for i in 0..out_l.len() {
            let lfo = self.lfo_phase.sin();
            self.lfo_phase += lfo_inc;
            if self.lfo_phase >= TAU {
                self.lfo_phase -= TAU;
            }

            let inputs = [in_l[i] * input_gain, in_r[i] * input_gain];
            let mut outs = [0.0f32; 2];

            for ch in 0..2 {
                let other = 1 - ch;

                // Cross-coupled branch read, size-scaled and modulated.
                let base = BRANCH_DELAYS[other] as f32 * size_scale;
                let modulated = base + lfo * mod_amount * if ch == 0 { 1.0 } else { -1.0 };
                let tank = self.branches[other].read_at(modulated.max(32.0));

                // Damping: lp = 1 leaves the loop transparent (freeze),
                // lower values close a one-pole lowpass; hp subtracts a
                // slow follower to thin the lows.
                self.lp_state[ch] += (tank - self.lp_state[ch]) * (0.1 + lp * 0.9);
                let low_damped = self.lp_state[ch];
                self.hp_state[ch] += (low_damped - self.hp_state[ch]) * 0.05;
                let damped = low_damped - self.hp_state[ch] * hp;

                // Shimmer feeds the loop pitched on channel 0 only; the
                // cross-coupling spreads it to both.
                let shimmered = if ch == 0 && (ratio - 1.0).abs() > 1e-3 {
                    let shifted = self.shimmer.process(damped);
                    damped * 0.5 + shifted * 0.5
                } else {
                    damped
                };

                // Modulated allpass diffusion inside the loop.
                let ap_len = AP_DELAYS[ch] as f32 * (1.0 + size_scale * 2.0);
                let ap_out = self.allpass[ch].read_at(ap_len);
                let feed = shimmered - ap_out * diffusion;
                self.allpass[ch].write(feed);
                let diffused = ap_out + feed * diffusion;

                let next = soft_limit(inputs[ch] + diffused * decay);
                self.branches[ch].write(next);
                outs[ch] = tank;
            }

            out_l[i] = outs[0];
            out_r[i] = outs[1];
        }
    }

    pub fn reset(&mut self) {
        for line in self.branches.iter_mut().chain(self.allpass.iter_mut()) {
            line.reset();
        }
        self.lp_state = [0.0; 2];
        self.hp_state = [0.0; 2];
        self.lfo_phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(oliverb: &mut Oliverb, params: &CloudsParams, blocks: usize, input: f32) -> Vec<f32> {
        let mut collected = Vec::new();
        for b in 0..blocks {
            let x = if b == 0 { input } else { 0.0 };
            let in_l = vec![x; 128];
            let in_r = vec![x; 128];
            let mut out_l = vec![0.0; 128];
            let mut out_r = vec![0.0; 128];
            oliverb.process(params, &in_l, &in_r, &mut out_l, &mut out_r);
            collected.extend_from_slice(&out_l);
        }
        collected
    }

    #[test]
    fn tank_rings_and_decays() {
        let mut oliverb = Oliverb::new(48000.0);
        let params = CloudsParams {
            density: 0.5,
            size: 0.5,
            texture: 0.5,
            ..Default::default()
        };
        let out = render(&mut oliverb, &params, 400, 0.8);

        let early: f32 = out[4096..12288].iter().map(|x| x.abs()).sum();
        let late: f32 = out[out.len() - 8192..].iter().map(|x| x.abs()).sum();
        assert!(early > 0.1, "tank should ring, got {early}");
        assert!(late < early, "tank should decay");
    }

    #[test]
    fn freeze_sustains_the_tank() {
        let mut oliverb = Oliverb::new(48000.0);
        let params = CloudsParams {
            density: 0.7,
            size: 0.7,
            ..Default::default()
        };
        // Inject, then freeze.
        let _ = render(&mut oliverb, &params, 40, 0.8);
        oliverb.set_freeze(true);

        let frozen = render(&mut oliverb, &params, 400, 0.0);
        let head: f32 = frozen[..8192].iter().map(|x| x.abs()).sum();
        let tail: f32 = frozen[frozen.len() - 8192..].iter().map(|x| x.abs()).sum();
        assert!(tail > head * 0.25, "frozen tank should keep ringing");
    }
}
