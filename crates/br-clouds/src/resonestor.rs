//! Resonestor: damped comb-bank modal synth
//!
//! A bank of tuned comb filters per channel, voiced as a chord selected
//! by the size control. Pitch sets the root, density narrows the
//! resonance bandwidth, texture sets the damping, spread pans the combs
//! across the field, and a density past 0.9 fires a noise burst through
//! the bank. Feedback is hard-clamped at 0.95 at the engine boundary so
//! the bank can never self-oscillate out of control.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use br_core::{CloudsParams, Sample};

/// Combs per channel (one per chord voice).
pub const NUM_COMBS: usize = 6;

/// Engine-boundary feedback clamp.
const FEEDBACK_CLAMP: f32 = 0.95;

/// Burst excitation length in samples.
const BURST_LENGTH: usize = 1200;

/// Eleven chord voicings as semitone offsets from the root.
pub const CHORDS: [[f32; NUM_COMBS]; 11] = [
    [0.0, 0.01, 12.0, 12.01, 24.0, 24.01],  // unison / octaves
    [0.0, 7.0, 12.0, 19.0, 24.0, 31.0],     // fifths
    [0.0, 5.0, 12.0, 17.0, 24.0, 29.0],     // fourths
    [0.0, 3.0, 12.0, 15.0, 24.0, 27.0],     // minor
    [0.0, 3.0, 10.0, 15.0, 22.0, 27.0],     // minor seventh
    [0.0, 3.0, 14.0, 15.0, 26.0, 27.0],     // minor ninth
    [0.0, 4.0, 12.0, 16.0, 24.0, 28.0],     // major
    [0.0, 4.0, 11.0, 16.0, 23.0, 28.0],     // major seventh
    [0.0, 4.0, 14.0, 16.0, 26.0, 28.0],     // major ninth
    [0.0, 2.0, 7.0, 14.0, 24.0, 26.0],      // sus2 spread
    [0.0, 6.0, 12.0, 18.0, 24.0, 30.0],     // tritone stack
];

struct Comb {
    buffer: Vec<Sample>,
    write: usize,
    /// Fractional delay in samples.
    delay: f32,
    lp_state: f32,
    bp_state: f32,
}

impl Comb {
    fn new(max_delay: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay],
            write: 0,
            delay: 100.0,
            lp_state: 0.0,
            bp_state: 0.0,
        }
    }

    fn tune(&mut self, freq: f32, sample_rate: f32) {
        let delay = sample_rate / freq.clamp(20.0, 8000.0);
        self.delay = delay.clamp(2.0, self.buffer.len() as f32 - 2.0);
    }

    #[inline]
    fn read(&self) -> Sample {
        let max = self.buffer.len() as f32;
        let pos = self.write as f32 + max - self.delay;
        let i = pos as usize;
        let frac = pos - i as f32;
        let a = self.buffer[i % self.buffer.len()];
        let b = self.buffer[(i + 1) % self.buffer.len()];
        a + (b - a) * frac
    }

    /// One tick: excite, filter the loop, feed back.
    #[inline]
    fn process(&mut self, input: Sample, feedback: f32, damping: f32, narrow: f32) -> Sample {
        let delayed = self.read();

        // Loop filter: damping closes a one-pole lowpass, narrow pulls
        // the loop toward its own smoothed state (higher Q).
        self.lp_state += (delayed - self.lp_state) * damping;
        self.bp_state += (self.lp_state - self.bp_state) * (1.0 - narrow * 40.0).clamp(0.05, 1.0);
        let filtered = self.bp_state;

        self.buffer[self.write] = input + filtered * feedback;
        self.write = (self.write + 1) % self.buffer.len();
        delayed
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.lp_state = 0.0;
        self.bp_state = 0.0;
    }
}

pub struct Resonestor {
    combs_l: Vec<Comb>,
    combs_r: Vec<Comb>,
    /// (left, right) gains per comb from the spread control.
    pans: [(f32, f32); NUM_COMBS],
    burst_remaining: usize,
    burst_armed: bool,
    rng: ChaCha8Rng,
    sample_rate: f32,
}

impl Resonestor {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        let max_delay = (sample_rate / 20.0) as usize + 4;
        Self {
            combs_l: (0..NUM_COMBS).map(|_| Comb::new(max_delay)).collect(),
            combs_r: (0..NUM_COMBS).map(|_| Comb::new(max_delay)).collect(),
            pans: [(0.7, 0.7); NUM_COMBS],
            burst_remaining: 0,
            burst_armed: true,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sample_rate,
        }
    }

    /// External trigger: fire the burst.
    pub fn trigger(&mut self) {
        self.burst_remaining = BURST_LENGTH;
    }

    /// Render one block; input excites the bank, output overwrites.
    pub fn process(
        &mut self,
        params: &CloudsParams,
        in_l: &[Sample],
        in_r: &[Sample],
        out_l: &mut [Sample],
        out_r: &mut [Sample],
    ) {
        // Controls.
        let root = br_core::note_to_freq(36.0 + params.pitch_semitones() + 24.0);
        let chord_index =
            ((params.size * (CHORDS.len() - 1) as f32) as usize).min(CHORDS.len() - 1);
        let narrow = (params.density * 0.01).clamp(0.001, 0.01);
        let damping = 0.3 + params.texture * 0.7;
        let feedback = params.feedback.min(FEEDBACK_CLAMP);
        let gain_comp = 1.0 + 0.5 * narrow;

        // Density past the top fires bursts on a rising edge.
        if params.density > 0.9 {
            if self.burst_armed {
                self.trigger();
                self.burst_armed = false;
            }
        } else {
            self.burst_armed = true;
        }

        // Tune the bank and spread the pans.
        for (i, offsets) in CHORDS[chord_index].iter().enumerate() {
            let freq = root * (offsets / 12.0).exp2();
            self.combs_l[i].tune(freq, self.sample_rate);
            self.combs_r[i].tune(freq * 1.003, self.sample_rate);

            let pan = (i as f32 / (NUM_COMBS - 1) as f32 - 0.5) * params.spread;
            let angle = (pan + 0.5) * core::f32::consts::FRAC_PI_2;
            self.pans[i] = (angle.cos(), angle.sin());
        }

        for i in 0..out_l.len() {
            let burst = if self.burst_remaining > 0 {
                self.burst_remaining -= 1;
                (self.rng.gen::<f32>() * 2.0 - 1.0) * 0.5
            } else {
                0.0
            };
            let excite_l = in_l[i] + burst;
            let excite_r = in_r[i] + burst;

            let mut l = 0.0;
            let mut r = 0.0;
            for c in 0..NUM_COMBS {
                let (gl, gr) = self.pans[c];
                l += self.combs_l[c].process(excite_l * gl, feedback, damping, narrow);
                r += self.combs_r[c].process(excite_r * gr, feedback, damping, narrow);
            }
            out_l[i] = l / NUM_COMBS as f32 * gain_comp;
            out_r[i] = r / NUM_COMBS as f32 * gain_comp;
        }
    }

    pub fn reset(&mut self) {
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        self.burst_remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_table_has_eleven_voicings() {
        assert_eq!(CHORDS.len(), 11);
        for chord in CHORDS.iter() {
            assert_eq!(chord[0], 0.0, "every voicing is rooted");
        }
    }

    #[test]
    fn feedback_clamped_at_boundary() {
        let params = CloudsParams {
            feedback: 1.0,
            ..Default::default()
        };
        assert_eq!(params.feedback.min(FEEDBACK_CLAMP), 0.95);
    }

    #[test]
    fn impulse_rings_at_root() {
        let mut resonestor = Resonestor::new(48000.0, 5);
        let params = CloudsParams {
            pitch: 0.0,
            size: 0.0,
            density: 0.5,
            texture: 0.9,
            feedback: 0.9,
            spread: 0.0,
            ..Default::default()
        };

        let mut collected = Vec::new();
        for b in 0..100 {
            let x = if b == 0 { 1.0 } else { 0.0 };
            let in_l = vec![x; 128];
            let in_r = vec![x; 128];
            let mut out_l = vec![0.0; 128];
            let mut out_r = vec![0.0; 128];
            resonestor.process(&params, &in_l, &in_r, &mut out_l, &mut out_r);
            collected.extend_from_slice(&out_l);
        }
        let tail: f32 = collected[6400..].iter().map(|x| x.abs()).sum();
        assert!(tail > 0.05, "comb bank should ring, got {tail}");
    }

    #[test]
    fn high_density_fires_burst_once_per_crossing() {
        let mut resonestor = Resonestor::new(48000.0, 5);
        let hot = CloudsParams {
            density: 0.95,
            ..Default::default()
        };

        let in_l = vec![0.0; 128];
        let in_r = vec![0.0; 128];
        let mut out_l = vec![0.0; 128];
        let mut out_r = vec![0.0; 128];
        resonestor.process(&hot, &in_l, &in_r, &mut out_l, &mut out_r);
        let first_remaining = resonestor.burst_remaining;
        assert!(first_remaining > 0);

        // Holding density high does not re-arm the burst.
        resonestor.process(&hot, &in_l, &in_r, &mut out_l, &mut out_r);
        assert!(resonestor.burst_remaining < first_remaining);
    }
}
