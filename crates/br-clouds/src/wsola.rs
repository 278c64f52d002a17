//! WSOLA time stretch
//!
//! Waveform-similarity overlap-add against the shared ring: each hop,
//! the engine grabs a Hann-windowed segment from the neighbourhood of a
//! nominal read position, picking the lag with the best normalized
//! cross-correlation against the tail of what was already laid down,
//! then overlap-adds it into an output ring. Pitch shift plays that
//! ring through a fractional resampler at `2^pitch`.

use br_core::{CloudsParams, Sample};
use br_dsp::ring::CircularBuffer;

/// Synthesis window bounds in samples.
const MIN_WINDOW: usize = 1024;
const MAX_WINDOW: usize = 4096;

/// Correlation search half-range in samples, scanned with a coarse step.
const SEARCH_RANGE: usize = 384;
const SEARCH_STEP: usize = 4;

/// Output ring; must exceed the largest window comfortably.
const OUT_RING: usize = 16384;

pub struct WsolaEngine {
    /// Overlap-add output ring and its play/write cursors.
    out_ring: Vec<Sample>,
    out_ring_r: Vec<Sample>,
    synth_pos: usize,
    /// Fractional playback cursor for the pitch resampler.
    play_pos: f64,
    /// Synthesized runway ahead of the play cursor, in samples.
    available: f64,
}

impl WsolaEngine {
    pub fn new(_sample_rate: f32) -> Self {
        Self {
            out_ring: vec![0.0; OUT_RING],
            out_ring_r: vec![0.0; OUT_RING],
            synth_pos: 0,
            play_pos: 0.0,
            available: 0.0,
        }
    }

    fn window_size(params: &CloudsParams) -> usize {
        let t = params.size.clamp(0.0, 1.0);
        // Power-of-two-ish sweep keeps the hop aligned.
        (MIN_WINDOW as f32 * (MAX_WINDOW as f32 / MIN_WINDOW as f32).powf(t)) as usize & !0x3
    }

    /// Find the best-correlated lag for the next segment.
    fn best_lag(&self, buffer: &CircularBuffer, nominal: f32, hop: usize) -> f32 {
        let mut best_lag = 0isize;
        let mut best_score = f32::NEG_INFINITY;

        // Compare the segment head against the most recent `hop`
        // samples already in the output ring.
        let lag_range = (SEARCH_RANGE as isize / SEARCH_STEP as isize).max(1);
        for l in -lag_range..=lag_range {
            let lag = l * SEARCH_STEP as isize;
            let mut score = 0.0;
            let mut energy = 1e-6;
            let mut i = 0;
            while i < hop {
                let ring_idx = (self.synth_pos + OUT_RING - hop + i) % OUT_RING;
                let candidate = buffer.read_linear(0, nominal + lag as f32 + i as f32);
                score += self.out_ring[ring_idx] * candidate;
                energy += candidate * candidate;
                i += SEARCH_STEP;
            }
            let normalized = score / energy.sqrt();
            if normalized > best_score {
                best_score = normalized;
                best_lag = lag;
            }
        }
        best_lag as f32
    }

    /// Overlap-add one segment starting at the synthesis cursor.
    fn lay_segment(&mut self, buffer: &CircularBuffer, start: f32, window: usize, hop: usize) {
        // The second half of the previous segment overlaps the first
        // half of this one; clear only the brand-new region.
        for i in hop..window {
            let idx = (self.synth_pos + i) % OUT_RING;
            self.out_ring[idx] = 0.0;
            self.out_ring_r[idx] = 0.0;
        }
        for i in 0..window {
            let t = i as f32 / window as f32;
            let hann = 0.5 - 0.5 * (2.0 * core::f32::consts::PI * t).cos();
            let idx = (self.synth_pos + i) % OUT_RING;
            self.out_ring[idx] += buffer.read_linear(0, start + i as f32) * hann;
            self.out_ring_r[idx] += buffer.read_linear(1, start + i as f32) * hann;
        }
        self.synth_pos = (self.synth_pos + hop) % OUT_RING;
        self.available += hop as f64;
    }

    /// Render one block into `out_l`/`out_r` (overwrites).
    pub fn process(
        &mut self,
        params: &CloudsParams,
        buffer: &CircularBuffer,
        out_l: &mut [Sample],
        out_r: &mut [Sample],
    ) {
        let window = Self::window_size(params);
        let hop = window / 2;
        let ratio = params.pitch.exp2() as f64;

        // Nominal read point: `position` sets how far behind the write
        // head the stretcher reads.
        let span = (buffer.size() / 2) as f32;
        let nominal = buffer.write_head() as f32 - 64.0 - params.position * span - window as f32;

        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            // Keep at least one window of synthesized material ahead.
            while self.available < window as f64 {
                let lag = self.best_lag(buffer, nominal, hop);
                self.lay_segment(buffer, nominal + lag, window, hop);
            }

            let base = self.play_pos.floor();
            let frac = (self.play_pos - base) as f32;
            let i0 = base as usize % OUT_RING;
            let i1 = (i0 + 1) % OUT_RING;
            *l = self.out_ring[i0] + (self.out_ring[i1] - self.out_ring[i0]) * frac;
            *r = self.out_ring_r[i0] + (self.out_ring_r[i1] - self.out_ring_r[i0]) * frac;

            self.play_pos += ratio;
            if self.play_pos >= OUT_RING as f64 {
                self.play_pos -= OUT_RING as f64;
            }
            self.available -= ratio;
        }
    }

    pub fn reset(&mut self) {
        self.out_ring.fill(0.0);
        self.out_ring_r.fill(0.0);
        self.synth_pos = 0;
        self.play_pos = 0.0;
        self.available = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_buffer(freq: f32) -> CircularBuffer {
        let mut buffer = CircularBuffer::new(65536);
        for i in 0..65536 {
            let x = (2.0 * core::f32::consts::PI * freq * i as f32 / 48000.0).sin() * 0.8;
            buffer.write_frame(x, x);
        }
        buffer
    }

    fn dominant_freq(samples: &[f32]) -> f32 {
        let mut crossings = 0;
        for pair in samples.windows(2) {
            if pair[0] <= 0.0 && pair[1] > 0.0 {
                crossings += 1;
            }
        }
        crossings as f32 * 48000.0 / samples.len() as f32
    }

    #[test]
    fn unison_keeps_frequency() {
        let buffer = sine_buffer(440.0);
        let mut engine = WsolaEngine::new(48000.0);
        let params = CloudsParams::default();

        let mut collected = Vec::new();
        for _ in 0..200 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
            collected.extend_from_slice(&l);
        }
        let freq = dominant_freq(&collected[8192..]);
        assert!((freq - 440.0).abs() < 25.0, "got {freq} Hz");
    }

    #[test]
    fn octave_up_doubles_frequency() {
        let buffer = sine_buffer(330.0);
        let mut engine = WsolaEngine::new(48000.0);
        let params = CloudsParams {
            pitch: 1.0,
            ..Default::default()
        };

        let mut collected = Vec::new();
        for _ in 0..200 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
            collected.extend_from_slice(&l);
        }
        let freq = dominant_freq(&collected[8192..]);
        assert!((freq - 660.0).abs() < 50.0, "got {freq} Hz");
    }
}
