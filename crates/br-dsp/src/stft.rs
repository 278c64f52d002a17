//! STFT with int16 analysis/synthesis rings
//!
//! Overlap-add analysis and synthesis around the radix-2 FFT. Incoming
//! samples drain into an int16 analysis ring of length N+H; a parallel
//! synthesis ring accumulates windowed inverse frames with int16
//! clipping. A frame becomes "ready" each time the sample counter
//! crosses the hop; `buffer()` consumes one ready frame through the
//! installed `FrameTransformer`. Both rings use the same
//! `(read + length) mod ring_len` addressing.
//!
//! With the sine window applied on both sides and the synthesis scale
//! `2·H/N`, a 4x-overlap pass through the identity transformer has unit
//! gain.

use crate::fft::Fft;

/// Spectral frame hook. `real`/`imag` hold the half spectrum produced
/// by the forward transform; the transformer mutates them in place.
pub trait FrameTransformer: Send {
    fn process(&mut self, real: &mut [f32], imag: &mut [f32]);
}

/// Pass-through transformer.
pub struct Identity;

impl FrameTransformer for Identity {
    fn process(&mut self, _real: &mut [f32], _imag: &mut [f32]) {}
}

/// Short-time Fourier transform processor.
pub struct Stft {
    size: usize,
    hop: usize,
    ring_len: usize,
    window: Vec<f32>,
    analysis: Vec<i16>,
    synthesis: Vec<i16>,
    /// Analysis write position.
    a_write: usize,
    /// Start of the next overlap-add region.
    s_write: usize,
    /// Synthesis read position.
    s_read: usize,
    /// Samples written since the last hop boundary.
    hop_counter: usize,
    /// Frames ready for `buffer()`.
    ready: usize,
    /// Finalized synthesis samples available for output.
    pending_out: usize,
    fft: Fft,
    frame: Vec<f32>,
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl Stft {
    /// `size` must be a power of two with `hop = size / 4` (4x overlap).
    pub fn new(size: usize, hop: usize) -> Self {
        assert!(size % hop == 0 && hop * 4 == size, "STFT requires 4x overlap");
        let ring_len = size + hop;

        let window = (0..size)
            .map(|i| (core::f32::consts::PI * i as f32 / size as f32).sin())
            .collect();

        Self {
            size,
            hop,
            ring_len,
            window,
            analysis: vec![0; ring_len],
            synthesis: vec![0; ring_len],
            a_write: 0,
            s_write: 0,
            s_read: 0,
            hop_counter: 0,
            ready: 0,
            pending_out: 0,
            fft: Fft::new(size),
            frame: vec![0.0; size],
            real: vec![0.0; size / 2],
            imag: vec![0.0; size / 2],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Frames waiting for `buffer()`.
    #[inline]
    pub fn frames_ready(&self) -> usize {
        self.ready
    }

    /// Drain `input` into the analysis ring and emit synthesized samples
    /// into `output`. Output lags by the synthesis latency; the leading
    /// samples are silence.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());

        for (x, y) in input.iter().zip(output.iter_mut()) {
            self.analysis[self.a_write] = clip_i16(*x * 32768.0);
            self.a_write = (self.a_write + 1) % self.ring_len;

            self.hop_counter += 1;
            if self.hop_counter == self.hop {
                self.hop_counter = 0;
                self.ready += 1;
            }

            if self.pending_out > 0 {
                *y = self.synthesis[self.s_read] as f32 / 32768.0;
                self.synthesis[self.s_read] = 0;
                self.s_read = (self.s_read + 1) % self.ring_len;
                self.pending_out -= 1;
            } else {
                *y = 0.0;
            }
        }
    }

    /// Consume one ready frame: window, forward FFT, transform, inverse
    /// FFT, window again, scale by 2·H/N and overlap-add with int16
    /// clipping. No-op when nothing is ready.
    pub fn buffer(&mut self, transformer: &mut dyn FrameTransformer) {
        if self.ready == 0 {
            return;
        }
        self.ready -= 1;

        // The most recent N samples end at the analysis write position.
        let start = (self.a_write + self.ring_len - self.size) % self.ring_len;
        for i in 0..self.size {
            let s = self.analysis[(start + i) % self.ring_len] as f32 / 32768.0;
            self.frame[i] = s * self.window[i];
        }

        self.fft.forward(&self.frame, &mut self.real, &mut self.imag);
        transformer.process(&mut self.real, &mut self.imag);
        self.fft.inverse(&self.real, &self.imag, &mut self.frame);

        let scale = 2.0 * self.hop as f32 / self.size as f32;
        for i in 0..self.size {
            let idx = (self.s_write + i) % self.ring_len;
            let add = self.frame[i] * self.window[i] * scale * 32768.0;
            let sum = self.synthesis[idx] as i32 + add as i32;
            self.synthesis[idx] = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }

        self.s_write = (self.s_write + self.hop) % self.ring_len;
        self.pending_out += self.hop;
    }

    pub fn reset(&mut self) {
        self.analysis.fill(0);
        self.synthesis.fill(0);
        self.a_write = 0;
        self.s_write = 0;
        self.s_read = 0;
        self.hop_counter = 0;
        self.ready = 0;
        self.pending_out = 0;
    }
}

#[inline]
fn clip_i16(x: f32) -> i16 {
    x.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
