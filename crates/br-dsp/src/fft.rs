//! Radix-2 real FFT
//!
//! Decimation-in-time Cooley–Tukey on interleaved complex data with
//! twiddles and the bit-reversal table precomputed at construction. The
//! spectral path depends on the exact half-spectrum split layout (N/2
//! real + N/2 imaginary words, DC at bin 0, Nyquist dropped), so the
//! kernel is owned here rather than planned through `rustfft`; the tests
//! cross-check both implementations against each other.

use core::f32::consts::PI;

/// Smallest and largest supported transform lengths.
pub const MIN_FFT_SIZE: usize = 64;
pub const MAX_FFT_SIZE: usize = 16384;

/// Real-input radix-2 FFT with precomputed twiddles.
pub struct Fft {
    size: usize,
    /// cos(2πk/N), sin(2πk/N) for k in [0, N/2)
    twiddle_cos: Vec<f32>,
    twiddle_sin: Vec<f32>,
    /// Bit-reversed index for every position
    bit_reverse: Vec<u32>,
    /// Interleaved complex scratch, 2N floats
    scratch: Vec<f32>,
}

impl Fft {
    /// `size` must be a power of two in [64, 16384].
    pub fn new(size: usize) -> Self {
        assert!(
            size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size),
            "unsupported FFT size {size}"
        );

        let half = size / 2;
        let mut twiddle_cos = Vec::with_capacity(half);
        let mut twiddle_sin = Vec::with_capacity(half);
        for k in 0..half {
            let angle = 2.0 * PI * k as f32 / size as f32;
            twiddle_cos.push(angle.cos());
            twiddle_sin.push(angle.sin());
        }

        let bits = size.trailing_zeros();
        let bit_reverse = (0..size as u32)
            .map(|i| i.reverse_bits() >> (32 - bits))
            .collect();

        Self {
            size,
            twiddle_cos,
            twiddle_sin,
            bit_reverse,
            scratch: vec![0.0; size * 2],
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform of a real block. Emits the half spectrum:
    /// `real[k]`, `imag[k]` for k in [0, N/2). Bins above N/2 are the
    /// conjugate mirror and are not stored; the Nyquist bin is dropped.
    pub fn forward(&mut self, input: &[f32], real: &mut [f32], imag: &mut [f32]) {
        let n = self.size;
        debug_assert_eq!(input.len(), n);
        debug_assert!(real.len() >= n / 2 && imag.len() >= n / 2);

        for i in 0..n {
            let j = self.bit_reverse[i] as usize;
            self.scratch[2 * i] = input[j];
            self.scratch[2 * i + 1] = 0.0;
        }

        self.butterflies(false);

        for k in 0..n / 2 {
            real[k] = self.scratch[2 * k];
            imag[k] = self.scratch[2 * k + 1];
        }
    }

    /// Inverse transform of a half spectrum back to a real block. The
    /// upper half is reconstructed by conjugate symmetry
    /// (X[N-k] = conj(X[k])) and the result is scaled by 1/N.
    pub fn inverse(&mut self, real: &[f32], imag: &[f32], output: &mut [f32]) {
        let n = self.size;
        debug_assert!(real.len() >= n / 2 && imag.len() >= n / 2);
        debug_assert_eq!(output.len(), n);

        // Rebuild the full conjugate-symmetric spectrum, bit-reversed in
        // place of the copy pass.
        for i in 0..n {
            let j = self.bit_reverse[i] as usize;
            let (re, im) = if j == 0 {
                (real[0], 0.0)
            } else if j < n / 2 {
                (real[j], imag[j])
            } else if j == n / 2 {
                (0.0, 0.0)
            } else {
                (real[n - j], -imag[n - j])
            };
            self.scratch[2 * i] = re;
            self.scratch[2 * i + 1] = im;
        }

        self.butterflies(true);

        let scale = 1.0 / n as f32;
        for i in 0..n {
            output[i] = self.scratch[2 * i] * scale;
        }
    }

    /// log2(N) butterfly passes over the interleaved scratch buffer.
    /// Forward uses twiddle (cos, -sin); inverse flips the sign.
    fn butterflies(&mut self, inverse: bool) {
        let n = self.size;
        let mut len = 2;
        while len <= n {
            let half = len / 2;
            let stride = n / len;
            for start in (0..n).step_by(len) {
                for k in 0..half {
                    let tw = k * stride;
                    let (cos, sin) = (self.twiddle_cos[tw], self.twiddle_sin[tw]);
                    let sin = if inverse { sin } else { -sin };

                    let a = start + k;
                    let b = a + half;
                    let (ar, ai) = (self.scratch[2 * a], self.scratch[2 * a + 1]);
                    let (br, bi) = (self.scratch[2 * b], self.scratch[2 * b + 1]);

                    let tr = br * cos - bi * sin;
                    let ti = br * sin + bi * cos;

                    self.scratch[2 * a] = ar + tr;
                    self.scratch[2 * a + 1] = ai + ti;
                    self.scratch[2 * b] = ar - tr;
                    self.scratch[2 * b + 1] = ai - ti;
                }
            }
            len *= 2;
        }
    }
}
