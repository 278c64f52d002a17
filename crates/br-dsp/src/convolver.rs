//! Partitioned FFT convolution
//!
//! Uniform-partition overlap-save convolver for the global reverb, plus
//! the noise-based impulse generator. Partitions are block-sized, so the
//! convolver adds no latency beyond the block itself; impulse updates
//! happen on the control thread and reach the audio thread as a whole
//! prepared instance (the dual-slot crossfade lives in the send bus).

use std::sync::Arc;

use rand::Rng;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use br_core::Sample;

/// One frequency-domain IR segment.
struct Partition {
    spectrum: Vec<Complex<f32>>,
}

/// Mono uniform-partition convolver.
pub struct PartitionedConvolver {
    partition_size: usize,
    fft_size: usize,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    partitions: Vec<Partition>,
    /// Frequency delay line: one input spectrum per partition slot.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    /// Previous input block for the overlap-save window.
    prev_block: Vec<f32>,
    time_scratch: Vec<f32>,
    spectrum_scratch: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
}

impl PartitionedConvolver {
    pub fn new(partition_size: usize) -> Self {
        assert!(partition_size.is_power_of_two());
        let fft_size = partition_size * 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let bins = fft_size / 2 + 1;

        Self {
            partition_size,
            fft_size,
            fft_forward,
            fft_inverse,
            partitions: Vec::new(),
            fdl: Vec::new(),
            fdl_pos: 0,
            prev_block: vec![0.0; partition_size],
            time_scratch: vec![0.0; fft_size],
            spectrum_scratch: vec![Complex::default(); bins],
            acc: vec![Complex::default(); bins],
        }
    }

    /// Install a new impulse response. Control-thread only: allocates.
    pub fn set_impulse(&mut self, ir: &[f32]) {
        let bins = self.fft_size / 2 + 1;
        let count = ir.len().div_ceil(self.partition_size).max(1);

        self.partitions.clear();
        for p in 0..count {
            let start = p * self.partition_size;
            let end = (start + self.partition_size).min(ir.len());

            let mut padded = vec![0.0f32; self.fft_size];
            if start < ir.len() {
                padded[..end - start].copy_from_slice(&ir[start..end]);
            }
            let mut spectrum = vec![Complex::default(); bins];
            self.fft_forward.process(&mut padded, &mut spectrum).ok();
            self.partitions.push(Partition { spectrum });
        }

        self.fdl = (0..count).map(|_| vec![Complex::default(); bins]).collect();
        self.fdl_pos = 0;
        self.prev_block.fill(0.0);
    }

    pub fn is_loaded(&self) -> bool {
        !self.partitions.is_empty()
    }

    /// Convolve one block in place. `io.len()` must equal the partition
    /// size.
    pub fn process(&mut self, io: &mut [Sample]) {
        debug_assert_eq!(io.len(), self.partition_size);
        if self.partitions.is_empty() {
            io.fill(0.0);
            return;
        }

        // Overlap-save window: [previous block | current block].
        self.time_scratch[..self.partition_size].copy_from_slice(&self.prev_block);
        self.time_scratch[self.partition_size..].copy_from_slice(io);
        self.prev_block.copy_from_slice(io);

        self.fft_forward
            .process(&mut self.time_scratch, &mut self.spectrum_scratch)
            .ok();
        self.fdl[self.fdl_pos].copy_from_slice(&self.spectrum_scratch);

        let count = self.partitions.len();
        self.acc.fill(Complex::default());
        for (k, partition) in self.partitions.iter().enumerate() {
            let slot = (self.fdl_pos + count - k) % count;
            for (a, (x, h)) in self
                .acc
                .iter_mut()
                .zip(self.fdl[slot].iter().zip(partition.spectrum.iter()))
            {
                *a += x * h;
            }
        }
        self.fdl_pos = (self.fdl_pos + 1) % count;

        self.spectrum_scratch.copy_from_slice(&self.acc);
        self.fft_inverse
            .process(&mut self.spectrum_scratch, &mut self.time_scratch)
            .ok();

        let scale = 1.0 / self.fft_size as f32;
        for (y, &t) in io.iter_mut().zip(&self.time_scratch[self.partition_size..]) {
            *y = t * scale;
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.fdl {
            slot.fill(Complex::default());
        }
        self.prev_block.fill(0.0);
        self.fdl_pos = 0;
    }
}

/// Stereo pair sharing one impulse pair.
pub struct StereoConvolver {
    left: PartitionedConvolver,
    right: PartitionedConvolver,
}

impl StereoConvolver {
    pub fn new(partition_size: usize) -> Self {
        Self {
            left: PartitionedConvolver::new(partition_size),
            right: PartitionedConvolver::new(partition_size),
        }
    }

    pub fn set_impulse(&mut self, left_ir: &[f32], right_ir: &[f32]) {
        self.left.set_impulse(left_ir);
        self.right.set_impulse(right_ir);
    }

    pub fn is_loaded(&self) -> bool {
        self.left.is_loaded()
    }

    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample]) {
        self.left.process(left);
        self.right.process(right);
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

/// Reverb impulse parameters in patch units (0..100 except pre-delay).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseSpec {
    pub decay: f32,
    pub diffusion: f32,
    pub damping: f32,
    pub pre_delay_ms: f32,
}

/// Generate one noise-based reverb impulse channel:
/// `(1 - t)^(2 + diffusion·2) · exp(-t · damping · 5)` over a length of
/// `(0.1 + decay·4)` seconds, preceded by the silent pre-delay.
pub fn generate_impulse<R: Rng>(spec: &ImpulseSpec, sample_rate: f32, rng: &mut R) -> Vec<f32> {
    let decay = (spec.decay / 100.0).clamp(0.0, 1.0);
    let diffusion = (spec.diffusion / 100.0).clamp(0.0, 1.0);
    let damping = (spec.damping / 100.0).clamp(0.0, 1.0);

    let body_len = ((0.1 + decay * 4.0) * sample_rate) as usize;
    let pre_len = (spec.pre_delay_ms.max(0.0) * 0.001 * sample_rate) as usize;

    let mut ir = vec![0.0f32; pre_len + body_len];
    let shape = 2.0 + diffusion * 2.0;
    for (i, out) in ir[pre_len..].iter_mut().enumerate() {
        let t = i as f32 / body_len as f32;
        let envelope = (1.0 - t).powf(shape) * (-t * damping * 5.0).exp();
        *out = (rng.gen::<f32>() * 2.0 - 1.0) * envelope;
    }
    ir
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn unit_impulse_is_identity() {
        let mut conv = PartitionedConvolver::new(128);
        let mut ir = vec![0.0f32; 300];
        ir[0] = 1.0;
        conv.set_impulse(&ir);

        let mut block: Vec<f32> = (0..128).map(|i| (i as f32 * 0.05).sin()).collect();
        let expected = block.clone();
        conv.process(&mut block);
        for (y, e) in block.iter().zip(&expected) {
            assert!((y - e).abs() < 1e-4);
        }
    }

    #[test]
    fn delayed_impulse_shifts_across_partitions() {
        let mut conv = PartitionedConvolver::new(128);
        // Delay of 200 samples spans into the second partition.
        let mut ir = vec![0.0f32; 256];
        ir[200] = 1.0;
        conv.set_impulse(&ir);

        let mut first = vec![0.0f32; 128];
        first[3] = 1.0;
        conv.process(&mut first);
        let mut second = vec![0.0f32; 128];
        conv.process(&mut second);

        // 3 + 200 = 203 lands at offset 75 of the second block.
        assert!(first.iter().all(|x| x.abs() < 1e-4));
        for (i, y) in second.iter().enumerate() {
            let expected = if i == 75 { 1.0 } else { 0.0 };
            assert!((y - expected).abs() < 1e-3, "sample {i}: {y}");
        }
    }

    #[test]
    fn impulse_generator_shape() {
        let spec = ImpulseSpec {
            decay: 50.0,
            diffusion: 50.0,
            damping: 50.0,
            pre_delay_ms: 10.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let ir = generate_impulse(&spec, 48000.0, &mut rng);

        let pre = (10.0 * 0.001 * 48000.0) as usize;
        assert!(ir[..pre].iter().all(|&x| x == 0.0));
        assert_eq!(ir.len(), pre + ((0.1 + 0.5 * 4.0) * 48000.0) as usize);

        // Energy decays front to back.
        let body = &ir[pre..];
        let head: f32 = body[..4800].iter().map(|x| x * x).sum();
        let tail: f32 = body[body.len() - 4800..].iter().map(|x| x * x).sum();
        assert!(head > tail * 10.0);
    }
}
