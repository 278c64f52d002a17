//! Granular engine
//!
//! A pool of windowed grains reading from the shared ring. A density
//! accumulator decides when to seed a grain; each grain carries its own
//! buffer offset, size, pitch ratio, pan and envelope position, and
//! retires itself once the envelope has run its length. Texture morphs
//! the grain window from Hann to rectangular; quality selects the read
//! interpolator and the pool size.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use br_core::{CloudsParams, GrainQuality, Sample};
use br_dsp::ring::CircularBuffer;

/// Grain size bounds in samples.
pub const MIN_GRAIN_SIZE: usize = 1024;
pub const MAX_GRAIN_SIZE: usize = 16384;

/// Pool bounds; reduced-quality modes run the small pool.
const MAX_GRAINS: usize = 16;
const LOW_QUALITY_GRAINS: usize = 8;

/// Target seed rate at full density, grains per second.
const GRAIN_RATE_HZ: f32 = 60.0;

/// Grain size lookup: exponential sweep between the bounds.
fn grain_size_for(size_param: f32) -> usize {
    let t = size_param.clamp(0.0, 1.0);
    let ratio = MAX_GRAIN_SIZE as f32 / MIN_GRAIN_SIZE as f32;
    (MIN_GRAIN_SIZE as f32 * ratio.powf(t)) as usize
}

#[derive(Debug, Clone, Copy, Default)]
struct Grain {
    active: bool,
    /// Read origin in the ring.
    offset: f32,
    size: f32,
    pitch_ratio: f32,
    pan_l: f32,
    pan_r: f32,
    envelope_position: f32,
}

pub struct GranularEngine {
    grains: [Grain; MAX_GRAINS],
    /// Density accumulator; a grain seeds when it crosses 1.
    phase: f32,
    quality: GrainQuality,
    rng: ChaCha8Rng,
    sample_rate: f32,
}

impl GranularEngine {
    pub fn new(sample_rate: f32, seed: u64) -> Self {
        Self {
            grains: [Grain::default(); MAX_GRAINS],
            phase: 0.0,
            quality: GrainQuality::Linear,
            rng: ChaCha8Rng::seed_from_u64(seed),
            sample_rate,
        }
    }

    pub fn set_quality(&mut self, quality: GrainQuality) {
        self.quality = quality;
    }

    fn pool_size(&self) -> usize {
        match self.quality {
            GrainQuality::Zoh => LOW_QUALITY_GRAINS,
            GrainQuality::Linear | GrainQuality::Hermite => MAX_GRAINS,
        }
    }

    fn seed_grain(&mut self, params: &CloudsParams, buffer: &CircularBuffer) {
        let pool = self.pool_size();
        let Some(grain) = self.grains[..pool].iter_mut().find(|g| !g.active) else {
            return;
        };

        let size = grain_size_for(params.size) as f32;
        let span = (buffer.size() - MAX_GRAIN_SIZE) as f32;
        let offset = buffer.write_head() as f32 - params.position * span - size;

        // Random equal-power pan, width from spread.
        let pan = (self.rng.gen::<f32>() - 0.5) * params.spread;
        let angle = (pan + 0.5) * core::f32::consts::FRAC_PI_2;

        *grain = Grain {
            active: true,
            offset,
            size,
            pitch_ratio: params.pitch.exp2(),
            pan_l: angle.cos(),
            pan_r: angle.sin(),
            envelope_position: 0.0,
        };
    }

    /// Grain window: Hann at texture 0 morphing to rectangular at 1.
    #[inline]
    fn window(position: f32, size: f32, texture: f32) -> f32 {
        let t = (position / size).clamp(0.0, 1.0);
        let hann = 0.5 - 0.5 * (2.0 * core::f32::consts::PI * t).cos();
        hann + (1.0 - hann) * texture
    }

    #[inline]
    fn read(&self, buffer: &CircularBuffer, channel: usize, position: f32) -> Sample {
        match self.quality {
            GrainQuality::Zoh => buffer.read(channel, position.rem_euclid(buffer.size() as f32) as usize),
            GrainQuality::Linear => buffer.read_linear(channel, position),
            GrainQuality::Hermite => buffer.read_hermite(channel, position),
        }
    }

    /// Render one block, adding grain output into `out_l`/`out_r`.
    pub fn process(
        &mut self,
        params: &CloudsParams,
        buffer: &CircularBuffer,
        out_l: &mut [Sample],
        out_r: &mut [Sample],
    ) {
        let block = out_l.len();

        // Seed grains according to the density accumulator.
        self.phase += params.density * block as f32 / self.sample_rate * GRAIN_RATE_HZ;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.seed_grain(params, buffer);
        }

        let pool = self.pool_size();
        let texture = params.texture;
        for g in 0..pool {
            if !self.grains[g].active {
                continue;
            }
            let mut grain = self.grains[g];
            for i in 0..block {
                let position = grain.offset + grain.envelope_position * grain.pitch_ratio;
                let envelope = Self::window(grain.envelope_position, grain.size, texture);
                let l = self.read(buffer, 0, position) * envelope;
                let r = self.read(buffer, 1, position) * envelope;
                out_l[i] += l * grain.pan_l;
                out_r[i] += r * grain.pan_r;

                grain.envelope_position += 1.0;
                if grain.envelope_position >= grain.size {
                    grain.active = false;
                    break;
                }
            }
            self.grains[g] = grain;
        }
    }

    pub fn active_grains(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }

    pub fn reset(&mut self) {
        self.grains = [Grain::default(); MAX_GRAINS];
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_buffer() -> CircularBuffer {
        let mut buffer = CircularBuffer::new(65536);
        for i in 0..65536 {
            let x = (2.0 * core::f32::consts::PI * 440.0 * i as f32 / 48000.0).sin();
            buffer.write_frame(x, x);
        }
        buffer
    }

    #[test]
    fn grain_sizes_span_declared_range() {
        assert_eq!(grain_size_for(0.0), MIN_GRAIN_SIZE);
        assert!((grain_size_for(1.0) as i64 - MAX_GRAIN_SIZE as i64).abs() <= 1);
    }

    #[test]
    fn density_zero_is_silent() {
        let mut engine = GranularEngine::new(48000.0, 1);
        let buffer = filled_buffer();
        let params = CloudsParams {
            density: 0.0,
            ..Default::default()
        };
        let mut l = vec![0.0; 128];
        let mut r = vec![0.0; 128];
        for _ in 0..100 {
            engine.process(&params, &buffer, &mut l, &mut r);
        }
        assert!(l.iter().all(|&x| x == 0.0));
        assert_eq!(engine.active_grains(), 0);
    }

    #[test]
    fn grains_spawn_and_retire() {
        let mut engine = GranularEngine::new(48000.0, 1);
        let buffer = filled_buffer();
        let params = CloudsParams {
            density: 0.8,
            size: 0.0,
            ..Default::default()
        };
        let mut spawned = false;
        for _ in 0..400 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
            spawned |= engine.active_grains() > 0;
        }
        assert!(spawned);

        // Stop seeding; the pool drains within one max grain length.
        let quiet = CloudsParams {
            density: 0.0,
            ..Default::default()
        };
        for _ in 0..(MAX_GRAIN_SIZE / 128 + 2) {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&quiet, &buffer, &mut l, &mut r);
        }
        assert_eq!(engine.active_grains(), 0);
    }

    #[test]
    fn output_preserves_tone() {
        // E4-style check: a 440 Hz source grain cloud keeps a 440 Hz
        // dominant component at unison pitch.
        let mut engine = GranularEngine::new(48000.0, 7);
        let buffer = filled_buffer();
        let params = CloudsParams {
            density: 0.5,
            position: 0.5,
            size: 0.5,
            texture: 0.0,
            spread: 0.0,
            pitch: 0.0,
            ..Default::default()
        };

        let mut collected = Vec::new();
        for _ in 0..400 {
            let mut l = vec![0.0; 128];
            let mut r = vec![0.0; 128];
            engine.process(&params, &buffer, &mut l, &mut r);
            collected.extend_from_slice(&l);
        }
        let active = &collected[24000..];
        let rms = (active.iter().map(|x| x * x).sum::<f32>() / active.len() as f32).sqrt();
        assert!(rms > 0.01, "grain cloud should be audible");

        let mut crossings = 0;
        for pair in active.windows(2) {
            if pair[0] <= 0.0 && pair[1] > 0.0 {
                crossings += 1;
            }
        }
        let freq = crossings as f32 * 48000.0 / active.len() as f32;
        assert!((freq - 440.0).abs() < 30.0, "dominant frequency {freq}");
    }
}
