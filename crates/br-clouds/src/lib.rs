//! br-clouds: granular/spectral texture processor
//!
//! A functionally complete port of the six-mode texture synthesizer:
//! - `granular` - windowed grain playback from the shared ring
//! - `wsola` - correlation-aligned time stretch with pitch resampling
//! - `looping_delay` - crossfaded loop region playback
//! - `spectral` - the phase-vocoder engine over an STFT
//! - `oliverb` - modulated-allpass shimmer reverb
//! - `resonestor` - damped comb-bank modal synth
//!
//! `processor` hosts the engines: the shared 262144-frame buffer, the
//! nonlinear feedback path, diffusion, the internal reverb and the
//! freeze-smoothed equal-power dry/wet crossfade.

pub mod diffuser;
pub mod fx_engine;
pub mod granular;
pub mod looping_delay;
pub mod oliverb;
pub mod processor;
pub mod resonestor;
pub mod spectral;
pub mod wsola;

/// Shared recording buffer length in frames (power of two).
pub const BUFFER_SIZE: usize = 262144;

/// Render block capacity engines are sized for.
pub const MAX_BLOCK: usize = 1024;

pub use processor::CloudsProcessor;

/// Soft saturation used throughout the wet path:
/// `x·(27 + x²) / (27 + 9·x²)`, hard-limited at ±3 input.
#[inline]
pub fn soft_limit(x: f32) -> f32 {
    let x = x.clamp(-3.0, 3.0);
    x * (27.0 + x * x) / (27.0 + 9.0 * x * x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_limit_is_bounded_and_gentle() {
        assert!((soft_limit(0.1) - 0.1).abs() < 1e-3);
        for x in [-10.0, -1.0, 0.5, 2.0, 10.0] {
            assert!(soft_limit(x).abs() <= 1.0);
        }
    }
}
