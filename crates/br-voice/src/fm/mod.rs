//! 6-operator FM voice
//!
//! A DX7-style synthesis stack: 32 fixed algorithm graphs, 4-stage
//! rate/level envelopes per operator, a pitch envelope, operator
//! detune and per-operator pan, optional low-pass gate, and the macro
//! remapping applied before a patch is loaded (DEPTH biases modulator
//! levels, RATE scales envelope times, PITCH arrives as the note).

pub mod algorithms;
pub mod envelope;
pub mod operator;
pub mod voice;

pub use algorithms::{Algorithm, ALGORITHMS, NUM_OPERATORS};
pub use voice::FmVoice;

use br_core::FmPatch;

/// Remap the DEPTH macro (0..1) into the patch: bias modulator operator
/// levels by `(depth - 0.5) · 32`, leaving carriers untouched.
pub fn apply_depth_macro(patch: &mut FmPatch, depth: f32) {
    let bias = (depth.clamp(0.0, 1.0) - 0.5) * 32.0;
    let algorithm = Algorithm::get(patch.algorithm);
    for (i, op) in patch.operators.iter_mut().enumerate() {
        if !algorithm.carriers[i] {
            op.level = (op.level + bias).clamp(0.0, 99.0);
        }
    }
}

/// Remap the RATE macro (0..1) into the patch: attack/decay times scale
/// by `2^((0.5 - rate) · 8)`, release by the bell curve
/// `2^(-|rate - 0.3| · 8)`.
pub fn rate_macro_scales(rate: f32) -> (f32, f32) {
    let rate = rate.clamp(0.0, 1.0);
    let ad_scale = ((0.5 - rate) * 8.0).exp2();
    let release_scale = (-(rate - 0.3).abs() * 8.0).exp2();
    (ad_scale, release_scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use br_core::FmPatch;

    #[test]
    fn depth_macro_spares_carriers() {
        let mut patch = FmPatch {
            algorithm: 1,
            ..Default::default()
        };
        for op in patch.operators.iter_mut() {
            op.level = 50.0;
        }
        apply_depth_macro(&mut patch, 1.0);

        let algorithm = Algorithm::get(1);
        for (i, op) in patch.operators.iter().enumerate() {
            if algorithm.carriers[i] {
                assert_eq!(op.level, 50.0, "carrier {i} must not move");
            } else {
                assert_eq!(op.level, 66.0, "modulator {i} biased by +16");
            }
        }
    }

    #[test]
    fn rate_macro_neutral_at_half() {
        let (ad, _) = rate_macro_scales(0.5);
        assert!((ad - 1.0).abs() < 1e-6);
        // Release bell peaks at 0.3.
        let (_, r_peak) = rate_macro_scales(0.3);
        let (_, r_off) = rate_macro_scales(0.9);
        assert!((r_peak - 1.0).abs() < 1e-6);
        assert!(r_off < r_peak);
    }
}
