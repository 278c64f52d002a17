//! FACTORS pattern composition
//!
//! Builds a 32-step sequence from Euclidean masks. The fill pattern
//! places the active steps; accent, slide and trill are distributed
//! among the fill positions from the same budget (their counts never
//! exceed the fill count); flam and ratchet masks run over the whole
//! step grid independently and may land anywhere, including on top of
//! each other.

use br_core::{EuclidPatch, StepPatch};

use crate::euclidean::{bjorklund, bjorklund_rotated};

/// Default retrigger count for steps selected by the ratchet mask.
const RATCHET_COUNT: u8 = 2;

/// Velocity for accented fills; plain fills use the step default.
const ACCENT_VELOCITY: u8 = 127;

/// Compose a step sequence from Euclidean parameters. The result is
/// `steps` entries long; callers pad or tile it onto the 32-step grid.
pub fn compose_factors(euclid: &EuclidPatch) -> Vec<StepPatch> {
    let e = euclid.clamped();
    let steps = e.steps as usize;
    let fills = e.fills as usize;

    let fill_mask = bjorklund_rotated(steps, fills, e.shift as usize);

    // Orthogonal sub-distributions over the pulse indices. Each mask is
    // rotated by its ordinal so accent, slide and trill prefer different
    // pulses when budgets overlap.
    let accent_mask = sub_mask(fills, e.accent as usize, 0);
    let slide_mask = sub_mask(fills, e.slide as usize, 1);
    let trill_mask = sub_mask(fills, e.trill as usize, 2);

    let flam_mask = bjorklund_rotated(steps, e.flam as usize, e.shift as usize);
    let ratchet_mask = bjorklund_rotated(steps, e.ratchet as usize, e.shift as usize);

    let mut sequence = vec![StepPatch::default(); steps];
    let mut pulse_index = 0usize;
    for (i, step) in sequence.iter_mut().enumerate() {
        if fill_mask[i] {
            step.active = true;
            if accent_mask.get(pulse_index).copied().unwrap_or(false) {
                step.velocity = ACCENT_VELOCITY;
            }
            step.slide = slide_mask.get(pulse_index).copied().unwrap_or(false);
            step.trill = trill_mask.get(pulse_index).copied().unwrap_or(false);
            pulse_index += 1;
        }
        step.flam = flam_mask[i];
        if ratchet_mask[i] {
            step.ratchet = RATCHET_COUNT;
        }
    }
    sequence
}

fn sub_mask(fills: usize, count: usize, rotation: usize) -> Vec<bool> {
    if fills == 0 {
        return Vec::new();
    }
    let mut mask = bjorklund(fills, count);
    mask.rotate_right(rotation % fills);
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_place_active_steps() {
        let sequence = compose_factors(&EuclidPatch {
            steps: 8,
            fills: 5,
            shift: 0,
            ..Default::default()
        });
        let active: Vec<usize> = sequence
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.active.then_some(i))
            .collect();
        assert_eq!(active, vec![0, 2, 3, 5, 6]);
    }

    #[test]
    fn accent_budget_respected() {
        let sequence = compose_factors(&EuclidPatch {
            steps: 16,
            fills: 8,
            accent: 3,
            ..Default::default()
        });
        let accents = sequence
            .iter()
            .filter(|s| s.active && s.velocity == ACCENT_VELOCITY)
            .count();
        assert_eq!(accents, 3);
    }

    #[test]
    fn flam_may_overlap_fills() {
        let sequence = compose_factors(&EuclidPatch {
            steps: 8,
            fills: 8,
            flam: 4,
            ratchet: 2,
            ..Default::default()
        });
        // All steps are fills; flams and ratchets land on top of them.
        assert!(sequence.iter().any(|s| s.active && s.flam));
        assert!(sequence.iter().any(|s| s.active && s.ratchet > 0));
    }

    #[test]
    fn factor_counts_never_exceed_fills() {
        let sequence = compose_factors(&EuclidPatch {
            steps: 12,
            fills: 5,
            accent: 9,
            slide: 9,
            trill: 9,
            ..Default::default()
        });
        let slides = sequence.iter().filter(|s| s.slide).count();
        let trills = sequence.iter().filter(|s| s.trill).count();
        let accents = sequence.iter().filter(|s| s.velocity == ACCENT_VELOCITY).count();
        assert!(accents + slides + trills <= 5);
    }
}
