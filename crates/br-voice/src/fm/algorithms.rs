//! The 32 fixed operator routing graphs
//!
//! Each algorithm names its carriers (operators summed into the output),
//! the modulation sources feeding every operator, and the operator
//! carrying the feedback loop. Operators are indexed 0..5 (panel
//! numbers 1..6). Looped multi-operator feedbacks are folded onto the
//! loop's head operator.

/// Operator count.
pub const NUM_OPERATORS: usize = 6;

/// One routing graph.
#[derive(Debug, Clone, Copy)]
pub struct Algorithm {
    /// Which operators sum into the voice output.
    pub carriers: [bool; NUM_OPERATORS],
    /// Modulation inputs per operator (indices of source operators).
    pub mods: [&'static [usize]; NUM_OPERATORS],
    /// Operator whose output feeds back into itself.
    pub feedback_op: usize,
}

impl Algorithm {
    /// Look up a 1-based algorithm number; out-of-range values clamp
    /// into [1, 32].
    pub fn get(number: u8) -> &'static Algorithm {
        let index = (number.clamp(1, 32) - 1) as usize;
        &ALGORITHMS[index]
    }

    /// Number of carriers, for output normalization.
    pub fn carrier_count(&self) -> usize {
        self.carriers.iter().filter(|&&c| c).count()
    }

    pub fn is_carrier(&self, op: usize) -> bool {
        self.carriers[op]
    }
}

macro_rules! algorithm {
    (carriers: [$($c:expr),*], mods: [$($m:expr),*], fb: $fb:expr) => {
        Algorithm {
            carriers: [$($c),*],
            mods: [$($m),*],
            feedback_op: $fb,
        }
    };
}

const T: bool = true;
const F: bool = false;
const NONE: &[usize] = &[];

/// All 32 graphs, panel order.
pub static ALGORITHMS: [Algorithm; 32] = [
    // 1: 2→1, 6→5→4→3; carriers 1,3; fb 6
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3], &[4], &[5], NONE], fb: 5),
    // 2: as 1, fb 2
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3], &[4], &[5], NONE], fb: 1),
    // 3: 3→2→1, 6→5→4; carriers 1,4; fb 6
    algorithm!(carriers: [T, F, F, T, F, F],
               mods: [&[1], &[2], NONE, &[4], &[5], NONE], fb: 5),
    // 4: as 3, feedback loop folded onto 4
    algorithm!(carriers: [T, F, F, T, F, F],
               mods: [&[1], &[2], NONE, &[4], &[5], NONE], fb: 3),
    // 5: 2→1, 4→3, 6→5; carriers 1,3,5; fb 6
    algorithm!(carriers: [T, F, T, F, T, F],
               mods: [&[1], NONE, &[3], NONE, &[5], NONE], fb: 5),
    // 6: as 5, loop folded onto 5
    algorithm!(carriers: [T, F, T, F, T, F],
               mods: [&[1], NONE, &[3], NONE, &[5], NONE], fb: 4),
    // 7: 2→1, 4→3, 6→5→3; carriers 1,3; fb 6
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3, 4], NONE, &[5], NONE], fb: 5),
    // 8: as 7, fb 4
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3, 4], NONE, &[5], NONE], fb: 3),
    // 9: as 7, fb 2
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3, 4], NONE, &[5], NONE], fb: 1),
    // 10: 3→2→1, 5→4, 6→4; carriers 1,4; fb 3
    algorithm!(carriers: [T, F, F, T, F, F],
               mods: [&[1], &[2], NONE, &[4, 5], NONE, NONE], fb: 2),
    // 11: as 10, fb 6
    algorithm!(carriers: [T, F, F, T, F, F],
               mods: [&[1], &[2], NONE, &[4, 5], NONE, NONE], fb: 5),
    // 12: 2→1, 4→3, 5→3, 6→3; carriers 1,3; fb 2
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3, 4, 5], NONE, NONE, NONE], fb: 1),
    // 13: as 12, fb 6
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3, 4, 5], NONE, NONE, NONE], fb: 5),
    // 14: 2→1, 4→3, 5→4, 6→4; carriers 1,3; fb 6
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3], &[4, 5], NONE, NONE], fb: 5),
    // 15: as 14, fb 2
    algorithm!(carriers: [T, F, T, F, F, F],
               mods: [&[1], NONE, &[3], &[4, 5], NONE, NONE], fb: 1),
    // 16: 2→1, 3→1, 5→1, 4→3, 6→5; carrier 1; fb 6
    algorithm!(carriers: [T, F, F, F, F, F],
               mods: [&[1, 2, 4], NONE, &[3], NONE, &[5], NONE], fb: 5),
    // 17: as 16, fb 2
    algorithm!(carriers: [T, F, F, F, F, F],
               mods: [&[1, 2, 4], NONE, &[3], NONE, &[5], NONE], fb: 1),
    // 18: 2→1, 3→1, 4→1, 5→4, 6→5; carrier 1; fb 3
    algorithm!(carriers: [T, F, F, F, F, F],
               mods: [&[1, 2, 3], NONE, NONE, &[4], &[5], NONE], fb: 2),
    // 19: 3→2→1, 6→4, 6→5; carriers 1,4,5; fb 6
    algorithm!(carriers: [T, F, F, T, T, F],
               mods: [&[1], &[2], NONE, &[5], &[5], NONE], fb: 5),
    // 20: 3→1, 3→2, 5→4, 6→4; carriers 1,2,4; fb 3
    algorithm!(carriers: [T, T, F, T, F, F],
               mods: [&[2], &[2], NONE, &[4, 5], NONE, NONE], fb: 2),
    // 21: 3→1, 3→2, 6→4, 6→5; carriers 1,2,4,5; fb 3
    algorithm!(carriers: [T, T, F, T, T, F],
               mods: [&[2], &[2], NONE, &[5], &[5], NONE], fb: 2),
    // 22: 2→1, 6→3, 6→4, 6→5; carriers 1,3,4,5; fb 6
    algorithm!(carriers: [T, F, T, T, T, F],
               mods: [&[1], NONE, &[5], &[5], &[5], NONE], fb: 5),
    // 23: 3→2, 6→4, 6→5; carriers 1,2,4,5; fb 6
    algorithm!(carriers: [T, T, F, T, T, F],
               mods: [NONE, &[2], NONE, &[5], &[5], NONE], fb: 5),
    // 24: 6→3, 6→4, 6→5; carriers 1..5; fb 6
    algorithm!(carriers: [T, T, T, T, T, F],
               mods: [NONE, NONE, &[5], &[5], &[5], NONE], fb: 5),
    // 25: 6→4, 6→5; carriers 1..5; fb 6
    algorithm!(carriers: [T, T, T, T, T, F],
               mods: [NONE, NONE, NONE, &[5], &[5], NONE], fb: 5),
    // 26: 3→2, 5→4, 6→4; carriers 1,2,4; fb 6
    algorithm!(carriers: [T, T, F, T, F, F],
               mods: [NONE, &[2], NONE, &[4, 5], NONE, NONE], fb: 5),
    // 27: as 26, fb 3
    algorithm!(carriers: [T, T, F, T, F, F],
               mods: [NONE, &[2], NONE, &[4, 5], NONE, NONE], fb: 2),
    // 28: 2→1, 4→3, 5→4; carriers 1,3,6; fb 5
    algorithm!(carriers: [T, F, T, F, F, T],
               mods: [&[1], NONE, &[3], &[4], NONE, NONE], fb: 4),
    // 29: 4→3, 6→5; carriers 1,2,3,5; fb 6
    algorithm!(carriers: [T, T, T, F, T, F],
               mods: [NONE, NONE, &[3], NONE, &[5], NONE], fb: 5),
    // 30: 4→3, 5→4; carriers 1,2,3,6; fb 5
    algorithm!(carriers: [T, T, T, F, F, T],
               mods: [NONE, NONE, &[3], &[4], NONE, NONE], fb: 4),
    // 31: 6→5; carriers 1..5; fb 6
    algorithm!(carriers: [T, T, T, T, T, F],
               mods: [NONE, NONE, NONE, NONE, &[5], NONE], fb: 5),
    // 32: no modulation; all six carriers; fb 6
    algorithm!(carriers: [T, T, T, T, T, T],
               mods: [NONE, NONE, NONE, NONE, NONE, NONE], fb: 5),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_algorithm_has_carriers() {
        for (i, algorithm) in ALGORITHMS.iter().enumerate() {
            assert!(
                algorithm.carrier_count() > 0,
                "algorithm {} has no carriers",
                i + 1
            );
        }
    }

    #[test]
    fn modulation_sources_are_valid_and_acyclic_downward() {
        // Sources always have a higher index than their target; the
        // renderer evaluates operators top-down (6 first).
        for (i, algorithm) in ALGORITHMS.iter().enumerate() {
            for (op, sources) in algorithm.mods.iter().enumerate() {
                for &source in sources.iter() {
                    assert!(source < NUM_OPERATORS);
                    assert!(
                        source > op,
                        "algorithm {}: op {} modulated by lower op {}",
                        i + 1,
                        op,
                        source
                    );
                }
            }
            assert!(algorithm.feedback_op < NUM_OPERATORS);
        }
    }

    #[test]
    fn lookup_clamps() {
        assert_eq!(Algorithm::get(0).carrier_count(), Algorithm::get(1).carrier_count());
        assert_eq!(Algorithm::get(99).carrier_count(), 6);
    }

    #[test]
    fn algorithm_32_is_additive() {
        let organ = Algorithm::get(32);
        assert_eq!(organ.carrier_count(), 6);
        assert!(organ.mods.iter().all(|m| m.is_empty()));
    }
}
