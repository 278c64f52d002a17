//! Euclidean rhythm generation (Bjorklund's algorithm)
//!
//! Distributes `fills` pulses over `steps` positions as evenly as the
//! integers allow: every gap between consecutive pulses is either
//! ⌊steps/fills⌋ or ⌈steps/fills⌉, and rotation preserves that.

/// Generate the canonical Bjorklund pattern. `fills` is clamped to
/// `steps`; zero fills yields an empty pattern.
pub fn bjorklund(steps: usize, fills: usize) -> Vec<bool> {
    let fills = fills.min(steps);
    if steps == 0 {
        return Vec::new();
    }
    if fills == 0 {
        return vec![false; steps];
    }
    if fills == steps {
        return vec![true; steps];
    }

    // Pairing form of the algorithm: repeatedly append remainder groups
    // onto the head groups until one remainder is left.
    let mut head: Vec<Vec<bool>> = (0..fills).map(|_| vec![true]).collect();
    let mut tail: Vec<Vec<bool>> = (0..steps - fills).map(|_| vec![false]).collect();

    while tail.len() > 1 {
        let pairs = head.len().min(tail.len());
        let mut next_head = Vec::with_capacity(pairs);
        for i in 0..pairs {
            let mut group = core::mem::take(&mut head[i]);
            group.extend_from_slice(&tail[i]);
            next_head.push(group);
        }
        let remainder = if head.len() > pairs {
            head.split_off(pairs)
        } else {
            tail.split_off(pairs)
        };
        head = next_head;
        tail = remainder;
    }

    head.into_iter()
        .chain(tail)
        .flatten()
        .collect()
}

/// Bjorklund pattern rotated right by `shift` steps.
pub fn bjorklund_rotated(steps: usize, fills: usize, shift: usize) -> Vec<bool> {
    let mut pattern = bjorklund(steps, fills);
    if !pattern.is_empty() {
        let len = pattern.len();
        pattern.rotate_right(shift % len);
    }
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse_positions(pattern: &[bool]) -> Vec<usize> {
        pattern
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| p.then_some(i))
            .collect()
    }

    /// Cyclic gaps between consecutive pulses.
    fn gaps(pattern: &[bool]) -> Vec<usize> {
        let positions = pulse_positions(pattern);
        let n = pattern.len();
        positions
            .iter()
            .zip(positions.iter().cycle().skip(1))
            .map(|(&a, &b)| (b + n - a) % n)
            .collect()
    }

    #[test]
    fn five_over_eight() {
        let pattern = bjorklund(8, 5);
        assert_eq!(pulse_positions(&pattern), vec![0, 2, 3, 5, 6]);
        assert_eq!(gaps(&pattern), vec![2, 1, 2, 1, 2]);
    }

    #[test]
    fn tresillo() {
        let pattern = bjorklund(8, 3);
        assert_eq!(pulse_positions(&pattern), vec![0, 3, 6]);
    }

    #[test]
    fn adjacent_gaps_differ_by_at_most_one() {
        for steps in 1..=32 {
            for fills in 1..=steps {
                let pattern = bjorklund(steps, fills);
                assert_eq!(pulse_positions(&pattern).len(), fills);
                let gaps = gaps(&pattern);
                let min = *gaps.iter().min().unwrap();
                let max = *gaps.iter().max().unwrap();
                assert!(
                    max - min <= 1,
                    "steps={steps} fills={fills}: gaps {gaps:?}"
                );
            }
        }
    }

    #[test]
    fn rotation_preserves_gaps() {
        for shift in 0..8 {
            let rotated = bjorklund_rotated(8, 5, shift);
            let mut g = gaps(&rotated);
            g.sort_unstable();
            assert_eq!(g, vec![1, 1, 2, 2, 2]);
        }
    }

    #[test]
    fn degenerate_cases() {
        assert_eq!(bjorklund(4, 0), vec![false; 4]);
        assert_eq!(bjorklund(4, 4), vec![true; 4]);
        assert!(bjorklund(0, 0).is_empty());
    }
}
