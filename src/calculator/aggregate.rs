//! Reduction of per-modifier candidates to one next-change time.

use super::report::Candidate;
use crate::time::Epsilon;

/// The earliest candidate, or `None` for an empty input.
pub fn earliest(candidates: impl IntoIterator<Item = Candidate>) -> Option<Candidate> {
    candidates.into_iter().min()
}

/// Minimum of the present times under the epsilon order; absent entries are
/// skipped.
pub fn earliest_time(times: impl IntoIterator<Item = Option<Epsilon>>) -> Option<Epsilon> {
    times.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::Exactness;
    use crate::model::ModifierId;
    use crate::time::Rational;

    fn cand(n: i64, eps: bool, m: usize) -> Candidate {
        let numeric = Rational::from(n);
        Candidate {
            time: if eps {
                Epsilon::just_after(numeric)
            } else {
                Epsilon::exact(numeric)
            },
            modifier: ModifierId(m),
            label: None,
            exactness: Exactness::Optimal,
        }
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(earliest(Vec::new()), None);
        assert_eq!(earliest_time([None, None]), None);
    }

    #[test]
    fn exact_beats_epsilon_at_same_numeric() {
        let winner = earliest([cand(5, true, 0), cand(5, false, 1), cand(7, false, 2)]);
        assert_eq!(winner, Some(cand(5, false, 1)));
    }

    #[test]
    fn result_is_permutation_invariant() {
        let items = [cand(3, true, 2), cand(3, true, 1), cand(4, false, 0), cand(9, true, 3)];
        let expected = earliest(items.clone());
        let mut rotated = items.to_vec();
        for _ in 0..items.len() {
            rotated.rotate_left(1);
            assert_eq!(earliest(rotated.clone()), expected);
            let mut reversed = rotated.clone();
            reversed.reverse();
            assert_eq!(earliest(reversed), expected);
        }
        // ties on time are broken by modifier
        assert_eq!(expected.map(|c| c.modifier), Some(ModifierId(1)));
    }

    #[test]
    fn absent_times_are_skipped() {
        let five = Rational::from(5);
        assert_eq!(
            earliest_time([None, Some(Epsilon::just_after(five)), None, Some(Epsilon::exact(five))]),
            Some(Epsilon::exact(five))
        );
    }
}
