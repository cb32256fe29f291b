use anyhow::Result;
use log::warn;

use super::{BookDiff, BookMove, EstimateOptions, InvariantViolation, MoveSet, RunStats, SuperBook};

/// A position reachable with some probability, along with its superbook.
#[derive(Clone, Copy, Debug)]
pub struct Sibling<'a> {
    pub probability: f64,
    pub book: &'a SuperBook,
}

impl<'a> Sibling<'a> {
    pub fn new(probability: f64, book: &'a SuperBook) -> Self {
        Self { probability, book }
    }

    fn weighted_marginal(&self, k: usize) -> f64 {
        self.book.marginal_value(k) * self.probability
    }

    fn weighted_estimate(&self, k: usize) -> f64 {
        self.book.estimated_marginal_value(k) * self.probability
    }
}

/// Combines the superbooks of positions reached at random into one superbook.
///
/// Each size step greedily takes further moves from whichever sibling currently
/// promises the highest probability-weighted estimated gain, as long as the merged
/// repertoire stays within that size. Moves shared through transpositions are
/// only counted once.
pub fn aggregate(
    budget: usize,
    siblings: &[Sibling<'_>],
    estimate: &EstimateOptions,
    stats: &mut RunStats,
) -> Result<SuperBook> {
    let starting_value = siblings
        .iter()
        .map(|s| s.book.starting_value() * s.probability)
        .sum::<f64>();

    let mut output = SuperBook::new(starting_value);
    let mut total = starting_value;
    let mut moves = MoveSet::new();
    let mut counts = vec![0usize; siblings.len()];
    let mut estimates = siblings
        .iter()
        .map(|s| (s.book.size() > 0).then(|| s.weighted_estimate(1)))
        .collect::<Vec<_>>();
    let mut marginals = siblings
        .iter()
        .map(|s| (s.book.size() > 0).then(|| s.weighted_marginal(1)).unwrap_or(0.0))
        .collect::<Vec<_>>();
    // Siblings that are never reached can only spend budget.
    let mut options = (0..siblings.len())
        .filter(|&i| siblings[i].book.size() > 0 && siblings[i].probability > 0.0)
        .collect::<Vec<_>>();

    for size in 1..=budget {
        if options.is_empty() {
            break;
        }

        let mut add = MoveSet::new();
        let mut discard = MoveSet::new();

        while let Some(best) = best_option(&options, &estimates) {
            let sibling = &siblings[best];
            let diff = sibling.book.diff(counts[best] + 1);
            let diff_add = MoveSet::from_moves(&diff.added);
            let diff_discard = MoveSet::from_moves(&diff.removed);

            let (next_add, next_discard) =
                MoveSet::combine_diffs(&add, &discard, &diff_add, &diff_discard);
            let (effective_add, effective_discard) =
                moves.apply_diff(&next_add, &next_discard, false);

            let new_size =
                (moves.len() + effective_add.len()) as isize - effective_discard.len() as isize;
            if new_size > size as isize {
                break;
            }

            add = next_add;
            discard = next_discard;
            total += marginals[best];
            counts[best] += 1;

            let k = counts[best] + 1;
            if sibling.book.size() >= k {
                marginals[best] = sibling.weighted_marginal(k);
                estimates[best] = Some(sibling.weighted_estimate(k));
            } else {
                options.retain(|&i| i != best);
            }
        }

        let (added, removed) = moves.apply_diff(&add, &discard, true);

        if moves.len() > size {
            return Err(InvariantViolation::OversizedRepertoire {
                size: moves.len(),
                budget: size,
            }
            .into());
        }

        let contradictions = added
            .iter()
            .filter(|m| removed.contains(m))
            .map(BookMove::to_string)
            .collect::<Vec<_>>();
        if !contradictions.is_empty() {
            return Err(InvariantViolation::ContradictoryDiff {
                moves: contradictions,
            }
            .into());
        }

        let stalled = siblings
            .iter()
            .zip(&estimates)
            .any(|(s, e)| *e == Some(0.0) && s.probability != 0.0);
        if stalled {
            warn!("Reachable position has zero estimated gain at size {}", size);
            stats.zero_estimates += 1;
        }

        output.push_at(
            size,
            BookDiff::new(added.into_moves(), removed.into_moves()),
            total,
            estimate,
        )?;
    }

    Ok(output)
}

/// The option with the highest estimate, preferring the earliest on ties.
fn best_option(options: &[usize], estimates: &[Option<f64>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &i in options {
        let estimate = estimates[i].unwrap_or(f64::NEG_INFINITY);
        if best.map_or(true, |(_, b)| estimate > b) {
            best = Some((i, estimate));
        }
    }

    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::super::{Action, OpeningBook};
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use engine::PositionKey;

    const PREP: f64 = 0.0036;

    fn pos(name: &str) -> PositionKey {
        PositionKey::normalize(&format!("{} w - - 0 1", name))
    }

    fn leaf(name: &str, value: f64, size: usize) -> SuperBook {
        SuperBook::placeholder(pos(name), value, size, PREP)
    }

    fn gain(k: usize) -> f64 {
        PREP * ((k + 1) as f64).ln()
    }

    #[test]
    fn test_greedy_allocation_matches_brute_force() {
        let books = [leaf("a", 0.5, 3), leaf("b", 0.6, 3), leaf("c", 0.4, 3)];
        let probabilities = [0.5, 0.3, 0.2];
        let siblings = books
            .iter()
            .zip(probabilities)
            .map(|(b, p)| Sibling::new(p, b))
            .collect::<Vec<_>>();

        let book = aggregate(3, &siblings, &EstimateOptions::default(), &mut RunStats::default()).unwrap();

        let starting = 0.5 * 0.5 + 0.3 * 0.6 + 0.2 * 0.4;
        let mut brute_force = f64::NEG_INFINITY;
        for a in 0..=3 {
            for b in 0..=(3 - a) {
                let c = 3 - a - b;
                let value = starting + 0.5 * gain(a) + 0.3 * gain(b) + 0.2 * gain(c);
                brute_force = brute_force.max(value);
            }
        }

        assert_eq!(book.size(), 3);
        assert_approx_eq!(book.starting_value(), starting);
        assert_approx_eq!(book.total_value(3), brute_force);
        assert_approx_eq!(book.total_value(3), starting + 0.5 * gain(2) + 0.3 * gain(1));

        let order = (1..=3)
            .map(|k| {
                let diff = book.diff(k);
                assert_eq!(diff.added.len(), 1);
                (diff.added[0].position.clone(), diff.added[0].action.clone())
            })
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                (pos("a"), Action::Prep(0)),
                (pos("b"), Action::Prep(0)),
                (pos("a"), Action::Prep(1)),
            ]
        );

        for k in 2..=3 {
            assert!(book.marginal_value(k) < book.marginal_value(k - 1));
        }
    }

    #[test]
    fn test_stops_when_siblings_are_exhausted() {
        let books = [leaf("a", 0.5, 1), leaf("b", 0.5, 1)];
        let siblings = books.iter().map(|b| Sibling::new(0.5, b)).collect::<Vec<_>>();

        let book = aggregate(5, &siblings, &EstimateOptions::default(), &mut RunStats::default()).unwrap();

        assert_eq!(book.size(), 2);
        assert_eq!(book.book(2).len(), 2);
    }

    #[test]
    fn test_zero_budget() {
        let books = [leaf("a", 0.5, 3)];
        let siblings = [Sibling::new(1.0, &books[0])];

        let book = aggregate(0, &siblings, &EstimateOptions::default(), &mut RunStats::default()).unwrap();

        assert_eq!(book.size(), 0);
        assert_approx_eq!(book.total_value(0), 0.5);
    }

    #[test]
    fn test_shared_moves_count_once() {
        let shared = BookMove::new(pos("t"), Action::Move("e4".to_string()), 0.7);
        let estimate = EstimateOptions::default();

        let mut first = SuperBook::new(0.5);
        first
            .push(BookDiff::new(vec![shared.clone()], vec![]), 0.7, &estimate)
            .unwrap();
        let mut second = SuperBook::new(0.5);
        second
            .push(BookDiff::new(vec![shared.clone()], vec![]), 0.7, &estimate)
            .unwrap();
        let siblings = [Sibling::new(0.5, &first), Sibling::new(0.5, &second)];

        let book = aggregate(1, &siblings, &estimate, &mut RunStats::default()).unwrap();

        assert_eq!(book.size(), 1);
        assert_approx_eq!(book.total_value(1), 0.7);
        assert_eq!(book.book(1), OpeningBook::from_iter([shared]));
    }

    #[test]
    fn test_repertoire_never_exceeds_size() {
        let estimate = EstimateOptions::default();
        let mut wide = SuperBook::new(0.4);
        wide.push(
            BookDiff::new(
                vec![
                    BookMove::new(pos("x"), Action::Move("e4".to_string()), 0.6),
                    BookMove::new(pos("y"), Action::Move("d4".to_string()), 0.6),
                ],
                vec![],
            ),
            0.6,
            &estimate,
        )
        .unwrap();
        let narrow = leaf("z", 0.5, 4);
        let siblings = [Sibling::new(0.9, &wide), Sibling::new(0.1, &narrow)];

        let book = aggregate(4, &siblings, &estimate, &mut RunStats::default()).unwrap();

        for k in 0..=book.size() {
            assert!(book.book(k).len() <= k);
            if k > 0 {
                assert!(book.total_value(k) >= book.total_value(k - 1));
            }
        }
        assert_eq!(book.book(2).len(), 2);
    }
}
