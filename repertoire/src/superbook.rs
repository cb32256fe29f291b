use std::borrow::Cow;

use anyhow::Result;
use engine::PositionKey;
use serde::{Deserialize, Serialize};

use super::{Action, BookDiff, BookMove, EstimateOptions, InvariantViolation, OpeningBook};

/// One size step of an explicit book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Step {
    diff: BookDiff,
    total: f64,
    marginal: f64,
    estimated: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Steps {
    Explicit(Vec<Step>),
    /// Generic preparation at an unexpanded position. Values grow with `prep_value * ln(k + 1)`.
    Placeholder {
        position: PositionKey,
        size: usize,
        prep_value: f64,
    },
}

/// The best repertoire at every size from zero up to a budget, for one position and role.
///
/// Sizes are 1-based: `total_value(0)` is the value without any memorized move and
/// `diff(k)` turns the size `k - 1` book into the size `k` book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuperBook {
    starting_value: f64,
    steps: Steps,
}

impl SuperBook {
    pub fn new(starting_value: f64) -> Self {
        Self {
            starting_value,
            steps: Steps::Explicit(Vec::new()),
        }
    }

    pub fn placeholder(position: PositionKey, starting_value: f64, size: usize, prep_value: f64) -> Self {
        Self {
            starting_value,
            steps: Steps::Placeholder {
                position,
                size,
                prep_value,
            },
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.steps, Steps::Placeholder { .. })
    }

    pub fn size(&self) -> usize {
        match &self.steps {
            Steps::Explicit(steps) => steps.len(),
            Steps::Placeholder { size, .. } => *size,
        }
    }

    pub fn starting_value(&self) -> f64 {
        self.starting_value
    }

    /// Extends the book by one size step.
    pub fn push(&mut self, diff: BookDiff, total: f64, estimate: &EstimateOptions) -> Result<()> {
        let starting_value = self.starting_value;
        let steps = match &mut self.steps {
            Steps::Explicit(steps) => steps,
            Steps::Placeholder { .. } => return Err(InvariantViolation::ImmutableBook.into()),
        };

        let (marginal, estimated) = match steps.last() {
            None => {
                let marginal = total - starting_value;
                (marginal, marginal)
            }
            Some(previous) => {
                let marginal = total - previous.total;
                let estimated = if marginal == 0.0 {
                    previous.estimated * estimate.zero_decay
                } else if diff.net_prep() == 1 {
                    marginal
                } else {
                    marginal
                        .max(previous.estimated * estimate.clamp_low)
                        .min(previous.estimated * estimate.clamp_high)
                };

                (marginal, estimated)
            }
        };

        steps.push(Step {
            diff,
            total,
            marginal,
            estimated,
        });

        Ok(())
    }

    /// Like `push`, but fails unless the book currently has `size - 1` steps.
    pub fn push_at(&mut self, size: usize, diff: BookDiff, total: f64, estimate: &EstimateOptions) -> Result<()> {
        if self.size() + 1 != size {
            return Err(InvariantViolation::SizeMismatch {
                expected: size,
                actual: self.size(),
            }
            .into());
        }

        self.push(diff, total, estimate)
    }

    /// Total expected value with at most `k` memorized moves. Panics if `k > size()`.
    pub fn total_value(&self, k: usize) -> f64 {
        if k == 0 {
            return self.starting_value;
        }

        match &self.steps {
            Steps::Explicit(steps) => steps[k - 1].total,
            Steps::Placeholder { size, prep_value, .. } => {
                assert!(k <= *size, "size {} is past the book's size {}", k, size);
                self.starting_value + prep_gain(*prep_value, k)
            }
        }
    }

    pub fn marginal_value(&self, k: usize) -> f64 {
        match &self.steps {
            Steps::Explicit(steps) => steps[k - 1].marginal,
            Steps::Placeholder { prep_value, .. } => {
                prep_gain(*prep_value, k) - prep_gain(*prep_value, k - 1)
            }
        }
    }

    pub fn estimated_marginal_value(&self, k: usize) -> f64 {
        match &self.steps {
            Steps::Explicit(steps) => steps[k - 1].estimated,
            Steps::Placeholder { .. } => self.marginal_value(k),
        }
    }

    pub fn diff(&self, k: usize) -> Cow<'_, BookDiff> {
        match &self.steps {
            Steps::Explicit(steps) => Cow::Borrowed(&steps[k - 1].diff),
            Steps::Placeholder { position, .. } => Cow::Owned(BookDiff::new(
                vec![BookMove::new(
                    position.clone(),
                    Action::Prep(k - 1),
                    self.total_value(k),
                )],
                Vec::new(),
            )),
        }
    }

    /// The book of size `k`, folded from the diffs.
    pub fn book(&self, k: usize) -> OpeningBook {
        let mut snapshots = self.snapshots();
        for _ in 0..k {
            snapshots.advance();
        }

        snapshots.into_book()
    }

    pub fn snapshots(&self) -> Snapshots<'_> {
        Snapshots {
            superbook: self,
            size: 0,
            book: OpeningBook::new(),
        }
    }

    /// The smallest size reaching the highest total value.
    pub fn best_size(&self) -> usize {
        let mut best = 0;
        for k in 1..=self.size() {
            if self.total_value(k) > self.total_value(best) {
                best = k;
            }
        }

        best
    }
}

fn prep_gain(prep_value: f64, k: usize) -> f64 {
    prep_value * ((k + 1) as f64).ln()
}

/// Walks a superbook's repertoires in size order without rebuilding each one.
pub struct Snapshots<'a> {
    superbook: &'a SuperBook,
    size: usize,
    book: OpeningBook,
}

impl<'a> Snapshots<'a> {
    /// Moves to the next size. Returns `None` once the superbook is exhausted.
    pub fn advance(&mut self) -> Option<&OpeningBook> {
        if self.size >= self.superbook.size() {
            return None;
        }

        self.size += 1;
        self.book.apply(&self.superbook.diff(self.size));
        Some(&self.book)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn book(&self) -> &OpeningBook {
        &self.book
    }

    pub fn into_book(self) -> OpeningBook {
        self.book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn pos(name: &str) -> PositionKey {
        PositionKey::normalize(&format!("{} w - - 0 1", name))
    }

    fn mv(position: &str, action: &str, value: f64) -> BookMove {
        BookMove::new(pos(position), Action::Move(action.to_string()), value)
    }

    fn prep(position: &str, i: usize, value: f64) -> BookMove {
        BookMove::new(pos(position), Action::Prep(i), value)
    }

    #[test]
    fn test_placeholder_values() {
        let book = SuperBook::placeholder(pos("leaf"), 0.55, 10, 0.0036);

        assert_eq!(book.size(), 10);
        assert_approx_eq!(book.total_value(0), 0.55);
        assert_approx_eq!(book.total_value(5), 0.55 + 0.0036 * 6f64.ln());
        assert_approx_eq!(book.marginal_value(1), 0.0036 * 2f64.ln());
        assert_approx_eq!(book.estimated_marginal_value(3), book.marginal_value(3));
    }

    #[test]
    fn test_placeholder_diffs_add_one_prep_move() {
        let book = SuperBook::placeholder(pos("leaf"), 0.55, 4, 0.0036);

        let diff = book.diff(3);
        assert_eq!(diff.added, vec![prep("leaf", 2, book.total_value(3))]);
        assert!(diff.removed.is_empty());
        assert_eq!(book.book(4).len(), 4);
    }

    #[test]
    fn test_placeholder_cannot_be_extended() {
        let mut book = SuperBook::placeholder(pos("leaf"), 0.5, 2, 0.0036);

        let err = book
            .push(BookDiff::default(), 0.6, &EstimateOptions::default())
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<InvariantViolation>(),
            Some(&InvariantViolation::ImmutableBook)
        );
    }

    #[test]
    fn test_first_estimate_is_marginal() {
        let mut book = SuperBook::new(0.5);
        book.push(BookDiff::new(vec![mv("a", "e4", 0.6)], vec![]), 0.6, &EstimateOptions::default())
            .unwrap();

        assert_approx_eq!(book.marginal_value(1), 0.1);
        assert_approx_eq!(book.estimated_marginal_value(1), 0.1);
    }

    #[test]
    fn test_zero_gain_decays_estimate() {
        let estimate = EstimateOptions::default();
        let mut book = SuperBook::new(0.5);
        book.push(BookDiff::new(vec![mv("a", "e4", 0.6)], vec![]), 0.6, &estimate).unwrap();
        book.push(BookDiff::default(), 0.6, &estimate).unwrap();

        assert_eq!(book.marginal_value(2), 0.0);
        assert_approx_eq!(book.estimated_marginal_value(2), 0.09);
    }

    #[test]
    fn test_estimate_is_clamped_around_previous() {
        let estimate = EstimateOptions::default();
        let mut book = SuperBook::new(0.5);
        book.push(BookDiff::new(vec![mv("a", "e4", 0.6)], vec![]), 0.6, &estimate).unwrap();
        book.push(BookDiff::new(vec![mv("b", "e5", 0.9)], vec![]), 0.9, &estimate).unwrap();
        book.push(BookDiff::new(vec![mv("c", "d4", 0.91)], vec![]), 0.91, &estimate).unwrap();

        assert_approx_eq!(book.marginal_value(2), 0.3);
        assert_approx_eq!(book.estimated_marginal_value(2), 0.12);
        assert_approx_eq!(book.marginal_value(3), 0.01);
        assert_approx_eq!(book.estimated_marginal_value(3), 0.096);
    }

    #[test]
    fn test_single_prep_step_is_not_clamped() {
        let estimate = EstimateOptions::default();
        let mut book = SuperBook::new(0.5);
        book.push(BookDiff::new(vec![mv("a", "e4", 0.6)], vec![]), 0.6, &estimate).unwrap();
        book.push(BookDiff::new(vec![prep("b", 0, 0.601)], vec![]), 0.601, &estimate).unwrap();

        assert_approx_eq!(book.estimated_marginal_value(2), 0.001);
    }

    #[test]
    fn test_push_at_checks_size() {
        let mut book = SuperBook::new(0.5);

        let err = book
            .push_at(2, BookDiff::default(), 0.5, &EstimateOptions::default())
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<InvariantViolation>(),
            Some(&InvariantViolation::SizeMismatch {
                expected: 2,
                actual: 0
            })
        );
    }

    #[test]
    fn test_snapshots_fold_diffs() {
        let estimate = EstimateOptions::default();
        let mut book = SuperBook::new(0.5);
        book.push(BookDiff::new(vec![mv("a", "e4", 0.6)], vec![]), 0.6, &estimate).unwrap();
        book.push(
            BookDiff::new(vec![mv("a", "d4", 0.7)], vec![mv("a", "e4", 0.6)]),
            0.7,
            &estimate,
        )
        .unwrap();

        let mut snapshots = book.snapshots();
        assert_eq!(snapshots.advance().map(|b| b.len()), Some(1));
        let second = snapshots.advance().cloned().unwrap();
        assert!(snapshots.advance().is_none());

        assert_eq!(second.iter().cloned().collect::<Vec<_>>(), vec![mv("a", "d4", 0.7)]);
        assert_eq!(second, book.book(2));
        assert_eq!(book.best_size(), 2);
    }
}
