use std::collections::HashMap;

use anyhow::{anyhow, Result};
use common::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::PositionKey;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafEvaluation {
    pub best_move: String,
    /// Expected value in `[0, 1]` for the side to move.
    pub value: f64,
}

impl LeafEvaluation {
    pub fn new(best_move: impl Into<String>, value: f64) -> Self {
        Self {
            best_move: best_move.into(),
            value,
        }
    }
}

/// Evaluates positions that the opening tree does not expand further.
pub trait LeafEvaluator {
    fn evaluate(&mut self, position: &PositionKey, optimism: f64) -> Result<LeafEvaluation>;

    /// Adds everything that evaluations depend on. Two evaluators with equal
    /// fingerprints return the same evaluation for every position they both know.
    fn fingerprint(&self, fingerprint: &mut Fingerprint) -> Result<()>;
}

impl<E: LeafEvaluator + ?Sized> LeafEvaluator for &mut E {
    fn evaluate(&mut self, position: &PositionKey, optimism: f64) -> Result<LeafEvaluation> {
        (**self).evaluate(position, optimism)
    }

    fn fingerprint(&self, fingerprint: &mut Fingerprint) -> Result<()> {
        (**self).fingerprint(fingerprint)
    }
}

/// Serves evaluations from a fixed table. Optimism shifts the value by `optimism * spread`.
#[derive(Clone, Debug, Default)]
pub struct StaticEvaluator {
    evaluations: HashMap<PositionKey, LeafEvaluation>,
    spread: f64,
    calls: usize,
}

impl StaticEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spread(spread: f64) -> Self {
        Self {
            spread,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, position: PositionKey, evaluation: LeafEvaluation) {
        self.evaluations.insert(position, evaluation);
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FromIterator<(PositionKey, LeafEvaluation)> for StaticEvaluator {
    fn from_iter<T: IntoIterator<Item = (PositionKey, LeafEvaluation)>>(iter: T) -> Self {
        Self {
            evaluations: iter.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl LeafEvaluator for StaticEvaluator {
    fn evaluate(&mut self, position: &PositionKey, optimism: f64) -> Result<LeafEvaluation> {
        self.calls += 1;

        let evaluation = self
            .evaluations
            .get(position)
            .ok_or_else(|| anyhow!("No evaluation available for {}", position))?;

        Ok(LeafEvaluation {
            best_move: evaluation.best_move.clone(),
            value: evaluation.value + self.spread * optimism,
        })
    }

    fn fingerprint(&self, fingerprint: &mut Fingerprint) -> Result<()> {
        let mut evaluations = self.evaluations.iter().collect::<Vec<_>>();
        evaluations.sort_by(|(a, _), (b, _)| a.cmp(b));

        fingerprint.add(&self.spread)?.add(&evaluations)?;

        Ok(())
    }
}
