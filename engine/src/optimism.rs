use common::scaled_sigmoid;
use serde::{Deserialize, Serialize};

/// Estimates how noisy an evaluation is from the time spent on it, and shifts
/// evaluations by that noise to model variance-seeking (positive optimism) or
/// variance-averse (negative optimism) play.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimismModel {
    pub nodes_per_second: f64,
    pub elo_scale: f64,
    pub elo_midpoint: f64,
    pub elo_floor: f64,
    pub elo_steepness: f64,
    pub perfect_elo: f64,
    pub elo_per_unit_error: f64,
}

impl Default for OptimismModel {
    fn default() -> Self {
        // Elo against search size, fitted to published engine self-play data.
        Self {
            nodes_per_second: 1_000_000.0,
            elo_scale: 3.30869470e+03,
            elo_midpoint: 1.34955266e+01,
            elo_floor: 4.88409556e+02,
            elo_steepness: 2.87964204e-01,
            perfect_elo: 3797.0,
            elo_per_unit_error: 20000.0,
        }
    }
}

impl OptimismModel {
    pub fn elo(&self, eval_time_ms: u64) -> f64 {
        let nodes = self.nodes_per_second * (eval_time_ms as f64 / 1000.0);
        let log2_nodes = nodes.max(1.0).log2();

        scaled_sigmoid(
            log2_nodes,
            self.elo_scale,
            self.elo_midpoint,
            self.elo_floor,
            self.elo_steepness,
        )
    }

    /// Expected evaluation error, on the order of 0.02 for a one second search.
    pub fn error(&self, eval_time_ms: u64) -> f64 {
        (self.perfect_elo - self.elo(eval_time_ms)) / self.elo_per_unit_error
    }

    pub fn apply(&self, value: f64, eval_time_ms: u64, optimism: f64) -> f64 {
        if optimism == 0.0 {
            return value;
        }

        value + self.error(eval_time_ms) * optimism
    }
}
