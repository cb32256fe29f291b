use common::sigmoid;
use serde::{Deserialize, Serialize};

/// Scores beyond ten pawns are treated as decisive.
pub const CAP_CENTIPAWNS: i32 = 10 * 100;

/// Scales the capped centipawn range so that +10 pawns maps to a 90% expected value.
const SIGMOID_90_PERCENT: f64 = 2.19722457733;

/// An engine score from the perspective of the side to move.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

impl Score {
    pub fn to_centipawns(&self) -> i32 {
        match *self {
            Score::Centipawns(cp) => cp.clamp(-CAP_CENTIPAWNS, CAP_CENTIPAWNS),
            Score::Mate(mate) if mate > 0 => CAP_CENTIPAWNS,
            Score::Mate(_) => -CAP_CENTIPAWNS,
        }
    }

    /// Expected value in `[0, 1]` for the side to move.
    pub fn to_value(&self) -> f64 {
        match *self {
            Score::Centipawns(_) => {
                let cp = self.to_centipawns() as f64;
                sigmoid(SIGMOID_90_PERCENT * (cp / CAP_CENTIPAWNS as f64))
            }
            Score::Mate(0) => 0.0,
            Score::Mate(mate) if mate > 0 => 0.9,
            Score::Mate(_) => 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_even_position_is_half() {
        assert_approx_eq!(Score::Centipawns(0).to_value(), 0.5);
    }

    #[test]
    fn test_cap_maps_to_ninety_percent() {
        assert_approx_eq!(Score::Centipawns(1000).to_value(), 0.9, 1e-9);
        assert_approx_eq!(Score::Centipawns(2500).to_value(), 0.9, 1e-9);
        assert_approx_eq!(Score::Centipawns(-4000).to_value(), 0.1, 1e-9);
    }

    #[test]
    fn test_mate_scores() {
        assert_eq!(Score::Mate(0).to_value(), 0.0);
        assert_eq!(Score::Mate(3).to_value(), 0.9);
        assert_eq!(Score::Mate(-2).to_value(), 0.1);
        assert_eq!(Score::Mate(-2).to_centipawns(), -CAP_CENTIPAWNS);
        assert_eq!(Score::Mate(0).to_centipawns(), -CAP_CENTIPAWNS);
    }

    #[test]
    fn test_value_is_monotonic_in_centipawns() {
        let values = [-300, -50, 0, 35, 120]
            .into_iter()
            .map(|cp| Score::Centipawns(cp).to_value())
            .collect::<Vec<_>>();

        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }
}
