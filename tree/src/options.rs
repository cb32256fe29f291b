use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use common::{Config, ConfigLoader};
use engine::PositionKey;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct TreeOptions {
    /// Exponent applied to move weights. Values above 1 concentrate play on the most
    /// common move, modelling opponents stronger than the corpus. Zero disables it.
    pub player_strength: f64,
    /// Positions observed fewer times than this are reported as unreliable.
    pub reliability_floor: u64,
    pub multipliers: ProbabilityMultipliers,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            player_strength: 1.0,
            reliability_floor: 20,
            multipliers: ProbabilityMultipliers::default(),
        }
    }
}

impl Config for TreeOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let multipliers = match config.get_optional_path("probability_multipliers")? {
            Some(path) => ProbabilityMultipliers::load(&path)?,
            None => ProbabilityMultipliers::default(),
        };

        Ok(Self {
            player_strength: config
                .get("player_strength")
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0),
            reliability_floor: config
                .get("reliability_floor")
                .and_then(|v| v.as_u64())
                .unwrap_or(20),
            multipliers,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiplierRecord {
    pub fen: String,
    pub action: String,
    pub multiplier: f64,
}

/// Hand-tuned corrections to how often a move is expected to be played.
#[derive(Clone, Debug, Default)]
pub struct ProbabilityMultipliers(HashMap<(PositionKey, String), f64>);

impl ProbabilityMultipliers {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open probability multipliers {:?}", path))?;
        let records: Vec<MultiplierRecord> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid probability multipliers in {:?}", path))?;

        Ok(records.into_iter().collect())
    }

    pub fn get(&self, position: &PositionKey, action: &str) -> f64 {
        self.0
            .get(&(position.clone(), action.to_string()))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<MultiplierRecord> for ProbabilityMultipliers {
    fn from_iter<T: IntoIterator<Item = MultiplierRecord>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|r| ((PositionKey::normalize(&r.fen), r.action), r.multiplier))
                .collect(),
        )
    }
}
