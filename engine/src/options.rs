use std::path::PathBuf;

use anyhow::Result;
use common::{Config, ConfigLoader};

use crate::OptimismModel;

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluatorOptions {
    /// UCI engine binary. Without one only stored evaluations can be served.
    pub engine_path: Option<PathBuf>,
    /// Search time per leaf, in milliseconds.
    pub eval_time: u64,
    pub evaluations_path: Option<PathBuf>,
    pub optimism: OptimismModel,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            engine_path: None,
            eval_time: 1000,
            evaluations_path: None,
            optimism: OptimismModel::default(),
        }
    }
}

impl Config for EvaluatorOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let default = OptimismModel::default();
        let get_f64 = |name: &str, default: f64| {
            config
                .get(name)
                .and_then(|v| v.as_f64())
                .unwrap_or(default)
        };

        Ok(Self {
            engine_path: config.get_optional_path("engine_path")?,
            eval_time: config
                .get("eval_time")
                .and_then(|v| v.as_u64())
                .unwrap_or(1000),
            evaluations_path: config.get_optional_path("evaluations_path")?,
            optimism: OptimismModel {
                nodes_per_second: get_f64("nodes_per_second", default.nodes_per_second),
                elo_scale: get_f64("elo_scale", default.elo_scale),
                elo_midpoint: get_f64("elo_midpoint", default.elo_midpoint),
                elo_floor: get_f64("elo_floor", default.elo_floor),
                elo_steepness: get_f64("elo_steepness", default.elo_steepness),
                perfect_elo: get_f64("perfect_elo", default.perfect_elo),
                elo_per_unit_error: get_f64("elo_per_unit_error", default.elo_per_unit_error),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::from_str("evaluator {}", "evaluator".to_string()).unwrap();
        let options: EvaluatorOptions = config.load().unwrap();

        assert_eq!(options, EvaluatorOptions::default());
    }

    #[test]
    fn test_overrides() {
        let config = ConfigLoader::from_str(
            r#"
            evaluator {
                eval_time = 250
                nodes_per_second = 2000000
            }
            "#,
            "evaluator".to_string(),
        )
        .unwrap();
        let options: EvaluatorOptions = config.load().unwrap();

        assert_eq!(options.eval_time, 250);
        assert_eq!(options.optimism.nodes_per_second, 2_000_000.0);
        assert!(options.engine_path.is_none());
    }
}
