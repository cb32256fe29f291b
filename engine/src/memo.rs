use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use common::{read_gz_json, write_gz_json, Fingerprint};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{LeafEvaluation, LeafEvaluator, OptimismModel, PositionKey, Score};

/// A backend that can search a position for a fixed amount of time.
pub trait EngineSearch {
    fn search(&mut self, fen: &str, movetime_ms: u64) -> Result<(String, Score)>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct EvalRecord {
    position: PositionKey,
    eval_time: u64,
    best_move: String,
    score: Score,
}

/// Caches engine results per position together with the time they were searched for.
///
/// Requests for more time than a cached result was computed with trigger a new search
/// at the cached time times the smallest power of two that covers the request.
pub struct MemoEvaluator<S> {
    engine: Option<S>,
    records: HashMap<PositionKey, EvalRecord>,
    eval_time: u64,
    optimism: OptimismModel,
    path: Option<PathBuf>,
}

impl<S: EngineSearch> MemoEvaluator<S> {
    pub fn new(engine: Option<S>, eval_time: u64, optimism: OptimismModel) -> Self {
        Self {
            engine,
            records: HashMap::new(),
            eval_time,
            optimism,
            path: None,
        }
    }

    /// Loads the evaluation table at `path` if one exists. A table that can't be read is
    /// discarded, it is only ever a cache of engine output.
    pub fn open(
        path: impl AsRef<Path>,
        engine: Option<S>,
        eval_time: u64,
        optimism: OptimismModel,
    ) -> Self {
        let path = path.as_ref();
        let mut evaluator = Self::new(engine, eval_time, optimism);
        evaluator.path = Some(path.to_path_buf());

        if path.is_file() {
            match read_gz_json::<Vec<EvalRecord>>(path) {
                Ok(records) => {
                    info!("Loaded {} evaluations from {:?}", records.len(), path);
                    evaluator.records = records
                        .into_iter()
                        .map(|r| (r.position.clone(), r))
                        .collect();
                }
                Err(err) => warn!("Ignoring unreadable evaluation table {:?}: {:#}", path, err),
            }
        }

        evaluator
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn eval_time_of(&self, position: &PositionKey) -> Option<u64> {
        self.records.get(position).map(|r| r.eval_time)
    }

    pub fn insert(&mut self, position: PositionKey, eval_time: u64, best_move: String, score: Score) {
        let record = EvalRecord {
            position: position.clone(),
            eval_time,
            best_move,
            score,
        };
        self.records.insert(position, record);
    }

    /// Evaluates `position` with at least `eval_time` ms of search where an engine is available.
    pub fn refine(&mut self, position: &PositionKey, eval_time: u64) -> Result<LeafEvaluation> {
        let record = self.memo_eval(position, eval_time)?;
        Ok(LeafEvaluation::new(record.best_move.clone(), record.score.to_value()))
    }

    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("The evaluation table was not opened from a file"))?;

        let mut records = self.records.values().cloned().collect::<Vec<_>>();
        records.sort_by(|a, b| a.position.cmp(&b.position));
        write_gz_json(path, &records)?;

        info!("Saved {} evaluations to {:?}", records.len(), path);

        Ok(())
    }

    fn memo_eval(&mut self, position: &PositionKey, eval_time: u64) -> Result<&EvalRecord> {
        let search_time = match self.records.get(position) {
            None if eval_time == 0 => {
                bail!("{} has no stored evaluation and no search time was given", position)
            }
            None => Some(eval_time),
            Some(record) if eval_time > record.eval_time && self.engine.is_some() => {
                Some(doubled_time(record.eval_time, eval_time))
            }
            Some(record) if eval_time > record.eval_time => {
                debug!(
                    "No engine to refine {} beyond {} ms, using stored evaluation",
                    position, record.eval_time
                );
                None
            }
            Some(_) => None,
        };

        if let Some(search_time) = search_time {
            let engine = self
                .engine
                .as_mut()
                .ok_or_else(|| anyhow!("No engine configured to evaluate {}", position))?;

            let (best_move, score) = engine.search(&position.for_engine(), search_time)?;
            self.insert(position.clone(), search_time, best_move, score);
        }

        self.records
            .get(position)
            .ok_or_else(|| anyhow!("Missing evaluation for {}", position))
    }
}

impl<S: EngineSearch> LeafEvaluator for MemoEvaluator<S> {
    fn evaluate(&mut self, position: &PositionKey, optimism: f64) -> Result<LeafEvaluation> {
        let eval_time = self.eval_time;
        let record = self.memo_eval(position, eval_time)?.clone();
        let value = self
            .optimism
            .apply(record.score.to_value(), record.eval_time, optimism);

        Ok(LeafEvaluation::new(record.best_move.clone(), value))
    }

    /// Covers the stored table, so refining or adding evaluations changes it.
    fn fingerprint(&self, fingerprint: &mut Fingerprint) -> Result<()> {
        let mut records = self.records.values().collect::<Vec<_>>();
        records.sort_by(|a, b| a.position.cmp(&b.position));

        fingerprint
            .add(&self.eval_time)?
            .add(&self.optimism)?
            .add(&records)?;

        Ok(())
    }
}

/// `current * 2^ceil(log2(requested / current))`
fn doubled_time(current: u64, requested: u64) -> u64 {
    let mut time = current.max(1);
    while time < requested {
        time *= 2;
    }

    time
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[derive(Default)]
    struct CountingEngine {
        searches: Vec<u64>,
    }

    impl EngineSearch for CountingEngine {
        fn search(&mut self, _fen: &str, movetime_ms: u64) -> Result<(String, Score)> {
            self.searches.push(movetime_ms);
            Ok(("e2e4".to_string(), Score::Centipawns(30)))
        }
    }

    fn key() -> PositionKey {
        PositionKey::normalize("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
    }

    #[test]
    fn test_doubled_time() {
        assert_eq!(doubled_time(1000, 1000), 1000);
        assert_eq!(doubled_time(1000, 1001), 2000);
        assert_eq!(doubled_time(1000, 5000), 8000);
    }

    #[test]
    fn test_results_are_memoized() {
        let mut evaluator =
            MemoEvaluator::new(Some(CountingEngine::default()), 1000, OptimismModel::default());

        let first = evaluator.evaluate(&key(), 0.0).unwrap();
        let second = evaluator.evaluate(&key(), 0.0).unwrap();

        assert_eq!(first, second);
        assert_eq!(evaluator.engine.as_ref().unwrap().searches, vec![1000]);
        assert_approx_eq!(first.value, Score::Centipawns(30).to_value());
    }

    #[test]
    fn test_refine_searches_longer() {
        let mut evaluator =
            MemoEvaluator::new(Some(CountingEngine::default()), 1000, OptimismModel::default());

        evaluator.evaluate(&key(), 0.0).unwrap();
        evaluator.refine(&key(), 3000).unwrap();
        evaluator.refine(&key(), 2000).unwrap();

        assert_eq!(evaluator.engine.as_ref().unwrap().searches, vec![1000, 4000]);
        assert_eq!(evaluator.eval_time_of(&key()), Some(4000));
    }

    #[test]
    fn test_refining_changes_the_fingerprint() {
        let digest = |evaluator: &MemoEvaluator<CountingEngine>| {
            let mut fingerprint = Fingerprint::new();
            evaluator.fingerprint(&mut fingerprint).unwrap();
            fingerprint.finish()
        };
        let mut evaluator =
            MemoEvaluator::new(Some(CountingEngine::default()), 1000, OptimismModel::default());
        evaluator.evaluate(&key(), 0.0).unwrap();
        let evaluated = digest(&evaluator);

        evaluator.evaluate(&key(), 0.0).unwrap();
        assert_eq!(digest(&evaluator), evaluated);

        evaluator.refine(&key(), 3000).unwrap();
        assert_ne!(digest(&evaluator), evaluated);

        let longer =
            MemoEvaluator::<CountingEngine>::new(None, 2000, OptimismModel::default());
        let shorter =
            MemoEvaluator::<CountingEngine>::new(None, 1000, OptimismModel::default());
        assert_ne!(digest(&longer), digest(&shorter));
    }

    #[test]
    fn test_zero_time_for_unknown_position_fails() {
        let mut evaluator =
            MemoEvaluator::new(Some(CountingEngine::default()), 0, OptimismModel::default());

        assert!(evaluator.evaluate(&key(), 0.0).is_err());
    }

    #[test]
    fn test_table_without_engine() {
        let mut evaluator =
            MemoEvaluator::<CountingEngine>::new(None, 1000, OptimismModel::default());
        evaluator.insert(key(), 500, "d2d4".to_string(), Score::Centipawns(0));

        let evaluation = evaluator.evaluate(&key(), 1.0).unwrap();
        let expected = 0.5 + OptimismModel::default().error(500);

        assert_eq!(evaluation.best_move, "d2d4");
        assert_approx_eq!(evaluation.value, expected);

        let other = PositionKey::normalize("8/8/8/8/8/8/8/K6k w - - 0 1");
        assert!(evaluator.evaluate(&other, 0.0).is_err());
    }

    #[test]
    fn test_table_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evals.json.gz");

        let mut evaluator = MemoEvaluator::open(
            &path,
            Some(CountingEngine::default()),
            1000,
            OptimismModel::default(),
        );
        evaluator.evaluate(&key(), 0.0).unwrap();
        evaluator.save().unwrap();

        let reopened =
            MemoEvaluator::<CountingEngine>::open(&path, None, 1000, OptimismModel::default());

        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.eval_time_of(&key()), Some(1000));
    }

    #[test]
    fn test_corrupt_table_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evals.json.gz");
        std::fs::write(&path, b"not gzip").unwrap();

        let evaluator =
            MemoEvaluator::<CountingEngine>::open(&path, None, 1000, OptimismModel::default());

        assert!(evaluator.is_empty());
    }
}
