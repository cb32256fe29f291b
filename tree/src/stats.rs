use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Observed continuations of one position across the game corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionStats {
    pub fen: String,
    pub moves: Vec<MoveStats>,
    /// The engine's preferred move, when it leads somewhere the corpus may not.
    #[serde(default)]
    pub best_move: Option<MoveEdge>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveStats {
    pub action: String,
    pub child: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveEdge {
    pub action: String,
    pub child: String,
}

impl PositionStats {
    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            moves: Vec::new(),
            best_move: None,
        }
    }

    pub fn with_move(mut self, action: &str, child: &str, count: u64) -> Self {
        self.moves.push(MoveStats {
            action: action.to_string(),
            child: child.to_string(),
            count,
        });
        self
    }

    pub fn with_best_move(mut self, action: &str, child: &str) -> Self {
        self.best_move = Some(MoveEdge {
            action: action.to_string(),
            child: child.to_string(),
        });
        self
    }

    pub fn total_count(&self) -> u64 {
        self.moves.iter().map(|m| m.count).sum()
    }
}

/// Reads a stream of json records, one position per record.
pub fn read_stats<R: Read>(reader: R) -> Result<Vec<PositionStats>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<PositionStats>()
        .enumerate()
        .map(|(i, record)| record.with_context(|| format!("Invalid position record #{}", i + 1)))
        .collect()
}

pub fn load_stats(path: &Path) -> Result<Vec<PositionStats>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    read_stats(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_json_lines() {
        let input = r#"
            {"fen": "a w - - 0 1", "moves": [{"action": "e2e4", "child": "b b - - 0 1", "count": 30}]}
            {"fen": "b b - - 0 1", "moves": [], "best_move": {"action": "e7e5", "child": "c w - - 0 2"}}
        "#;

        let stats = read_stats(input.as_bytes()).unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].total_count(), 30);
        assert!(stats[0].best_move.is_none());
        assert_eq!(stats[1].best_move.as_ref().unwrap().action, "e7e5");
    }

    #[test]
    fn test_bad_record_is_reported() {
        let input = r#"{"fen": "a w - - 0 1", "moves": []} {"fen": 3}"#;
        let err = read_stats(input.as_bytes()).unwrap_err();

        assert!(format!("{:#}", err).contains("#2"));
    }
}
