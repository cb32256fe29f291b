use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const CLOCK_PLACEHOLDER: &str = "-";

/// A FEN with the half-move clock replaced by `-`, so positions that differ only
/// in that counter share a key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionKey(Arc<str>);

impl PositionKey {
    pub fn normalize(fen: &str) -> Self {
        Self(replace_clock(fen, CLOCK_PLACEHOLDER).into())
    }

    /// The key with a concrete half-move clock, suitable for an engine.
    pub fn for_engine(&self) -> String {
        replace_clock(&self.0, "0")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PositionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PositionKey {
    fn from(fen: &str) -> Self {
        Self::normalize(fen)
    }
}

fn replace_clock(fen: &str, clock: &str) -> String {
    let mut fields = fen.split_whitespace().collect::<Vec<_>>();
    if fields.len() >= 2 {
        let idx = fields.len() - 2;
        fields[idx] = clock;
    }

    fields.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_normalize_drops_halfmove_clock() {
        let key = PositionKey::normalize(START);

        assert_eq!(
            key.as_str(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - - 1"
        );
    }

    #[test]
    fn test_transpositions_share_a_key() {
        let a = PositionKey::normalize("8/8/8/8/8/8/8/K6k w - - 3 40");
        let b = PositionKey::normalize("8/8/8/8/8/8/8/K6k w - - 17 40");

        assert_eq!(a, b);
    }

    #[test]
    fn test_for_engine_restores_a_clock() {
        let key = PositionKey::normalize(START);

        assert_eq!(key.for_engine(), START);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let key = PositionKey::normalize(START);

        assert_eq!(PositionKey::normalize(key.as_str()), key);
    }
}
