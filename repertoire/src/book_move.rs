use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

use engine::PositionKey;
use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Action {
    /// A concrete move in the position.
    Move(String),
    /// The i-th unit of generic preparation at a position the tree does not expand.
    Prep(usize),
}

impl Action {
    pub fn is_prep(&self) -> bool {
        matches!(self, Action::Prep(_))
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(action) => f.write_str(action),
            Action::Prep(i) => write!(f, "move_{}", i),
        }
    }
}

/// A memorized move together with the total value of the book it was chosen for.
///
/// The value is part of the identity: the same move chosen for books of different
/// value is a different entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookMove {
    pub position: PositionKey,
    pub action: Action,
    pub value: f64,
}

impl BookMove {
    pub fn new(position: PositionKey, action: Action, value: f64) -> Self {
        Self {
            position,
            action,
            value,
        }
    }
}

impl PartialEq for BookMove {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BookMove {}

impl PartialOrd for BookMove {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BookMove {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.action.cmp(&other.action))
            .then_with(|| self.value.total_cmp(&other.value))
    }
}

impl Hash for BookMove {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
        self.action.hash(state);
        self.value.to_bits().hash(state);
    }
}

impl Display for BookMove {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {:.6})", self.position, self.action, self.value)
    }
}
