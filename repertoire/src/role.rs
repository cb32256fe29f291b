use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Whose turn it is at a position, relative to the repertoire's owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Role {
    /// The owner picks one move to memorize.
    Mover,
    /// The opponent plays any observed reply.
    Opponent,
}

impl Role {
    pub fn other(self) -> Self {
        match self {
            Role::Mover => Role::Opponent,
            Role::Opponent => Role::Mover,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Role::Mover => f.write_str("mover"),
            Role::Opponent => f.write_str("opponent"),
        }
    }
}
