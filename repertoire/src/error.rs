use std::fmt::{self, Display, Formatter};

/// Internal consistency failures. These indicate a bug rather than bad input and
/// abort the computation.
#[derive(Clone, Debug, PartialEq)]
pub enum InvariantViolation {
    OversizedRepertoire { size: usize, budget: usize },
    ContradictoryDiff { moves: Vec<String> },
    SizeMismatch { expected: usize, actual: usize },
    ImmutableBook,
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::OversizedRepertoire { size, budget } => write!(
                f,
                "repertoire holds {} moves but the size budget is {}",
                size, budget
            ),
            InvariantViolation::ContradictoryDiff { moves } => write!(
                f,
                "diff both adds and removes: {}",
                moves.join(", ")
            ),
            InvariantViolation::SizeMismatch { expected, actual } => write!(
                f,
                "expected to extend the book to size {} but it has size {}",
                expected, actual
            ),
            InvariantViolation::ImmutableBook => {
                write!(f, "placeholder books cannot be extended")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}
