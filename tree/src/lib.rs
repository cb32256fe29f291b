//! Builds the tree of opening positions from corpus statistics.

mod builder;
mod node;
mod options;
mod stats;

pub use builder::*;
pub use node::*;
pub use options::*;
pub use stats::*;
