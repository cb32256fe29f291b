//! Finds the opening repertoire worth the most for every number of memorized moves.

mod aggregate;
mod book_move;
mod cache;
mod error;
mod opening_book;
mod optimizer;
mod options;
mod report;
mod role;
mod stats;
mod superbook;

pub use aggregate::*;
pub use book_move::*;
pub use cache::*;
pub use error::*;
pub use opening_book::*;
pub use optimizer::*;
pub use options::*;
pub use report::*;
pub use role::*;
pub use stats::*;
pub use superbook::*;
