mod evaluator;
mod memo;
mod optimism;
mod options;
mod position_key;
mod score;
mod uci;

pub use evaluator::*;
pub use memo::*;
pub use optimism::*;
pub use options::*;
pub use position_key::*;
pub use score::*;
pub use uci::*;
