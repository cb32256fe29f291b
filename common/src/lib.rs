pub mod config;
pub mod fingerprint;
pub mod fs;
pub mod math;

pub use config::*;
pub use fingerprint::*;
pub use fs::*;
pub use math::*;
