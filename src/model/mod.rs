pub mod config;
pub mod position;
pub mod tree;

pub use config::*;
pub use position::*;
pub use tree::*;
