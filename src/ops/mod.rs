pub mod check;
pub mod normalize;
pub mod pending;
pub mod reparent;
pub mod tree_builder;
pub mod view;
