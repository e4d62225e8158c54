//! Screen components.

pub mod grid;

pub use grid::GridScreen;
