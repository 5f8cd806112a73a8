//! Command implementations for the Tensorlink CLI.

pub mod predict;
pub mod train;
