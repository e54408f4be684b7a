//! Command-line interface for the guidocoin binary

pub mod commands;

pub use commands::*;
