//! timeglass CLI library.
//!
//! This crate provides the command-line interface over the engine and store.

mod cli;
pub mod commands;
mod config;

pub use cli::{CategoriesAction, Cli, Commands};
pub use config::{Config, RecomputeSettings};
