//! Usage tracker CLI library.
//!
//! This crate provides the `pa` command-line host for the tracker.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
