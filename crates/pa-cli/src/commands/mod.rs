//! CLI subcommand implementations.

pub mod answer;
pub mod events;
pub mod run;
pub mod sessions;
pub mod status;
pub mod util;
