//! Session runner module.

mod orchestrator;
mod stats;

pub use orchestrator::{RunnerConfig, SessionRunner};
pub use stats::RunStats;
