//! Wiring for the strata server binary: the simulation thread loop and the
//! persistence hooks around it.

pub mod error;
pub mod runner;

pub use error::ServerError;
pub use runner::{LoopSummary, load_world, run_simulation, save_world};
