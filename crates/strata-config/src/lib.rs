//! Configuration system for the strata server.
//!
//! Settings persist to disk as RON files, accept CLI overrides via clap, and
//! stay forward/backward compatible: every section falls back to defaults.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AuthConfig, AuthMode, CONFIG_FILE, Config, DebugConfig, MovementConfig, PerceptionConfig,
    ProjectileConfig, ServerConfig, SimulationConfig, SpellDef, SpellsConfig, TerrainConfig,
    TokenEntry,
};
pub use error::ConfigError;
