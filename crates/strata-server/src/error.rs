use strata_config::ConfigError;
use strata_net::TransportError;
use strata_sim::{PersistenceError, SimError};

/// Anything that stops the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("simulation: {0}")]
    Sim(#[from] SimError),

    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("simulation thread panicked")]
    SimThreadPanicked,
}
