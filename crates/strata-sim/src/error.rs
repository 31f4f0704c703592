//! Error types for the simulation.

use crate::entity::EntityId;
use crate::persistence::PersistenceError;
use crate::registry::RegistryError;

/// A recoverable failure inside one subsystem's planning step.
///
/// The phase that raised it is skipped for the current tick and the other
/// phases run normally.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubsystemFault {
    /// An entity carries a NaN or infinite position.
    #[error("entity {0} has a non-finite position")]
    NonFinitePosition(EntityId),

    /// The planning code panicked.
    #[error("subsystem panicked: {0}")]
    Panicked(String),
}

/// Errors that stop the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Shared state is inconsistent. The process must not keep ticking.
    #[error("fatal simulation fault: {0}")]
    Fatal(#[from] RegistryError),

    /// A world save could not be restored or produced.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}
