//! Authoritative world simulation for the strata server.
//!
//! [`Simulation`] owns the entity registry, the voxel chunk store, per-client
//! input buffers and the projectile and perception subsystems. It is stepped
//! at a fixed rate by a [`FixedTimestep`] and talks to clients only through
//! the transport-agnostic [`strata_protocol::MessageSink`].

pub mod auth;
pub mod collision;
pub mod driver;
pub mod entity;
pub mod error;
pub mod input;
pub mod perception;
pub mod persistence;
pub mod projectile;
pub mod registry;
pub mod session;
pub mod simulation;
pub mod spells;

pub use auth::{AuthError, OpenValidator, SessionValidator, TokenTable, validator_from_config};
pub use driver::FixedTimestep;
pub use entity::{Entity, EntityId, EntityInit};
pub use error::{SimError, SubsystemFault};
pub use input::InputBuffer;
pub use perception::{NpcPerception, PerceptionParams, PerceptionSystem};
pub use persistence::{
    InMemoryPersistence, PersistenceError, SavedChunk, WorldPersistence, WorldSave,
};
pub use projectile::{ProjectileError, ProjectileParams, ProjectileSystem};
pub use registry::{EntityRegistry, RegistryError};
pub use session::{ClientSession, ConnectionState, SessionTable};
pub use simulation::{Phase, Simulation, StepReport};
pub use spells::{SpellBook, SpellEffect, SpellError};
