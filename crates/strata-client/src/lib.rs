//! Client mirror of the strata simulation.
//!
//! - [`prediction`]: local input applied immediately with shared kinematics
//! - [`reconciliation`]: replay after server acknowledgements, visual smoothing
//! - [`interpolation`]: delayed rendering of remote entities
//! - [`chunk_cache`]: versioned cache of received chunks
//! - [`session`]: ties the pieces to the server message stream

pub mod chunk_cache;
pub mod interpolation;
pub mod prediction;
pub mod reconciliation;
pub mod session;

pub use chunk_cache::{ChunkCacheError, ClientChunkCache};
pub use interpolation::{InterpolationBuffer, RemoteEntities, RemoteSample};
pub use prediction::{ClientPredictor, PredictionBuffer, PredictionEntry};
pub use reconciliation::{CorrectionSmoothing, ReconcileConfig, ReconcileOutcome, reconcile};
pub use session::{ClientError, ClientSession, SessionStatus, TickTracker};
