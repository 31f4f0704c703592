//! Voxel terrain for the strata simulation.
//!
//! The [`ChunkStore`] owns a sparse map of 32³ [`Chunk`]s with monotonic
//! per-chunk versions. Terrain changes only through [`TerraformOp`]s applied
//! inside a simulation tick; clients pull chunks as [`CompressedChunk`]
//! payloads by last-known version.

pub mod chunk;
pub mod compression;
pub mod raycast;
pub mod store;
pub mod terraform;

pub use chunk::{CHUNK_SIZE, CHUNK_VOLUME, Chunk, ChunkId, EMPTY, SOLID};
pub use compression::{ChunkCodecError, CompressedChunk, decode_voxels};
pub use raycast::{VoxelHit, raycast};
pub use store::ChunkStore;
pub use terraform::{TerraformError, TerraformLimits, TerraformOp};
