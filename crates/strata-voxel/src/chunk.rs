//! Fixed-size voxel chunks and their grid coordinates.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use strata_protocol::ChunkCoord;

/// Voxels along each edge of a chunk.
pub const CHUNK_SIZE: usize = 32;

/// Total voxels in one chunk (32³ = 32 768).
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

/// Empty voxel value.
pub const EMPTY: u8 = 0;

/// Plain solid voxel value. Values `>= 2` are material ids.
pub const SOLID: u8 = 1;

const CHUNK_SIZE_I32: i32 = CHUNK_SIZE as i32;

// ---------------------------------------------------------------------------
// ChunkId
// ---------------------------------------------------------------------------

/// Integer coordinate of a chunk in the chunk grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkId {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk containing a world-space position: `floor(pos / 32)` per axis.
    pub fn from_world(pos: Vec3) -> Self {
        Self::containing(pos.floor().as_ivec3())
    }

    /// The chunk containing an integer voxel coordinate.
    pub fn containing(voxel: IVec3) -> Self {
        Self {
            x: voxel.x.div_euclid(CHUNK_SIZE_I32),
            y: voxel.y.div_euclid(CHUNK_SIZE_I32),
            z: voxel.z.div_euclid(CHUNK_SIZE_I32),
        }
    }

    /// World-space voxel coordinate of this chunk's minimum corner.
    pub fn origin(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z) * CHUNK_SIZE_I32
    }
}

impl From<ChunkCoord> for ChunkId {
    fn from([x, y, z]: ChunkCoord) -> Self {
        Self { x, y, z }
    }
}

impl From<ChunkId> for ChunkCoord {
    fn from(id: ChunkId) -> Self {
        [id.x, id.y, id.z]
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One 32³ block of voxels with its mutation counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    version: u32,
    voxels: Box<[u8]>,
}

impl Chunk {
    /// An all-empty chunk at version 0.
    pub fn new() -> Self {
        Self {
            version: 0,
            voxels: vec![EMPTY; CHUNK_VOLUME].into_boxed_slice(),
        }
    }

    /// Rebuild a chunk from stored parts. Returns `None` if `voxels` is not
    /// exactly [`CHUNK_VOLUME`] bytes.
    pub fn from_parts(version: u32, voxels: Box<[u8]>) -> Option<Self> {
        (voxels.len() == CHUNK_VOLUME).then_some(Self { version, voxels })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Raw voxel bytes, x varying fastest.
    pub fn voxels(&self) -> &[u8] {
        &self.voxels
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.voxels[linear_index(x, y, z)]
    }

    /// Count of non-empty voxels.
    pub fn solid_count(&self) -> usize {
        self.voxels.iter().filter(|&&v| v != EMPTY).count()
    }

    pub(crate) fn voxels_mut(&mut self) -> &mut [u8] {
        &mut self.voxels
    }

    pub(crate) fn bump_version(&mut self) -> u32 {
        self.version = self.version.saturating_add(1);
        self.version
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts local `(x, y, z)` to a linear index (x varies fastest).
pub fn linear_index(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < CHUNK_SIZE && y < CHUNK_SIZE && z < CHUNK_SIZE);
    x + y * CHUNK_SIZE + z * CHUNK_SIZE * CHUNK_SIZE
}

/// Local coordinate of a world voxel inside its chunk.
pub fn local_coord(voxel: IVec3) -> (usize, usize, usize) {
    (
        voxel.x.rem_euclid(CHUNK_SIZE_I32) as usize,
        voxel.y.rem_euclid(CHUNK_SIZE_I32) as usize,
        voxel.z.rem_euclid(CHUNK_SIZE_I32) as usize,
    )
}
