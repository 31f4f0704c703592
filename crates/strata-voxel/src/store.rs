//! Sparse chunk store: owner of all voxel data and per-chunk versions.
//!
//! Chunks are created lazily and never removed during a session. Every
//! accepted mutation that changes at least one voxel of a chunk bumps that
//! chunk's version by exactly one.

use glam::{IVec3, Vec3};
use rustc_hash::FxHashMap;
use strata_protocol::TerraformKind;
use tracing::debug;

use crate::chunk::{CHUNK_SIZE, Chunk, ChunkId, EMPTY, linear_index, local_coord};
use crate::compression::CompressedChunk;
use crate::terraform::{TerraformError, TerraformLimits, TerraformOp};

/// Owns every chunk, keyed by [`ChunkId`].
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: FxHashMap<ChunkId, Chunk>,
    limits: TerraformLimits,
}

impl ChunkStore {
    pub fn new(limits: TerraformLimits) -> Self {
        Self {
            chunks: FxHashMap::default(),
            limits,
        }
    }

    pub fn limits(&self) -> &TerraformLimits {
        &self.limits
    }

    /// The chunk at `id`, allocating an empty one on first touch.
    pub fn get_or_create(&mut self, id: ChunkId) -> &Chunk {
        self.chunks.entry(id).or_default()
    }

    /// The chunk at `id` if it was ever touched.
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id)
    }

    /// Current version of a chunk. Untouched chunks are at version 0.
    pub fn version(&self, id: ChunkId) -> u32 {
        self.chunks.get(&id).map_or(0, Chunk::version)
    }

    /// Number of allocated chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Voxel value at an integer world coordinate.
    pub fn voxel(&self, pos: IVec3) -> u8 {
        let Some(chunk) = self.chunks.get(&ChunkId::containing(pos)) else {
            return EMPTY;
        };
        let (x, y, z) = local_coord(pos);
        chunk.get(x, y, z)
    }

    /// Validate and apply a sphere edit.
    ///
    /// Returns `(chunk_id, new_version)` for every chunk in which at least one
    /// voxel changed, in ascending `(x, y, z)` chunk order. A rejected
    /// operation changes nothing.
    pub fn apply_terraform(
        &mut self,
        op: &TerraformOp,
    ) -> Result<Vec<(ChunkId, u32)>, TerraformError> {
        let value = op.validate(&self.limits)?;

        let min = (op.center - Vec3::splat(op.radius)).floor().as_ivec3();
        let max = (op.center + Vec3::splat(op.radius)).floor().as_ivec3();
        let chunk_min = ChunkId::containing(min);
        let chunk_max = ChunkId::containing(max);
        let radius_sq = op.radius * op.radius;

        let mut changed = Vec::new();
        for cx in chunk_min.x..=chunk_max.x {
            for cy in chunk_min.y..=chunk_max.y {
                for cz in chunk_min.z..=chunk_max.z {
                    let id = ChunkId::new(cx, cy, cz);
                    let chunk = match op.kind {
                        TerraformKind::SphereAdd => self.chunks.entry(id).or_default(),
                        // Removing or recolouring cannot change an empty chunk.
                        TerraformKind::SphereSub | TerraformKind::Paint => {
                            match self.chunks.get_mut(&id) {
                                Some(chunk) => chunk,
                                None => continue,
                            }
                        }
                    };
                    let origin = id.origin();
                    let lo = (min - origin).clamp(IVec3::ZERO, IVec3::splat(CHUNK_SIZE as i32 - 1));
                    let hi = (max - origin).clamp(IVec3::ZERO, IVec3::splat(CHUNK_SIZE as i32 - 1));
                    if carve_sphere(chunk, origin, lo, hi, op, value, radius_sq) {
                        changed.push((id, chunk.bump_version()));
                    }
                }
            }
        }

        debug!(
            op = ?op.kind,
            radius = op.radius,
            changed = changed.len(),
            "Applied terraform"
        );
        Ok(changed)
    }

    /// Compressed copy of a chunk, only if the server holds a newer version
    /// than the client.
    pub fn serve_if_newer(&self, id: ChunkId, client_known_version: u32) -> Option<CompressedChunk> {
        let chunk = self.chunks.get(&id)?;
        (chunk.version() > client_known_version)
            .then(|| CompressedChunk::encode(id, chunk.version(), chunk.voxels()))
    }

    /// All chunks sorted by id.
    pub fn iter_sorted(&self) -> Vec<(ChunkId, &Chunk)> {
        let mut all: Vec<_> = self.chunks.iter().map(|(id, c)| (*id, c)).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// Insert a chunk at a stored version, replacing any existing one.
    pub fn restore(&mut self, id: ChunkId, chunk: Chunk) {
        self.chunks.insert(id, chunk);
    }
}

/// Write `value` into every voxel of `chunk` (local range `lo..=hi`) whose
/// centre lies within the sphere. Returns whether any voxel changed.
fn carve_sphere(
    chunk: &mut Chunk,
    origin: IVec3,
    lo: IVec3,
    hi: IVec3,
    op: &TerraformOp,
    value: u8,
    radius_sq: f32,
) -> bool {
    let voxels = chunk.voxels_mut();
    let mut changed = false;
    for z in lo.z..=hi.z {
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                let centre = (origin + IVec3::new(x, y, z)).as_vec3() + Vec3::splat(0.5);
                if centre.distance_squared(op.center) > radius_sq {
                    continue;
                }
                let slot = &mut voxels[linear_index(x as usize, y as usize, z as usize)];
                let next = match op.kind {
                    TerraformKind::SphereAdd | TerraformKind::SphereSub => value,
                    TerraformKind::Paint if *slot != EMPTY => value,
                    TerraformKind::Paint => continue,
                };
                if *slot != next {
                    *slot = next;
                    changed = true;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
