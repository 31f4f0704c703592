//! Client-side cache of received chunks.
//!
//! The cache remembers which version of each chunk the client holds so that
//! CHUNK_REQUESTs carry the last-known version and the server can skip
//! chunks the client already has.

use rustc_hash::FxHashMap;
use strata_protocol::{ChunkCoord, ChunkData, ChunkRequest, TerraformApplied};
use strata_voxel::{Chunk, ChunkCodecError, ChunkId, decode_voxels};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ChunkCacheError {
    #[error("chunk {chunk:?}: invalid base64 payload: {source}")]
    Base64 {
        chunk: ChunkId,
        #[source]
        source: base64::DecodeError,
    },

    #[error("chunk {chunk:?}: {source}")]
    Codec {
        chunk: ChunkId,
        #[source]
        source: ChunkCodecError,
    },

    #[error("chunk {0:?}: payload does not hold one chunk")]
    WrongSize(ChunkId),
}

/// Chunks received from the server, keyed by coordinate.
#[derive(Debug, Default)]
pub struct ClientChunkCache {
    chunks: FxHashMap<ChunkId, Chunk>,
}

impl ClientChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id)
    }

    /// Held version, 0 when the chunk was never received.
    pub fn version(&self, id: ChunkId) -> u32 {
        self.chunks.get(&id).map_or(0, Chunk::version)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Request for `chunk` carrying the version already held.
    pub fn request(&self, chunk: ChunkCoord) -> ChunkRequest {
        ChunkRequest {
            chunk,
            known_version: self.version(chunk.into()),
        }
    }

    /// Store a CHUNK_DATA payload. Returns `false` when a version at least as
    /// new is already cached.
    pub fn insert(&mut self, data: &ChunkData) -> Result<bool, ChunkCacheError> {
        let id = ChunkId::from(data.chunk);
        if self.chunks.contains_key(&id) && self.version(id) >= data.version {
            debug!(chunk = ?id, version = data.version, "Ignoring stale chunk payload");
            return Ok(false);
        }

        let bytes = data
            .bytes()
            .map_err(|source| ChunkCacheError::Base64 { chunk: id, source })?;
        let voxels = decode_voxels(&bytes, data.compressed)
            .map_err(|source| ChunkCacheError::Codec { chunk: id, source })?;
        let chunk = Chunk::from_parts(data.version, voxels).ok_or(ChunkCacheError::WrongSize(id))?;
        self.chunks.insert(id, chunk);
        Ok(true)
    }

    /// Requests for every cached chunk a terraform made stale.
    pub fn stale_after(&self, applied: &TerraformApplied) -> Vec<ChunkRequest> {
        applied
            .chunks
            .iter()
            .filter(|cv| {
                let id = ChunkId::from(cv.chunk);
                self.chunks.contains_key(&id) && self.version(id) < cv.version
            })
            .map(|cv| self.request(cv.chunk))
            .collect()
    }

    pub fn remove(&mut self, id: ChunkId) -> Option<Chunk> {
        self.chunks.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use strata_protocol::{ChunkVersion, TerraformKind};
    use strata_voxel::{ChunkStore, TerraformOp};

    fn terraformed_store() -> ChunkStore {
        let mut store = ChunkStore::default();
        store
            .apply_terraform(&TerraformOp {
                kind: TerraformKind::SphereAdd,
                center: Vec3::new(16.0, 16.0, 16.0),
                radius: 4.0,
                material: 2,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_request_carries_known_version() {
        let store = terraformed_store();
        let mut cache = ClientChunkCache::new();
        assert_eq!(cache.request([0, 0, 0]).known_version, 0);

        let payload = store.serve_if_newer(ChunkId::new(0, 0, 0), 0).unwrap();
        assert!(cache.insert(&payload.to_message()).unwrap());
        assert_eq!(cache.request([0, 0, 0]).known_version, 1);
        assert_eq!(
            cache.get(ChunkId::new(0, 0, 0)).map(Chunk::solid_count),
            store.get(ChunkId::new(0, 0, 0)).map(Chunk::solid_count)
        );
    }

    #[test]
    fn test_stale_payload_ignored() {
        let store = terraformed_store();
        let mut cache = ClientChunkCache::new();
        let msg = store.serve_if_newer(ChunkId::new(0, 0, 0), 0).unwrap().to_message();
        assert!(cache.insert(&msg).unwrap());
        assert!(!cache.insert(&msg).unwrap());
    }

    #[test]
    fn test_corrupt_payload_rejected() {
        let mut cache = ClientChunkCache::new();
        let bad = ChunkData {
            chunk: [1, 2, 3],
            version: 1,
            compressed: false,
            data: "not base64!".into(),
        };
        assert!(matches!(cache.insert(&bad), Err(ChunkCacheError::Base64 { .. })));

        let short = ChunkData::from_bytes([1, 2, 3], 1, false, &[0u8; 16]);
        assert!(matches!(cache.insert(&short), Err(ChunkCacheError::Codec { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_terraform_marks_cached_chunks_stale() {
        let store = terraformed_store();
        let mut cache = ClientChunkCache::new();
        let msg = store.serve_if_newer(ChunkId::new(0, 0, 0), 0).unwrap().to_message();
        cache.insert(&msg).unwrap();

        let applied = TerraformApplied {
            op: TerraformKind::SphereSub,
            center: Vec3::splat(16.0),
            radius: 2.0,
            material: 0,
            chunks: vec![
                ChunkVersion {
                    chunk: [0, 0, 0],
                    version: 2,
                },
                ChunkVersion {
                    chunk: [5, 5, 5],
                    version: 1,
                },
            ],
            tick: 10,
        };
        let requests = cache.stale_after(&applied);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].chunk, [0, 0, 0]);
        assert_eq!(requests[0].known_version, 1);
    }
}
