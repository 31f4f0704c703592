//! Whole-world save payloads exchanged with a persistence service.
//!
//! A [`WorldSave`] holds the tick counter, the entity id counter, every
//! non-player entity and every chunk with its version. It is encoded with
//! postcard and wrapped in size-prefixed LZ4.

use serde::{Deserialize, Serialize};
use strata_voxel::{Chunk, ChunkCodecError, ChunkId, CompressedChunk};

use crate::entity::{Entity, EntityId};

/// Current save format version.
pub const SAVE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("save format version {found} is newer than supported {max_supported}")]
    VersionTooNew { found: u32, max_supported: u32 },

    #[error("chunk {chunk:?}: {source}")]
    Chunk {
        chunk: ChunkId,
        #[source]
        source: ChunkCodecError,
    },
}

/// One stored chunk. Voxels are kept in their wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedChunk {
    pub id: ChunkId,
    pub version: u32,
    pub compressed: bool,
    pub bytes: Vec<u8>,
}

impl SavedChunk {
    pub fn from_chunk(id: ChunkId, chunk: &Chunk) -> Self {
        let encoded = CompressedChunk::encode(id, chunk.version(), chunk.voxels());
        Self {
            id,
            version: encoded.version,
            compressed: encoded.compressed,
            bytes: encoded.bytes,
        }
    }

    /// Rebuild the chunk at its stored version.
    pub fn to_chunk(&self) -> Result<Chunk, PersistenceError> {
        let voxels = strata_voxel::decode_voxels(&self.bytes, self.compressed).map_err(|source| {
            PersistenceError::Chunk {
                chunk: self.id,
                source,
            }
        })?;
        Chunk::from_parts(self.version, voxels).ok_or_else(|| {
            PersistenceError::Serialization(format!("chunk {:?} has the wrong size", self.id))
        })
    }
}

/// A complete world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSave {
    pub format_version: u32,
    pub tick: u64,
    /// Lowest id never handed out.
    pub next_entity_id: EntityId,
    pub entities: Vec<Entity>,
    pub chunks: Vec<SavedChunk>,
}

impl WorldSave {
    pub fn new(
        tick: u64,
        next_entity_id: EntityId,
        entities: Vec<Entity>,
        chunks: Vec<SavedChunk>,
    ) -> Self {
        Self {
            format_version: SAVE_FORMAT_VERSION,
            tick,
            next_entity_id,
            entities,
            chunks,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        let bytes =
            postcard::to_allocvec(self).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        Ok(lz4_flex::compress_prepend_size(&bytes))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, PersistenceError> {
        let bytes = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let save: WorldSave =
            postcard::from_bytes(&bytes).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        if save.format_version > SAVE_FORMAT_VERSION {
            return Err(PersistenceError::VersionTooNew {
                found: save.format_version,
                max_supported: SAVE_FORMAT_VERSION,
            });
        }
        Ok(save)
    }
}

/// Supplies the initial world and accepts the final one.
pub trait WorldPersistence: Send {
    /// The stored world, or `None` when nothing has been saved yet.
    fn load(&mut self) -> Result<Option<WorldSave>, PersistenceError>;

    fn store(&mut self, save: &WorldSave) -> Result<(), PersistenceError>;
}

/// Keeps the encoded save in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    data: Option<Vec<u8>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_save(&self) -> bool {
        self.data.is_some()
    }
}

impl WorldPersistence for InMemoryPersistence {
    fn load(&mut self) -> Result<Option<WorldSave>, PersistenceError> {
        self.data.as_deref().map(WorldSave::from_bytes).transpose()
    }

    fn store(&mut self, save: &WorldSave) -> Result<(), PersistenceError> {
        self.data = Some(save.to_bytes()?);
        Ok(())
    }
}
