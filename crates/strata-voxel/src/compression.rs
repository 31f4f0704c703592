//! Chunk payload compression for wire transfer.
//!
//! Payloads use the LZ4 block format with no size prefix: the decompressed
//! size is always [`CHUNK_VOLUME`]. When compression does not shrink the
//! voxels, the raw bytes are sent with `compressed = false`.

use lz4_flex::block::{compress, decompress};
use strata_protocol::ChunkData;

use crate::chunk::{CHUNK_VOLUME, ChunkId};

/// A chunk copied out of the store and prepared for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedChunk {
    pub chunk: ChunkId,
    pub version: u32,
    pub compressed: bool,
    pub bytes: Vec<u8>,
}

impl CompressedChunk {
    /// Encode a voxel buffer.
    pub fn encode(chunk: ChunkId, version: u32, voxels: &[u8]) -> Self {
        let packed = compress(voxels);
        if packed.len() < voxels.len() {
            Self {
                chunk,
                version,
                compressed: true,
                bytes: packed,
            }
        } else {
            Self {
                chunk,
                version,
                compressed: false,
                bytes: voxels.to_vec(),
            }
        }
    }

    /// The CHUNK_DATA message for this payload.
    pub fn to_message(&self) -> ChunkData {
        ChunkData::from_bytes(self.chunk.into(), self.version, self.compressed, &self.bytes)
    }

    /// Recover the voxel bytes.
    pub fn voxels(&self) -> Result<Box<[u8]>, ChunkCodecError> {
        decode_voxels(&self.bytes, self.compressed)
    }
}

/// Errors decoding a chunk payload.
#[derive(Debug, thiserror::Error)]
pub enum ChunkCodecError {
    /// LZ4 rejected the input.
    #[error("LZ4 decompression failed: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),

    /// The payload does not expand to exactly one chunk.
    #[error("chunk payload has {actual} bytes, expected {CHUNK_VOLUME}")]
    WrongSize { actual: usize },
}

/// Decode payload bytes into a full voxel buffer.
pub fn decode_voxels(bytes: &[u8], compressed: bool) -> Result<Box<[u8]>, ChunkCodecError> {
    let voxels = if compressed {
        decompress(bytes, CHUNK_VOLUME)?
    } else {
        bytes.to_vec()
    };
    if voxels.len() != CHUNK_VOLUME {
        return Err(ChunkCodecError::WrongSize {
            actual: voxels.len(),
        });
    }
    Ok(voxels.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_chunk_compresses() {
        let voxels = vec![0u8; CHUNK_VOLUME];
        let payload = CompressedChunk::encode(ChunkId::new(0, 0, 0), 1, &voxels);
        assert!(payload.compressed);
        assert!(payload.bytes.len() < 1024);
        assert_eq!(&*payload.voxels().unwrap(), &voxels[..]);
    }

    #[test]
    fn test_incompressible_chunk_sent_raw() {
        // xorshift noise does not compress.
        let mut state = 0x9E37_79B9u32;
        let voxels: Vec<u8> = (0..CHUNK_VOLUME)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        let payload = CompressedChunk::encode(ChunkId::new(1, 2, 3), 4, &voxels);
        assert!(!payload.compressed);
        assert_eq!(payload.bytes.len(), CHUNK_VOLUME);
        assert_eq!(&*payload.voxels().unwrap(), &voxels[..]);
    }

    #[test]
    fn test_message_carries_base64() {
        let voxels = vec![1u8; CHUNK_VOLUME];
        let payload = CompressedChunk::encode(ChunkId::new(-1, 0, 2), 7, &voxels);
        let msg = payload.to_message();
        assert_eq!(msg.chunk, [-1, 0, 2]);
        assert_eq!(msg.version, 7);
        let bytes = msg.bytes().unwrap();
        let back = decode_voxels(&bytes, msg.compressed).unwrap();
        assert_eq!(&*back, &voxels[..]);
    }

    #[test]
    fn test_wrong_size_rejected() {
        assert!(matches!(
            decode_voxels(&[0u8; 100], false),
            Err(ChunkCodecError::WrongSize { actual: 100 })
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_voxels(&[0xFF, 0xFF, 0xFF], true).is_err());
    }
}
