use gridspace_common::ChunkId;
use gridspace_model::Chunk;

/// Errors reported by a chunk store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {id}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        id: ChunkId,
        expected: String,
        actual: String,
    },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("stored {id} is {actual:?} cells, expected {expected:?}")]
    SizeMismatch {
        id: ChunkId,
        expected: glam::UVec2,
        actual: glam::UVec2,
    },
}

/// Backend that physically persists chunks.
///
/// `load_chunk` is called from spooler worker threads, so implementations must be
/// thread-safe. `Ok(None)` means the store has never seen the chunk.
pub trait ChunkStore: Send + Sync {
    fn load_chunk(&self, id: ChunkId) -> Result<Option<Chunk>, StoreError>;
    fn save_chunk(&self, id: ChunkId, chunk: &Chunk) -> Result<(), StoreError>;
}

/// Store that never has anything and discards saves. Every chunk starts empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChunkStore;

impl ChunkStore for NullChunkStore {
    fn load_chunk(&self, _id: ChunkId) -> Result<Option<Chunk>, StoreError> {
        Ok(None)
    }

    fn save_chunk(&self, _id: ChunkId, _chunk: &Chunk) -> Result<(), StoreError> {
        Ok(())
    }
}
