use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use gridspace_common::ChunkId;
use gridspace_model::Chunk;
use gridspace_stream::{ChunkStore, StoreError};
use parking_lot::Mutex;

use crate::codec::{decode_chunk, encode_chunk};

/// Chunk store that keeps encoded chunks in memory. Counts loads and saves.
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: Mutex<HashMap<ChunkId, Vec<u8>>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `chunk` directly, bypassing the save counter.
    pub fn insert(&self, id: ChunkId, chunk: &Chunk) -> Result<(), StoreError> {
        let bytes = encode_chunk(chunk)?;
        self.chunks.lock().insert(id, bytes);
        Ok(())
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.chunks.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl ChunkStore for MemoryChunkStore {
    fn load_chunk(&self, id: ChunkId) -> Result<Option<Chunk>, StoreError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let bytes = self.chunks.lock().get(&id).cloned();
        bytes.map(|b| decode_chunk(&b)).transpose()
    }

    fn save_chunk(&self, id: ChunkId, chunk: &Chunk) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::Relaxed);
        self.insert(id, chunk)
    }
}
