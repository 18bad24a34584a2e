//! File-backed chunk store.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json              - schema version and chunk dimensions
//! chunks/
//!   00000003_00000001.chunk.cbor.zst - one CBOR+zstd file per chunk
//! integrity/
//!   manifest.json              - sha256 of every chunk file
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::UVec2;
use gridspace_common::ChunkId;
use gridspace_model::Chunk;
use gridspace_stream::{ChunkStore, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::{decode_chunk, encode_chunk, sha256_hex};

const CHUNK_SCHEMA_VERSION: u32 = 1;

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub chunk_schema_version: u32,
    pub cells_per_chunk_x: u32,
    pub cells_per_chunk_y: u32,
}

/// Integrity manifest: chunk file name to sha256 of its bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: BTreeMap<String, String>,
}

/// Chunk store persisting each chunk to its own compressed file.
///
/// # Invariants
/// - A chunk file is only trusted if its hash matches the manifest.
/// - Opening a store written with a different schema or chunk size fails.
pub struct DiskChunkStore {
    root: PathBuf,
    meta: StoreMeta,
    manifest: Mutex<IntegrityManifest>,
}

impl DiskChunkStore {
    /// Open or create a chunk store at the given path.
    pub fn open(path: impl AsRef<Path>, chunk_size: UVec2) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("chunks"))?;
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join("store.meta.json");
        let manifest_path = root.join("integrity").join("manifest.json");

        let (meta, manifest) = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.chunk_schema_version != CHUNK_SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.chunk_schema_version,
                    expected_version: CHUNK_SCHEMA_VERSION,
                });
            }
            let stored = UVec2::new(meta.cells_per_chunk_x, meta.cells_per_chunk_y);
            if stored != chunk_size {
                return Err(StoreError::SizeMismatch {
                    id: ChunkId(0),
                    expected: chunk_size,
                    actual: stored,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            (meta, manifest)
        } else {
            let meta = StoreMeta {
                chunk_schema_version: CHUNK_SCHEMA_VERSION,
                cells_per_chunk_x: chunk_size.x,
                cells_per_chunk_y: chunk_size.y,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            (meta, manifest)
        };

        tracing::debug!(root = %root.display(), chunks = manifest.entries.len(), "opened chunk store");
        Ok(Self {
            root,
            meta,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    /// Number of chunks recorded in the manifest.
    pub fn stored_count(&self) -> usize {
        self.manifest.lock().entries.len()
    }

    /// Verify every chunk file against the manifest.
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        let manifest = self.manifest.lock();
        for (filename, expected) in &manifest.entries {
            let data = std::fs::read(self.root.join("chunks").join(filename))?;
            let actual = sha256_hex(&data);
            if &actual != expected {
                return Err(StoreError::IntegrityMismatch {
                    id: parse_filename(filename).unwrap_or(ChunkId(0)),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    fn chunk_path(&self, filename: &str) -> PathBuf {
        self.root.join("chunks").join(filename)
    }

    fn save_manifest(&self, manifest: &IntegrityManifest) -> Result<(), StoreError> {
        let path = self.root.join("integrity").join("manifest.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, manifest)?;
        Ok(())
    }
}

impl ChunkStore for DiskChunkStore {
    fn load_chunk(&self, id: ChunkId) -> Result<Option<Chunk>, StoreError> {
        let filename = chunk_filename(id);
        let Some(expected) = self.manifest.lock().entries.get(&filename).cloned() else {
            return Ok(None);
        };
        let compressed = std::fs::read(self.chunk_path(&filename))?;
        let actual = sha256_hex(&compressed);
        if actual != expected {
            return Err(StoreError::IntegrityMismatch {
                id,
                expected,
                actual,
            });
        }
        decode_chunk(&compressed).map(Some)
    }

    fn save_chunk(&self, id: ChunkId, chunk: &Chunk) -> Result<(), StoreError> {
        let filename = chunk_filename(id);
        let compressed = encode_chunk(chunk)?;
        let hash = sha256_hex(&compressed);

        // Held across the write so the file and its manifest entry change together.
        let mut manifest = self.manifest.lock();
        std::fs::write(self.chunk_path(&filename), &compressed)?;
        manifest.entries.insert(filename, hash);
        self.save_manifest(&manifest)
    }
}

fn chunk_filename(id: ChunkId) -> String {
    format!("{:08x}_{:08x}.chunk.cbor.zst", id.x(), id.y())
}

fn parse_filename(name: &str) -> Option<ChunkId> {
    let stem = name.strip_suffix(".chunk.cbor.zst")?;
    let (x, y) = stem.split_once('_')?;
    Some(ChunkId::new(
        u32::from_str_radix(x, 16).ok()?,
        u32::from_str_radix(y, 16).ok()?,
    ))
}
