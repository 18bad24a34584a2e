//! Streaming: bounded chunk cache with background loading.
//!
//! # Invariants
//! - Chunks pinned by an active area or an open edit are never unloaded.
//! - Spooler threads never touch cache state; their results are integrated only when the
//!   owner calls [`ChunkStorageHandler::integrate`].
//! - A load whose chunk stopped being of interest is discarded on arrival.

mod handler;
mod spooler;
mod store;

pub use handler::{ChunkEvent, ChunkStorageHandler, LoadOrigin, StorageStats};
pub use spooler::{LoadResult, ReadyHook, Spooler, SpoolerConfig};
pub use store::{ChunkStore, NullChunkStore, StoreError};

pub fn crate_info() -> &'static str {
    "gridspace-stream v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("stream"));
    }
}
