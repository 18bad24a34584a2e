//! Developer tooling: read-only world inspection and text dumps.
//!
//! # Invariants
//! - Tools never mutate the world and never trigger chunk loads.

mod inspector;

pub use inspector::{ChunkInfo, LightInfo, WorldInspector, WorldSummary};

pub fn crate_info() -> &'static str {
    "gridspace-tools v0.1.0"
}
