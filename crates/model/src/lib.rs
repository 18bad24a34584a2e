//! World grid model: wall shapes, cells and chunks.
//!
//! # Invariants
//! - A `Shape` is always one of the 32 encodable variants; decoding anything else fails.
//! - Derived cell flags are never persisted; they are recomputed by the world.

mod cell;
mod chunk;
mod shape;

pub use cell::{Cell, Floor, Wall};
pub use chunk::{Chunk, ChunkExtension};
pub use shape::{BaseShape, Blockage, OutlineEdge, Shape, ShapeError, Side, Sides};
