//! Shared types used by every gridspace crate.
//!
//! Cell coordinates are `glam::UVec2` (column, row); positions in the world are
//! `glam::Vec2` measured in world units, where one cell spans `cell_resolution` units.

mod types;

pub use types::{CellRect, ChunkId, Color, LightId, SpriteId};

pub use glam::{UVec2, Vec2};
