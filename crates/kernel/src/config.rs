use glam::UVec2;
use gridspace_stream::SpoolerConfig;
use serde::{Deserialize, Serialize};

use crate::error::WorldError;

/// Dimensions and cache budget of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub chunk_count_x: u32,
    pub chunk_count_y: u32,
    pub cells_per_chunk_x: u32,
    pub cells_per_chunk_y: u32,
    /// Size of one cell in world units.
    pub cell_resolution: f32,
    pub wall_height: f32,
    /// Loaded chunks outside every active area that may stay cached.
    pub max_loaded_nonessential_chunks: usize,
    #[serde(skip_serializing_if = "is_default_spooler")]
    pub spooler: SpoolerConfig,
}

fn is_default_spooler(config: &SpoolerConfig) -> bool {
    *config == SpoolerConfig::default()
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_count_x: 8,
            chunk_count_y: 8,
            cells_per_chunk_x: 16,
            cells_per_chunk_y: 16,
            cell_resolution: 32.0,
            wall_height: 96.0,
            max_loaded_nonessential_chunks: 32,
            spooler: SpoolerConfig::default(),
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), WorldError> {
        let invalid = |msg: &str| Err(WorldError::InvalidConfig(msg.to_string()));
        if self.chunk_count_x == 0 || self.chunk_count_y == 0 {
            return invalid("chunk counts must be positive");
        }
        if self.cells_per_chunk_x == 0 || self.cells_per_chunk_y == 0 {
            return invalid("cells per chunk must be positive");
        }
        if self.chunk_count_x.checked_mul(self.cells_per_chunk_x).is_none()
            || self.chunk_count_y.checked_mul(self.cells_per_chunk_y).is_none()
        {
            return invalid("cell count overflows u32");
        }
        if !(self.cell_resolution.is_finite() && self.cell_resolution > 0.0) {
            return invalid("cell resolution must be positive and finite");
        }
        if !(self.wall_height.is_finite() && self.wall_height >= 0.0) {
            return invalid("wall height must be non-negative and finite");
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> UVec2 {
        UVec2::new(self.cells_per_chunk_x, self.cells_per_chunk_y)
    }

    pub fn chunk_count(&self) -> UVec2 {
        UVec2::new(self.chunk_count_x, self.chunk_count_y)
    }

    /// Total size of the world in cells.
    pub fn cell_count(&self) -> UVec2 {
        self.chunk_count() * self.chunk_size()
    }
}
