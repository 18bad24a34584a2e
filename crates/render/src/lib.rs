//! Rendering: cell sprites, visibility from a point of view and dynamic lighting over a world.
//!
//! # Invariants
//! - Nothing here mutates the world; every pass reads the cells currently loaded.
//! - Per-frame cost is bounded by the visibility budgets, not by the view size.
//! - Light color queries answer from the previous frame and never wait for the current one.

mod canvas;
mod cells;
mod lighting;
mod visibility;

pub use canvas::{BlendMode, Canvas, Image, PixelCanvas, SpriteProvider, SpriteSheet};
pub use cells::{CellRenderStats, TopDownRenderer, dimetric_transform, from_dimetric, to_dimetric};
pub use lighting::LightingRenderer;
pub use visibility::{CalculationStats, VisibilityCalculator, VisibilityCalculatorConfig};

pub fn crate_info() -> &'static str {
    "gridspace-render v0.1.0"
}
