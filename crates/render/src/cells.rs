use glam::{Mat2, UVec2, Vec2};
use gridspace_common::SpriteId;
use gridspace_kernel::World;

use crate::canvas::{BlendMode, Canvas, SpriteProvider};

/// Rotates 45 degrees counter-clockwise and squashes the new Y axis by half.
pub fn dimetric_transform() -> Mat2 {
    Mat2::from_cols(Vec2::new(1.0, -0.5), Vec2::new(1.0, 0.5))
}

/// World position to dimetric view position.
pub fn to_dimetric(pos: Vec2) -> Vec2 {
    dimetric_transform() * pos
}

/// Dimetric view position back to world position.
pub fn from_dimetric(pos: Vec2) -> Vec2 {
    dimetric_transform().inverse() * pos
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellRenderStats {
    pub floors: u32,
    pub walls: u32,
    /// Sprite ids the provider could not resolve. Those cells are skipped.
    pub missing_sprites: u32,
}

/// Draws floors and walls of loaded cells straight down onto a canvas, one sprite
/// stretched over each cell.
#[derive(Debug, Clone, Default)]
pub struct TopDownRenderer {
    /// Draw walls with their reduced sprite.
    pub reduce_walls: bool,
    stats: CellRenderStats,
}

impl TopDownRenderer {
    pub fn new(reduce_walls: bool) -> Self {
        Self {
            reduce_walls,
            stats: CellRenderStats::default(),
        }
    }

    pub fn stats(&self) -> &CellRenderStats {
        &self.stats
    }

    /// Render every loaded cell overlapping the view. Floors go first so walls cover them.
    pub fn render(
        &mut self,
        world: &World,
        sprites: &dyn SpriteProvider,
        canvas: &mut dyn Canvas,
        view_center: Vec2,
        view_size: Vec2,
    ) {
        let _span = tracing::trace_span!("render_cells").entered();
        self.stats = CellRenderStats::default();
        let cr = world.cell_resolution();
        let half = view_size.abs() / 2.0;
        let first = ((view_center - half) / cr).floor().max(Vec2::ZERO).as_uvec2();
        let end = ((view_center + half) / cr)
            .ceil()
            .max(Vec2::ZERO)
            .as_uvec2()
            .min(world.cell_count());

        for y in first.y..end.y {
            for x in first.x..end.x {
                let cell = UVec2::new(x, y);
                let Some(model) = world.cell_at_unchecked(cell) else {
                    continue;
                };
                let top_left = cell.as_vec2() * cr;
                if let Some(floor) = model.floor() {
                    if self.draw(sprites, canvas, floor.sprite_id, top_left, cr) {
                        self.stats.floors += 1;
                    }
                }
                if let Some(wall) = model.wall() {
                    let id = if self.reduce_walls {
                        wall.sprite_id_reduced
                    } else {
                        wall.sprite_id
                    };
                    if self.draw(sprites, canvas, id, top_left, cr) {
                        self.stats.walls += 1;
                    }
                }
            }
        }
        tracing::trace!(stats = ?self.stats, "cells rendered");
    }

    fn draw(
        &mut self,
        sprites: &dyn SpriteProvider,
        canvas: &mut dyn Canvas,
        id: SpriteId,
        top_left: Vec2,
        cell_resolution: f32,
    ) -> bool {
        let Some(image) = sprites.sprite(id) else {
            self.stats.missing_sprites += 1;
            return false;
        };
        let pixel_size = Vec2::splat(cell_resolution) / image.size.max(UVec2::ONE).as_vec2();
        canvas.draw_image(image, top_left, pixel_size, BlendMode::Alpha);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimetric_maps_axes_onto_diagonals() {
        assert_eq!(to_dimetric(Vec2::new(1.0, 0.0)), Vec2::new(1.0, -0.5));
        assert_eq!(to_dimetric(Vec2::new(0.0, 1.0)), Vec2::new(1.0, 0.5));
        assert_eq!(to_dimetric(Vec2::new(2.0, 2.0)), Vec2::new(4.0, 0.0));
    }

    #[test]
    fn dimetric_round_trips() {
        let p = Vec2::new(96.0, -40.0);
        assert!(from_dimetric(to_dimetric(p)).abs_diff_eq(p, 1e-4));
    }
}
