use std::sync::Arc;

use glam::{UVec2, Vec2};
use gridspace_common::{CellRect, Color};
use gridspace_kernel::{World, WorldConfig};
use gridspace_model::{Floor, Shape, Wall};
use gridspace_render::{CellRenderStats, PixelCanvas, SpriteSheet, TopDownRenderer};
use gridspace_stream::NullChunkStore;

const GRASS: u16 = 1;
const BRICK: u16 = 2;
const BRICK_LOW: u16 = 3;
const GRASS_COLOR: Color = Color::rgb(0, 160, 0);
const BRICK_COLOR: Color = Color::rgb(180, 60, 40);
const BRICK_LOW_COLOR: Color = Color::rgb(90, 30, 20);

/// 4x4 world of 8-unit cells: grass everywhere, a brick wall at (1, 1).
fn garden() -> World {
    let config = WorldConfig {
        chunk_count_x: 2,
        chunk_count_y: 2,
        cells_per_chunk_x: 2,
        cells_per_chunk_y: 2,
        cell_resolution: 8.0,
        ..WorldConfig::default()
    };
    let mut world = World::new(config, Arc::new(NullChunkStore)).unwrap();
    let area = world.create_active_area();
    world.set_active_area(area, CellRect::new(0, 0, 4, 4)).unwrap();
    world.wait_for_pending_io();
    world.update();

    let perm = world.permission_to_edit().unwrap();
    world
        .edit(&perm, |e| {
            for cell in CellRect::new(0, 0, 4, 4).cells() {
                e.set_floor_at(cell, Some(Floor { sprite_id: GRASS }))?;
            }
            let mut wall = Wall::new(BRICK, Shape::FULL_SQUARE);
            wall.sprite_id_reduced = BRICK_LOW;
            e.set_wall_at((1, 1), Some(wall))
        })
        .unwrap()
        .unwrap();
    world
}

fn sheet() -> SpriteSheet {
    let mut sheet = SpriteSheet::new();
    sheet.insert(GRASS, UVec2::splat(2), vec![GRASS_COLOR; 4]);
    sheet.insert(BRICK, UVec2::ONE, vec![BRICK_COLOR]);
    sheet.insert(BRICK_LOW, UVec2::ONE, vec![BRICK_LOW_COLOR]);
    sheet
}

fn canvas() -> PixelCanvas {
    PixelCanvas::new(UVec2::splat(32), Vec2::ZERO, 1.0, Color::BLACK)
}

#[test]
fn walls_cover_floors_cell_by_cell() {
    let world = garden();
    let mut canvas = canvas();
    let mut renderer = TopDownRenderer::default();
    renderer.render(&world, &sheet(), &mut canvas, Vec2::splat(16.0), Vec2::splat(32.0));

    assert_eq!(canvas.pixel(3, 3), Some(GRASS_COLOR));
    assert_eq!(canvas.pixel(12, 12), Some(BRICK_COLOR));
    assert_eq!(canvas.pixel(16, 12), Some(GRASS_COLOR));
    assert_eq!(
        *renderer.stats(),
        CellRenderStats {
            floors: 16,
            walls: 1,
            missing_sprites: 0,
        }
    );
}

#[test]
fn reduced_walls_use_their_reduced_sprite() {
    let world = garden();
    let mut canvas = canvas();
    let mut renderer = TopDownRenderer::new(true);
    renderer.render(&world, &sheet(), &mut canvas, Vec2::splat(16.0), Vec2::splat(32.0));
    assert_eq!(canvas.pixel(12, 12), Some(BRICK_LOW_COLOR));
}

#[test]
fn only_cells_in_view_with_known_sprites_are_drawn() {
    let world = garden();
    let mut sprites = SpriteSheet::new();
    sprites.insert(GRASS, UVec2::ONE, vec![GRASS_COLOR]);
    let mut canvas = canvas();
    let mut renderer = TopDownRenderer::default();
    // Covers cells (0, 0) through (1, 1).
    renderer.render(&world, &sprites, &mut canvas, Vec2::splat(8.0), Vec2::splat(16.0));

    assert_eq!(canvas.pixel(12, 12), Some(GRASS_COLOR));
    assert_eq!(canvas.pixel(20, 20), Some(Color::BLACK));
    let stats = renderer.stats();
    assert_eq!((stats.floors, stats.walls, stats.missing_sprites), (4, 0, 1));
}
