use glam::{UVec2, Vec2};
use gridspace_common::{CellRect, ChunkId, Color, LightId};
use gridspace_kernel::World;
use gridspace_model::{BaseShape, Cell};
use gridspace_render::VisibilityCalculator;

/// World inspector for developer tooling.
///
/// Read-only queries against the world state for debugging and the CLI.
pub struct WorldInspector;

impl WorldInspector {
    /// Produce a summary of the world state.
    pub fn summary(world: &World) -> WorldSummary {
        let stats = world.storage_stats();
        WorldSummary {
            cell_count: world.cell_count(),
            chunk_count: UVec2::new(world.chunk_count_x(), world.chunk_count_y()),
            loaded_chunks: stats.loaded,
            pinned_chunks: stats.pinned,
            pending_loads: stats.pending_loads,
            dynamic_lights: world.dynamic_lights().len(),
            inactive_lights: world.inactive_lights().len(),
            generator_mode: world.is_generator_mode(),
        }
    }

    /// Details of a loaded chunk.
    pub fn inspect_chunk(world: &World, id: ChunkId) -> Option<ChunkInfo> {
        let chunk = world.chunk_at_id(id).ok()??;
        let cells = chunk.cells();
        Some(ChunkInfo {
            id,
            pinned: world.is_chunk_pinned(id),
            walls: cells.iter().filter(|c| c.is_occupied()).count(),
            floors: cells.iter().filter(|c| c.floor().is_some()).count(),
            has_extension: chunk.extension().is_some(),
        })
    }

    pub fn inspect_light(world: &World, id: LightId) -> Option<LightInfo> {
        let light = world.light(id)?;
        Some(LightInfo {
            id,
            center: light.center(),
            radius: light.radius(),
            color: light.color(),
            active: world.dynamic_lights().iter().any(|l| l.id() == id),
        })
    }

    /// Ids of all loaded chunks, sorted.
    pub fn list_chunks(world: &World) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = world.available_chunks().collect();
        ids.sort();
        ids
    }

    /// One character per cell: `#` full wall, `/` other wall shapes, `.` floor, space for
    /// empty cells and `?` for cells whose chunk is not loaded.
    pub fn ascii_map(world: &World, rect: CellRect) -> String {
        Self::render_rows(world, rect, |_, cell| Self::cell_glyph(cell))
    }

    /// Like [`WorldInspector::ascii_map`], but open cells show whether their center is
    /// visible (`o`) or hidden (`x`) for the latest calculation.
    pub fn visibility_map(world: &World, calc: &VisibilityCalculator, rect: CellRect) -> String {
        let cr = world.cell_resolution();
        Self::render_rows(world, rect, |pos, cell| match cell {
            Some(c) if c.is_occupied() => Self::cell_glyph(Some(c)),
            _ => match calc.test_visibility_at((pos.as_vec2() + 0.5) * cr) {
                Some(true) => 'o',
                Some(false) => 'x',
                None => ' ',
            },
        })
    }

    fn cell_glyph(cell: Option<&Cell>) -> char {
        match cell {
            None => '?',
            Some(c) => match c.shape() {
                Some(s) if s.base() == BaseShape::FullSquare => '#',
                Some(_) => '/',
                None if c.floor().is_some() => '.',
                None => ' ',
            },
        }
    }

    fn render_rows(
        world: &World,
        rect: CellRect,
        glyph: impl Fn(UVec2, Option<&Cell>) -> char,
    ) -> String {
        let rect = rect.expanded(0, world.cell_count());
        let mut out = String::with_capacity(((rect.width + 1) * rect.height) as usize);
        for y in rect.y..rect.end_y() {
            for x in rect.x..rect.end_x() {
                let pos = UVec2::new(x, y);
                out.push(glyph(pos, world.cell_at_unchecked(pos)));
            }
            out.push('\n');
        }
        out
    }
}

/// Summary of world state for the inspector.
#[derive(Debug, Clone)]
pub struct WorldSummary {
    pub cell_count: UVec2,
    pub chunk_count: UVec2,
    pub loaded_chunks: usize,
    pub pinned_chunks: usize,
    pub pending_loads: usize,
    pub dynamic_lights: usize,
    pub inactive_lights: usize,
    pub generator_mode: bool,
}

impl std::fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "World: cells={}x{} chunks={}x{} loaded={} pinned={} pending={} lights={}+{} inactive{}",
            self.cell_count.x,
            self.cell_count.y,
            self.chunk_count.x,
            self.chunk_count.y,
            self.loaded_chunks,
            self.pinned_chunks,
            self.pending_loads,
            self.dynamic_lights,
            self.inactive_lights,
            if self.generator_mode { " [generator]" } else { "" },
        )
    }
}

/// Detailed info about a single loaded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub id: ChunkId,
    pub pinned: bool,
    pub walls: usize,
    pub floors: usize,
    pub has_extension: bool,
}

impl std::fmt::Display for ChunkInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} walls={} floors={}{}{}",
            self.id,
            self.walls,
            self.floors,
            if self.pinned { " pinned" } else { "" },
            if self.has_extension { " +ext" } else { "" },
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightInfo {
    pub id: LightId,
    pub center: Vec2,
    pub radius: f32,
    pub color: Color,
    pub active: bool,
}

impl std::fmt::Display for LightInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Light {} at ({:.1}, {:.1}) r={:.1} rgb=({}, {}, {}){}",
            self.id,
            self.center.x,
            self.center.y,
            self.radius,
            self.color.r,
            self.color.g,
            self.color.b,
            if self.active { "" } else { " inactive" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridspace_kernel::WorldConfig;
    use gridspace_model::{Floor, Shape, Wall};
    use gridspace_stream::NullChunkStore;
    use std::sync::Arc;

    fn world() -> World {
        let config = WorldConfig {
            chunk_count_x: 2,
            chunk_count_y: 1,
            cells_per_chunk_x: 4,
            cells_per_chunk_y: 3,
            ..WorldConfig::default()
        };
        World::new(config, Arc::new(NullChunkStore)).unwrap()
    }

    #[test]
    fn summary_empty_world() {
        let world = world();
        let summary = WorldInspector::summary(&world);
        assert_eq!(summary.cell_count, UVec2::new(8, 3));
        assert_eq!(summary.loaded_chunks, 0);
        assert!(format!("{summary}").contains("cells=8x3"));
    }

    #[test]
    fn ascii_map_marks_unloaded_and_shapes() {
        let mut world = world();
        let perm = world.permission_to_edit().unwrap();
        world
            .edit(&perm, |e| {
                e.set_wall_at((0, 0), Some(Wall::new(1, Shape::FULL_SQUARE)))?;
                e.set_wall_at(
                    (1, 0),
                    Some(Wall::new(1, Shape::new(BaseShape::LargeTriangle, true, false))),
                )?;
                e.set_floor_at((2, 1), Some(Floor { sprite_id: 1 }))
            })
            .unwrap()
            .unwrap();

        let map = WorldInspector::ascii_map(&world, CellRect::new(0, 0, 6, 2));
        assert_eq!(map, "#/  ??\n  . ??\n");
        assert_eq!(WorldInspector::list_chunks(&world), vec![ChunkId::new(0, 0)]);

        let info = WorldInspector::inspect_chunk(&world, ChunkId::new(0, 0)).unwrap();
        assert_eq!((info.walls, info.floors, info.pinned), (2, 1, false));
        assert!(WorldInspector::inspect_chunk(&world, ChunkId::new(1, 0)).is_none());
        assert!(WorldInspector::inspect_chunk(&world, ChunkId::new(5, 0)).is_none());
    }

    #[test]
    fn light_info_tracks_pools() {
        let mut world = world();
        let id = world.create_dynamic_light(Vec2::ONE, 10.0, Color::WHITE, 0, UVec2::ONE);
        assert!(WorldInspector::inspect_light(&world, id).unwrap().active);
        world.deactivate_light(id);
        let info = WorldInspector::inspect_light(&world, id).unwrap();
        assert!(!info.active);
        assert!(info.to_string().ends_with("inactive"));
    }

    #[test]
    fn visibility_map_marks_hidden_cells() {
        let mut world = world();
        let perm = world.permission_to_edit().unwrap();
        world
            .edit(&perm, |e| {
                for y in 0..3 {
                    e.set_wall_at((2, y), Some(Wall::new(1, Shape::FULL_SQUARE)))?;
                }
                Ok::<_, gridspace_kernel::WorldError>(())
            })
            .unwrap()
            .unwrap();
        let mut calc = VisibilityCalculator::default();
        let pov = Vec2::new(16.0, 48.0);
        calc.calc(&world, pov, Vec2::splat(256.0), pov);
        let map = WorldInspector::visibility_map(&world, &calc, CellRect::new(0, 0, 4, 3));
        assert_eq!(map, "oo#x\noo#x\noo#x\n");
    }
}
