use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use glam::UVec2;
use gridspace_common::{CellRect, ChunkId};
use gridspace_kernel::{Binder, CellEditInfo, World, WorldConfig};
use gridspace_model::{Cell, Chunk, ChunkExtension, Floor, Shape, Side, Wall};
use gridspace_persist::MemoryChunkStore;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Ready(ChunkId),
    Created(ChunkId),
    Loaded(ChunkId),
    Unloaded(ChunkId),
    Edited(Vec<CellEditInfo>),
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock())
    }

    fn edits(&self) -> Vec<Vec<CellEditInfo>> {
        self.take()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Edited(infos) => Some(infos),
                _ => None,
            })
            .collect()
    }
}

impl Binder for Recorder {
    fn on_chunk_ready(&self, id: ChunkId) {
        self.seen.lock().push(Seen::Ready(id));
    }

    fn on_chunk_created(&self, id: ChunkId) {
        self.seen.lock().push(Seen::Created(id));
    }

    fn on_chunk_loaded(&self, id: ChunkId) {
        self.seen.lock().push(Seen::Loaded(id));
    }

    fn on_chunk_unloaded(&self, id: ChunkId) {
        self.seen.lock().push(Seen::Unloaded(id));
    }

    fn on_cells_edited(&self, edits: &[CellEditInfo]) {
        self.seen.lock().push(Seen::Edited(edits.to_vec()));
    }
}

fn config(chunks: u32, cells: u32, budget: usize) -> WorldConfig {
    WorldConfig {
        chunk_count_x: chunks,
        chunk_count_y: chunks,
        cells_per_chunk_x: cells,
        cells_per_chunk_y: cells,
        max_loaded_nonessential_chunks: budget,
        ..WorldConfig::default()
    }
}

fn setup(config: WorldConfig, store: Arc<MemoryChunkStore>) -> (World, Arc<Recorder>) {
    let mut world = World::new(config, store).unwrap();
    let recorder = Arc::new(Recorder::default());
    world.attach_binder(recorder.clone()).unwrap();
    (world, recorder)
}

/// Pin the whole world and wait until every chunk is resident.
fn load_everything(world: &mut World) {
    let area = world.create_active_area();
    let all = CellRect::new(0, 0, world.cell_count_x(), world.cell_count_y());
    world.set_active_area(area, all).unwrap();
    world.wait_for_pending_io();
    world.update();
}

fn wall() -> Option<Wall> {
    Some(Wall::new(1, Shape::FULL_SQUARE))
}

fn expected_flags(world: &World, cell: UVec2) -> u16 {
    let mut flags = 0;
    for side in Side::ALL {
        let n = cell.as_ivec2() + side.offset();
        if n.x < 0 || n.y < 0 {
            continue;
        }
        let blocked = world
            .cell_at(n.as_uvec2())
            .ok()
            .flatten()
            .and_then(Cell::shape)
            .is_some_and(|s| s.blockage().blocks_fully(side.opposite()));
        if blocked {
            flags |= side.bit() as u16;
        }
    }
    flags
}

#[test]
fn removing_a_wall_reports_one_edit_and_refreshes_neighbours() {
    let (mut world, recorder) = setup(config(2, 4, 8), Arc::new(MemoryChunkStore::new()));
    load_everything(&mut world);
    let perm = world.permission_to_edit().unwrap();

    world
        .edit(&perm, |e| e.set_wall_at((3, 3), wall()))
        .unwrap()
        .unwrap();
    let flag = |w: &World, x: u32, y: u32| w.cell_at((x, y)).unwrap().unwrap().flags();
    assert_eq!(flag(&world, 2, 3), Cell::OBSTRUCTED_FULLY_BY_EAST_NEIGHBOR);
    assert_eq!(flag(&world, 4, 3), Cell::OBSTRUCTED_FULLY_BY_WEST_NEIGHBOR);
    assert_eq!(flag(&world, 3, 2), Cell::OBSTRUCTED_FULLY_BY_SOUTH_NEIGHBOR);
    assert_eq!(flag(&world, 3, 4), Cell::OBSTRUCTED_FULLY_BY_NORTH_NEIGHBOR);
    recorder.take();

    world
        .edit(&perm, |e| e.set_wall_at((3, 3), None))
        .unwrap()
        .unwrap();
    assert_eq!(
        recorder.edits(),
        vec![vec![CellEditInfo {
            cell: UVec2::new(3, 3),
            what: CellEditInfo::WALL,
        }]]
    );
    for (x, y) in [(2, 3), (4, 3), (3, 2), (3, 4)] {
        assert_eq!(flag(&world, x, y), 0, "cell ({x}, {y})");
    }
}

#[test]
fn prune_keeps_active_area_and_evicts_unreferenced_chunks() {
    let (mut world, recorder) = setup(config(8, 4, 0), Arc::new(MemoryChunkStore::new()));
    let area = world.create_active_area();
    world.set_active_area(area, CellRect::new(0, 0, 4, 4)).unwrap();
    world.wait_for_pending_io();
    world.update();

    let perm = world.permission_to_edit().unwrap();
    world.chunk_at_locked(&perm, (5, 5)).unwrap();
    assert!(world.chunk_at((5, 5)).unwrap().is_some());
    world.wait_for_pending_io();
    world.update();

    world.prune();
    assert!(world.chunk_at((0, 0)).unwrap().is_some());
    assert!(world.chunk_at((5, 5)).unwrap().is_none());

    let seen = recorder.take();
    let far = ChunkId::new(5, 5);
    assert!(seen.contains(&Seen::Created(ChunkId::new(0, 0))));
    let created = seen.iter().position(|s| *s == Seen::Created(far));
    let unloaded = seen.iter().position(|s| *s == Seen::Unloaded(far));
    assert!(created.is_some() && created < unloaded);
    assert!(seen.contains(&Seen::Ready(ChunkId::new(0, 0))));
}

#[test]
fn edit_reports_exactly_the_fields_that_changed() {
    let (mut world, recorder) = setup(config(2, 4, 8), Arc::new(MemoryChunkStore::new()));
    load_everything(&mut world);
    let perm = world.permission_to_edit().unwrap();
    world
        .edit(&perm, |e| e.set_floor_at((1, 1), Some(Floor { sprite_id: 2 })))
        .unwrap()
        .unwrap();
    recorder.take();

    world
        .edit(&perm, |e| {
            // Set and revert: no report.
            e.set_wall_at((0, 0), wall())?;
            e.set_wall_at((0, 0), None)?;
            // Same value again: no report.
            e.set_floor_at((1, 1), Some(Floor { sprite_id: 2 }))?;
            // Two fields of one cell across a chunk border.
            e.set_floor_at((5, 6), Some(Floor { sprite_id: 3 }))?;
            e.set_wall_at((5, 6), wall())?;
            e.set_floor_at((1, 1), None)
        })
        .unwrap()
        .unwrap();

    let mut infos = recorder.edits().concat();
    infos.sort_by_key(|i| (i.cell.x, i.cell.y, i.what));
    assert_eq!(
        infos,
        vec![
            CellEditInfo {
                cell: UVec2::new(1, 1),
                what: CellEditInfo::FLOOR,
            },
            CellEditInfo {
                cell: UVec2::new(5, 6),
                what: CellEditInfo::FLOOR,
            },
            CellEditInfo {
                cell: UVec2::new(5, 6),
                what: CellEditInfo::WALL,
            },
        ]
    );

    world.edit(&perm, |_| ()).unwrap();
    assert!(recorder.edits().is_empty());
}

#[test]
fn obstruction_flags_match_fresh_derivation() {
    let (mut world, _) = setup(config(3, 5, 16), Arc::new(MemoryChunkStore::new()));
    load_everything(&mut world);
    let perm = world.permission_to_edit().unwrap();
    let shapes: Vec<Shape> = Shape::all().collect();
    let mut seed = 0x2545_f491_u32;
    world
        .edit(&perm, |e| {
            for cell in CellRect::new(0, 0, 15, 15).cells() {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                if seed >> 29 == 0 {
                    let shape = shapes[(seed >> 8) as usize % shapes.len()];
                    e.set_wall_at(cell, Some(Wall::new(1, shape)))?;
                }
            }
            Ok::<_, gridspace_kernel::WorldError>(())
        })
        .unwrap()
        .unwrap();

    for cell in CellRect::new(0, 0, 15, 15).cells() {
        let actual = world.cell_at(cell).unwrap().unwrap().flags();
        assert_eq!(actual, expected_flags(&world, cell), "cell {cell}");
    }
}

#[test]
fn panicking_edit_still_closes_the_transaction() {
    let (mut world, recorder) = setup(config(2, 4, 8), Arc::new(MemoryChunkStore::new()));
    load_everything(&mut world);
    let perm = world.permission_to_edit().unwrap();

    let result = catch_unwind(AssertUnwindSafe(|| {
        world.edit(&perm, |e| {
            e.set_wall_at((2, 2), wall()).unwrap();
            panic!("generator bug");
        })
    }));
    assert!(result.is_err());
    assert_eq!(recorder.edits().concat().len(), 1);
    assert_eq!(
        world.cell_at((1, 2)).unwrap().unwrap().flags(),
        Cell::OBSTRUCTED_FULLY_BY_EAST_NEIGHBOR
    );
    world.edit(&perm, |e| e.set_wall_at((2, 2), None)).unwrap().unwrap();
}

#[test]
fn out_of_range_edit_fails_without_side_effects() {
    let (mut world, recorder) = setup(config(2, 4, 8), Arc::new(MemoryChunkStore::new()));
    let perm = world.permission_to_edit().unwrap();
    let err = world
        .edit(&perm, |e| e.set_floor_at((8, 0), Some(Floor { sprite_id: 1 })))
        .unwrap()
        .unwrap_err();
    assert_eq!(err, gridspace_kernel::WorldError::CellOutOfBounds { x: 8, y: 0 });
    assert!(recorder.edits().is_empty());
}

#[test]
fn stored_content_replaces_untouched_placeholder() {
    let store = Arc::new(MemoryChunkStore::new());
    let mut chunk = Chunk::new(4, 4);
    chunk
        .cell_at_mut(UVec2::new(1, 1))
        .set_floor(Some(Floor { sprite_id: 7 }));
    store.insert(ChunkId::new(0, 0), &chunk).unwrap();

    let (mut world, recorder) = setup(config(2, 4, 8), store);
    let perm = world.permission_to_edit().unwrap();
    assert!(world.cell_at_locked(&perm, (1, 1)).unwrap().floor().is_none());

    world.wait_for_pending_io();
    world.update();
    assert_eq!(
        world.cell_at((1, 1)).unwrap().unwrap().floor(),
        Some(Floor { sprite_id: 7 })
    );
    let seen = recorder.take();
    let id = ChunkId::new(0, 0);
    assert!(seen.contains(&Seen::Loaded(id)));
    assert!(!seen.contains(&Seen::Created(id)));
}

#[test]
fn placeholder_with_nothing_stored_is_created_not_loaded() {
    let (mut world, recorder) = setup(config(2, 4, 8), Arc::new(MemoryChunkStore::new()));
    let perm = world.permission_to_edit().unwrap();
    world.cell_at_locked(&perm, (6, 1)).unwrap();
    assert!(recorder.take().is_empty());

    world.wait_for_pending_io();
    world.update();
    let id = ChunkId::new(1, 0);
    let seen: Vec<Seen> = recorder
        .take()
        .into_iter()
        .filter(|s| !matches!(s, Seen::Ready(_)))
        .collect();
    assert_eq!(seen, vec![Seen::Created(id)]);
}

#[test]
fn editing_an_unloaded_chunk_keeps_its_stored_content() {
    let store = Arc::new(MemoryChunkStore::new());
    let id = ChunkId::new(0, 0);
    let mut chunk = Chunk::new(4, 4);
    chunk
        .cell_at_mut(UVec2::new(1, 1))
        .set_floor(Some(Floor { sprite_id: 7 }));
    store.insert(id, &chunk).unwrap();

    let (mut world, recorder) = setup(config(2, 4, 8), store.clone());
    let perm = world.permission_to_edit().unwrap();
    // A placeholder is already waiting for the same chunk.
    world.cell_at_locked(&perm, (0, 0)).unwrap();
    world
        .edit(&perm, |e| e.set_floor_at((2, 2), Some(Floor { sprite_id: 9 })))
        .unwrap()
        .unwrap();

    let cell = |w: &World, x: u32, y: u32| w.cell_at((x, y)).unwrap().unwrap().floor();
    assert_eq!(cell(&world, 2, 2), Some(Floor { sprite_id: 9 }));
    assert_eq!(cell(&world, 1, 1), Some(Floor { sprite_id: 7 }));

    // The chunk is announced before the edit that touched it.
    let seen = recorder.take();
    let loaded = seen.iter().position(|s| *s == Seen::Loaded(id));
    let edited = seen.iter().position(|s| matches!(s, Seen::Edited(_)));
    assert!(loaded.is_some() && loaded < edited);
    assert!(!seen.contains(&Seen::Created(id)));

    world.wait_for_pending_io();
    world.update();
    assert_eq!(cell(&world, 1, 1), Some(Floor { sprite_id: 7 }));
    world.save();
    world.wait_for_pending_io();
    drop(world);

    let (mut reopened, _) = setup(config(2, 4, 8), store);
    load_everything(&mut reopened);
    assert_eq!(cell(&reopened, 1, 1), Some(Floor { sprite_id: 7 }));
    assert_eq!(cell(&reopened, 2, 2), Some(Floor { sprite_id: 9 }));
}

#[test]
fn evicted_edits_survive_a_reload_before_update() {
    let store = Arc::new(MemoryChunkStore::new());
    let (mut world, _) = setup(config(2, 4, 0), store.clone());
    let perm = world.permission_to_edit().unwrap();
    world
        .edit(&perm, |e| e.set_floor_at((1, 1), Some(Floor { sprite_id: 5 })))
        .unwrap()
        .unwrap();
    world.prune();
    assert!(world.chunk_at((0, 0)).unwrap().is_none());

    // Referenced again while the eviction save may still be queued.
    world.cell_at_locked(&perm, (1, 1)).unwrap();
    world.wait_for_pending_io();
    world.update();
    assert_eq!(
        world.cell_at((1, 1)).unwrap().unwrap().floor(),
        Some(Floor { sprite_id: 5 })
    );

    let area = world.create_active_area();
    world.set_active_area(area, CellRect::new(0, 0, 4, 4)).unwrap();
    world.save();
    world.wait_for_pending_io();
    drop(world);

    let (mut reopened, _) = setup(config(2, 4, 0), store);
    load_everything(&mut reopened);
    assert_eq!(
        reopened.cell_at((1, 1)).unwrap().unwrap().floor(),
        Some(Floor { sprite_id: 5 })
    );
}

#[test]
fn generator_mode_persists_edits_beyond_the_cache_budget() {
    let store = Arc::new(MemoryChunkStore::new());
    let (mut world, recorder) = setup(config(2, 4, 0), store.clone());
    let perm = world.permission_to_edit().unwrap();
    world.toggle_generator_mode(&perm, true).unwrap();

    world
        .edit(&perm, |e| {
            for cell in CellRect::new(0, 0, 8, 8).cells() {
                e.set_floor_at(cell, Some(Floor { sprite_id: 4 }))?;
            }
            // Revisit a chunk that has been evicted in the meantime.
            e.set_wall_at((0, 0), wall())
        })
        .unwrap()
        .unwrap();
    assert!(world.storage_stats().loaded <= 1);
    assert_eq!(recorder.edits().concat().len(), 65);

    world.toggle_generator_mode(&perm, false).unwrap();
    world.save();
    world.wait_for_pending_io();
    assert_eq!(store.len(), 4);
    drop(world);

    let (mut reopened, _) = setup(config(2, 4, 0), store);
    load_everything(&mut reopened);
    for cell in CellRect::new(0, 0, 8, 8).cells() {
        let c = reopened.cell_at(cell).unwrap().unwrap();
        assert_eq!(c.floor(), Some(Floor { sprite_id: 4 }), "cell {cell}");
        assert_eq!(c.flags(), expected_flags(&reopened, cell));
    }
    assert!(reopened.cell_at((0, 0)).unwrap().unwrap().is_occupied());
}

struct Tag(ChunkId, &'static str);

struct Tagger(&'static str);

impl Binder for Tagger {
    fn create_chunk_extension(&self, id: ChunkId) -> Option<Box<dyn ChunkExtension>> {
        Some(Box::new(Tag(id, self.0)))
    }
}

#[test]
fn chunk_extension_comes_from_the_lowest_priority_binder() {
    let mut world = World::new(config(1, 4, 4), Arc::new(MemoryChunkStore::new())).unwrap();
    world
        .attach_binder_with_priority(Arc::new(Tagger("late")), 500)
        .unwrap();
    let early: Arc<dyn Binder> = Arc::new(Tagger("early"));
    world.attach_binder_with_priority(early.clone(), 10).unwrap();
    load_everything(&mut world);

    let tag = world.chunk_extension::<Tag>(ChunkId::new(0, 0)).unwrap();
    assert_eq!((tag.0, tag.1), (ChunkId::new(0, 0), "early"));
    assert!(world.chunk_extension::<String>(ChunkId::new(0, 0)).is_none());
    assert!(world.detach_binder(&early));
}

#[test]
fn placeholder_carries_an_extension_before_it_is_announced() {
    let mut world = World::new(config(1, 4, 4), Arc::new(MemoryChunkStore::new())).unwrap();
    world.attach_binder(Arc::new(Tagger("only"))).unwrap();
    let perm = world.permission_to_edit().unwrap();
    world.cell_at_locked(&perm, (1, 1)).unwrap();

    let id = ChunkId::new(0, 0);
    assert!(world.chunk_extension::<Tag>(id).is_some());
    world.wait_for_pending_io();
    world.update();
    assert_eq!(world.chunk_extension::<Tag>(id).unwrap().1, "only");
}
