use std::collections::HashMap;
use std::collections::hash_map::Entry;

use glam::UVec2;
use gridspace_common::CellRect;
use gridspace_model::{Cell, Floor, Wall};

use crate::binder::CellEditInfo;
use crate::error::WorldError;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Floor,
    Wall,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Floor(Option<Floor>),
    Wall(Option<Wall>),
}

struct Touch {
    cell: UVec2,
    field: Field,
    original: Value,
    latest: Value,
}

/// Bookkeeping of one open edit transaction.
#[derive(Default)]
pub(crate) struct EditLog {
    bbox: CellRect,
    touches: Vec<Touch>,
    index: HashMap<(UVec2, Field), usize>,
}

impl EditLog {
    fn record(&mut self, cell: UVec2, original: Value, latest: Value) {
        let field = match original {
            Value::Floor(_) => Field::Floor,
            Value::Wall(_) => Field::Wall,
        };
        self.bbox.include(cell);
        match self.index.entry((cell, field)) {
            Entry::Occupied(e) => self.touches[*e.get()].latest = latest,
            Entry::Vacant(e) => {
                e.insert(self.touches.len());
                self.touches.push(Touch {
                    cell,
                    field,
                    original,
                    latest,
                });
            }
        }
    }

    /// Rectangle of every cell that was changed at least once.
    pub fn bbox(&self) -> CellRect {
        self.bbox
    }

    /// One entry per (cell, field) whose final value differs from its original, in the
    /// order the fields were first touched.
    pub fn changes(&self) -> Vec<CellEditInfo> {
        self.touches
            .iter()
            .filter(|t| t.original != t.latest)
            .map(|t| CellEditInfo {
                cell: t.cell,
                what: match t.field {
                    Field::Floor => CellEditInfo::FLOOR,
                    Field::Wall => CellEditInfo::WALL,
                },
            })
            .collect()
    }
}

/// Mutating view of a world, alive only inside [`World::edit`].
///
/// Dropping the editor closes the transaction, also while unwinding from a panic in the
/// edit body.
pub struct Editor<'w> {
    world: &'w mut World,
    log: EditLog,
}

impl<'w> Editor<'w> {
    pub(crate) fn new(world: &'w mut World) -> Self {
        Self {
            world,
            log: EditLog::default(),
        }
    }

    /// Read access to the world being edited.
    pub fn world(&self) -> &World {
        self.world
    }

    pub fn set_floor_at(
        &mut self,
        cell: impl Into<UVec2>,
        floor: Option<Floor>,
    ) -> Result<(), WorldError> {
        let cell = self.world.check_cell(cell.into())?;
        self.set_floor_at_unchecked(cell, floor);
        Ok(())
    }

    pub fn set_floor_at_unchecked(&mut self, cell: impl Into<UVec2>, floor: Option<Floor>) {
        let cell = cell.into();
        let target = self.world.cell_for_edit(cell);
        let old = target.floor();
        if target.set_floor(floor) {
            self.log.record(cell, Value::Floor(old), Value::Floor(floor));
            self.world.mark_edited(cell);
        }
    }

    pub fn set_wall_at(
        &mut self,
        cell: impl Into<UVec2>,
        wall: Option<Wall>,
    ) -> Result<(), WorldError> {
        let cell = self.world.check_cell(cell.into())?;
        self.set_wall_at_unchecked(cell, wall);
        Ok(())
    }

    pub fn set_wall_at_unchecked(&mut self, cell: impl Into<UVec2>, wall: Option<Wall>) {
        let cell = cell.into();
        let target = self.world.cell_for_edit(cell);
        let old = target.wall();
        if target.set_wall(wall) {
            self.log.record(cell, Value::Wall(old), Value::Wall(wall));
            self.world.mark_edited(cell);
        }
    }

    /// Set the opaque user data of a cell. Not reported to binders.
    pub fn set_user_data_at(&mut self, cell: impl Into<UVec2>, data: i64) -> Result<(), WorldError> {
        let cell = self.world.check_cell(cell.into())?;
        self.world.cell_for_edit(cell).set_user_data(data);
        self.world.mark_edited(cell);
        Ok(())
    }

    /// Cell content as currently edited, loading its chunk if needed.
    pub fn cell_at(&mut self, cell: impl Into<UVec2>) -> Result<&Cell, WorldError> {
        let cell = self.world.check_cell(cell.into())?;
        Ok(self.world.cell_for_edit(cell))
    }
}

impl Drop for Editor<'_> {
    fn drop(&mut self) {
        let log = std::mem::take(&mut self.log);
        self.world.close_edit(log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverted_changes_are_not_reported() {
        let mut log = EditLog::default();
        let a = UVec2::new(1, 1);
        let b = UVec2::new(4, 2);
        let floor = Some(Floor { sprite_id: 1 });
        log.record(a, Value::Floor(None), Value::Floor(floor));
        let wall = Some(Wall::new(2, gridspace_model::Shape::FULL_SQUARE));
        log.record(b, Value::Wall(None), Value::Wall(wall));
        log.record(a, Value::Floor(floor), Value::Floor(None));

        assert_eq!(
            log.changes(),
            vec![CellEditInfo {
                cell: b,
                what: CellEditInfo::WALL
            }]
        );
        assert_eq!(log.bbox(), CellRect::new(1, 1, 4, 2));
    }

    #[test]
    fn floor_and_wall_of_one_cell_are_separate_entries() {
        let mut log = EditLog::default();
        let c = UVec2::new(0, 0);
        log.record(c, Value::Floor(None), Value::Floor(Some(Floor { sprite_id: 3 })));
        log.record(
            c,
            Value::Wall(None),
            Value::Wall(Some(Wall::new(1, gridspace_model::Shape::FULL_SQUARE))),
        );
        let whats: Vec<u8> = log.changes().iter().map(|i| i.what).collect();
        assert_eq!(whats, vec![CellEditInfo::FLOOR, CellEditInfo::WALL]);
    }
}
