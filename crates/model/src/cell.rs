use gridspace_common::SpriteId;
use serde::{Deserialize, Serialize};

use crate::shape::{Shape, Side, Sides};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Floor {
    pub sprite_id: SpriteId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    pub sprite_id: SpriteId,
    /// Sprite used when the wall is drawn reduced (e.g. to reveal what is behind it).
    pub sprite_id_reduced: SpriteId,
    pub shape: Shape,
}

impl Wall {
    pub fn new(sprite_id: SpriteId, shape: Shape) -> Self {
        Self {
            sprite_id,
            sprite_id_reduced: sprite_id,
            shape,
        }
    }
}

/// A single grid cell.
///
/// # Invariants
/// - `flags` and `openness` are derived from this cell's wall and its four neighbours.
///   They are only written by the world refresh pass and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    floor: Option<Floor>,
    wall: Option<Wall>,
    #[serde(skip)]
    flags: u16,
    #[serde(skip)]
    openness: u8,
    #[serde(default)]
    user_data: i64,
}

impl Cell {
    pub const OBSTRUCTED_FULLY_BY_NORTH_NEIGHBOR: u16 = 0x01;
    pub const OBSTRUCTED_FULLY_BY_WEST_NEIGHBOR: u16 = 0x02;
    pub const OBSTRUCTED_FULLY_BY_EAST_NEIGHBOR: u16 = 0x04;
    pub const OBSTRUCTED_FULLY_BY_SOUTH_NEIGHBOR: u16 = 0x08;

    /// Openness never exceeds this many rings.
    pub const MAX_OPENNESS: u8 = 3;

    pub fn floor(&self) -> Option<Floor> {
        self.floor
    }

    pub fn wall(&self) -> Option<Wall> {
        self.wall
    }

    /// Shape of the wall, if any.
    pub fn shape(&self) -> Option<Shape> {
        self.wall.map(|w| w.shape)
    }

    pub fn is_occupied(&self) -> bool {
        self.wall.is_some()
    }

    /// Returns true if the floor changed.
    pub fn set_floor(&mut self, floor: Option<Floor>) -> bool {
        let changed = self.floor != floor;
        self.floor = floor;
        changed
    }

    /// Returns true if the wall changed.
    pub fn set_wall(&mut self, wall: Option<Wall>) -> bool {
        let changed = self.wall != wall;
        self.wall = wall;
        changed
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Sides on which a neighbour's wall fully covers the shared border.
    pub fn obstructed_sides(&self) -> Sides {
        Sides((self.flags & 0x0F) as u8)
    }

    pub fn is_obstructed_fully_by(&self, side: Side) -> bool {
        self.obstructed_sides().contains(side)
    }

    /// Number of wall-free rings around this cell, capped at [`Cell::MAX_OPENNESS`].
    pub fn openness(&self) -> u8 {
        self.openness
    }

    pub fn set_derived(&mut self, flags: u16, openness: u8) {
        self.flags = flags;
        self.openness = openness.min(Self::MAX_OPENNESS);
    }

    pub fn user_data(&self) -> i64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, data: i64) {
        self.user_data = data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::BaseShape;

    #[test]
    fn setters_report_changes() {
        let mut cell = Cell::default();
        assert!(!cell.set_floor(None));
        assert!(cell.set_floor(Some(Floor { sprite_id: 3 })));
        assert!(!cell.set_floor(Some(Floor { sprite_id: 3 })));

        let wall = Wall::new(9, Shape::new(BaseShape::LargeTriangle, true, false));
        assert!(cell.set_wall(Some(wall)));
        assert!(cell.is_occupied());
        assert_eq!(cell.shape(), Some(wall.shape));
        assert!(cell.set_wall(None));
        assert!(!cell.is_occupied());
    }

    #[test]
    fn derived_state_is_not_serialized() {
        let mut cell = Cell::default();
        cell.set_floor(Some(Floor { sprite_id: 1 }));
        cell.set_user_data(-42);
        cell.set_derived(Cell::OBSTRUCTED_FULLY_BY_EAST_NEIGHBOR, 7);
        assert_eq!(cell.openness(), Cell::MAX_OPENNESS);
        assert!(cell.is_obstructed_fully_by(Side::East));

        let json = serde_json::to_string(&cell).unwrap();
        let back: Cell = serde_json::from_str(&json).unwrap();
        assert_eq!(back.floor(), cell.floor());
        assert_eq!(back.user_data(), -42);
        assert_eq!(back.flags(), 0);
        assert_eq!(back.openness(), 0);
    }
}
