//! Derived cell state: neighbour obstruction flags and openness.

use glam::{IVec2, UVec2};
use gridspace_model::{Cell, Side};

/// Derived state of `cell`, computed from the live cells around it.
///
/// `lookup` returns `None` for cells that are outside the world or not loaded; those
/// never obstruct, but they do end the openness count.
pub(crate) fn derive<'a>(
    cell: UVec2,
    world_size: UVec2,
    lookup: impl Fn(UVec2) -> Option<&'a Cell>,
) -> (u16, u8) {
    let neighbour = |offset: IVec2| -> Option<UVec2> {
        let p = cell.as_ivec2() + offset;
        let inside =
            p.x >= 0 && p.y >= 0 && (p.x as u32) < world_size.x && (p.y as u32) < world_size.y;
        inside.then(|| p.as_uvec2())
    };

    let mut flags = 0u16;
    for side in Side::ALL {
        let blocked = neighbour(side.offset())
            .and_then(&lookup)
            .and_then(|n| n.shape())
            .is_some_and(|shape| shape.blockage().blocks_fully(side.opposite()));
        if blocked {
            flags |= side.bit() as u16;
        }
    }

    let own_wall = lookup(cell).is_some_and(Cell::is_occupied);
    let mut openness = 0u8;
    if !own_wall {
        'rings: for ring in 1..=Cell::MAX_OPENNESS as i32 {
            for dy in -ring..=ring {
                for dx in -ring..=ring {
                    if dx.abs() != ring && dy.abs() != ring {
                        continue;
                    }
                    let clear = neighbour(IVec2::new(dx, dy))
                        .and_then(&lookup)
                        .is_some_and(|c| !c.is_occupied());
                    if !clear {
                        break 'rings;
                    }
                }
            }
            openness += 1;
        }
    }
    (flags, openness)
}
