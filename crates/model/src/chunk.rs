use std::any::Any;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;

/// Opaque per-chunk payload supplied by the host application.
pub trait ChunkExtension: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Send> ChunkExtension for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fixed-size rectangular tile of cells, stored row-major.
///
/// # Invariants
/// - `cells.len() == width * height` for the lifetime of the chunk.
/// - The extension is never persisted; it is recreated by binders on load.
#[derive(Serialize, Deserialize)]
pub struct Chunk {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
    #[serde(skip)]
    extension: Option<Box<dyn ChunkExtension>>,
}

impl Chunk {
    /// A chunk of default (empty) cells.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::default(); (width * height) as usize],
            extension: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// True when the stored cell count matches the declared size.
    pub fn is_well_formed(&self) -> bool {
        self.cells.len() == (self.width * self.height) as usize
    }

    fn index(&self, local: UVec2) -> usize {
        debug_assert!(local.x < self.width && local.y < self.height);
        (local.y * self.width + local.x) as usize
    }

    /// Cell at chunk-local coordinates. Panics when out of range.
    pub fn cell_at(&self, local: UVec2) -> &Cell {
        &self.cells[self.index(local)]
    }

    pub fn cell_at_mut(&mut self, local: UVec2) -> &mut Cell {
        let i = self.index(local);
        &mut self.cells[i]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Copy of the cell content without the extension, suitable for handing to a store.
    pub fn snapshot(&self) -> Chunk {
        Chunk {
            width: self.width,
            height: self.height,
            cells: self.cells.clone(),
            extension: None,
        }
    }

    /// Replace the cells with those of `other`, keeping this chunk's extension.
    pub fn replace_cells(&mut self, other: Chunk) {
        self.width = other.width;
        self.height = other.height;
        self.cells = other.cells;
    }

    pub fn extension(&self) -> Option<&dyn ChunkExtension> {
        self.extension.as_deref()
    }

    pub fn set_extension(&mut self, extension: Option<Box<dyn ChunkExtension>>) {
        self.extension = extension;
    }

    pub fn extension_as<T: Any>(&self) -> Option<&T> {
        self.extension.as_deref()?.as_any().downcast_ref()
    }

    pub fn extension_as_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.extension.as_deref_mut()?.as_any_mut().downcast_mut()
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("occupied", &self.cells.iter().filter(|c| c.is_occupied()).count())
            .field("has_extension", &self.extension.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Floor;

    #[derive(Debug, PartialEq)]
    struct Tag(u32);

    #[test]
    fn cells_are_row_major() {
        let mut chunk = Chunk::new(4, 2);
        assert!(chunk.is_well_formed());
        chunk
            .cell_at_mut(UVec2::new(1, 1))
            .set_floor(Some(Floor { sprite_id: 5 }));
        assert_eq!(chunk.cells()[5].floor(), Some(Floor { sprite_id: 5 }));
    }

    #[test]
    fn extension_downcasts_and_snapshot_drops_it() {
        let mut chunk = Chunk::new(2, 2);
        chunk.set_extension(Some(Box::new(Tag(7))));
        assert_eq!(chunk.extension_as::<Tag>(), Some(&Tag(7)));
        assert!(chunk.extension_as::<u8>().is_none());
        chunk.extension_as_mut::<Tag>().unwrap().0 = 8;
        assert_eq!(chunk.extension_as::<Tag>(), Some(&Tag(8)));

        let snap = chunk.snapshot();
        assert!(snap.extension().is_none());
        assert_eq!(snap.cells(), chunk.cells());

        let mut target = Chunk::new(2, 2);
        target.set_extension(Some(Box::new(Tag(1))));
        target.replace_cells(snap);
        assert_eq!(target.extension_as::<Tag>(), Some(&Tag(1)));
    }
}
