use std::sync::Arc;

use glam::UVec2;
use gridspace_common::ChunkId;
use gridspace_model::ChunkExtension;
use parking_lot::RwLock;

use crate::error::WorldError;

/// One changed field of one cell, reported after an edit closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellEditInfo {
    pub cell: UVec2,
    /// Bitmask of [`CellEditInfo::FLOOR`] and [`CellEditInfo::WALL`].
    pub what: u8,
}

impl CellEditInfo {
    pub const FLOOR: u8 = 0x01;
    pub const WALL: u8 = 0x02;
}

/// Observer of world events and supplier of chunk extensions.
///
/// Binders are notified in ascending priority order. `on_chunk_ready` is called from a
/// spooler worker thread; every other method runs on the thread that owns the world.
pub trait Binder: Send + Sync {
    /// A background load finished; the chunk becomes available at the next `update`.
    fn on_chunk_ready(&self, _id: ChunkId) {}

    fn on_chunk_created(&self, _id: ChunkId) {}

    fn on_chunk_loaded(&self, _id: ChunkId) {}

    fn on_chunk_unloaded(&self, _id: ChunkId) {}

    fn on_cells_edited(&self, _edits: &[CellEditInfo]) {}

    /// Extension for a chunk entering the cache. The best (lowest) priority binder that
    /// returns one wins.
    fn create_chunk_extension(&self, _id: ChunkId) -> Option<Box<dyn ChunkExtension>> {
        None
    }
}

pub const MIN_BINDER_PRIORITY: i32 = 0;
pub const MAX_BINDER_PRIORITY: i32 = 10_000;
pub const DEFAULT_BINDER_PRIORITY: i32 = 100;

struct Slot {
    binder: Arc<dyn Binder>,
    priority: i32,
}

fn same_binder(a: &Arc<dyn Binder>, b: &Arc<dyn Binder>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Binders sorted by ascending priority, shared with the spooler's ready hook.
#[derive(Clone, Default)]
pub(crate) struct BinderRegistry {
    slots: Arc<RwLock<Vec<Slot>>>,
}

impl BinderRegistry {
    pub fn attach(&self, binder: Arc<dyn Binder>, priority: i32) -> Result<(), WorldError> {
        if !(MIN_BINDER_PRIORITY..=MAX_BINDER_PRIORITY).contains(&priority) {
            return Err(WorldError::BinderPriorityOutOfRange(priority));
        }
        let mut slots = self.slots.write();
        if slots.iter().any(|s| same_binder(&s.binder, &binder)) {
            return Err(WorldError::BinderAlreadyAttached);
        }
        let at = slots.partition_point(|s| s.priority <= priority);
        slots.insert(at, Slot { binder, priority });
        Ok(())
    }

    pub fn detach(&self, binder: &Arc<dyn Binder>) -> bool {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|s| !same_binder(&s.binder, binder));
        slots.len() != before
    }

    /// Current binders in notification order. Callbacks run without the lock held.
    pub fn ordered(&self) -> Vec<Arc<dyn Binder>> {
        self.slots.read().iter().map(|s| Arc::clone(&s.binder)).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn notify_ready(&self, id: ChunkId) {
        for binder in self.ordered() {
            binder.on_chunk_ready(id);
        }
    }
}
