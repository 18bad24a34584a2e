use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use glam::{UVec2, Vec2};
use gridspace_common::{CellRect, ChunkId, Color, LightId, SpriteId};
use gridspace_model::{Cell, Chunk};
use gridspace_stream::{ChunkEvent, ChunkStorageHandler, ChunkStore, ReadyHook, StorageStats};

use crate::binder::{Binder, BinderRegistry, DEFAULT_BINDER_PRIORITY};
use crate::config::WorldConfig;
use crate::editor::{EditLog, Editor};
use crate::error::WorldError;
use crate::light::{Light, LightRegistry};
use crate::permission::{EditPermission, PermissionGate};
use crate::refresh;

/// Cells around an edited or (un)loaded region whose derived state is recomputed.
/// Openness looks this many rings out, so nothing further away can change.
pub const REFRESH_HALO: u32 = Cell::MAX_OPENNESS as u32;

/// Handle of an active area created by [`World::create_active_area`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActiveAreaId(u64);

impl ActiveAreaId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct ActiveArea {
    rect: CellRect,
    chunks: Vec<ChunkId>,
}

/// The world: a fixed grid of chunks, streamed through a bounded cache.
///
/// Reads without an [`EditPermission`] never load anything; reads and writes with one
/// load missing chunks on demand. Loads complete in the background and become visible
/// at the next [`World::update`].
///
/// # Invariants
/// - Chunks intersecting an active area are never unloaded.
/// - Outside generator mode, the derived state of every loaded cell that is not inside an
///   open edit matches its wall and its four live neighbours.
/// - At most one edit is open at a time.
pub struct World {
    config: WorldConfig,
    cell_count: UVec2,
    storage: ChunkStorageHandler,
    binders: BinderRegistry,
    permission: PermissionGate,
    edit_open: bool,
    generator_mode: bool,
    areas: HashMap<ActiveAreaId, ActiveArea>,
    next_area_id: u64,
    lights: LightRegistry,
}

impl World {
    pub fn new(config: WorldConfig, store: Arc<dyn ChunkStore>) -> Result<Self, WorldError> {
        config.validate()?;
        let binders = BinderRegistry::default();
        let hook_binders = binders.clone();
        let on_ready: ReadyHook = Arc::new(move |id| hook_binders.notify_ready(id));
        let storage = ChunkStorageHandler::new(
            config.chunk_size(),
            config.max_loaded_nonessential_chunks,
            store,
            &config.spooler,
            Some(on_ready),
        );
        tracing::info!(
            chunks_x = config.chunk_count_x,
            chunks_y = config.chunk_count_y,
            cells_per_chunk_x = config.cells_per_chunk_x,
            cells_per_chunk_y = config.cells_per_chunk_y,
            "world created"
        );
        Ok(Self {
            cell_count: config.cell_count(),
            config,
            storage,
            binders,
            permission: PermissionGate::default(),
            edit_open: false,
            generator_mode: false,
            areas: HashMap::new(),
            next_area_id: 0,
            lights: LightRegistry::default(),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // ----- binders -----

    pub fn attach_binder(&mut self, binder: Arc<dyn Binder>) -> Result<(), WorldError> {
        self.attach_binder_with_priority(binder, DEFAULT_BINDER_PRIORITY)
    }

    pub fn attach_binder_with_priority(
        &mut self,
        binder: Arc<dyn Binder>,
        priority: i32,
    ) -> Result<(), WorldError> {
        self.binders.attach(binder, priority)
    }

    /// Returns false if the binder was not attached.
    pub fn detach_binder(&mut self, binder: &Arc<dyn Binder>) -> bool {
        self.binders.detach(binder)
    }

    // ----- lifecycle -----

    /// Integrate finished background loads and notify binders. Call once per frame.
    pub fn update(&mut self) {
        let _span = tracing::info_span!("world_update").entered();
        self.storage.integrate();
        self.dispatch_chunk_events();
        let stats = self.storage.stats();
        tracing::trace!(
            loaded = stats.loaded,
            pinned = stats.pinned,
            pending = stats.pending_loads,
            "world update complete"
        );
    }

    /// Unload least recently used chunks outside every active area, down to
    /// `max_loaded_nonessential_chunks`.
    pub fn prune(&mut self) {
        let _span = tracing::debug_span!("world_prune").entered();
        self.storage.prune();
        self.dispatch_chunk_events();
    }

    /// Queue every loaded chunk for saving.
    pub fn save(&mut self) {
        tracing::info!(chunks = self.storage.stats().loaded, "saving world");
        self.storage.save_all();
    }

    /// Block until all queued loads and saves have been processed by the store.
    /// Loaded content still only becomes visible at the next [`World::update`].
    pub fn wait_for_pending_io(&self) {
        self.storage.wait_for_spooler();
    }

    pub fn storage_stats(&self) -> StorageStats {
        self.storage.stats()
    }

    fn dispatch_chunk_events(&mut self) {
        let events = self.storage.take_events();
        if events.is_empty() {
            return;
        }
        let binders = self.binders.ordered();
        for event in events {
            match event {
                ChunkEvent::Created(id) | ChunkEvent::Loaded(id) => {
                    if self.storage.is_available(id) {
                        self.attach_extension(id, &binders);
                        if !self.generator_mode {
                            self.refresh_around_chunk(id);
                        }
                    }
                    for binder in &binders {
                        if matches!(event, ChunkEvent::Created(_)) {
                            binder.on_chunk_created(id);
                        } else {
                            binder.on_chunk_loaded(id);
                        }
                    }
                }
                ChunkEvent::Unloaded(id) => {
                    for binder in &binders {
                        binder.on_chunk_unloaded(id);
                    }
                    if !self.generator_mode {
                        self.refresh_around_chunk(id);
                    }
                }
                ChunkEvent::Dropped(id) => {
                    if !self.generator_mode {
                        self.refresh_around_chunk(id);
                    }
                }
            }
        }
    }

    fn attach_extension(&mut self, id: ChunkId, binders: &[Arc<dyn Binder>]) {
        let Some(chunk) = self.storage.get_mut(id) else {
            return;
        };
        if chunk.extension().is_some() {
            return;
        }
        let extension = binders.iter().find_map(|b| b.create_chunk_extension(id));
        chunk.set_extension(extension);
    }

    // ----- conversions -----

    pub fn cell_resolution(&self) -> f32 {
        self.config.cell_resolution
    }

    pub fn wall_height(&self) -> f32 {
        self.config.wall_height
    }

    pub fn cell_count(&self) -> UVec2 {
        self.cell_count
    }

    pub fn cell_count_x(&self) -> u32 {
        self.cell_count.x
    }

    pub fn cell_count_y(&self) -> u32 {
        self.cell_count.y
    }

    pub fn chunk_count_x(&self) -> u32 {
        self.config.chunk_count_x
    }

    pub fn chunk_count_y(&self) -> u32 {
        self.config.chunk_count_y
    }

    /// Cell containing a world position. Positions `[0, res)` map to cell 0, and so on.
    pub fn pos_to_cell(&self, pos: Vec2) -> Result<UVec2, WorldError> {
        let out = || WorldError::PositionOutOfBounds { x: pos.x, y: pos.y };
        if !pos.is_finite() || pos.x < 0.0 || pos.y < 0.0 {
            return Err(out());
        }
        let cell = self.pos_to_cell_unchecked(pos);
        if cell.x >= self.cell_count.x || cell.y >= self.cell_count.y {
            return Err(out());
        }
        Ok(cell)
    }

    /// Like [`World::pos_to_cell`] without the bounds check. Negative coordinates saturate
    /// to zero.
    pub fn pos_to_cell_unchecked(&self, pos: Vec2) -> UVec2 {
        (pos / self.config.cell_resolution).floor().as_uvec2()
    }

    pub fn check_cell(&self, cell: UVec2) -> Result<UVec2, WorldError> {
        if cell.x < self.cell_count.x && cell.y < self.cell_count.y {
            Ok(cell)
        } else {
            Err(WorldError::CellOutOfBounds {
                x: cell.x,
                y: cell.y,
            })
        }
    }

    fn check_chunk(&self, chunk: UVec2) -> Result<ChunkId, WorldError> {
        if chunk.x < self.config.chunk_count_x && chunk.y < self.config.chunk_count_y {
            Ok(ChunkId::new(chunk.x, chunk.y))
        } else {
            Err(WorldError::ChunkOutOfBounds {
                x: chunk.x,
                y: chunk.y,
            })
        }
    }

    pub fn cell_to_chunk_id(&self, cell: impl Into<UVec2>) -> Result<ChunkId, WorldError> {
        let cell = self.check_cell(cell.into())?;
        Ok(self.cell_to_chunk_id_unchecked(cell))
    }

    pub fn cell_to_chunk_id_unchecked(&self, cell: impl Into<UVec2>) -> ChunkId {
        let chunk = cell.into() / self.config.chunk_size();
        ChunkId::new(chunk.x, chunk.y)
    }

    /// Cells covered by a chunk.
    pub fn chunk_rect(&self, id: ChunkId) -> CellRect {
        let size = self.config.chunk_size();
        let origin = id.coords() * size;
        CellRect::new(origin.x, origin.y, size.x, size.y)
    }

    fn local_cell(&self, cell: UVec2) -> UVec2 {
        cell % self.config.chunk_size()
    }

    /// Chunks intersecting `rect`, row by row.
    pub fn chunks_in_rect(&self, rect: CellRect) -> Vec<ChunkId> {
        let rect = rect.expanded(0, self.cell_count);
        if rect.is_empty() {
            return Vec::new();
        }
        let size = self.config.chunk_size();
        let first = UVec2::new(rect.x, rect.y) / size;
        let last = UVec2::new(rect.end_x() - 1, rect.end_y() - 1) / size;
        (first.y..=last.y)
            .flat_map(|y| (first.x..=last.x).map(move |x| ChunkId::new(x, y)))
            .collect()
    }

    // ----- permission -----

    /// The single edit permission of this world. Fails while another one is alive.
    pub fn permission_to_edit(&self) -> Result<EditPermission, WorldError> {
        self.permission.acquire()
    }

    // ----- cell getters -----

    /// Cell if its chunk is loaded. Never triggers a load.
    pub fn cell_at(&self, cell: impl Into<UVec2>) -> Result<Option<&Cell>, WorldError> {
        let cell = self.check_cell(cell.into())?;
        Ok(self.cell_at_unchecked(cell))
    }

    pub fn cell_at_unchecked(&self, cell: impl Into<UVec2>) -> Option<&Cell> {
        let cell = cell.into();
        let chunk = self.storage.get(self.cell_to_chunk_id_unchecked(cell))?;
        Some(chunk.cell_at(self.local_cell(cell)))
    }

    /// Cell, loading its chunk on demand. Until the load completes, a missing chunk reads
    /// as empty cells.
    pub fn cell_at_locked(
        &mut self,
        permission: &EditPermission,
        cell: impl Into<UVec2>,
    ) -> Result<&Cell, WorldError> {
        let cell = self.check_cell(cell.into())?;
        self.cell_at_locked_unchecked(permission, cell)
    }

    pub fn cell_at_locked_unchecked(
        &mut self,
        permission: &EditPermission,
        cell: impl Into<UVec2>,
    ) -> Result<&Cell, WorldError> {
        self.permission.check(permission)?;
        let cell = cell.into();
        let id = self.cell_to_chunk_id_unchecked(cell);
        let local = self.local_cell(cell);
        Ok(self.load_on_demand(id).cell_at(local))
    }

    // ----- chunk getters -----

    /// Chunk at chunk coordinates, if loaded.
    pub fn chunk_at(&self, chunk: impl Into<UVec2>) -> Result<Option<&Chunk>, WorldError> {
        let id = self.check_chunk(chunk.into())?;
        Ok(self.storage.get(id))
    }

    pub fn chunk_at_unchecked(&self, chunk: impl Into<UVec2>) -> Option<&Chunk> {
        let chunk = chunk.into();
        self.storage.get(ChunkId::new(chunk.x, chunk.y))
    }

    pub fn chunk_at_id(&self, id: ChunkId) -> Result<Option<&Chunk>, WorldError> {
        self.check_chunk(id.coords())?;
        Ok(self.storage.get(id))
    }

    pub fn chunk_at_id_unchecked(&self, id: ChunkId) -> Option<&Chunk> {
        self.storage.get(id)
    }

    pub fn chunk_at_locked(
        &mut self,
        permission: &EditPermission,
        chunk: impl Into<UVec2>,
    ) -> Result<&Chunk, WorldError> {
        let id = self.check_chunk(chunk.into())?;
        self.chunk_at_id_locked(permission, id)
    }

    pub fn chunk_at_id_locked(
        &mut self,
        permission: &EditPermission,
        id: ChunkId,
    ) -> Result<&Chunk, WorldError> {
        self.permission.check(permission)?;
        self.check_chunk(id.coords())?;
        Ok(self.load_on_demand(id))
    }

    /// Ids of every chunk currently available, in no particular order.
    pub fn available_chunks(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.storage.available_ids()
    }

    pub fn is_chunk_pinned(&self, id: ChunkId) -> bool {
        self.storage.is_pinned(id)
    }

    /// Extension of a loaded chunk, downcast to its concrete type.
    pub fn chunk_extension<T: Any>(&self, id: ChunkId) -> Option<&T> {
        self.storage.get(id)?.extension_as::<T>()
    }

    pub fn chunk_extension_mut<T: Any>(&mut self, id: ChunkId) -> Option<&mut T> {
        self.storage.get_mut(id)?.extension_as_mut::<T>()
    }

    fn load_on_demand(&mut self, id: ChunkId) -> &mut Chunk {
        if !self.storage.is_available(id) {
            self.storage.get_or_load(id);
            let binders = self.binders.ordered();
            self.attach_extension(id, &binders);
            if !self.generator_mode {
                self.refresh_around_chunk(id);
            }
        }
        self.storage.get_or_load(id)
    }

    // ----- active areas -----

    /// A new, empty active area. Give it a rectangle with [`World::set_active_area`].
    pub fn create_active_area(&mut self) -> ActiveAreaId {
        let id = ActiveAreaId(self.next_area_id);
        self.next_area_id += 1;
        self.areas.insert(id, ActiveArea::default());
        id
    }

    /// Move an active area. Chunks it newly covers are pinned and loaded in the background.
    pub fn set_active_area(&mut self, id: ActiveAreaId, rect: CellRect) -> Result<(), WorldError> {
        let rect = rect.expanded(0, self.cell_count);
        let chunks = self.chunks_in_rect(rect);
        let area = self
            .areas
            .get_mut(&id)
            .ok_or(WorldError::UnknownActiveArea(id.0))?;
        // Pin before unpinning so chunks in both rectangles are never released.
        self.storage.pin_area(&chunks);
        let old = std::mem::replace(area, ActiveArea { rect, chunks });
        self.storage.unpin_area(&old.chunks);
        tracing::debug!(area = id.0, ?rect, "active area moved");
        Ok(())
    }

    pub fn active_area(&self, id: ActiveAreaId) -> Option<CellRect> {
        self.areas.get(&id).map(|a| a.rect)
    }

    pub fn destroy_active_area(&mut self, id: ActiveAreaId) -> bool {
        match self.areas.remove(&id) {
            Some(area) => {
                self.storage.unpin_area(&area.chunks);
                true
            }
            None => false,
        }
    }

    // ----- editing -----

    pub fn is_generator_mode(&self) -> bool {
        self.generator_mode
    }

    /// Enter or leave generator mode. Leaving it refreshes every loaded cell.
    pub fn toggle_generator_mode(
        &mut self,
        permission: &EditPermission,
        generator_mode: bool,
    ) -> Result<(), WorldError> {
        self.permission.check(permission)?;
        if self.edit_open {
            return Err(WorldError::EditInProgress);
        }
        if self.generator_mode == generator_mode {
            return Ok(());
        }
        self.generator_mode = generator_mode;
        tracing::info!(generator_mode, "generator mode toggled");
        if !generator_mode {
            self.dispatch_chunk_events();
            let ids: Vec<ChunkId> = self.storage.available_ids().collect();
            for id in ids {
                self.refresh_rect(self.chunk_rect(id));
            }
        }
        Ok(())
    }

    /// Run `body` as one edit transaction.
    ///
    /// When the body returns (or panics), derived state around the changed cells is
    /// refreshed and binders receive one [`CellEditInfo`](crate::CellEditInfo) per cell
    /// field whose value differs from before the edit.
    pub fn edit<R>(
        &mut self,
        permission: &EditPermission,
        body: impl FnOnce(&mut Editor<'_>) -> R,
    ) -> Result<R, WorldError> {
        self.permission.check(permission)?;
        if self.edit_open {
            return Err(WorldError::EditInProgress);
        }
        self.edit_open = true;
        let mut editor = Editor::new(self);
        Ok(body(&mut editor))
    }

    /// Cell to be modified by the open edit, pinning its chunk.
    ///
    /// Edits never land on a placeholder: a chunk that is missing or still waiting for its
    /// load is read from the store first, so stored content is never shadowed.
    pub(crate) fn cell_for_edit(&mut self, cell: UVec2) -> &mut Cell {
        let id = self.cell_to_chunk_id_unchecked(cell);
        let local = self.local_cell(cell);
        let needs_load = !self.storage.is_available(id) || self.storage.is_placeholder(id);
        if self.generator_mode {
            if needs_load {
                // The chunk may have been evicted with edits earlier in this batch.
                self.storage.load_blocking(id);
                self.storage.prune_keeping(id);
            }
        } else {
            self.storage.pin_for_edit(id);
            if needs_load {
                self.storage.load_blocking(id);
            }
        }
        self.storage.get_or_load(id).cell_at_mut(local)
    }

    pub(crate) fn mark_edited(&mut self, cell: UVec2) {
        let id = self.cell_to_chunk_id_unchecked(cell);
        self.storage.mark_edited(id);
    }

    pub(crate) fn close_edit(&mut self, log: EditLog) {
        let _span = tracing::debug_span!("close_edit").entered();
        self.edit_open = false;
        self.dispatch_chunk_events();
        if !self.generator_mode && !log.bbox().is_empty() {
            self.refresh_rect(log.bbox().expanded(REFRESH_HALO, self.cell_count));
        }
        self.storage.unpin_all_edits();

        let changes = log.changes();
        if changes.is_empty() {
            return;
        }
        tracing::debug!(count = changes.len(), "delivering cell edits");
        for binder in self.binders.ordered() {
            binder.on_cells_edited(&changes);
        }
    }

    fn refresh_around_chunk(&mut self, id: ChunkId) {
        let rect = self.chunk_rect(id).expanded(REFRESH_HALO, self.cell_count);
        self.refresh_rect(rect);
    }

    /// Recompute derived state of every loaded cell in `rect`.
    fn refresh_rect(&mut self, rect: CellRect) {
        let updates: Vec<(UVec2, u16, u8)> = rect
            .cells()
            .filter(|c| self.cell_at_unchecked(*c).is_some())
            .map(|c| {
                let (flags, openness) =
                    refresh::derive(c, self.cell_count, |p| self.cell_at_unchecked(p));
                (c, flags, openness)
            })
            .collect();
        for (cell, flags, openness) in updates {
            let id = self.cell_to_chunk_id_unchecked(cell);
            let local = self.local_cell(cell);
            if let Some(chunk) = self.storage.get_mut(id) {
                chunk.cell_at_mut(local).set_derived(flags, openness);
            }
        }
    }

    // ----- lights -----

    pub fn create_dynamic_light(
        &mut self,
        center: Vec2,
        radius: f32,
        color: Color,
        sprite_id: SpriteId,
        texture_size: UVec2,
    ) -> LightId {
        self.lights.create(center, radius, color, sprite_id, texture_size)
    }

    /// Active or inactive light by id.
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(id)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights.get_mut(id)
    }

    /// Lights that are rendered.
    pub fn dynamic_lights(&self) -> &[Light] {
        self.lights.dynamic()
    }

    pub fn inactive_lights(&self) -> &[Light] {
        self.lights.inactive()
    }

    /// Exclude a light from rendering without destroying it.
    pub fn deactivate_light(&mut self, id: LightId) -> bool {
        self.lights.deactivate(id)
    }

    pub fn activate_light(&mut self, id: LightId) -> bool {
        self.lights.activate(id)
    }

    pub fn destroy_light(&mut self, id: LightId) -> bool {
        self.lights.destroy(id)
    }

    /// Mark every active light as rendered in its current state.
    pub fn clear_light_dirty_flags(&mut self) {
        for light in self.lights.dynamic_mut() {
            light.clear_dirty();
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("cell_count", &self.cell_count)
            .field("storage", &self.storage.stats())
            .field("binders", &self.binders.len())
            .field("generator_mode", &self.generator_mode)
            .field("active_areas", &self.areas.len())
            .field("lights", &self.lights.dynamic().len())
            .finish()
    }
}
