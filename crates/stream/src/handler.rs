use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use glam::UVec2;
use gridspace_common::ChunkId;
use gridspace_model::Chunk;
use lru::LruCache;

use crate::spooler::{LoadResult, ReadyHook, Spooler, SpoolerConfig};
use crate::store::{ChunkStore, StoreError};

/// Lifecycle change of a chunk, queued in order for the owner to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Chunk became available with default content; nothing was stored for it.
    Created(ChunkId),
    /// Chunk became available with stored content.
    Loaded(ChunkId),
    /// A chunk announced by `Created` or `Loaded` was evicted from the cache.
    Unloaded(ChunkId),
    /// A placeholder was evicted before its content arrived. It was never announced.
    Dropped(ChunkId),
}

/// Why a load was requested. A result is kept only if its reason still holds on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    ActiveArea,
    OnDemand,
    /// Requested by [`ChunkStorageHandler::load_blocking`]; always kept.
    Blocking,
}

#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    origin: LoadOrigin,
    ticket: u64,
}

struct Resident {
    chunk: Chunk,
    /// Default content standing in for a load that has not arrived yet.
    placeholder: bool,
    edited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub loaded: usize,
    pub pinned: usize,
    pub nonessential: usize,
    pub pending_loads: usize,
}

/// Bounded cache of chunks.
///
/// # Invariants
/// - A chunk pinned by an active area or an open edit is never evicted.
/// - Every resident chunk that is not pinned is tracked in the LRU list, and nothing else is.
/// - Load results are integrated only in [`ChunkStorageHandler::integrate`].
/// - Only the result carrying the ticket of the current pending request is integrated.
///   Evicting a chunk cancels its pending request, so a later reference loads again
///   behind the eviction save.
/// - A resident placeholder always has a pending request.
pub struct ChunkStorageHandler {
    chunk_size: UVec2,
    max_nonessential: usize,
    chunks: HashMap<ChunkId, Resident>,
    area_pins: HashMap<ChunkId, u32>,
    edit_pins: HashMap<ChunkId, u32>,
    nonessential: LruCache<ChunkId, ()>,
    pending: HashMap<ChunkId, PendingLoad>,
    next_ticket: u64,
    events: Vec<ChunkEvent>,
    spooler: Spooler,
}

impl ChunkStorageHandler {
    pub fn new(
        chunk_size: UVec2,
        max_nonessential: usize,
        store: Arc<dyn ChunkStore>,
        spooler_config: &SpoolerConfig,
        on_ready: Option<ReadyHook>,
    ) -> Self {
        Self {
            chunk_size,
            max_nonessential,
            chunks: HashMap::new(),
            area_pins: HashMap::new(),
            edit_pins: HashMap::new(),
            nonessential: LruCache::unbounded(),
            pending: HashMap::new(),
            next_ticket: 0,
            events: Vec::new(),
            spooler: Spooler::new(store, spooler_config, on_ready),
        }
    }

    pub fn max_nonessential(&self) -> usize {
        self.max_nonessential
    }

    /// Chunk if currently available. Never triggers a load.
    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id).map(|r| &r.chunk)
    }

    pub fn get_mut(&mut self, id: ChunkId) -> Option<&mut Chunk> {
        self.chunks.get_mut(&id).map(|r| &mut r.chunk)
    }

    /// Chunk, synthesizing a default placeholder and requesting a background load on a miss.
    ///
    /// The placeholder is announced as `Created` or `Loaded` once the store answers.
    pub fn get_or_load(&mut self, id: ChunkId) -> &mut Chunk {
        let pinned = self.is_pinned(id);
        if !self.chunks.contains_key(&id) {
            tracing::debug!(%id, "chunk miss, creating placeholder");
            if !self.pending.contains_key(&id) {
                self.request_load(id, LoadOrigin::OnDemand);
            }
            if !pinned {
                self.nonessential.put(id, ());
            }
        } else if !pinned {
            self.nonessential.promote(&id);
        }
        let chunk_size = self.chunk_size;
        &mut self
            .chunks
            .entry(id)
            .or_insert_with(|| Resident {
                chunk: Chunk::new(chunk_size.x, chunk_size.y),
                placeholder: true,
                edited: false,
            })
            .chunk
    }

    /// Chunk with its stored content, waiting for the spooler if it is missing or still a
    /// placeholder.
    pub fn load_blocking(&mut self, id: ChunkId) -> &mut Chunk {
        if self.is_placeholder(id) || !self.chunks.contains_key(&id) {
            match self.pending.get_mut(&id) {
                Some(pending) => pending.origin = LoadOrigin::Blocking,
                None => self.request_load(id, LoadOrigin::Blocking),
            }
            self.spooler.wait_idle();
            self.integrate();
        }
        self.get_or_load(id)
    }

    fn request_load(&mut self, id: ChunkId, origin: LoadOrigin) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending.insert(id, PendingLoad { origin, ticket });
        self.spooler.request_load(id, ticket);
    }

    /// Record that cell content of a resident chunk was changed by an edit.
    pub fn mark_edited(&mut self, id: ChunkId) {
        if let Some(r) = self.chunks.get_mut(&id) {
            r.edited = true;
        }
    }

    pub fn is_available(&self, id: ChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    /// True while the resident chunk is default content waiting for its load.
    pub fn is_placeholder(&self, id: ChunkId) -> bool {
        self.chunks.get(&id).is_some_and(|r| r.placeholder)
    }

    pub fn is_pinned(&self, id: ChunkId) -> bool {
        self.area_pins.contains_key(&id) || self.edit_pins.contains_key(&id)
    }

    pub fn is_pending(&self, id: ChunkId) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn available_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        self.chunks.keys().copied()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            loaded: self.chunks.len(),
            pinned: self
                .chunks
                .keys()
                .filter(|id| self.is_pinned(**id))
                .count(),
            nonessential: self.nonessential.len(),
            pending_loads: self.pending.len(),
        }
    }

    /// Pin chunks on behalf of an active area, requesting loads for missing ones.
    pub fn pin_area(&mut self, ids: &[ChunkId]) {
        for &id in ids {
            *self.area_pins.entry(id).or_insert(0) += 1;
            self.nonessential.pop(&id);
            if !self.chunks.contains_key(&id) && !self.pending.contains_key(&id) {
                self.request_load(id, LoadOrigin::ActiveArea);
            }
        }
    }

    pub fn unpin_area(&mut self, ids: &[ChunkId]) {
        for &id in ids {
            if let Entry::Occupied(mut pin) = self.area_pins.entry(id) {
                *pin.get_mut() -= 1;
                if *pin.get() == 0 {
                    pin.remove();
                    self.release(id);
                }
            }
        }
    }

    /// Pin a chunk for the duration of an edit. Pins nest.
    pub fn pin_for_edit(&mut self, id: ChunkId) {
        *self.edit_pins.entry(id).or_insert(0) += 1;
        self.nonessential.pop(&id);
    }

    pub fn unpin_all_edits(&mut self) {
        let ids: Vec<ChunkId> = self.edit_pins.drain().map(|(id, _)| id).collect();
        for id in ids {
            self.release(id);
        }
    }

    /// Chunk no longer pinned by anyone becomes nonessential (most recently used).
    fn release(&mut self, id: ChunkId) {
        if !self.is_pinned(id) && self.chunks.contains_key(&id) {
            self.nonessential.put(id, ());
        }
    }

    /// Integrate load results that arrived from the spooler. Must run on the owning thread.
    pub fn integrate(&mut self) {
        for LoadResult { id, ticket, outcome } in self.spooler.drain_results() {
            let origin = match self.pending.get(&id) {
                Some(pending) if pending.ticket == ticket => pending.origin,
                _ => {
                    tracing::debug!(%id, ticket, "discarding superseded or cancelled load");
                    continue;
                }
            };
            self.pending.remove(&id);
            let loaded = match outcome {
                Ok(loaded) => loaded,
                Err(err) => {
                    tracing::warn!(%id, %err, "chunk load failed, keeping default content");
                    None
                }
            };
            let loaded = loaded.and_then(|chunk| self.validate(id, chunk));

            match self.chunks.get_mut(&id) {
                Some(resident) if resident.placeholder => {
                    resident.placeholder = false;
                    let event = match loaded {
                        Some(chunk) if !resident.edited => {
                            tracing::debug!(%id, "swapping placeholder for loaded content");
                            resident.chunk.replace_cells(chunk);
                            ChunkEvent::Loaded(id)
                        }
                        Some(_) => {
                            tracing::warn!(%id, "discarding loaded content, placeholder was edited");
                            ChunkEvent::Created(id)
                        }
                        None => ChunkEvent::Created(id),
                    };
                    self.events.push(event);
                }
                Some(_) => {
                    tracing::warn!(%id, "load result for a chunk that is already resident");
                }
                None if origin == LoadOrigin::Blocking || self.area_pins.contains_key(&id) => {
                    let (chunk, event) = match loaded {
                        Some(chunk) => (chunk, ChunkEvent::Loaded(id)),
                        None => (
                            Chunk::new(self.chunk_size.x, self.chunk_size.y),
                            ChunkEvent::Created(id),
                        ),
                    };
                    tracing::debug!(%id, ?event, "chunk integrated");
                    self.chunks.insert(
                        id,
                        Resident {
                            chunk,
                            placeholder: false,
                            edited: false,
                        },
                    );
                    if !self.is_pinned(id) {
                        self.nonessential.put(id, ());
                    }
                    self.events.push(event);
                }
                None => {
                    tracing::debug!(%id, ?origin, "chunk no longer of interest, discarding load");
                }
            }
        }
    }

    fn validate(&self, id: ChunkId, chunk: Chunk) -> Option<Chunk> {
        if chunk.size() == self.chunk_size && chunk.is_well_formed() {
            return Some(chunk);
        }
        let err = StoreError::SizeMismatch {
            id,
            expected: self.chunk_size,
            actual: chunk.size(),
        };
        tracing::warn!(%err, "rejecting stored chunk");
        None
    }

    /// Evict least recently used unpinned chunks until at most `max_nonessential` remain.
    /// Returns the evicted ids in eviction order.
    pub fn prune(&mut self) -> Vec<ChunkId> {
        self.prune_to(self.max_nonessential, None)
    }

    /// Like [`ChunkStorageHandler::prune`], but never evicts `keep`. The budget may be
    /// exceeded by that one chunk.
    pub fn prune_keeping(&mut self, keep: ChunkId) -> Vec<ChunkId> {
        self.prune_to(self.max_nonessential, Some(keep))
    }

    fn prune_to(&mut self, budget: usize, keep: Option<ChunkId>) -> Vec<ChunkId> {
        let kept = keep.filter(|id| self.nonessential.pop(id).is_some());
        let budget = if kept.is_some() {
            budget.saturating_sub(1)
        } else {
            budget
        };
        let mut evicted = Vec::new();
        while self.nonessential.len() > budget {
            let Some((id, ())) = self.nonessential.pop_lru() else {
                break;
            };
            self.evict(id);
            evicted.push(id);
        }
        if let Some(id) = kept {
            self.nonessential.put(id, ());
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "pruned chunks");
        }
        evicted
    }

    fn evict(&mut self, id: ChunkId) {
        let Some(resident) = self.chunks.remove(&id) else {
            return;
        };
        // A load still in flight was read before the save below.
        if let Some(cancelled) = self.pending.remove(&id) {
            tracing::debug!(%id, ticket = cancelled.ticket, "cancelling in-flight load");
        }
        tracing::debug!(%id, "unloading chunk");
        let announced = !resident.placeholder;
        if Self::should_save(&resident) {
            let mut chunk = resident.chunk;
            chunk.set_extension(None);
            self.spooler.request_save(id, chunk);
        }
        self.events.push(if announced {
            ChunkEvent::Unloaded(id)
        } else {
            ChunkEvent::Dropped(id)
        });
    }

    /// Untouched placeholders would overwrite stored content that has not arrived yet.
    fn should_save(resident: &Resident) -> bool {
        !resident.placeholder || resident.edited
    }

    /// Queue a save of every resident chunk.
    pub fn save_all(&self) {
        for (&id, resident) in &self.chunks {
            if Self::should_save(resident) {
                self.spooler.request_save(id, resident.chunk.snapshot());
            }
        }
    }

    /// Lifecycle events accumulated since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<ChunkEvent> {
        std::mem::take(&mut self.events)
    }

    /// Block until the spooler has finished every queued load and save.
    pub fn wait_for_spooler(&self) {
        self.spooler.wait_idle();
    }
}
