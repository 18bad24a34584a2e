use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use gridspace_common::ChunkId;
use gridspace_model::Chunk;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::store::{ChunkStore, StoreError};

/// Called on a worker thread right after a load finished. Must not touch the cache.
pub type ReadyHook = Arc<dyn Fn(ChunkId) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolerConfig {
    /// Number of background worker threads. Zero is treated as one.
    pub worker_count: usize,
}

impl Default for SpoolerConfig {
    fn default() -> Self {
        Self { worker_count: 1 }
    }
}

enum Job {
    Load(ChunkId, u64),
    Save(ChunkId, Chunk),
}

/// Outcome of a background load, buffered until the owner drains it.
pub struct LoadResult {
    pub id: ChunkId,
    /// Ticket passed to [`Spooler::request_load`].
    pub ticket: u64,
    pub outcome: Result<Option<Chunk>, StoreError>,
}

/// Count of queued plus running jobs, with a wakeup when it drops to zero.
#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Runs chunk loads and saves on background threads.
///
/// # Invariants
/// - Jobs for the same chunk always run on the same worker, in submission order.
/// - Results are only ever handed out through [`Spooler::drain_results`]; workers never
///   touch the owner's state.
/// - Dropping the spooler finishes every queued job before the workers exit.
pub struct Spooler {
    lanes: Vec<Sender<Job>>,
    results: Receiver<LoadResult>,
    outstanding: Arc<Outstanding>,
    workers: Vec<JoinHandle<()>>,
}

impl Spooler {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        config: &SpoolerConfig,
        on_ready: Option<ReadyHook>,
    ) -> Self {
        let (tx_done, rx_done) = unbounded::<LoadResult>();
        let outstanding = Arc::new(Outstanding::default());
        let mut lanes = Vec::new();

        let workers: Vec<JoinHandle<()>> = (0..config.worker_count.max(1))
            .map(|i| {
                let (tx_job, rx_job) = unbounded::<Job>();
                lanes.push(tx_job);
                let store = Arc::clone(&store);
                let tx_done = tx_done.clone();
                let on_ready = on_ready.clone();
                let outstanding = Arc::clone(&outstanding);
                std::thread::Builder::new()
                    .name(format!("chunk-spooler-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx_job.recv() {
                            run_job(&*store, job, &tx_done, on_ready.as_deref());
                            outstanding.done();
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::error!(%err, "failed to spawn spooler worker");
                    None
                }
            })
            .collect();

        if workers.is_empty() {
            lanes.clear();
        }

        Self {
            lanes,
            results: rx_done,
            outstanding,
            workers,
        }
    }

    /// Queue a load. The result carries `ticket` back so the owner can tell a current
    /// request from a superseded one.
    pub fn request_load(&self, id: ChunkId, ticket: u64) {
        tracing::debug!(%id, ticket, "requesting chunk load");
        self.submit(id, Job::Load(id, ticket));
    }

    pub fn request_save(&self, id: ChunkId, chunk: Chunk) {
        tracing::debug!(%id, "requesting chunk save");
        self.submit(id, Job::Save(id, chunk));
    }

    fn submit(&self, id: ChunkId, job: Job) {
        if self.lanes.is_empty() {
            tracing::warn!(%id, "no spooler workers, job dropped");
            return;
        }
        let lane = (id.x() ^ id.y().rotate_left(16)) as usize % self.lanes.len();
        self.outstanding.add();
        if self.lanes[lane].send(job).is_err() {
            tracing::warn!("spooler channel closed, job dropped");
            self.outstanding.done();
        }
    }

    /// Every load result that arrived since the last call, in arrival order.
    pub fn drain_results(&self) -> Vec<LoadResult> {
        self.results.try_iter().collect()
    }

    /// Block until every submitted job has finished.
    pub fn wait_idle(&self) {
        if self.workers.is_empty() {
            return;
        }
        self.outstanding.wait_idle();
    }
}

fn run_job(
    store: &dyn ChunkStore,
    job: Job,
    tx_done: &Sender<LoadResult>,
    on_ready: Option<&(dyn Fn(ChunkId) + Send + Sync)>,
) {
    match job {
        Job::Load(id, ticket) => {
            let outcome = store.load_chunk(id);
            if tx_done.send(LoadResult { id, ticket, outcome }).is_ok()
                && let Some(hook) = on_ready
            {
                hook(id);
            }
        }
        Job::Save(id, chunk) => {
            if let Err(err) = store.save_chunk(id, &chunk) {
                tracing::warn!(%id, %err, "chunk save failed");
            }
        }
    }
}

impl Drop for Spooler {
    fn drop(&mut self) {
        // Closing the lanes lets workers drain their queues and exit.
        self.lanes.clear();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("spooler worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<ChunkId, Chunk>>);

    impl ChunkStore for MapStore {
        fn load_chunk(&self, id: ChunkId) -> Result<Option<Chunk>, StoreError> {
            Ok(self.0.lock().get(&id).map(Chunk::snapshot))
        }

        fn save_chunk(&self, id: ChunkId, chunk: &Chunk) -> Result<(), StoreError> {
            self.0.lock().insert(id, chunk.snapshot());
            Ok(())
        }
    }

    #[test]
    fn saves_then_loads_in_order() {
        let store = Arc::new(MapStore::default());
        let spooler = Spooler::new(store.clone(), &SpoolerConfig::default(), None);
        let id = ChunkId::new(1, 2);
        spooler.request_save(id, Chunk::new(3, 3));
        spooler.request_load(id, 1);
        spooler.request_load(ChunkId::new(9, 9), 2);
        spooler.wait_idle();

        let results = spooler.drain_results();
        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0].outcome, Ok(Some(c)) if c.width() == 3));
        assert_eq!(results[0].ticket, 1);
        assert!(matches!(results[1].outcome, Ok(None)));
        assert_eq!(results[1].ticket, 2);
        assert!(spooler.drain_results().is_empty());
    }

    #[test]
    fn ready_hook_fires_on_worker() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let hook: ReadyHook = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let spooler = Spooler::new(
            Arc::new(MapStore::default()),
            &SpoolerConfig { worker_count: 3 },
            Some(hook),
        );
        for x in 0..10 {
            spooler.request_load(ChunkId::new(x, 0), x as u64);
        }
        spooler.wait_idle();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(spooler.drain_results().len(), 10);
    }

    #[test]
    fn drop_flushes_queued_saves() {
        let store = Arc::new(MapStore::default());
        {
            let spooler = Spooler::new(store.clone(), &SpoolerConfig::default(), None);
            for x in 0..5 {
                spooler.request_save(ChunkId::new(x, x), Chunk::new(1, 1));
            }
        }
        assert_eq!(store.0.lock().len(), 5);
    }
}
