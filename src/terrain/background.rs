//! # Background Generator
//!
//! One dedicated worker thread fills, meshes and uploads chunks off the
//! render thread. It owns the upload context, so GPU resources for chunk
//! meshes are only ever created there.
//!
//! The main thread and the worker share a pending set behind a mutex. Two
//! condition variables gate it:
//! - `wake`: signalled on every `load` and on shutdown; the worker sleeps on
//!   it while the set is empty
//! - `idle`: signalled whenever the worker runs out of work
//!
//! The worker always claims the pending chunk with the lowest score. Scores
//! change every frame, so this is the order at the moment of claiming, not a
//! strict global order.
//!
//! ## Deletion
//! A chunk is deleted by exactly one side:
//! - still pending: removed from the set and deleted by the main thread,
//!   its generation never runs
//! - claimed by the worker: flagged pending-delete, the worker deletes it
//!   once its generation step finishes
//! - otherwise: deleted by the main thread right away

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::config::TerrainSettings;
use crate::core::MtResource;
use crate::error::{TerrainError, UploadError};
use crate::rendering::gpu::UploadContext;

use super::chunk::{ChunkShared, GenerationOutcome};
use super::generation::TerrainGenerator;

struct Queue<U: UploadContext> {
    pending: Vec<Arc<ChunkShared<U>>>,
    /// Id of the chunk the worker is generating.
    current: Option<u64>,
    stop: bool,
}

impl<U: UploadContext> Queue<U> {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }

    /// Removes the pending chunk with the lowest score. Ties go to the
    /// oldest chunk.
    fn pop_best(&mut self) -> Option<Arc<ChunkShared<U>>> {
        let best = self
            .pending
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.score().total_cmp(&b.score()).then(a.id.cmp(&b.id)))
            .map(|(index, _)| index)?;
        Some(self.pending.swap_remove(best))
    }
}

struct Shared<U: UploadContext> {
    queue: Mutex<Queue<U>>,
    wake: Condvar,
    idle: Condvar,
    stats: StatCounters,
    fatal: MtResource<Option<UploadError>>,
}

impl<U: UploadContext> Shared<U> {
    fn lock(&self) -> MutexGuard<'_, Queue<U>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct StatCounters {
    queued: AtomicUsize,
    generated: AtomicUsize,
    cancelled: AtomicUsize,
    deleted_by_worker: AtomicUsize,
    deleted_by_main: AtomicUsize,
    failed: AtomicUsize,
}

impl StatCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of the generator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Chunks handed to `load`.
    pub queued: usize,
    /// Generation steps that produced a mesh.
    pub generated: usize,
    /// Chunks removed from the pending set before the worker claimed them.
    pub cancelled: usize,
    /// Pending-delete chunks deleted by the worker.
    pub deleted_by_worker: usize,
    /// Chunks deleted by the main thread.
    pub deleted_by_main: usize,
    /// Generation steps whose callback panicked.
    pub failed: usize,
}

/// Owner of the generation worker thread.
pub struct BackgroundGenerator<U: UploadContext> {
    shared: Arc<Shared<U>>,
    worker: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl<U: UploadContext> BackgroundGenerator<U> {
    /// Spawns the worker thread.
    ///
    /// # Arguments
    /// * `generator` - Voxel callbacks, only ever called from the worker
    /// * `uploader` - Upload context moved onto the worker
    /// * `settings` - Mesher selection and parameters
    pub fn spawn<G: TerrainGenerator>(
        generator: Arc<G>,
        uploader: U,
        settings: TerrainSettings,
    ) -> Result<Self, TerrainError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                pending: Vec::new(),
                current: None,
                stop: false,
            }),
            wake: Condvar::new(),
            idle: Condvar::new(),
            stats: StatCounters::default(),
            fatal: MtResource::new(None),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("chunk-generator".to_string())
            .spawn(move || run_worker(&worker_shared, generator.as_ref(), uploader, &settings))
            .map_err(TerrainError::WorkerSpawn)?;

        Ok(BackgroundGenerator {
            shared,
            worker: Some(worker),
            next_id: AtomicU64::new(0),
        })
    }

    /// Allocates a chunk id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a chunk to the pending set and wakes the worker.
    pub fn load(&self, chunk: Arc<ChunkShared<U>>) {
        let mut queue = self.shared.lock();
        queue.pending.push(chunk);
        StatCounters::bump(&self.shared.stats.queued);
        self.shared.wake.notify_one();
    }

    /// Withdraws a chunk and deletes it, or defers the deletion to the worker
    /// if it is generating the chunk right now.
    pub fn unload(&self, chunk: &Arc<ChunkShared<U>>) {
        let mut queue = self.shared.lock();

        if let Some(index) = queue.pending.iter().position(|c| c.id == chunk.id) {
            queue.pending.swap_remove(index);
            StatCounters::bump(&self.shared.stats.cancelled);
            if queue.is_idle() {
                self.shared.idle.notify_all();
            }
        } else if queue.current == Some(chunk.id) {
            chunk.mark_pending_delete();
            return;
        }

        if chunk.retire() {
            StatCounters::bump(&self.shared.stats.deleted_by_main);
        }
    }

    /// Number of chunks waiting to be claimed.
    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Blocks until the pending set is empty and the worker has finished its
    /// current chunk, or the worker stopped. Meant for tools and tests; the
    /// frame loop never waits on the worker.
    pub fn wait_idle(&self) {
        let queue = self.shared.lock();
        let _queue = self
            .shared
            .idle
            .wait_while(queue, |queue| !queue.is_idle() && !queue.stop)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn stats(&self) -> GeneratorStats {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        let stats = &self.shared.stats;
        GeneratorStats {
            queued: load(&stats.queued),
            generated: load(&stats.generated),
            cancelled: load(&stats.cancelled),
            deleted_by_worker: load(&stats.deleted_by_worker),
            deleted_by_main: load(&stats.deleted_by_main),
            failed: load(&stats.failed),
        }
    }

    /// Returns an error once the worker has stopped for good: the upload
    /// context failed, or the thread died.
    pub fn check_health(&self) -> Result<(), TerrainError> {
        if let Some(err) = self.shared.fatal.take() {
            return Err(TerrainError::Upload(err));
        }
        match &self.worker {
            Some(worker) if worker.is_finished() => Err(TerrainError::WorkerDied),
            _ => Ok(()),
        }
    }

    /// Stops the worker after its current chunk and joins it.
    pub fn shutdown(&mut self) {
        {
            let mut queue = self.shared.lock();
            queue.stop = true;
            self.shared.wake.notify_all();
            self.shared.idle.notify_all();
        }

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Chunk generator thread panicked");
            }
            info!("Chunk generator stopped");
        }
    }
}

impl<U: UploadContext> Drop for BackgroundGenerator<U> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<U, G>(shared: &Shared<U>, generator: &G, mut uploader: U, settings: &TerrainSettings)
where
    U: UploadContext,
    G: TerrainGenerator + ?Sized,
{
    info!("Chunk generator started");

    loop {
        let chunk = {
            let mut queue = shared.lock();
            loop {
                if queue.stop {
                    return;
                }
                if let Some(chunk) = queue.pop_best() {
                    queue.current = Some(chunk.id);
                    break chunk;
                }
                shared.idle.notify_all();
                queue = shared.wake.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
        };

        let result = chunk.generate(generator, &mut uploader, settings);

        let mut queue = shared.lock();
        queue.current = None;

        match result {
            Ok(GenerationOutcome::Uploaded) => StatCounters::bump(&shared.stats.generated),
            Ok(GenerationOutcome::Failed) => {
                StatCounters::bump(&shared.stats.failed);
                warn!(
                    "Generation callback panicked for chunk {} at {:?}, level {}",
                    chunk.id, chunk.center, chunk.level
                );
            }
            Err(err) => {
                error!("Chunk upload failed, stopping terrain generation: {err}");
                shared.fatal.replace(err);
                queue.stop = true;
                shared.idle.notify_all();
            }
        }

        if chunk.is_pending_delete() && chunk.retire() {
            StatCounters::bump(&shared.stats.deleted_by_worker);
            debug!("Deleted chunk {} after generation", chunk.id);
        }

        if queue.is_idle() {
            shared.idle.notify_all();
        }
    }
}
