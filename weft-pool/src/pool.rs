//! Worker pool manager
//!
//! Owns the worker roster, the task cache, and the memoized decoder module.
//! Workers are spawned lazily up to the configured limit; once the roster is
//! full, each task goes to the worker with the least outstanding load,
//! where load is the sum of encoded byte lengths of its in-flight tasks.
//!
//! All bookkeeping lives behind one mutex and every mutation is a short
//! critical section; completion callbacks are always fired outside the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use hashbrown::HashMap;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tracing::{debug, trace, warn};
use weft_codec::{CodecError, DecodedGeometry, DecoderModule, ModuleLoader};

use crate::cache::{CacheOutcome, TaskCache};
use crate::task::{EncodedBuffer, TaskConfig};
use crate::worker::{WorkerRequest, WorkerResponse, spawn_worker};
use crate::{PoolConfig, PoolError};

type TaskResult = Result<Arc<DecodedGeometry>, PoolError>;

struct WorkerSlot {
    /// Request queue into the worker thread. `None` after shutdown.
    requests: Option<std::sync::mpsc::Sender<WorkerRequest>>,
    join: Option<JoinHandle<()>>,
    /// Completion channels for tasks currently assigned to this worker.
    callbacks: HashMap<u64, oneshot::Sender<TaskResult>>,
    /// Encoded byte length of each in-flight task, summed into `load`.
    task_costs: HashMap<u64, usize>,
    load: usize,
}

struct PoolState {
    workers: Vec<WorkerSlot>,
    shut_down: bool,
}

struct PoolShared {
    config: PoolConfig,
    loader: Arc<dyn ModuleLoader>,
    /// Module load happens once, on first demand; a failure is memoized
    /// too and fans out to every subsequent submission.
    module: OnceCell<Result<Arc<dyn DecoderModule>, CodecError>>,
    state: Mutex<PoolState>,
    cache: Mutex<TaskCache>,
    next_task_id: AtomicU64,
}

/// Asynchronous decode worker pool.
///
/// See the crate docs for the architecture. `DecodePool` is the single
/// owning handle; dropping it shuts the pool down.
pub struct DecodePool {
    shared: Arc<PoolShared>,
}

impl DecodePool {
    pub fn new(config: PoolConfig, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                loader,
                module: OnceCell::new(),
                state: Mutex::new(PoolState {
                    workers: Vec::new(),
                    shut_down: false,
                }),
                cache: Mutex::new(TaskCache::new()),
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    /// Load the decoder module eagerly instead of on the first submission.
    pub async fn preload(&self) -> Result<(), PoolError> {
        self.shared.module().await.map(|_| ())
    }

    /// Submit one buffer for decoding.
    ///
    /// Resolves to the decoded geometry, shared between all submissions of
    /// the same buffer with the same config. The buffer's bytes move to a
    /// worker on first dispatch; resubmitting it afterwards with a
    /// different config fails with [`PoolError::ConfigConflict`].
    pub async fn submit(
        &self,
        buffer: &Arc<EncodedBuffer>,
        config: TaskConfig,
    ) -> Result<Arc<DecodedGeometry>, PoolError> {
        let key = config.cache_key();
        let cell = {
            let mut cache = self.shared.cache.lock().unwrap();
            match cache.check(buffer, &key) {
                CacheOutcome::Reused(cell) | CacheOutcome::Fresh(cell) => cell,
                CacheOutcome::Conflict => {
                    warn!(
                        "buffer {} resubmitted with a different config after transfer",
                        buffer.id()
                    );
                    return Err(PoolError::ConfigConflict);
                }
            }
        };
        cell.get_or_init(|| self.shared.clone().run_task(buffer.clone(), config))
            .await
            .clone()
    }

    /// Shut the pool down, rejecting every task still in flight with
    /// [`PoolError::Shutdown`], then join the worker threads. Idempotent.
    pub fn shutdown(&self) {
        let (callbacks, joins) = {
            let mut state = self.shared.state.lock().unwrap();
            if state.shut_down {
                return;
            }
            state.shut_down = true;

            let mut callbacks = Vec::new();
            let mut joins = Vec::new();
            for slot in &mut state.workers {
                // Dropping the sender is the worker's exit signal.
                slot.requests = None;
                if let Some(join) = slot.join.take() {
                    joins.push(join);
                }
                callbacks.extend(slot.callbacks.drain().map(|(_, tx)| tx));
                slot.task_costs.clear();
                slot.load = 0;
            }
            (callbacks, joins)
        };

        // Reject before joining: a worker may be mid-decode and its waiters
        // must not be held up by it.
        for callback in callbacks {
            let _ = callback.send(Err(PoolError::Shutdown));
        }
        for join in joins {
            if join.join().is_err() {
                warn!("decode worker panicked during shutdown");
            }
        }
        debug!("decode pool shut down");
    }

    /// Outstanding load (in encoded bytes) per worker, in spawn order.
    pub fn worker_loads(&self) -> Vec<usize> {
        let state = self.shared.state.lock().unwrap();
        state.workers.iter().map(|slot| slot.load).collect()
    }

    /// Number of workers with a live request queue.
    pub fn live_workers(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state
            .workers
            .iter()
            .filter(|slot| slot.requests.is_some())
            .count()
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolShared {
    async fn module(&self) -> Result<Arc<dyn DecoderModule>, PoolError> {
        self.module
            .get_or_init(|| async {
                debug!("loading decoder module");
                self.loader.load()
            })
            .await
            .clone()
            .map_err(PoolError::Init)
    }

    /// Drive one decode end to end. Runs at most once per result cell.
    async fn run_task(
        self: Arc<Self>,
        buffer: Arc<EncodedBuffer>,
        config: TaskConfig,
    ) -> TaskResult {
        let bytes = buffer.take().ok_or(PoolError::BufferTransferred)?;
        let cost = bytes.len();
        let module = self.module().await?;

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.dispatch(task_id, cost, config, bytes, module, reply_tx)?;

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(PoolError::WorkerLost),
        }
    }

    /// Place a task: spawn a new worker while under the limit, otherwise
    /// pick the least-loaded one (first wins ties, in spawn order).
    fn dispatch(
        self: &Arc<Self>,
        task_id: u64,
        cost: usize,
        config: TaskConfig,
        bytes: Vec<u8>,
        module: Arc<dyn DecoderModule>,
        reply: oneshot::Sender<TaskResult>,
    ) -> Result<(), PoolError> {
        let mut state = self.state.lock().unwrap();
        if state.shut_down {
            return Err(PoolError::Shutdown);
        }

        let limit = self.config.worker_limit.max(1);
        let index = if state.workers.len() < limit {
            let index = state.workers.len();
            let (response_tx, response_rx) = mpsc::unbounded_channel();
            let (requests, join) = spawn_worker(index, response_tx);
            if requests.send(WorkerRequest::Init { module }).is_err() {
                warn!("decode worker {index} died before init");
                return Err(PoolError::WorkerLost);
            }
            tokio::spawn(self.clone().route_responses(index, response_rx));
            state.workers.push(WorkerSlot {
                requests: Some(requests),
                join: Some(join),
                callbacks: HashMap::new(),
                task_costs: HashMap::new(),
                load: 0,
            });
            debug!("spawned decode worker {index}");
            index
        } else {
            let mut index = 0;
            for (i, slot) in state.workers.iter().enumerate() {
                if slot.load < state.workers[index].load {
                    index = i;
                }
            }
            index
        };

        let slot = &mut state.workers[index];
        slot.callbacks.insert(task_id, reply);
        slot.task_costs.insert(task_id, cost);
        slot.load += cost;
        trace!(
            "task {task_id} ({cost} bytes) -> worker {index}, load now {}",
            slot.load
        );

        let sent = slot.requests.as_ref().is_some_and(|requests| {
            requests
                .send(WorkerRequest::Decode {
                    id: task_id,
                    config,
                    buffer: bytes,
                })
                .is_ok()
        });
        if !sent {
            // Roll the bookkeeping back; dropping the callback is fine, the
            // caller sees the dispatch error directly.
            slot.callbacks.remove(&task_id);
            slot.task_costs.remove(&task_id);
            slot.load -= cost;
            warn!("decode worker {index} queue is closed, task {task_id} not dispatched");
            return Err(PoolError::WorkerLost);
        }
        Ok(())
    }

    /// Forward one worker's responses to their waiting callers. Runs until
    /// the worker drops its response sender.
    async fn route_responses(
        self: Arc<Self>,
        index: usize,
        mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    ) {
        while let Some(response) = responses.recv().await {
            match response {
                WorkerResponse::Decoded { id, geometry } => {
                    self.complete(index, id, Ok(Arc::new(geometry)));
                }
                WorkerResponse::Failed { id, error } => {
                    self.complete(index, id, Err(error));
                }
            }
        }
        self.fail_remaining(index, PoolError::WorkerLost);
    }

    /// Release one task's load and resolve its caller.
    fn complete(&self, index: usize, task_id: u64, result: TaskResult) {
        let callback = {
            let mut state = self.state.lock().unwrap();
            let slot = &mut state.workers[index];
            if let Some(cost) = slot.task_costs.remove(&task_id) {
                slot.load -= cost;
            }
            slot.callbacks.remove(&task_id)
        };
        if let Some(callback) = callback {
            // The caller may have gone away; that is not an error.
            let _ = callback.send(result);
        }
    }

    /// Fail every task still assigned to a worker whose response channel
    /// closed. After a shutdown there is nothing left to fail.
    fn fail_remaining(&self, index: usize, error: PoolError) {
        let callbacks: Vec<_> = {
            let mut state = self.state.lock().unwrap();
            let slot = &mut state.workers[index];
            slot.task_costs.clear();
            slot.load = 0;
            slot.callbacks.drain().map(|(_, tx)| tx).collect()
        };
        for callback in callbacks {
            let _ = callback.send(Err(error.clone()));
        }
    }
}
