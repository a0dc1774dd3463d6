//! The resizable worker pool.
//!
//! [`Pool`] keeps a registry of live workers, runs each on its own thread, and
//! routes tasks and results through caller-supplied channels. Shutdown is
//! driven by a [`CancellationToken`]; see [`PoolState`] for the lifecycle.

mod shutdown;

pub use shutdown::PoolState;

use crate::{
    channel::{Outlet, Receiver},
    error::{ClosedError, Error, TrySendError},
    registry::{Registry, Rejected},
    worker::{Worker, WorkerFactory},
};
use parking_lot::Mutex;
use shutdown::{Shared, Ticket, coordinate};
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};
use tokio_util::sync::CancellationToken;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// A dynamically resizable pool of workers sharing one input and one output
/// channel.
///
/// Workers are added and removed at runtime by identity. Tasks submitted with
/// [`Pool::add_task`] go to whichever worker receives them first; results are
/// read from [`Pool::output`].
///
/// When the cancellation token passed to [`Pool::new`] fires, the input
/// channel is closed, the pool waits for every worker thread it ever started,
/// and then closes the output channel. Draining [`Pool::output`] until it ends
/// is therefore enough to observe a complete shutdown. Dropping a pool does
/// not stop it: its coordinator keeps waiting for the token.
///
/// # Example
///
/// ```
/// use flexpool::{BoxError, Outlet, Pool, Receiver, Worker, channel};
/// use tokio_util::sync::CancellationToken;
///
/// struct Doubler {
///     id: u32,
///     input: Receiver<u64>,
///     output: Outlet<u64>,
/// }
///
/// impl Worker for Doubler {
///     type Id = u32;
///
///     fn id(&self) -> u32 {
///         self.id
///     }
///
///     fn process(&self) {
///         for task in self.input.iter() {
///             if self.output.send(task * 2).is_err() {
///                 return;
///             }
///         }
///     }
///
///     // Only exits through shutdown in this example.
///     fn signal_removal(&self) {}
/// }
///
/// let token = CancellationToken::new();
/// let pool: Pool<Doubler, u64, u64> = Pool::new(
///     token.clone(),
///     channel::bounded(8),
///     channel::unbounded(),
///     |id: u32, input: Receiver<u64>, output: Outlet<u64>| {
///         Ok::<_, BoxError>(Doubler { id, input, output })
///     },
/// )?;
///
/// pool.add_worker(0)?;
/// pool.add_task(21).unwrap();
/// token.cancel();
///
/// assert_eq!(pool.output().iter().collect::<Vec<_>>(), vec![42]);
/// # Ok::<(), flexpool::Error<u32>>(())
/// ```
pub struct Pool<W, T, R>
where
    W: Worker,
{
    registry: Registry<W::Id, W>,
    factory: Box<dyn WorkerFactory<W, T, R>>,
    shared: Arc<Shared<T, R>>,
    input: Receiver<T>,
    output: Receiver<R>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
    closed: crossbeam_channel::Receiver<()>,
}

impl<W, T, R> Pool<W, T, R>
where
    W: Worker,
    T: Send + 'static,
    R: Send + 'static,
{
    /// Creates an empty pool and starts its shutdown coordinator.
    ///
    /// `input` and `output` are the two halves of the task and result
    /// channels, typically from [`channel::bounded`](crate::channel::bounded)
    /// or [`channel::unbounded`](crate::channel::unbounded). The pool closes
    /// both during shutdown; a bounded input applies backpressure to
    /// [`Pool::add_task`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the coordinator thread cannot be started.
    pub fn new(
        token: CancellationToken,
        input: (Outlet<T>, Receiver<T>),
        output: (Outlet<R>, Receiver<R>),
        factory: impl WorkerFactory<W, T, R>,
    ) -> crate::Result<Self, W::Id> {
        let (task_tx, task_rx) = input;
        let (result_tx, result_rx) = output;
        let shared = Arc::new(Shared::new(token, task_tx, result_tx));
        let (closed_tx, closed_rx) = crossbeam_channel::bounded(0);

        let coordinator = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("flexpool-shutdown".into())
                .spawn(move || coordinate(shared, closed_tx))
                .map_err(Error::Spawn)?
        };

        Ok(Self {
            registry: Registry::new(),
            factory: Box::new(factory),
            shared,
            input: task_rx,
            output: result_rx,
            coordinator: Mutex::new(Some(coordinator)),
            closed: closed_rx,
        })
    }

    /// Builds a worker and starts it on its own thread.
    ///
    /// The worker is registered under the identity it reports through
    /// [`Worker::id`], which the factory is trusted to derive from `id`. The
    /// call returns as soon as the worker is registered and its thread is
    /// spawned; it does not wait for [`Worker::process`] to do anything.
    ///
    /// # Errors
    ///
    /// - [`Error::Factory`] if the factory fails.
    /// - [`Error::IdConflict`] if the identity is already registered. The new
    ///   worker is dropped without being started.
    /// - [`Error::Spawn`] if the worker thread cannot be started.
    /// - [`Error::Closed`] if shutdown has progressed past the point where new
    ///   worker threads can be waited on.
    ///
    /// None of these leave a trace in the registry.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn add_worker(&self, id: W::Id) -> crate::Result<(), W::Id> {
        let worker = self
            .factory
            .create(id, self.input.clone(), self.shared.output.clone())
            .map_err(Error::Factory)?;
        let id = worker.id();
        let ticket = self.shared.tracker.enter().ok_or(Error::Closed)?;

        match self
            .registry
            .insert_with(id.clone(), Arc::new(worker), |worker| spawn(worker, ticket))
        {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {id:?} admitted");
                Ok(())
            }
            Err(Rejected::Occupied) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {id:?} rejected: id already registered");
                Err(Error::IdConflict(id))
            }
            Err(Rejected::Start(err)) => Err(Error::Spawn(err)),
        }
    }

    /// Removes an arbitrary worker and signals it to stop.
    ///
    /// Which worker is chosen is unspecified. Returns `None` if the pool has no
    /// workers. See [`Pool::remove_worker_by_id`] for the removal semantics.
    pub fn remove_worker(&self) -> Option<Arc<W>> {
        let (_id, worker) = self.registry.remove_any()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {_id:?} removed");

        worker.signal_removal();
        Some(worker)
    }

    /// Removes the worker registered under `id` and signals it to stop.
    ///
    /// Returns `None` if no such worker is registered. The identity is free
    /// again as soon as this returns, even though the removed worker's thread
    /// may still be finishing its current task; that thread is still waited on
    /// during shutdown.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn remove_worker_by_id(&self, id: &W::Id) -> Option<Arc<W>> {
        let worker = self.registry.remove(id)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {id:?} removed");

        worker.signal_removal();
        Some(worker)
    }

    /// Number of registered workers at the time of the call.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether no worker is registered. Removed workers still winding down
    /// are not counted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a worker is registered under `id` at the time of the call.
    pub fn contains(&self, id: &W::Id) -> bool {
        self.registry.contains(id)
    }

    /// Submits a task, blocking while a bounded input channel is full.
    ///
    /// An accepted task is received by at most one worker. It stays queued,
    /// unconsumed, only if every worker exits before reaching it. A submission
    /// already blocked on a full channel when shutdown begins still completes
    /// if a worker makes room before the last worker thread returns.
    ///
    /// # Errors
    ///
    /// Submitting after shutdown closed the input channel is a bug in the
    /// caller. The task is handed back inside [`ClosedError`] rather than
    /// dropped. A blocked submission that no worker is left to unblock fails
    /// the same way once every worker thread has returned.
    pub fn add_task(&self, task: T) -> Result<(), ClosedError<T>> {
        self.shared.input.send(task)
    }

    /// Submits a task without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TrySendError::Full`] when a bounded input channel is at
    /// capacity and [`TrySendError::Closed`] once shutdown closed it.
    pub fn try_add_task(&self, task: T) -> Result<(), TrySendError<T>> {
        self.shared.input.try_send(task)
    }

    /// A handle to the result channel.
    ///
    /// Iteration ends once the pool is [`PoolState::Closed`] and every
    /// produced result was received.
    pub fn output(&self) -> Receiver<R> {
        self.output.clone()
    }

    /// Current lifecycle state. It only moves forward, so a stale answer is
    /// never ahead of the pool.
    pub fn state(&self) -> PoolState {
        self.shared.state()
    }

    /// Worker threads started and not yet returned.
    ///
    /// Unlike [`Pool::len`] this includes removed workers that are still
    /// winding down.
    pub fn running_workers(&self) -> usize {
        self.shared.tracker.running()
    }

    /// Blocks until the pool is [`PoolState::Closed`] and its coordinator
    /// thread has exited.
    ///
    /// This only returns after the cancellation token fired.
    pub fn join(&self) {
        let handle = self.coordinator.lock().take();
        match handle {
            Some(handle) => {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }
            // Another caller is joining; the coordinator drops its end of
            // `closed` on exit.
            None => {
                let _ = self.closed.recv();
            }
        }
    }
}

/// Starts `worker` on a dedicated thread that holds `ticket` until
/// [`Worker::process`] returns or unwinds.
fn spawn<W: Worker>(worker: Arc<W>, ticket: Ticket) -> io::Result<()> {
    thread::Builder::new()
        .name("flexpool-worker".into())
        .spawn(move || {
            let _ticket = ticket;

            #[cfg(feature = "tracing")]
            tracing::trace!("Worker {:?} started", worker.id());

            worker.process();

            #[cfg(feature = "tracing")]
            tracing::trace!("Worker {:?} stopped", worker.id());
        })
        .map(drop)
}
