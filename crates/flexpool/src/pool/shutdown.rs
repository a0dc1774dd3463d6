//! Shutdown coordination.
//!
//! A pool moves through [`PoolState::Running`], [`PoolState::ShuttingDown`]
//! and [`PoolState::Closed`], in that order and only forward:
//!
//! 1. The caller's [`CancellationToken`] fires.
//! 2. The input channel is closed. Registered workers drain what is left and
//!    exit; removed workers exit on their removal signal.
//! 3. The coordinator waits for every worker thread ever started.
//! 4. The input channel is aborted: a submission still parked on a full
//!    channel has nobody left to make room and gets its task back.
//! 5. The output channel is closed, telling consumers no result will follow.

use crate::channel::Outlet;
use crossbeam_channel::Sender;
use crossbeam_utils::sync::WaitGroup;
use parking_lot::Mutex;
use portable_atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a pool, driven by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    /// Accepting tasks and workers.
    Running = 0,
    /// The input channel is closed; waiting for worker threads to return.
    ShuttingDown = 1,
    /// Every worker thread returned and the output channel is closed.
    Closed = 2,
}

impl PoolState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }
}

/// Counts worker threads: one ticket per started thread, released when the
/// thread returns (or unwinds).
pub(crate) struct Tracker {
    running: Arc<AtomicUsize>,
    // `None` once the coordinator started waiting.
    group: Mutex<Option<WaitGroup>>,
}

/// Held by a worker thread for its whole life.
pub(crate) struct Ticket {
    running: Arc<AtomicUsize>,
    _group: WaitGroup,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        // Decrement before `_group` is dropped so a finished wait always
        // observes a zero count.
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self {
            running: Arc::new(AtomicUsize::new(0)),
            group: Mutex::new(Some(WaitGroup::new())),
        }
    }

    /// Issues a ticket for a thread about to start, or `None` if the
    /// coordinator is no longer counting.
    pub(crate) fn enter(&self) -> Option<Ticket> {
        let group = self.group.lock().as_ref()?.clone();
        self.running.fetch_add(1, Ordering::AcqRel);
        Some(Ticket {
            running: Arc::clone(&self.running),
            _group: group,
        })
    }

    /// Stops issuing tickets and blocks until every issued ticket is dropped.
    fn wait(&self) {
        let group = self.group.lock().take();
        if let Some(group) = group {
            group.wait();
        }
    }

    pub(crate) fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }
}

/// State shared between a pool and its coordinator thread.
pub(crate) struct Shared<T, R> {
    pub(crate) token: CancellationToken,
    pub(crate) input: Outlet<T>,
    pub(crate) output: Outlet<R>,
    pub(crate) tracker: Tracker,
    state: AtomicU8,
}

impl<T, R> Shared<T, R> {
    pub(crate) fn new(token: CancellationToken, input: Outlet<T>, output: Outlet<R>) -> Self {
        Self {
            token,
            input,
            output,
            tracker: Tracker::new(),
            state: AtomicU8::new(PoolState::Running as u8),
        }
    }

    pub(crate) fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, next: PoolState) {
        #[cfg(feature = "tracing")]
        tracing::debug!("Pool state {:?} -> {:?}", self.state(), next);
        self.state.store(next as u8, Ordering::Release);
    }
}

/// Body of the coordinator thread.
///
/// `_closed` is dropped on return, disconnecting every receiver waiting in
/// [`Pool::join`](crate::Pool::join).
pub(crate) fn coordinate<T, R>(shared: Arc<Shared<T, R>>, _closed: Sender<()>) {
    futures::executor::block_on(shared.token.cancelled());

    // === Running -> ShuttingDown: admit no more tasks ===
    shared.transition(PoolState::ShuttingDown);
    shared.input.close();

    // === Wait for every worker thread, removed ones included ===
    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Waiting for {} worker thread(s) to return",
        shared.tracker.running()
    );
    shared.tracker.wait();
    shared.input.abort();

    // === ShuttingDown -> Closed: no more results ===
    shared.transition(PoolState::Closed);
    shared.output.close();

    #[cfg(feature = "tracing")]
    tracing::info!("Worker pool shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use std::thread;

    #[test]
    fn tracker_counts_tickets_until_sealed() {
        let tracker = Tracker::new();
        let first = tracker.enter().unwrap();
        let second = tracker.enter().unwrap();
        assert_eq!(tracker.running(), 2);

        drop(first);
        assert_eq!(tracker.running(), 1);

        thread::scope(|s| {
            s.spawn(move || drop(second));
            tracker.wait();
        });

        assert_eq!(tracker.running(), 0);
        assert!(tracker.enter().is_none());
    }

    #[test]
    fn coordinator_closes_input_before_output() {
        let (task_tx, task_rx) = channel::unbounded::<u8>();
        let (result_tx, result_rx) = channel::unbounded::<u8>();
        let shared = Arc::new(Shared::new(CancellationToken::new(), task_tx, result_tx));
        let (closed_tx, closed_rx) = crossbeam_channel::bounded::<()>(0);

        let ticket = shared.tracker.enter().unwrap();
        let coordinator = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || coordinate(shared, closed_tx))
        };
        assert_eq!(shared.state(), PoolState::Running);

        shared.token.cancel();
        // A "worker" that still holds its ticket keeps the output open.
        assert!(task_rx.recv().is_err());
        shared.output.send(9).unwrap();
        assert_ne!(shared.state(), PoolState::Closed);
        drop(ticket);

        assert_eq!(result_rx.iter().collect::<Vec<_>>(), vec![9]);
        assert!(closed_rx.recv().is_err());
        coordinator.join().unwrap();
        assert_eq!(shared.state(), PoolState::Closed);
    }
}
