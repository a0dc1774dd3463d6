use crate::{
    channel::{Outlet, Receiver},
    error::BoxError,
};
use core::{fmt, hash::Hash};

/// A unit of execution driven by a [`Pool`](crate::Pool).
///
/// The pool never looks at tasks or results; it only needs to know who a
/// worker is, how to run it, and how to ask it to stop. Each started worker
/// gets its own OS thread on which [`Worker::process`] runs, while the pool
/// keeps a second [`Arc`](std::sync::Arc) to it in its registry.
///
/// # Contract
///
/// - [`Worker::id`] must not change for the lifetime of the worker.
/// - [`Worker::process`] must return once the input channel is empty and
///   closed, or once [`Worker::signal_removal`] was called. A worker that does
///   neither hangs shutdown forever.
/// - Every result must be sent to the output [`Outlet`] before `process`
///   returns; anything still held afterwards is lost.
/// - Workers only send on their channels. Closing or aborting the output
///   [`Outlet`] is reserved to the pool, which does it after every worker
///   thread has returned; a worker doing it early cuts off its peers.
/// - [`Worker::signal_removal`] must not block. The pool calls it at most once
///   per worker, possibly before `process` has started running.
pub trait Worker: Send + Sync + 'static {
    /// Identity used as the registry key.
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    /// Runs the processing loop on the worker's dedicated thread.
    fn process(&self);

    /// Requests cooperative termination of [`Worker::process`].
    fn signal_removal(&self);
}

/// Builds workers on demand for [`Pool::add_worker`](crate::Pool::add_worker).
///
/// Every worker receives a clone of the shared input [`Receiver`] and output
/// [`Outlet`]. Any `Fn(W::Id, Receiver<T>, Outlet<R>) -> Result<W, BoxError>`
/// closure is a factory.
///
/// The identity a factory is given is a request: the pool registers whatever
/// [`Worker::id`] the built worker reports. The output handle is shared by all
/// workers and must not be closed by them; see the [`Worker`] contract.
pub trait WorkerFactory<W: Worker, T, R>: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns any error that prevented the worker from being built. The pool
    /// surfaces it as [`Error::Factory`](crate::Error::Factory).
    fn create(&self, id: W::Id, input: Receiver<T>, output: Outlet<R>) -> Result<W, BoxError>;
}

impl<F, W, T, R> WorkerFactory<W, T, R> for F
where
    W: Worker,
    F: Fn(W::Id, Receiver<T>, Outlet<R>) -> Result<W, BoxError> + Send + Sync + 'static,
{
    fn create(&self, id: W::Id, input: Receiver<T>, output: Outlet<R>) -> Result<W, BoxError> {
        self(id, input, output)
    }
}
