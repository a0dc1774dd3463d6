//! Error types for the worker pool.
//!
//! Only worker admission can fail. Removing a worker that is not registered is
//! a no-op, and submitting a task to a closed pool hands the task back through
//! [`ClosedError`] instead of dropping it.

use core::fmt;

/// Boxed error produced by a [`WorkerFactory`](crate::WorkerFactory).
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A result type whose error carries the offending worker identity.
pub type Result<T, Id> = core::result::Result<T, Error<Id>>;

/// All errors produced while admitting workers or building a pool.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error<Id: fmt::Debug> {
    /// A worker with the same identity is already registered.
    ///
    /// Nothing was mutated; the freshly built worker was dropped without ever
    /// being started.
    #[error("worker id conflict: a worker with id {0:?} is already registered")]
    IdConflict(Id),

    /// The worker factory could not build a worker.
    #[error("worker factory failed: {0}")]
    Factory(#[source] BoxError),

    /// The OS refused to start a worker or coordinator thread.
    #[error("failed to spawn pool thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The pool has stopped tracking worker threads and admits no more.
    #[error("pool is closed")]
    Closed,
}

/// A message could not be sent because its channel was closed.
///
/// The rejected message is returned so the caller decides what to do with it.
#[derive(thiserror::Error, PartialEq, Eq, Clone, Copy)]
#[error("sending on a closed channel")]
pub struct ClosedError<T>(pub T);

impl<T> ClosedError<T> {
    /// Returns the message that could not be sent.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for ClosedError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClosedError { .. }")
    }
}

/// A non-blocking send failed.
#[derive(thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum TrySendError<T> {
    /// The channel is bounded and currently at capacity.
    #[error("sending on a full channel")]
    Full(T),

    /// The channel was closed.
    #[error("sending on a closed channel")]
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Returns the message that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(msg) | Self::Closed(msg) => msg,
        }
    }

    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> From<ClosedError<T>> for TrySendError<T> {
    fn from(ClosedError(msg): ClosedError<T>) -> Self {
        Self::Closed(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_conflict_names_the_identity() {
        let err: Error<u32> = Error::IdConflict(7);
        assert_eq!(
            err.to_string(),
            "worker id conflict: a worker with id 7 is already registered"
        );
    }

    #[test]
    fn factory_error_keeps_its_source() {
        use core::error::Error as _;

        let err: Error<u32> = Error::Factory("out of sockets".into());
        assert_eq!(err.to_string(), "worker factory failed: out of sockets");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("out of sockets"));
    }

    #[test]
    fn rejected_messages_are_handed_back() {
        assert_eq!(ClosedError(5).into_inner(), 5);
        assert_eq!(TrySendError::Full(1).into_inner(), 1);

        let err: TrySendError<_> = ClosedError("late").into();
        assert!(err.is_closed());
        assert!(!err.is_full());
        assert_eq!(err.into_inner(), "late");
    }
}
