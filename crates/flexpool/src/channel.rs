//! Closable multi-producer, multi-consumer channels.
//!
//! A [`crossbeam_channel`] disconnects only once every `Sender` is dropped,
//! which would leave the pool at the mercy of whoever still holds a clone. The
//! [`Outlet`] wraps the single real sender in a shared slot so any holder can
//! close the channel explicitly: receivers then drain what is buffered and
//! observe disconnection.
//!
//! ```
//! use flexpool::channel;
//!
//! let (tx, rx) = channel::bounded(4);
//! tx.send(1).unwrap();
//! tx.close();
//!
//! assert!(tx.send(2).is_err());
//! assert_eq!(rx.iter().collect::<Vec<_>>(), vec![1]);
//! ```

use crate::error::{ClosedError, TrySendError};
use crossbeam_channel::{Select, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub use crossbeam_channel::Receiver;

/// Creates a channel that holds at most `cap` messages.
///
/// Sending on a full channel blocks until a receiver makes room. A capacity of
/// zero yields a rendezvous channel.
pub fn bounded<M>(cap: usize) -> (Outlet<M>, Receiver<M>) {
    let (tx, rx) = crossbeam_channel::bounded(cap);
    (Outlet::new(tx), rx)
}

/// Creates a channel with no capacity limit.
pub fn unbounded<M>() -> (Outlet<M>, Receiver<M>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Outlet::new(tx), rx)
}

/// The sending half of a closable channel.
///
/// Clones share one underlying sender; closing through any clone closes the
/// channel for all of them.
pub struct Outlet<M> {
    inner: Arc<Inner<M>>,
}

struct Inner<M> {
    slot: RwLock<Option<Sender<M>>>,
    // Dropped by `abort`, which disconnects `aborted` and wakes parked sends.
    abort: Mutex<Option<Sender<()>>>,
    aborted: Receiver<()>,
}

impl<M> Clone for Outlet<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Outlet<M> {
    fn new(tx: Sender<M>) -> Self {
        let (abort, aborted) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                slot: RwLock::new(Some(tx)),
                abort: Mutex::new(Some(abort)),
                aborted,
            }),
        }
    }

    /// Returns a private copy of the sender, or `None` once closed.
    ///
    /// The slot lock is released before the caller sends, so a send blocked on
    /// a full channel never holds up [`Outlet::close`]. The copy keeps the
    /// channel connected until that send completes, which means a send that
    /// started before the close is still delivered.
    fn sender(&self) -> Option<Sender<M>> {
        self.inner.slot.read().as_ref().cloned()
    }

    fn is_aborted(&self) -> bool {
        matches!(self.inner.aborted.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sends a message, blocking while a bounded channel is full.
    ///
    /// A send already parked when the channel is closed keeps waiting for
    /// room; only [`Outlet::abort`] releases it.
    ///
    /// # Errors
    ///
    /// Returns the message inside [`ClosedError`] if the channel was closed
    /// before the call, or aborted while it was waiting.
    pub fn send(&self, mut msg: M) -> Result<(), ClosedError<M>> {
        let Some(tx) = self.sender() else {
            return Err(ClosedError(msg));
        };

        let mut sel = Select::new();
        sel.send(&tx);
        sel.recv(&self.inner.aborted);

        loop {
            if self.is_aborted() {
                return Err(ClosedError(msg));
            }
            match tx.try_send(msg) {
                Ok(()) => return Ok(()),
                Err(crossbeam_channel::TrySendError::Full(back)) => msg = back,
                Err(crossbeam_channel::TrySendError::Disconnected(back)) => {
                    return Err(ClosedError(back));
                }
            }
            // Wakes on room or on abort; either may be gone again by the
            // time the loop re-checks.
            sel.ready();
        }
    }

    /// Attempts to send a message without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TrySendError::Full`] if a bounded channel is at capacity and
    /// [`TrySendError::Closed`] if the channel was closed.
    pub fn try_send(&self, msg: M) -> Result<(), TrySendError<M>> {
        let Some(tx) = self.sender() else {
            return Err(TrySendError::Closed(msg));
        };
        tx.try_send(msg).map_err(|err| match err {
            crossbeam_channel::TrySendError::Full(msg) => TrySendError::Full(msg),
            crossbeam_channel::TrySendError::Disconnected(msg) => TrySendError::Closed(msg),
        })
    }

    /// Closes the channel.
    ///
    /// Returns `true` if this call closed it and `false` if it was already
    /// closed. Buffered messages stay available to receivers.
    pub fn close(&self) -> bool {
        self.inner.slot.write().take().is_some()
    }

    /// Closes the channel and fails every send still parked on it.
    ///
    /// Each parked send returns its message inside [`ClosedError`]. Use this
    /// once nothing is left to receive, so a producer blocked on a full
    /// channel cannot wait forever.
    pub fn abort(&self) {
        self.close();
        self.inner.abort.lock().take();
    }

    /// Whether the channel was closed, through [`Outlet::close`] or
    /// [`Outlet::abort`] on any clone.
    pub fn is_closed(&self) -> bool {
        self.inner.slot.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn close_is_shared_by_clones() {
        let (tx, rx) = unbounded::<u8>();
        let other = tx.clone();

        assert!(other.close());
        assert!(!tx.close());
        assert!(tx.is_closed());
        assert_eq!(tx.send(1), Err(ClosedError(1)));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn receivers_drain_buffered_messages_after_close() {
        let (tx, rx) = bounded(3);
        for i in 0..3 {
            tx.send(i).unwrap();
        }
        tx.close();

        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn try_send_reports_full_then_closed() {
        let (tx, _rx) = bounded(1);
        tx.try_send(1).unwrap();

        assert_eq!(tx.try_send(2), Err(TrySendError::Full(2)));
        tx.close();
        assert_eq!(tx.try_send(3), Err(TrySendError::Closed(3)));
    }

    #[test]
    fn in_flight_send_survives_close() {
        let (tx, rx) = bounded(1);
        tx.send(0).unwrap();

        // What `send` holds while parked on a full channel.
        let in_flight = tx.sender().unwrap();
        assert!(tx.close());

        thread::scope(|s| {
            let blocked = s.spawn(move || in_flight.send(1));
            thread::sleep(Duration::from_millis(20));

            assert_eq!(rx.recv(), Ok(0));
            assert!(blocked.join().unwrap().is_ok());
        });

        assert_eq!(rx.recv(), Ok(1));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn abort_releases_parked_sends() {
        let (tx, rx) = bounded(1);
        tx.send(0).unwrap();

        thread::scope(|s| {
            let parked = s.spawn(|| tx.send(1));
            thread::sleep(Duration::from_millis(20));
            tx.abort();

            assert_eq!(parked.join().unwrap(), Err(ClosedError(1)));
        });

        assert!(tx.is_closed());
        assert_eq!(tx.send(2), Err(ClosedError(2)));
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![0]);
    }
}
