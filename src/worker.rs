//! A background thread for work that must not stall the render loop.
//!
//! The only work moved off the engine thread is the face detector call. Each job carries a
//! [`Promise`]; the engine keeps the matching [`PromiseHandle`] and checks it without blocking on
//! every poll.

use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::drop::defer;

/// Creates a connected [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Room for exactly one value, so fulfilling never blocks the worker.
    let (tx, rx) = channel::bounded(1);
    (Promise { tx }, PromiseHandle { rx })
}

/// Write end of a single-value channel.
pub struct Promise<T> {
    tx: Sender<T>,
}

impl<T> Promise<T> {
    /// Hands `value` to the [`PromiseHandle`]. Drops it if the handle is already gone.
    pub fn fulfill(self, value: T) {
        let _ = self.tx.try_send(value);
    }
}

/// Read end of a single-value channel.
pub struct PromiseHandle<T> {
    rx: Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Takes the value if it has arrived.
    ///
    /// Returns `None` while the [`Promise`] is still pending, and `Some(Err(PromiseDropped))` once
    /// it was dropped unfulfilled (e.g. because the worker panicked).
    pub fn try_take(&self) -> Option<Result<T, PromiseDropped>> {
        match self.rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PromiseDropped)),
        }
    }
}

/// The [`Promise`] was dropped without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiseDropped;

/// A named thread that runs a handler on every job sent to it.
///
/// Jobs are queued in a channel with room for `capacity` entries. Dropping the `Worker` closes
/// the queue and joins the thread; a panic on the thread resurfaces on the thread that drops or
/// sends to the `Worker`.
pub struct Worker<J: Send + 'static> {
    tx: Option<Sender<J>>,
    thread: Option<JoinHandle<()>>,
}

impl<J: Send + 'static> Worker<J> {
    /// Spawns the worker thread.
    pub fn spawn<F>(name: &str, capacity: usize, mut handler: F) -> io::Result<Self>
    where
        F: FnMut(J) + Send + 'static,
    {
        let (tx, rx) = channel::bounded::<J>(capacity);
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                log::debug!("worker '{thread_name}' started");
                let _exit = defer(|| log::debug!("worker '{thread_name}' exited"));
                for job in rx {
                    handler(job);
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queues `job`, blocking while the queue is full.
    pub fn send(&mut self, job: J) {
        let delivered = self.tx.as_ref().map_or(false, |tx| tx.send(job).is_ok());
        if !delivered {
            // The receiving end only disappears when the thread is gone.
            self.join();
        }
    }

    fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if let Err(payload) = thread.join() {
            if !thread::panicking() {
                resume_unwind(payload);
            }
        }
    }
}

impl<J: Send + 'static> Drop for Worker<J> {
    fn drop(&mut self) {
        self.tx = None;
        self.join();
    }
}
