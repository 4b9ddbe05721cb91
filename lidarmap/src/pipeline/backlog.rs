//! Bounded work backlogs and run lifecycle tracking.
//!
//! Each backlog is a bounded crossbeam channel. Every item pushed into any
//! backlog is counted by the shared [`WorkTracker`] until the worker that
//! popped it drops the [`Job`] handle, so the run is complete exactly when
//! the count returns to zero after enumeration. Items pushed by a worker
//! while handling a job are counted before that job is released, which keeps
//! the count from touching zero mid-flight.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

/// How often blocked producers and idle workers re-check for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outstanding-work counter plus the run's shutdown flag.
#[derive(Debug, Default)]
pub struct WorkTracker {
    outstanding: Mutex<usize>,
    idle: Condvar,
    shutdown: AtomicBool,
}

impl WorkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self) {
        *self.outstanding.lock() += 1;
    }

    fn done(&self) {
        let mut outstanding = self.outstanding.lock();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    /// Items pushed but not yet fully handled.
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }

    /// Ask every worker and blocked producer to stop.
    pub fn shut_down(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.outstanding.lock();
        self.idle.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Block until no work is outstanding or shutdown is requested.
    ///
    /// Returns `true` when the backlogs drained.
    pub fn wait_idle(&self) -> bool {
        let mut outstanding = self.outstanding.lock();
        loop {
            if self.is_shut_down() {
                return false;
            }
            if *outstanding == 0 {
                return true;
            }
            self.idle.wait_for(&mut outstanding, POLL_INTERVAL);
        }
    }
}

/// A popped backlog item.
///
/// Dropping the handle marks the item as handled.
#[derive(Debug)]
pub struct Job<T> {
    item: T,
    tracker: Arc<WorkTracker>,
}

impl<T> Deref for Job<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

impl<T> Drop for Job<T> {
    fn drop(&mut self) {
        self.tracker.done();
    }
}

/// Bounded FIFO shared by producers and one worker pool.
#[derive(Debug)]
pub struct Backlog<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    tracker: Arc<WorkTracker>,
}

impl<T> Backlog<T> {
    pub fn new(capacity: usize, tracker: Arc<WorkTracker>) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            tracker,
        }
    }

    /// Push `item`, blocking while the backlog is full.
    ///
    /// Gives the item back if the run shuts down first.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.tracker.add();
        let mut item = item;
        loop {
            if self.tracker.is_shut_down() {
                self.tracker.done();
                return Err(item);
            }
            match self.sender.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => item = back,
                Err(SendTimeoutError::Disconnected(back)) => {
                    self.tracker.done();
                    return Err(back);
                }
            }
        }
    }

    /// Push `item` only if there is room right now.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        if self.tracker.is_shut_down() {
            return Err(item);
        }
        self.tracker.add();
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(back)) | Err(TrySendError::Disconnected(back)) => {
                self.tracker.done();
                Err(back)
            }
        }
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the run shuts down.
    pub fn pop(&self) -> Option<Job<T>> {
        loop {
            if self.tracker.is_shut_down() {
                return None;
            }
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(item) => {
                    return Some(Job {
                        item,
                        tracker: Arc::clone(&self.tracker),
                    })
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.receiver.capacity().unwrap_or(0)
    }
}
