//! Stage/streamer abstraction: a bounded, clearable FIFO queue plus the
//! worker plumbing that wires one stage's output to another's input.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};

/// One queued item: the frame itself, and whether it is the terminal frame
/// of its logical unit (a speech-end sentinel, an end-of-response marker).
#[derive(Debug, Clone)]
pub struct Queued<F> {
    /// The frame payload.
    pub frame: F,
    /// Whether this frame closes out the current logical unit downstream.
    pub terminal: bool,
}

struct Inner<F> {
    items: VecDeque<Queued<F>>,
    closed: bool,
}

/// A bounded FIFO queue of frames with an atomic `clear()` that a channel
/// cannot express: interrupting a stage must purge pending work and reset
/// any outstanding join state in one indivisible step, not a close-then-
/// reopen dance a channel would force.
pub struct FrameQueue<F> {
    inner: Mutex<Inner<F>>,
    notify: Notify,
    capacity: usize,
}

impl<F> FrameQueue<F> {
    /// Create a queue bounded to `capacity` pending items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push a frame. Returns an error if the queue has been closed or is
    /// at capacity.
    pub fn commit(&self, frame: F, terminal: bool) -> Result<()> {
        {
            let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
            if inner.closed {
                return Err(CoreError::Stage("queue is closed".into()));
            }
            if inner.items.len() >= self.capacity {
                return Err(CoreError::Stage("queue is at capacity".into()));
            }
            inner.items.push_back(Queued { frame, terminal });
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Atomically discard every pending item without closing the queue.
    /// A no-op on an already-empty queue.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
        inner.items.clear();
    }

    /// Mark the queue closed. Pending items remain available to `iterate`;
    /// no further `commit` will succeed.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Pop the next item, waiting if the queue is empty and open. Returns
    /// `None` once the queue is closed and drained.
    pub async fn iterate(&self) -> Option<Queued<F>> {
        loop {
            {
                let mut inner = self.inner.lock().expect("frame queue mutex poisoned");
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Number of items currently pending.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("frame queue mutex poisoned").items.len()
    }

    /// Whether the queue currently has no pending items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A source of frames a stage can be wired to read from.
#[async_trait::async_trait]
pub trait FrameSource<F: Send + 'static>: Send + Sync {
    /// Pull the next frame, or `None` once the source is exhausted.
    async fn next_frame(&self) -> Option<Queued<F>>;
}

/// A sink of frames a stage can be wired to write to.
#[async_trait::async_trait]
pub trait FrameSink<F: Send + 'static>: Send + Sync {
    /// Accept one frame.
    async fn accept(&self, frame: Queued<F>);
}

#[async_trait::async_trait]
impl<F: Send + 'static> FrameSource<F> for FrameQueue<F> {
    async fn next_frame(&self) -> Option<Queued<F>> {
        self.iterate().await
    }
}

/// Spawn a worker task that pulls from `source` and commits into `queue`
/// until the source is exhausted, then closes `queue`.
///
/// This is the generic form of the teacher's per-stage ingest workers:
/// one dedicated task bridges a stage's upstream source into its own
/// bounded queue so the stage's processing loop only ever deals with its
/// own `FrameQueue`.
pub fn read_from<F>(
    queue: std::sync::Arc<FrameQueue<F>>,
    source: std::sync::Arc<dyn FrameSource<F>>,
) -> tokio::task::JoinHandle<()>
where
    F: Send + 'static,
{
    tokio::task::spawn(async move {
        while let Some(item) = source.next_frame().await {
            let terminal = item.terminal;
            if queue.commit(item.frame, terminal).is_err() {
                debug!("read_from: downstream queue closed, stopping ingest");
                return;
            }
        }
        queue.close();
    })
}

/// Spawn a worker task that pulls from `queue` and forwards every item to
/// `sink` until the queue is closed and drained.
pub fn write_to<F>(
    queue: std::sync::Arc<FrameQueue<F>>,
    sink: std::sync::Arc<dyn FrameSink<F>>,
) -> tokio::task::JoinHandle<()>
where
    F: Send + 'static,
{
    tokio::task::spawn(async move {
        while let Some(item) = queue.iterate().await {
            sink.accept(item).await;
        }
    })
}

/// Close a stage's input queue and join its worker tasks, bounded by
/// `timeout`. A worker that doesn't join in time is abandoned with a
/// warning rather than blocking shutdown indefinitely.
pub async fn close_stage(
    queue: &FrameQueue<impl Send + 'static>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    timeout: std::time::Duration,
) {
    queue.close();
    for worker in workers {
        if tokio::time::timeout(timeout, worker).await.is_err() {
            warn!("stage worker did not join within {timeout:?}, abandoning");
        }
    }
}
