//! Bounded FIFO work queue with fail-fast admission control
//!
//! Enqueueing never blocks: a full buffer is surfaced to the submitter as
//! [`Error::Saturated`] instead of accumulating unbounded backlog. Dequeue
//! is the workers' side; a shared receiver hands each entry to exactly one
//! worker.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{Error, Result};

/// One unit of pending work
///
/// Entries carry the epoch they were enqueued with; a worker's claim only
/// succeeds while the job record still holds the same epoch, so cancelled or
/// requeued jobs leave stale entries that claim-and-discard harmlessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: Uuid,
    pub epoch: u64,
}

impl QueueEntry {
    pub fn new(id: Uuid, epoch: u64) -> Self {
        Self { id, epoch }
    }
}

/// Bounded multi-worker job queue
pub struct JobQueue {
    sender: mpsc::Sender<QueueEntry>,
    receiver: Arc<Mutex<mpsc::Receiver<QueueEntry>>>,
    capacity: usize,
}

impl JobQueue {
    /// Create a queue with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
        }
    }

    /// Admit an entry, failing fast when the buffer is full
    pub fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        match self.sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::Saturated),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::internal("job queue is closed"))
            }
        }
    }

    /// Wait for the next entry; `None` once the queue is closed and drained
    ///
    /// Single delivery: the receiver lock means each entry reaches exactly
    /// one worker.
    pub async fn dequeue(&self) -> Option<QueueEntry> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
