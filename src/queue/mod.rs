//! Pack queues
//!
//! Every pipeline stage owns one [`PackQueue`]. Producers append without
//! blocking and a single consumer task drains it:
//!
//! ```text
//! producer ─enqueue─► PackQueue ─dequeue─► worker task ─► sink
//! ```
//!
//! `dequeue` returns `None` after a wake-up that found nothing to read. That is
//! how `close()` reaches a parked worker: set the closed flag, then `signal()`.

mod buffer;

pub use buffer::PackBuffer;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Unbounded multi-producer queue with an async consumer side
#[derive(Debug)]
pub struct PackQueue<T> {
    packs: Mutex<PackBuffer<T>>,
    notify: Notify,
}

impl<T> PackQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            packs: Mutex::new(PackBuffer::new()),
            notify: Notify::new(),
        }
    }

    /// Append a pack and wake the consumer
    pub fn enqueue(&self, pack: T) {
        self.packs.lock().write_pack(pack);
        self.notify.notify_one();
    }

    /// Append several packs under one lock
    pub fn push_all<I>(&self, packs: I)
    where
        I: IntoIterator<Item = T>,
    {
        {
            let mut buf = self.packs.lock();
            for pack in packs {
                buf.write_pack(pack);
            }
        }
        self.notify.notify_one();
    }

    /// Take the next pack, waiting once if the queue is empty
    ///
    /// Returns `None` when a wake-up arrives and the queue is still empty.
    pub async fn dequeue(&self) -> Option<T> {
        let pack = self.packs.lock().read_pack();
        if pack.is_some() {
            return pack;
        }

        self.notify.notified().await;
        self.packs.lock().read_pack()
    }

    /// Take the next pack without waiting
    pub fn try_dequeue(&self) -> Option<T> {
        self.packs.lock().read_pack()
    }

    /// Wake the consumer without enqueuing anything
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Wake every task currently parked in `dequeue`
    pub fn broadcast(&self) {
        self.notify.notify_waiters();
    }

    /// Number of queued packs
    pub fn len(&self) -> usize {
        self.packs.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.packs.lock().is_empty()
    }

    /// Drop every queued pack
    pub fn clear(&self) {
        self.packs.lock().reset();
    }
}

impl<T> Default for PackQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
