//! Supervised queue workers
//!
//! A [`Worker`] owns a [`PackQueue`] and one task draining it into a handler.
//! The handler runs inside a child task; if it panics the supervising task
//! logs the panic, resets the queue and marks the worker closed so later
//! packs are dropped instead of piling up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::queue::PackQueue;

/// Single-consumer pipeline stage
#[derive(Debug)]
pub struct Worker<T> {
    name: &'static str,
    queue: Arc<PackQueue<T>>,
    closed: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawn the worker task; must be called within a tokio runtime
    ///
    /// Handler errors are logged and the pack is dropped. Packs still queued
    /// when the worker is closed are handed to the handler before it exits.
    pub fn spawn<H>(name: &'static str, mut handler: H) -> Self
    where
        H: FnMut(T) -> Result<()> + Send + 'static,
    {
        let queue = Arc::new(PackQueue::new());
        let closed = Arc::new(AtomicBool::new(false));

        let inner = {
            let queue = Arc::clone(&queue);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                tracing::debug!(worker = name, "Worker started");

                while !closed.load(Ordering::Acquire) {
                    let Some(pack) = queue.dequeue().await else {
                        continue;
                    };
                    if let Err(e) = handler(pack) {
                        tracing::warn!(worker = name, error = %e, "Dropped pack");
                    }
                }

                while let Some(pack) = queue.try_dequeue() {
                    if let Err(e) = handler(pack) {
                        tracing::warn!(worker = name, error = %e, "Dropped pack");
                    }
                }
            })
        };

        let handle = {
            let queue = Arc::clone(&queue);
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                if let Err(e) = inner.await {
                    if e.is_panic() {
                        tracing::error!(worker = name, error = %e, "Worker panicked");
                    }
                    closed.store(true, Ordering::Release);
                    queue.clear();
                }
                tracing::debug!(worker = name, "Worker stopped");
            })
        };

        Self {
            name,
            queue,
            closed,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a pack for the handler; dropped once the worker is closed
    pub fn submit(&self, pack: T) {
        if self.closed.load(Ordering::Acquire) {
            tracing::trace!(worker = self.name, "Worker closed, pack dropped");
            return;
        }
        self.queue.enqueue(pack);
    }

    /// Ask the worker to stop after draining what is queued
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue.signal();
    }

    /// Whether `close` was called or the handler panicked
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of packs waiting for the handler
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Wait for the worker task to finish
    pub async fn join(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl<T> Drop for Worker<T> {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.queue.signal();
    }
}
