//! Shared background rebuild worker.
//!
//! One thread drains a bounded queue of rebuild requests FIFO. Requests
//! are whole volumes; enqueuing the same volume twice just runs two
//! idempotent passes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, bounded};

use crate::volume::Volume;

/// Requests the queue holds before `enqueue` starts blocking.
const QUEUE_DEPTH: usize = 32;

pub struct RegenQueue {
    tx: Option<Sender<Arc<Volume>>>,
    worker: Option<JoinHandle<()>>,
}

impl RegenQueue {
    pub fn new() -> Self {
        let (tx, rx) = bounded::<Arc<Volume>>(QUEUE_DEPTH);
        let worker = std::thread::spawn(move || {
            while let Ok(volume) = rx.recv() {
                // One bad item must not take the worker down with it.
                let pass = panic::catch_unwind(AssertUnwindSafe(|| volume.regenerate_now()));
                if pass.is_err() {
                    tracing::error!("Rebuild pass panicked; skipping the item");
                }
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Queue a rebuild, blocking while the queue is full.
    pub fn enqueue(&self, volume: Arc<Volume>) {
        if let Some(tx) = &self.tx {
            // Send only fails once the worker is gone; nothing left to rebuild.
            let _ = tx.send(volume);
        }
    }
}

impl Default for RegenQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RegenQueue {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            // The closed channel still serves queued items, so this join
            // waits for every accepted request to finish.
            let _ = worker.join();
        }
    }
}
