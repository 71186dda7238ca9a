use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::cache::{Cache, CacheKey};

struct WriteJob {
    key: CacheKey,
    bytes: Bytes,
}

/// Populates the cache off the request path.
///
/// Jobs go through a bounded queue drained by one worker task, so a burst
/// of misses cannot spawn unbounded writers. When the queue is full the
/// write is dropped; the next miss for that key will try again.
pub struct CacheWriter {
    tx: Mutex<Option<mpsc::Sender<WriteJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CacheWriter {
    pub fn spawn(cache: Arc<dyn Cache>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteJob>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match cache.put(&job.key, &job.bytes).await {
                    Ok(()) => tracing::debug!("Cached variant {} ({} bytes)", job.key, job.bytes.len()),
                    Err(e) => tracing::warn!("Failed to cache variant {}: {}", job.key, e),
                }
            }
            tracing::debug!("Cache writer drained");
        });
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a write without waiting for it. Returns whether the job was
    /// accepted.
    pub async fn enqueue(&self, key: CacheKey, bytes: Bytes) -> bool {
        let guard = self.tx.lock().await;
        let Some(tx) = guard.as_ref() else {
            tracing::warn!("Cache writer is shut down, dropping write for {}", key);
            return false;
        };
        match tx.try_send(WriteJob { key, bytes }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!("Cache write queue full, dropping write for {}", job.key);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!("Cache writer stopped, dropping write for {}", job.key);
                false
            }
        }
    }

    /// Stops accepting writes and waits for queued ones to land on disk.
    pub async fn shutdown(&self) {
        self.tx.lock().await.take();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                tracing::error!("Cache writer task failed: {}", e);
            }
        }
    }
}
