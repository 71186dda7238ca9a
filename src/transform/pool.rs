use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::config::ImageFormat;
use crate::error::ImageError;

/// Runs transforms on the blocking thread pool, at most `workers` at once.
#[derive(Debug, Clone)]
pub struct TransformPool {
    permits: Arc<Semaphore>,
}

impl TransformPool {
    pub fn new(workers: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(workers.max(1))) }
    }

    pub async fn run(
        &self,
        source: Bytes,
        width: u32,
        quality: u8,
        format: ImageFormat,
    ) -> Result<Bytes, ImageError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ImageError::Internal(format!("transform pool closed: {}", e)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            super::transform(&source, width, quality, format).map(Bytes::from)
        })
        .await
        .map_err(|e| ImageError::Internal(format!("transform task failed: {}", e)))?
    }

    /// Refuses new work; transforms already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
