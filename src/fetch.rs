use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, Url};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object unreadable: {0}")]
    Unreadable(String),
    #[error("object exceeds {0} bytes")]
    TooLarge(usize),
}

/// Where source images come from.
#[async_trait::async_trait]
pub trait ObjectSource: Send + Sync {
    /// Fetches the whole object at `bucket`/`path`.
    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, SourceError>;
}

/// Anonymous, path-style reads from an S3-compatible endpoint.
pub struct S3Source {
    client: Client,
    base: Url,
    max_size: usize,
}

impl S3Source {
    pub fn new(base_url: &str, max_size: usize) -> Result<Self, SourceError> {
        let base = Url::parse(base_url)
            .map_err(|e| SourceError::Unreadable(format!("invalid endpoint {}: {}", base_url, e)))?;
        Ok(Self { client: Client::new(), base, max_size })
    }

    /// `{base}/{bucket}/{path}`, each segment percent-encoded.
    pub fn object_url(&self, bucket: &str, path: &str) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Unreadable(format!("endpoint {} cannot be a base", self.base)))?
            .pop_if_empty()
            .push(bucket)
            .extend(path.split('/'));
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ObjectSource for S3Source {
    /// Streams the object into memory with the size limit enforced both on
    /// `Content-Length` and on the bytes actually received.
    ///
    /// Transport failures and non-2xx statuses are reported as `NotFound`;
    /// a body that breaks off mid-stream is `Unreadable`.
    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, SourceError> {
        let url = self.object_url(bucket, path)?;
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::NotFound(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(SourceError::NotFound(format!(
                "{}: upstream status {}",
                url,
                resp.status()
            )));
        }

        if let Some(len) = resp.content_length() {
            if len > self.max_size as u64 {
                return Err(SourceError::TooLarge(self.max_size));
            }
        }

        let mut buf = BytesMut::with_capacity(8192);
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream
            .next()
            .await
            .transpose()
            .map_err(|e| SourceError::Unreadable(format!("{}: {}", url, e)))?
        {
            if buf.len() + chunk.len() > self.max_size {
                return Err(SourceError::TooLarge(self.max_size));
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(buf.freeze())
    }
}
