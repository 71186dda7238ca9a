use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod flight;
pub mod negotiate;
pub mod transform;

use crate::cache::{Cache, CacheKey, CacheWriter, DiskCache};
use crate::config::{ImageFormat, ServerConfig, DEFAULT_CACHE_CONTROL};
use crate::fetch::ObjectSource;
use crate::flight::Flights;
use crate::transform::params::ImageRequest;
use crate::transform::TransformPool;

pub use crate::error::{ImageError, Result};

const BANNER_NAME: &str = "next-image-s3";

/// Everything a request needs, shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    source: Arc<dyn ObjectSource>,
    cache: Arc<DiskCache>,
    writer: CacheWriter,
    pool: TransformPool,
    flights: Flights<CacheKey, Result<Bytes>>,
}

impl AppState {
    /// Builds the shared state and starts the background cache writer.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig, source: Arc<dyn ObjectSource>) -> Self {
        let cache = Arc::new(DiskCache::new(config.cache_dir.clone()));
        let writer = CacheWriter::spawn(cache.clone(), config.cache_write_queue);
        let pool = TransformPool::new(config.transform_workers);
        tracing::info!(
            "Transform pool ready: {} workers, cache at {}",
            config.transform_workers,
            config.cache_dir.display()
        );
        Self {
            config,
            source,
            cache,
            writer,
            pool,
            flights: Flights::new(),
        }
    }

    /// Releases the pipeline: no new transforms, pending cache writes flushed.
    pub async fn shutdown(&self) {
        self.pool.close();
        self.writer.shutdown().await;
        tracing::info!("Image pipeline shut down");
    }

    /// Fetches the source object, transforms it and queues the result for
    /// the cache. Nothing is cached when any step fails.
    async fn render_variant(&self, request: &ImageRequest, key: &CacheKey) -> Result<Bytes> {
        let source = self
            .source
            .get_object(&request.bucket, &request.path)
            .await?;
        tracing::debug!(
            "Fetched {}/{} ({} bytes)",
            request.bucket,
            request.path,
            source.len()
        );

        let encoded = self
            .pool
            .run(source, request.width, request.quality, request.format)
            .await?;

        self.writer.enqueue(key.clone(), encoded.clone()).await;
        Ok(encoded)
    }
}

fn image_response(bytes: Bytes, format: ImageFormat, cache_status: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(DEFAULT_CACHE_CONTROL));
    headers.insert("x-cache", HeaderValue::from_static(cache_status));
    headers.insert(header::VARY, HeaderValue::from_static("Accept"));
    (headers, Body::from(bytes)).into_response()
}

/// All `Accept` values joined, as if sent in one header.
fn accept_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() { None } else { Some(values.join(",")) }
}

async fn image_handler(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    let path = path.strip_prefix('/').unwrap_or(&path);
    tracing::info!("request bucket={} path={}", bucket, path);

    let request = ImageRequest::new(
        &bucket,
        path,
        accept_header(&headers).as_deref(),
        query.as_deref(),
        state.config.max_width,
    )?;
    let format = request.format;
    let key = state.cache.key_for(&request);

    match state.cache.get(&key).await {
        Ok(Some(data)) => {
            tracing::debug!("Cache hit for {}", key);
            return Ok(image_response(Bytes::from(data), format, "HIT"));
        }
        Ok(None) => tracing::debug!("Cache miss for {}", key),
        Err(e) => tracing::warn!("Cache lookup failed, treating as miss: {}", e),
    }

    let encoded = state
        .flights
        .run(&key, || state.render_variant(&request, &key))
        .await?;
    Ok(image_response(encoded, format, "MISS"))
}

async fn banner_handler() -> impl IntoResponse {
    format!(
        "{}\n\nRelease: {}\nBranch: {}\nCommit: {}",
        BANNER_NAME,
        env!("CARGO_PKG_VERSION"),
        option_env!("BUILD_BRANCH").unwrap_or("unknown"),
        option_env!("BUILD_COMMIT").unwrap_or("unknown"),
    )
}

async fn invalid_path_handler() -> ImageError {
    ImageError::InvalidPath("path does not match /{bucket}/{path...}".into())
}

/// Builds the service router: the banner at `/` and images under
/// `/{bucket}/{path...}`. Anything else is answered with a 400.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner_handler))
        .route("/:bucket/*path", get(image_handler))
        .fallback(invalid_path_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
