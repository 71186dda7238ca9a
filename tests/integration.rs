use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use image::GenericImageView;
use next_image_s3::config::ServerConfig;
use next_image_s3::fetch::{ObjectSource, SourceError};
use next_image_s3::{router, AppState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

/// In-memory object storage that counts reads.
#[derive(Default)]
struct MemorySource {
    objects: HashMap<(String, String), Bytes>,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl MemorySource {
    fn with(mut self, bucket: &str, path: &str, bytes: Vec<u8>) -> Self {
        self.objects.insert((bucket.into(), path.into()), Bytes::from(bytes));
        self
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectSource for MemorySource {
    async fn get_object(&self, bucket: &str, path: &str) -> Result<Bytes, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("{}/{}", bucket, path)))
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    source: Arc<MemorySource>,
    root: PathBuf,
    _tmp: tempfile::TempDir,
}

fn harness(source: MemorySource) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ServerConfig {
        s3_endpoint: "unused:9000".into(),
        cache_dir: tmp.path().to_path_buf(),
        transform_workers: 2,
        ..ServerConfig::default()
    };
    let source = Arc::new(source);
    let state = Arc::new(AppState::new(cfg, source.clone()));
    Harness {
        app: router(state.clone()),
        state,
        source,
        root: tmp.path().to_path_buf(),
        _tmp: tmp,
    }
}

fn photo_png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(w, h, |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    png
}

async fn get(app: &Router, uri: &str, accept: Option<&str>) -> (StatusCode, axum::http::HeaderMap, Bytes) {
    let mut builder = Request::builder().uri(uri);
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..200 {
        if path.is_file() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn banner_identifies_the_service() {
    let h = harness(MemorySource::default());
    let (status, _, body) = get(&h.app, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.starts_with("next-image-s3"));
    assert!(text.contains("Release: "));
    assert!(text.contains("Commit: "));
}

#[tokio::test]
async fn cold_miss_then_warm_hit() {
    let h = harness(MemorySource::default().with("mybucket", "photo.jpg", photo_png(400, 300)));

    let (status, headers, first) = get(&h.app, "/mybucket/photo.jpg?w=200&q=70", Some("image/webp")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(headers["cache-control"], "public, max-age=31536000");
    assert_eq!(headers["content-type"], "image/webp");
    assert_eq!(h.source.fetches(), 1);

    let decoded = image::load_from_memory_with_format(&first, image::ImageFormat::WebP).unwrap();
    assert_eq!(decoded.dimensions(), (200, 150));

    let cached = h.root.join("mybucket").join("photo.jpg_w200_q70.webp");
    assert!(wait_for_file(&cached).await, "variant never reached {}", cached.display());
    assert_eq!(std::fs::read(&cached).unwrap(), first.to_vec());

    let (status, headers, second) = get(&h.app, "/mybucket/photo.jpg?w=200&q=70", Some("image/webp")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "HIT");
    assert_eq!(headers["cache-control"], "public, max-age=31536000");
    assert_eq!(second, first);
    assert_eq!(h.source.fetches(), 1);
}

#[tokio::test]
async fn png_and_jpeg_are_served_and_cached_like_webp() {
    let h = harness(MemorySource::default().with("b", "dir/pic.png", photo_png(64, 32)));

    let (status, headers, body) = get(&h.app, "/b/dir/pic.png?w=32", Some("image/png")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/png");
    assert_eq!(headers["x-cache"], "MISS");
    let png = image::load_from_memory_with_format(&body, image::ImageFormat::Png).unwrap();
    assert_eq!(png.dimensions(), (32, 16));
    assert!(wait_for_file(&h.root.join("b/dir/pic.png_w32_q80.png")).await);

    let (status, headers, body) = get(&h.app, "/b/dir/pic.png?q=50", Some("image/jpeg")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/jpeg");
    assert_eq!(&body[0..2], &[0xFFu8, 0xD8]);
    assert!(wait_for_file(&h.root.join("b/dir/pic.png_w0_q50.jpg")).await);
}

#[tokio::test]
async fn missing_accept_defaults_to_webp() {
    let h = harness(MemorySource::default().with("b", "p.png", photo_png(8, 8)));
    let (status, headers, _) = get(&h.app, "/b/p.png", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "image/webp");
}

#[tokio::test]
async fn malformed_paths_are_bad_requests() {
    let h = harness(MemorySource::default());
    for uri in ["/mybucket/", "/mybucket", "/mybucket/a//b.png", "/mybucket/a/../b.png"] {
        let (status, _, body) = get(&h.app, uri, Some("image/webp")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(&body[..], b"Path must comply to the format `/{bucket}/{path...}`");
    }
    assert_eq!(h.source.fetches(), 0);
}

#[tokio::test]
async fn unparsable_params_are_bad_requests() {
    let h = harness(MemorySource::default().with("b", "p.png", photo_png(8, 8)));
    for uri in ["/b/p.png?w=abc", "/b/p.png?q=abc", "/b/p.png?w=-5", "/b/p.png?q=0"] {
        let (status, _, _) = get(&h.app, uri, Some("image/webp")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
    }
    assert_eq!(h.source.fetches(), 0);
}

#[tokio::test]
async fn unacceptable_format_is_a_bad_request() {
    let h = harness(MemorySource::default().with("b", "p.png", photo_png(8, 8)));
    let (status, _, body) = get(&h.app, "/b/p.png", Some("text/html")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(&body[..], b"Cannot accept any type provided by the header `Accept`");
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let h = harness(MemorySource::default());
    let (status, headers, body) = get(&h.app, "/mybucket/missing.jpg", Some("image/webp")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(&body[..], b"File cannot be found on the bucket");
    assert!(headers.get("x-cache").is_none());
}

#[tokio::test]
async fn undecodable_object_is_a_server_error_and_not_cached() {
    let h = harness(MemorySource::default().with("b", "broken.jpg", b"not an image".to_vec()));
    let (status, _, body) = get(&h.app, "/b/broken.jpg", Some("image/webp")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(&body[..], b"Cannot read the image");

    h.state.shutdown().await;
    assert!(!h.root.join("b").exists());
}

#[tokio::test]
async fn concurrent_misses_share_one_transform() {
    let source = MemorySource {
        delay: Some(Duration::from_millis(100)),
        ..MemorySource::default()
    }
    .with("b", "hot.png", photo_png(120, 80));
    let h = harness(source);

    let requests = (0..6).map(|_| get(&h.app, "/b/hot.png?w=60", Some("image/webp")));
    let responses = futures::future::join_all(requests).await;

    let first = &responses[0].2;
    for (status, headers, body) in &responses {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(headers["x-cache"], "MISS");
        assert_eq!(body, first);
    }
    assert_eq!(h.source.fetches(), 1);
}

#[tokio::test]
async fn shutdown_flushes_pending_writes() {
    let h = harness(MemorySource::default().with("b", "p.png", photo_png(16, 16)));
    let (status, _, body) = get(&h.app, "/b/p.png", Some("image/png")).await;
    assert_eq!(status, StatusCode::OK);

    h.state.shutdown().await;
    assert_eq!(std::fs::read(h.root.join("b/p.png_w0_q80.png")).unwrap(), body.to_vec());
}
