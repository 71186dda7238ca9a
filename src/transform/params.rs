use crate::config::{ImageFormat, DEFAULT_QUALITY};
use crate::error::ImageError;
use crate::negotiate::negotiate;

/// Query parameters as sent by the client; numbers are parsed afterwards
/// so each field can report its own error.
#[derive(Debug, Default)]
struct RawQuery {
    w: Option<String>,
    q: Option<String>,
}

impl RawQuery {
    /// First occurrence wins when a key is repeated.
    fn parse(query: &str) -> Result<Self, ImageError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| ImageError::InvalidQuery(e.to_string()))?;
        let mut raw = RawQuery::default();
        for (k, v) in pairs {
            match k.as_str() {
                "w" if raw.w.is_none() => raw.w = Some(v),
                "q" if raw.q.is_none() => raw.q = Some(v),
                _ => {}
            }
        }
        Ok(raw)
    }
}

/// A validated request for one variant of a source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub bucket: String,
    pub path: String,
    /// Target width, 0 keeps the source dimensions.
    pub width: u32,
    pub quality: u8,
    pub format: ImageFormat,
}

/// Checks a bucket name and object path taken from the URL.
///
/// Both must be non-empty. The bucket is a single segment and the path is
/// split on `/` with every segment non-empty and not `.` or `..`, which
/// keeps derived cache paths inside the cache root.
pub fn validate_location(bucket: &str, path: &str) -> Result<(), ImageError> {
    if bucket.is_empty() || path.is_empty() {
        return Err(ImageError::InvalidPath(format!("bucket={:?} path={:?}", bucket, path)));
    }
    if bucket.contains('/') || bucket.contains('\\') || bucket == "." || bucket == ".." {
        return Err(ImageError::InvalidPath(format!("bad bucket {:?}", bucket)));
    }
    let bad_segment = path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'));
    if bad_segment {
        return Err(ImageError::InvalidPath(format!("bad object path {:?}", path)));
    }
    Ok(())
}

/// Parses `w` and `q` from a raw query string.
///
/// Absent or empty values take their defaults: width 0 (no resize) and
/// quality 80.
pub fn parse_query(query: Option<&str>, max_width: u32) -> Result<(u32, u8), ImageError> {
    let raw: RawQuery = match query {
        Some(q) if !q.is_empty() => RawQuery::parse(q)?,
        _ => RawQuery::default(),
    };

    let width = match raw.w.as_deref().filter(|w| !w.is_empty()) {
        Some(w) => w
            .parse::<u32>()
            .map_err(|e| ImageError::InvalidWidth(format!("{:?}: {}", w, e)))?,
        None => 0,
    };
    if width > max_width {
        return Err(ImageError::WidthTooLarge(width));
    }

    let quality = match raw.q.as_deref().filter(|q| !q.is_empty()) {
        Some(q) => q
            .parse::<u8>()
            .ok()
            .filter(|q| (1..=100).contains(q))
            .ok_or_else(|| ImageError::InvalidQuality(format!("{:?}", q)))?,
        None => DEFAULT_QUALITY,
    };

    Ok((width, quality))
}

impl ImageRequest {
    /// Runs every request check in the order clients see them reported:
    /// location, then `Accept`, then `w` and `q`.
    pub fn new(
        bucket: &str,
        path: &str,
        accept: Option<&str>,
        query: Option<&str>,
        max_width: u32,
    ) -> Result<Self, ImageError> {
        validate_location(bucket, path)?;
        let format = negotiate(accept, &ImageFormat::SUPPORTED)?;
        let (width, quality) = parse_query(query, max_width)?;
        Ok(Self {
            bucket: bucket.to_string(),
            path: path.to_string(),
            width,
            quality,
            format,
        })
    }
}
